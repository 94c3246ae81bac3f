//! Signing pass errors.

use crate::crypto::{AlgorithmError, SignError};
use crate::rdata::{ParseError, Timestamp};
use crate::update::ApplyError;
use core::fmt;

//------------ SigningError --------------------------------------------------

/// An error aborting a signing pass.
///
/// An invalid signature found in the zone is not an error (it simply gets
/// removed and replaced); these variants are the conditions under which a
/// pass stops and leaves the zone update untouched.
#[derive(Clone, Debug)]
pub enum SigningError {
    /// A caller-supplied argument was unusable.
    InvalidArgument(&'static str),

    /// An RRSIG RRset was presented for signing.
    RrsigRrsMustNotBeSigned,

    /// A signature validity period ends before it starts.
    InvalidSignatureValidityPeriod(Timestamp, Timestamp),

    /// Existing record data in the zone could not be parsed.
    ParseRecordData(ParseError),

    /// Creating a signature failed.
    Signing(SignError),

    /// Verifying a signature failed for a reason other than the
    /// signature being invalid.
    Verification(AlgorithmError),

    /// A produced changeset could not be applied to the zone.
    ChangesetApply(ApplyError),

    /// A signing worker thread could not be started or did not finish.
    ThreadFailure,
}

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningError::InvalidArgument(what) => {
                write!(f, "invalid argument: {}", what)
            }
            SigningError::RrsigRrsMustNotBeSigned => {
                f.write_str("RRSIG RRsets cannot be signed")
            }
            SigningError::InvalidSignatureValidityPeriod(inc, exp) => {
                write!(
                    f,
                    "invalid signature validity period: {} to {}",
                    inc, exp
                )
            }
            SigningError::ParseRecordData(err) => {
                write!(f, "unusable record data in zone: {}", err)
            }
            SigningError::Signing(err) => {
                write!(f, "signing failed: {}", err)
            }
            SigningError::Verification(err) => {
                write!(f, "signature verification failed: {}", err)
            }
            SigningError::ChangesetApply(err) => {
                write!(f, "applying changeset failed: {}", err)
            }
            SigningError::ThreadFailure => {
                f.write_str("signing worker thread failed")
            }
        }
    }
}

impl std::error::Error for SigningError {}

//--- From

impl From<ParseError> for SigningError {
    fn from(err: ParseError) -> Self {
        SigningError::ParseRecordData(err)
    }
}

impl From<SignError> for SigningError {
    fn from(err: SignError) -> Self {
        SigningError::Signing(err)
    }
}

impl From<AlgorithmError> for SigningError {
    fn from(err: AlgorithmError) -> Self {
        SigningError::Verification(err)
    }
}

impl From<ApplyError> for SigningError {
    fn from(err: ApplyError) -> Self {
        SigningError::ChangesetApply(err)
    }
}
