//! Cryptographic signing and verification, backed by [`ring`].
//!
//! The signing engine treats keys abstractly through the [`SignRaw`]
//! trait, so deployments that keep private keys elsewhere (an HSM, a
//! remote signer) can plug in their own implementation. [`KeyPair`] is
//! the in-memory implementation used by default and by the tests.
//!
//! Verification of existing signatures goes through [`PublicKey`], which
//! is built from DNSKEY record data.

use crate::base::SecurityAlgorithm;
use crate::rdata::Dnskey;
use bytes::Bytes;
use core::fmt;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair as _, UnparsedPublicKey,
    ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING, ED25519,
};
use std::vec::Vec;

//------------ SignError -----------------------------------------------------

/// An error producing a signature.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignError {
    /// The requested algorithm is not supported for signing.
    UnsupportedAlgorithm,

    /// The key material could not be used.
    InvalidKey,

    /// The underlying cryptographic operation failed.
    SigningFailed,
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignError::UnsupportedAlgorithm => {
                "unsupported signing algorithm"
            }
            SignError::InvalidKey => "invalid key material",
            SignError::SigningFailed => "signing operation failed",
        })
    }
}

impl std::error::Error for SignError {}

//------------ AlgorithmError ------------------------------------------------

/// An error verifying a signature.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlgorithmError {
    /// The algorithm is not supported for verification.
    Unsupported,

    /// The signature did not verify.
    ///
    /// Unlike the other variants this is an expected outcome: callers
    /// routinely probe signatures made by retired keys.
    BadSig,

    /// The public key data is not valid for the algorithm.
    InvalidData,
}

impl fmt::Display for AlgorithmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlgorithmError::Unsupported => "unsupported algorithm",
            AlgorithmError::BadSig => "bad signature",
            AlgorithmError::InvalidData => "invalid public key data",
        })
    }
}

impl std::error::Error for AlgorithmError {}

//------------ Signature -----------------------------------------------------

/// A raw signature produced by [`SignRaw::sign_raw()`].
///
/// The wrapped octets are in the form DNSSEC stores in RRSIG record data,
/// i.e. fixed-width `r | s` for ECDSA rather than DER.
#[derive(Clone, Debug)]
pub enum Signature {
    EcdsaP256Sha256(Box<[u8; 64]>),
    Ed25519(Box<[u8; 64]>),
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        match self {
            Signature::EcdsaP256Sha256(sig) => sig.as_slice(),
            Signature::Ed25519(sig) => sig.as_slice(),
        }
    }
}

//------------ SignRaw -------------------------------------------------------

/// Low-level signing with a DNSSEC key.
///
/// Implementations sign raw octets; assembling the signed data and the
/// RRSIG record around the signature is the caller's job.
pub trait SignRaw {
    /// The algorithm of the key.
    fn algorithm(&self) -> SecurityAlgorithm;

    /// The public key as DNSKEY record data.
    ///
    /// The flags field is returned as 256 (zone key); callers managing
    /// key-signing keys replace the flags themselves.
    fn dnskey(&self) -> Dnskey;

    /// Signs the given data.
    fn sign_raw(&self, data: &[u8]) -> Result<Signature, SignError>;
}

//------------ KeyPair -------------------------------------------------------

/// An in-memory key pair.
pub enum KeyPair {
    EcdsaP256Sha256 {
        key: EcdsaKeyPair,
        rng: SystemRandom,
    },
    Ed25519(Ed25519KeyPair),
}

impl KeyPair {
    /// Generates a fresh key pair for the given algorithm.
    pub fn generate(algorithm: SecurityAlgorithm) -> Result<Self, SignError> {
        let rng = SystemRandom::new();
        match algorithm {
            SecurityAlgorithm::ECDSAP256SHA256 => {
                let doc = EcdsaKeyPair::generate_pkcs8(
                    &ECDSA_P256_SHA256_FIXED_SIGNING,
                    &rng,
                )
                .map_err(|_| SignError::SigningFailed)?;
                Self::from_pkcs8(algorithm, doc.as_ref())
            }
            SecurityAlgorithm::ED25519 => {
                let doc = Ed25519KeyPair::generate_pkcs8(&rng)
                    .map_err(|_| SignError::SigningFailed)?;
                Self::from_pkcs8(algorithm, doc.as_ref())
            }
            _ => Err(SignError::UnsupportedAlgorithm),
        }
    }

    /// Creates a key pair from a PKCS#8 encoded private key.
    pub fn from_pkcs8(
        algorithm: SecurityAlgorithm,
        der: &[u8],
    ) -> Result<Self, SignError> {
        match algorithm {
            SecurityAlgorithm::ECDSAP256SHA256 => {
                let rng = SystemRandom::new();
                let key = EcdsaKeyPair::from_pkcs8(
                    &ECDSA_P256_SHA256_FIXED_SIGNING,
                    der,
                    &rng,
                )
                .map_err(|_| SignError::InvalidKey)?;
                Ok(KeyPair::EcdsaP256Sha256 { key, rng })
            }
            SecurityAlgorithm::ED25519 => Ed25519KeyPair::from_pkcs8(der)
                .map(KeyPair::Ed25519)
                .map_err(|_| SignError::InvalidKey),
            _ => Err(SignError::UnsupportedAlgorithm),
        }
    }
}

impl SignRaw for KeyPair {
    fn algorithm(&self) -> SecurityAlgorithm {
        match self {
            KeyPair::EcdsaP256Sha256 { .. } => {
                SecurityAlgorithm::ECDSAP256SHA256
            }
            KeyPair::Ed25519(_) => SecurityAlgorithm::ED25519,
        }
    }

    fn dnskey(&self) -> Dnskey {
        let public_key = match self {
            KeyPair::EcdsaP256Sha256 { key, .. } => {
                // Ring exposes the uncompressed point format with a
                // leading 0x04 octet; DNSKEY stores bare `x | y`.
                Bytes::copy_from_slice(&key.public_key().as_ref()[1..])
            }
            KeyPair::Ed25519(key) => {
                Bytes::copy_from_slice(key.public_key().as_ref())
            }
        };
        Dnskey::new(256, 3, self.algorithm(), public_key)
    }

    fn sign_raw(&self, data: &[u8]) -> Result<Signature, SignError> {
        match self {
            KeyPair::EcdsaP256Sha256 { key, rng } => {
                let sig = key
                    .sign(rng, data)
                    .map_err(|_| SignError::SigningFailed)?;
                let sig: Box<[u8; 64]> = sig
                    .as_ref()
                    .try_into()
                    .map(Box::new)
                    .map_err(|_| SignError::SigningFailed)?;
                Ok(Signature::EcdsaP256Sha256(sig))
            }
            KeyPair::Ed25519(key) => {
                let sig = key.sign(data);
                let sig: Box<[u8; 64]> = sig
                    .as_ref()
                    .try_into()
                    .map(Box::new)
                    .map_err(|_| SignError::SigningFailed)?;
                Ok(Signature::Ed25519(sig))
            }
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.algorithm())
    }
}

//------------ PublicKey -----------------------------------------------------

/// A public key usable for signature verification.
#[derive(Clone, Debug)]
pub struct PublicKey {
    algorithm: SecurityAlgorithm,
    key: Vec<u8>,
}

impl PublicKey {
    /// Creates a verifier from DNSKEY record data.
    pub fn from_dnskey(dnskey: &Dnskey) -> Result<Self, AlgorithmError> {
        let raw = dnskey.public_key();
        let key = match dnskey.algorithm() {
            SecurityAlgorithm::ECDSAP256SHA256 => {
                if raw.len() != 64 {
                    return Err(AlgorithmError::InvalidData);
                }
                let mut key = Vec::with_capacity(65);
                key.push(0x04);
                key.extend_from_slice(raw);
                key
            }
            SecurityAlgorithm::ED25519 => {
                if raw.len() != 32 {
                    return Err(AlgorithmError::InvalidData);
                }
                raw.to_vec()
            }
            _ => return Err(AlgorithmError::Unsupported),
        };
        Ok(PublicKey {
            algorithm: dnskey.algorithm(),
            key,
        })
    }

    /// Verifies a signature over the given data.
    pub fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), AlgorithmError> {
        let params: &dyn ring::signature::VerificationAlgorithm =
            match self.algorithm {
                SecurityAlgorithm::ECDSAP256SHA256 => {
                    &ECDSA_P256_SHA256_FIXED
                }
                SecurityAlgorithm::ED25519 => &ED25519,
                _ => return Err(AlgorithmError::Unsupported),
            };
        UnparsedPublicKey::new(params, &self.key)
            .verify(data, signature)
            .map_err(|_| AlgorithmError::BadSig)
    }
}

//============ Tests =========================================================
