//! Typed views over the record data the signing engine interprets.
//!
//! Record data is stored as opaque wire-format octets throughout the
//! crate; this module provides the few typed views the engine needs:
//! `RRSIG` fields, `DNSKEY` fields and key tags, DS digests, and the
//! 32-bit serial timestamps used in signature validity periods.

use crate::base::name::Name;
use crate::base::{Rtype, SecurityAlgorithm, Ttl};
use bytes::Bytes;
use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;
use ring::digest;
use std::time::SystemTime;
use std::vec::Vec;
use time::{Date, Month, PrimitiveDateTime, Time};

//------------ ParseError ----------------------------------------------------

/// An error parsing record data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The record data ended before all fields were read.
    ShortInput,

    /// A field contained a malformed value.
    Malformed,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseError::ShortInput => "record data too short",
            ParseError::Malformed => "malformed record data",
        })
    }
}

impl std::error::Error for ParseError {}

//------------ Timestamp -----------------------------------------------------

/// An RRSIG expiration or inception time.
///
/// RFC 4034 defines these as seconds since the Unix epoch stored in 32
/// bits and compared using the serial number arithmetic of RFC 1982.
/// Because of the wrap-around there are pairs of values that are neither
/// smaller, larger, nor equal, so only a partial ordering is provided.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Returns the timestamp for the current system time.
    #[must_use]
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Timestamp(secs as u32)
    }

    /// Adds a number of seconds to the timestamp.
    ///
    /// Per RFC 1982 the amount must be at most `2^31 - 1`.
    ///
    /// # Panics
    ///
    /// Panics if `secs` is larger than `2^31 - 1`.
    #[must_use]
    pub fn add(self, secs: u32) -> Self {
        assert!(secs <= 0x7FFF_FFFF);
        Timestamp(self.0.wrapping_add(secs))
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn into_int(self) -> u32 {
        self.0
    }
}

impl From<u32> for Timestamp {
    fn from(value: u32) -> Self {
        Timestamp(value)
    }
}

impl FromStr for Timestamp {
    type Err = ParseError;

    /// Parses a timestamp from its presentation format.
    ///
    /// This is either the raw integer value or a date in
    /// `YYYYMMDDHHmmSS` format.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 14 && s.bytes().all(|ch| ch.is_ascii_digit()) {
            let num = |r: core::ops::Range<usize>| {
                s[r].parse::<u32>().map_err(|_| ParseError::Malformed)
            };
            let month = Month::try_from(num(4..6)? as u8)
                .map_err(|_| ParseError::Malformed)?;
            let date =
                Date::from_calendar_date(num(0..4)? as i32, month, num(6..8)? as u8)
                    .map_err(|_| ParseError::Malformed)?;
            let clock = Time::from_hms(
                num(8..10)? as u8,
                num(10..12)? as u8,
                num(12..14)? as u8,
            )
            .map_err(|_| ParseError::Malformed)?;
            let secs = PrimitiveDateTime::new(date, clock)
                .assume_utc()
                .unix_timestamp();
            Ok(Timestamp(secs as u32))
        } else {
            s.parse::<u32>()
                .map(Timestamp)
                .map_err(|_| ParseError::Malformed)
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.0 == other.0 {
            return Some(Ordering::Equal);
        }
        let diff = other.0.wrapping_sub(self.0);
        match diff.cmp(&0x8000_0000) {
            Ordering::Equal => None,
            Ordering::Less => Some(Ordering::Less),
            Ordering::Greater => Some(Ordering::Greater),
        }
    }
}

//------------ Rrsig ---------------------------------------------------------

/// The fields of RRSIG record data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rrsig {
    pub type_covered: Rtype,
    pub algorithm: SecurityAlgorithm,
    pub labels: u8,
    pub original_ttl: Ttl,
    pub expiration: Timestamp,
    pub inception: Timestamp,
    pub key_tag: u16,
    pub signer_name: Name,
    pub signature: Bytes,
}

impl Rrsig {
    /// Parses RRSIG record data.
    pub fn parse(rdata: &[u8]) -> Result<Self, ParseError> {
        if rdata.len() < 18 {
            return Err(ParseError::ShortInput);
        }
        let type_covered =
            Rtype::from_int(u16::from_be_bytes([rdata[0], rdata[1]]));
        let algorithm = SecurityAlgorithm::from_int(rdata[2]);
        let labels = rdata[3];
        let original_ttl = Ttl::from_secs(u32::from_be_bytes([
            rdata[4], rdata[5], rdata[6], rdata[7],
        ]));
        let expiration = Timestamp(u32::from_be_bytes([
            rdata[8], rdata[9], rdata[10], rdata[11],
        ]));
        let inception = Timestamp(u32::from_be_bytes([
            rdata[12], rdata[13], rdata[14], rdata[15],
        ]));
        let key_tag = u16::from_be_bytes([rdata[16], rdata[17]]);

        // The signer name is uncompressed in record data, so its length
        // can be determined by walking the labels.
        let rest = &rdata[18..];
        let mut pos = 0;
        loop {
            let len = *rest.get(pos).ok_or(ParseError::ShortInput)? as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            if len > 63 {
                return Err(ParseError::Malformed);
            }
            pos += len;
        }
        let signer_name =
            Name::from_wire(&rest[..pos]).ok_or(ParseError::Malformed)?;
        let signature = Bytes::copy_from_slice(&rest[pos..]);

        Ok(Rrsig {
            type_covered,
            algorithm,
            labels,
            original_ttl,
            expiration,
            inception,
            key_tag,
            signer_name,
            signature,
        })
    }

    /// Appends the wire format of the record data to a buffer.
    ///
    /// An empty signature field simply is not appended, which makes the
    /// composed form of a signature-less value exactly the "RRSIG RDATA"
    /// portion of the signed data defined in RFC 4034 section 3.1.8.1.
    pub fn compose(&self, target: &mut Vec<u8>) {
        target.extend_from_slice(&self.type_covered.to_int().to_be_bytes());
        target.push(self.algorithm.to_int());
        target.push(self.labels);
        target.extend_from_slice(&self.original_ttl.as_secs().to_be_bytes());
        target.extend_from_slice(&self.expiration.0.to_be_bytes());
        target.extend_from_slice(&self.inception.0.to_be_bytes());
        target.extend_from_slice(&self.key_tag.to_be_bytes());
        self.signer_name.compose(target);
        target.extend_from_slice(&self.signature);
    }

    /// Returns the covered type without parsing the whole record data.
    #[must_use]
    pub fn peek_type_covered(rdata: &[u8]) -> Option<Rtype> {
        rdata
            .get(0..2)
            .map(|b| Rtype::from_int(u16::from_be_bytes([b[0], b[1]])))
    }

    /// Returns the key tag without parsing the whole record data.
    #[must_use]
    pub fn peek_key_tag(rdata: &[u8]) -> Option<u16> {
        rdata.get(16..18).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Returns the expiration time without parsing the whole record data.
    #[must_use]
    pub fn peek_expiration(rdata: &[u8]) -> Option<Timestamp> {
        rdata.get(8..12).map(|b| {
            Timestamp(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        })
    }
}

//------------ Dnskey --------------------------------------------------------

/// The fields of DNSKEY record data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dnskey {
    flags: u16,
    protocol: u8,
    algorithm: SecurityAlgorithm,
    public_key: Bytes,
}

impl Dnskey {
    /// Creates new DNSKEY data.
    #[must_use]
    pub fn new(
        flags: u16,
        protocol: u8,
        algorithm: SecurityAlgorithm,
        public_key: Bytes,
    ) -> Self {
        Dnskey {
            flags,
            protocol,
            algorithm,
            public_key,
        }
    }

    /// Parses DNSKEY record data.
    pub fn parse(rdata: &[u8]) -> Result<Self, ParseError> {
        if rdata.len() < 4 {
            return Err(ParseError::ShortInput);
        }
        Ok(Dnskey {
            flags: u16::from_be_bytes([rdata[0], rdata[1]]),
            protocol: rdata[2],
            algorithm: SecurityAlgorithm::from_int(rdata[3]),
            public_key: Bytes::copy_from_slice(&rdata[4..]),
        })
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn algorithm(&self) -> SecurityAlgorithm {
        self.algorithm
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Returns whether the Zone Key flag is set.
    ///
    /// A key without this flag must not be used to verify RRSIGs covering
    /// RRsets. See RFC 4034 section 2.1.1.
    #[must_use]
    pub fn is_zone_key(&self) -> bool {
        self.flags & 0b0000_0001_0000_0000 != 0
    }

    /// Returns whether the Secure Entry Point flag is set.
    #[must_use]
    pub fn is_secure_entry_point(&self) -> bool {
        self.flags & 1 != 0
    }

    /// Appends the wire format of the record data to a buffer.
    pub fn compose(&self, target: &mut Vec<u8>) {
        target.extend_from_slice(&self.flags.to_be_bytes());
        target.push(self.protocol);
        target.push(self.algorithm.to_int());
        target.extend_from_slice(&self.public_key);
    }

    /// Returns the wire format of the record data.
    #[must_use]
    pub fn to_rdata(&self) -> Bytes {
        let mut rdata = Vec::with_capacity(4 + self.public_key.len());
        self.compose(&mut rdata);
        Bytes::from(rdata)
    }

    /// Returns the key tag of the key, per RFC 4034 appendix B.
    #[must_use]
    pub fn key_tag(&self) -> u16 {
        let mut ac = 0u32;
        let mut rdata = Vec::with_capacity(4 + self.public_key.len());
        self.compose(&mut rdata);
        for (i, &ch) in rdata.iter().enumerate() {
            if i & 1 == 0 {
                ac += u32::from(ch) << 8;
            } else {
                ac += u32::from(ch);
            }
        }
        ac += (ac >> 16) & 0xFFFF;
        (ac & 0xFFFF) as u16
    }
}

//------------ DS digests ----------------------------------------------------

/// The SHA-256 DS digest type value.
const DIGEST_TYPE_SHA256: u8 = 2;

/// Builds DS record data referring to the given key, with a SHA-256
/// digest.
///
/// The digest is computed over the canonical owner name followed by the
/// DNSKEY record data, per RFC 4034 section 5.1.4. Used to publish `CDS`
/// records alongside `CDNSKEY`s.
#[must_use]
pub fn ds_rdata_sha256(owner: &Name, dnskey: &Dnskey) -> Bytes {
    let mut input = Vec::with_capacity(
        owner.as_wire().len() + 4 + dnskey.public_key().len(),
    );
    owner.compose(&mut input);
    dnskey.compose(&mut input);
    let hash = digest::digest(&digest::SHA256, &input);

    let mut rdata = Vec::with_capacity(4 + hash.as_ref().len());
    rdata.extend_from_slice(&dnskey.key_tag().to_be_bytes());
    rdata.push(dnskey.algorithm().to_int());
    rdata.push(DIGEST_TYPE_SHA256);
    rdata.extend_from_slice(hash.as_ref());
    Bytes::from(rdata)
}

//============ Tests =========================================================
