//! IANA parameter value types.
//!
//! Only the values the signing engine actually needs to know about get a
//! named constant; everything else is carried through as its raw integer.

use core::fmt;

//------------ Rtype ---------------------------------------------------------

/// A resource record type.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rtype(u16);

impl Rtype {
    pub const A: Rtype = Rtype(1);
    pub const NS: Rtype = Rtype(2);
    pub const SOA: Rtype = Rtype(6);
    pub const MX: Rtype = Rtype(15);
    pub const TXT: Rtype = Rtype(16);
    pub const AAAA: Rtype = Rtype(28);
    pub const DS: Rtype = Rtype(43);
    pub const RRSIG: Rtype = Rtype(46);
    pub const NSEC: Rtype = Rtype(47);
    pub const DNSKEY: Rtype = Rtype(48);
    pub const NSEC3: Rtype = Rtype(50);
    pub const NSEC3PARAM: Rtype = Rtype(51);
    pub const CDS: Rtype = Rtype(59);
    pub const CDNSKEY: Rtype = Rtype(60);

    /// Creates a record type from its IANA value.
    #[must_use]
    pub const fn from_int(value: u16) -> Self {
        Rtype(value)
    }

    /// Returns the raw IANA value.
    #[must_use]
    pub const fn to_int(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Rtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Rtype::A => f.write_str("A"),
            Rtype::NS => f.write_str("NS"),
            Rtype::SOA => f.write_str("SOA"),
            Rtype::MX => f.write_str("MX"),
            Rtype::TXT => f.write_str("TXT"),
            Rtype::AAAA => f.write_str("AAAA"),
            Rtype::DS => f.write_str("DS"),
            Rtype::RRSIG => f.write_str("RRSIG"),
            Rtype::NSEC => f.write_str("NSEC"),
            Rtype::DNSKEY => f.write_str("DNSKEY"),
            Rtype::NSEC3 => f.write_str("NSEC3"),
            Rtype::NSEC3PARAM => f.write_str("NSEC3PARAM"),
            Rtype::CDS => f.write_str("CDS"),
            Rtype::CDNSKEY => f.write_str("CDNSKEY"),
            Rtype(value) => write!(f, "TYPE{}", value),
        }
    }
}

//------------ Class ---------------------------------------------------------

/// A DNS class.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Class(u16);

impl Class {
    pub const IN: Class = Class(1);

    /// Creates a class from its IANA value.
    #[must_use]
    pub const fn from_int(value: u16) -> Self {
        Class(value)
    }

    /// Returns the raw IANA value.
    #[must_use]
    pub const fn to_int(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Class::IN => f.write_str("IN"),
            Class(value) => write!(f, "CLASS{}", value),
        }
    }
}

//------------ SecurityAlgorithm ---------------------------------------------

/// A DNSSEC security algorithm number.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SecurityAlgorithm(u8);

impl SecurityAlgorithm {
    /// Used by the RFC 8078 delete sentinel.
    pub const DELETE: SecurityAlgorithm = SecurityAlgorithm(0);
    pub const RSASHA256: SecurityAlgorithm = SecurityAlgorithm(8);
    pub const ECDSAP256SHA256: SecurityAlgorithm = SecurityAlgorithm(13);
    pub const ED25519: SecurityAlgorithm = SecurityAlgorithm(15);

    /// Creates an algorithm from its IANA value.
    #[must_use]
    pub const fn from_int(value: u8) -> Self {
        SecurityAlgorithm(value)
    }

    /// Returns the raw IANA value.
    #[must_use]
    pub const fn to_int(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SecurityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SecurityAlgorithm::RSASHA256 => f.write_str("RSASHA256"),
            SecurityAlgorithm::ECDSAP256SHA256 => {
                f.write_str("ECDSAP256SHA256")
            }
            SecurityAlgorithm::ED25519 => f.write_str("ED25519"),
            SecurityAlgorithm(value) => write!(f, "ALG{}", value),
        }
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtype_display() {
        assert_eq!(Rtype::SOA.to_string(), "SOA");
        assert_eq!(Rtype::from_int(4711).to_string(), "TYPE4711");
    }

    #[test]
    fn rtype_roundtrip() {
        assert_eq!(Rtype::from_int(Rtype::RRSIG.to_int()), Rtype::RRSIG);
    }
}
