//! Domain names.

use bytes::Bytes;
use core::fmt;
use core::str::FromStr;
use std::vec::Vec;

//------------ Name ----------------------------------------------------------

/// An absolute domain name in wire format.
///
/// The name is stored with all ASCII letters lowercased, so byte-wise
/// equality is DNS name equality and the stored form is already the RFC
/// 4034 canonical form used when composing signed data.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Name {
    wire: Bytes,
}

impl Name {
    /// The maximum length of a name in wire format.
    pub const MAX_LEN: usize = 255;

    /// Returns the root name.
    #[must_use]
    pub fn root() -> Self {
        Name {
            wire: Bytes::from_static(b"\0"),
        }
    }

    /// Creates a name from its wire format.
    ///
    /// Returns `None` if the octets are not a well-formed absolute name.
    /// ASCII letters are lowercased.
    #[must_use]
    pub fn from_wire(octets: &[u8]) -> Option<Self> {
        if octets.len() > Self::MAX_LEN {
            return None;
        }
        let mut pos = 0;
        loop {
            let len = *octets.get(pos)? as usize;
            if len == 0 {
                if pos + 1 != octets.len() {
                    return None;
                }
                break;
            }
            if len > 63 {
                return None;
            }
            pos += 1 + len;
        }
        Some(Name {
            wire: Bytes::from(octets.to_ascii_lowercase()),
        })
    }

    /// Returns the wire format of the name.
    #[must_use]
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    /// Returns an iterator over the labels of the name.
    ///
    /// The final empty root label is not included.
    pub fn iter_labels(&self) -> impl Iterator<Item = &[u8]> {
        LabelIter {
            wire: &self.wire,
            pos: 0,
        }
    }

    /// Returns the number of labels, not counting the root label.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.iter_labels().count()
    }

    /// Returns the label count for the RRSIG labels field.
    ///
    /// Neither the root label nor a leftmost wildcard label is counted,
    /// per RFC 4034 section 3.1.3.
    #[must_use]
    pub fn rrsig_label_count(&self) -> u8 {
        let mut count = 0usize;
        for (i, label) in self.iter_labels().enumerate() {
            if i == 0 && label == b"*" {
                continue;
            }
            count += 1;
        }
        count as u8
    }

    /// Returns whether this is the root name.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Returns the parent name, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Name> {
        if self.is_root() {
            return None;
        }
        let first = self.wire[0] as usize;
        Some(Name {
            wire: self.wire.slice(1 + first..),
        })
    }

    /// Returns whether the name ends with (or equals) the given name.
    #[must_use]
    pub fn ends_with(&self, base: &Name) -> bool {
        let wire = self.wire.as_ref();
        let base = base.wire.as_ref();
        if base.len() > wire.len() {
            return false;
        }
        // Suffix match is only name containment when it starts at a label
        // boundary.
        let offset = wire.len() - base.len();
        if &wire[offset..] != base {
            return false;
        }
        let mut pos = 0;
        while pos < offset {
            pos += 1 + wire[pos] as usize;
        }
        pos == offset
    }

    /// Appends the wire format of the name to a buffer.
    pub fn compose(&self, target: &mut Vec<u8>) {
        target.extend_from_slice(&self.wire);
    }
}

//--- FromStr

/// An error creating a name from its presentation format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NameError(());

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid domain name")
    }
}

impl std::error::Error for NameError {}

impl FromStr for Name {
    type Err = NameError;

    /// Parses a name from its presentation format.
    ///
    /// A trailing dot is accepted and ignored; the name is always treated
    /// as absolute. Escapes are not supported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." || s.is_empty() {
            return Ok(Name::root());
        }
        let s = s.strip_suffix('.').unwrap_or(s);
        let mut wire = Vec::with_capacity(s.len() + 2);
        for label in s.split('.') {
            if label.is_empty() || label.len() > 63 || !label.is_ascii() {
                return Err(NameError(()));
            }
            wire.push(label.len() as u8);
            wire.extend(label.bytes().map(|ch| ch.to_ascii_lowercase()));
        }
        wire.push(0);
        if wire.len() > Self::MAX_LEN {
            return Err(NameError(()));
        }
        Ok(Name {
            wire: Bytes::from(wire),
        })
    }
}

//--- Display and Debug

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.iter_labels() {
            for &ch in label {
                if ch.is_ascii_graphic() {
                    fmt::Write::write_char(f, ch as char)?;
                } else {
                    write!(f, "\\{:03}", ch)?;
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

//------------ LabelIter -----------------------------------------------------

struct LabelIter<'a> {
    wire: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.wire[self.pos] as usize;
        if len == 0 {
            return None;
        }
        let start = self.pos + 1;
        self.pos = start + len;
        Some(&self.wire[start..start + len])
    }
}

//============ Tests =========================================================
