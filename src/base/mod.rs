//! Core wire-level DNS types used throughout the crate.

pub mod iana;
pub mod name;

pub use self::iana::{Class, Rtype, SecurityAlgorithm};
pub use self::name::Name;

use core::fmt;
use serde::{Deserialize, Serialize};

//------------ Ttl -----------------------------------------------------------

/// A time-to-live value, in seconds.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Deserialize,
    Serialize,
)]
pub struct Ttl(u32);

impl Ttl {
    /// A TTL of zero seconds.
    pub const ZERO: Ttl = Ttl(0);

    /// Creates a TTL from a number of seconds.
    #[must_use]
    pub const fn from_secs(secs: u32) -> Self {
        Ttl(secs)
    }

    /// Returns the TTL as a number of seconds.
    #[must_use]
    pub const fn as_secs(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
