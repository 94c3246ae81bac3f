//! Offline key-signing-key support.
//!
//! In an offline-KSK deployment the key-signing keys never touch this
//! host. A separate signer periodically produces the apex DNSKEY, CDNSKEY
//! and CDS RRsets together with a DNSKEY RRSIG, and this engine fetches
//! them from a store instead of building and signing them itself.

use crate::base::name::Name;
use crate::rdata::Timestamp;
use crate::sign::dnskeys::KeyRecords;
use core::fmt;

//------------ OfflineStoreError ---------------------------------------------

/// An error loading offline key records.
#[derive(Clone, Debug)]
pub enum OfflineStoreError {
    /// The store holds no records valid for the requested time.
    NotFound,

    /// The store itself failed.
    Backend(String),
}

impl fmt::Display for OfflineStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfflineStoreError::NotFound => {
                f.write_str("no offline records for the requested time")
            }
            OfflineStoreError::Backend(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for OfflineStoreError {}

//------------ OfflineRecordStore --------------------------------------------

/// A source of pre-signed apex key records.
pub trait OfflineRecordStore {
    /// Loads the key records valid for the given zone at the given time.
    ///
    /// Also returns the time at which the next stored record set takes
    /// over, if known, so the caller can schedule the next refresh.
    fn load_offline_records(
        &self,
        zone: &Name,
        now: Timestamp,
    ) -> Result<(KeyRecords, Option<Timestamp>), OfflineStoreError>;
}
