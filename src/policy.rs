//! Signing policy configuration.

use crate::base::Ttl;
use serde::{Deserialize, Serialize};
use std::time::Duration;

//------------ CdsPublish ----------------------------------------------------

/// When to publish CDS and CDNSKEY records at the apex.
///
/// These records (RFC 7344, RFC 8078) let the parent zone discover DS
/// changes. Which keys they advertise depends on the rollover state and
/// on this mode.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CdsPublish {
    /// Publish for keys in the ready state only, i.e. only while a KSK
    /// rollover is waiting for the parent.
    #[default]
    Rollover,

    /// Like `Rollover`, but fall back to the active key-signing keys when
    /// no key is ready, so the records are always present.
    Always,

    /// Publish both the ready and the active key-signing keys, for
    /// double-DS rollovers.
    DoubleDs,

    /// Publish the RFC 8078 delete sentinels, asking the parent to remove
    /// the secure delegation.
    Empty,

    /// Do not publish CDS or CDNSKEY records.
    None,
}

//------------ Policy --------------------------------------------------------

/// The configuration of a signing pass.
///
/// All fields have defaults, so a `Policy` can be deserialized from a
/// partial configuration fragment.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Policy {
    /// Number of worker threads for tree signing. Must be at least one.
    pub signing_threads: usize,

    /// How long from inception until a new signature expires.
    pub rrsig_lifetime: Duration,

    /// TTL for the apex DNSKEY, CDNSKEY and CDS RRsets.
    pub dnskey_ttl: Ttl,

    /// Drop and recreate all signatures instead of keeping valid ones.
    pub rrsig_drop_existing: bool,

    /// The key-signing keys live elsewhere; DNSKEY RRsets and their
    /// signatures arrive pre-signed through an offline record store.
    pub offline_ksk: bool,

    /// Sign the CDS and CDNSKEY RRsets with the key-signing keys rather
    /// than the zone-signing keys.
    pub cds_sign_by_ksk: bool,

    /// CDS and CDNSKEY publication mode.
    pub cds_cdnskey_publish: CdsPublish,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            signing_threads: 1,
            rrsig_lifetime: Duration::from_secs(14 * 24 * 3600),
            dnskey_ttl: Ttl::from_secs(3600),
            rrsig_drop_existing: false,
            offline_ksk: false,
            cds_sign_by_ksk: true,
            cds_cdnskey_publish: CdsPublish::Rollover,
        }
    }
}

impl Policy {
    /// Returns the signature lifetime in whole seconds.
    ///
    /// Sub-second precision is meaningless for RRSIG validity periods.
    /// The value is clamped to `2^31 - 1`, the largest offset the serial
    /// arithmetic of [`Timestamp::add`] can represent.
    ///
    /// [`Timestamp::add`]: crate::rdata::Timestamp::add
    #[must_use]
    pub fn rrsig_lifetime_secs(&self) -> u32 {
        self.rrsig_lifetime.as_secs().min(0x7FFF_FFFF) as u32
    }
}

//============ Tests =========================================================
