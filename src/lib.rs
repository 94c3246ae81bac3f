//! DNSSEC signature maintenance for authoritative zones.
//!
//! This crate keeps a zone's resource record sets covered by valid `RRSIG`
//! records. Given the zone's record trees, an immutable snapshot of the
//! signing keys and a signing policy, it
//!
//! - checks existing signatures and drops those that are expired, invalid,
//!   or made by keys that are no longer active,
//! - creates the signatures that are missing,
//! - maintains the apex `DNSKEY`, `CDNSKEY` and `CDS` RRsets across key
//!   rollovers, and
//! - reports the earliest signature expiration so the caller can schedule
//!   the next signing pass.
//!
//! All changes are produced as [`Changeset`]s and merged into a
//! [`ZoneUpdate`] transaction: a signing pass either applies completely or
//! not at all.
//!
//! # Usage
//!
//! The top-level entry points live in the [`sign`] module:
//!
//! - [`sign::sign_zone_update()`] signs whatever an update touched,
//!   falling back to a full zone sign when the apex `DNSKEY` or
//!   `NSEC3PARAM` RRset changed,
//! - [`sign::sign_zone()`] signs the whole zone unconditionally,
//! - [`sign::update_dnskeys()`] refreshes the apex key RRsets,
//! - [`sign::sign_soa()`] forces a fresh SOA signature.
//!
//! Large zones are partitioned across [`Policy::signing_threads`] worker
//! threads; workers never share mutable state and are joined before a pass
//! returns.
//!
//! # Scope
//!
//! Key rollover *policy* (which key is active, ready, or retired) is a
//! collaborator concern: keys arrive here as an already-computed
//! [`KeySet`]. Likewise NSEC/NSEC3 chain generation, zone loading, and
//! zone transfer are out of scope; the engine only signs what it is given.
//!
//! [`Changeset`]: update::Changeset
//! [`ZoneUpdate`]: update::ZoneUpdate
//! [`KeySet`]: keys::KeySet
//! [`Policy::signing_threads`]: policy::Policy

pub mod base;
pub mod crypto;
pub mod keys;
pub mod policy;
pub mod rdata;
pub mod sign;
pub mod update;
pub mod zonetree;

pub use self::policy::Policy;
pub use self::sign::error::SigningError;
