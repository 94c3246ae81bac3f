//! The signing engine.
//!
//! The functions here are the crate's top-level entry points. A pass
//! typically looks like this:
//!
//! 1. [`update_dnskeys()`] brings the apex key RRsets in line with the
//!    current key set (or the offline store),
//! 2. [`sign_zone_update()`] refreshes signatures: for everything when
//!    the update changed the apex DNSKEY or NSEC3PARAM RRset (or replaced
//!    the zone), otherwise only for what the update touched,
//! 3. the returned timestamp schedules the next pass.
//!
//! All work runs against a [`ZoneUpdate`] transaction and either applies
//! completely or leaves it untouched.

pub mod dnskeys;
pub mod error;
pub mod offline;
mod rrsigs;
mod tree;

pub use self::dnskeys::{
    add_dnskeys, collect_cds_keys, update_dnskeys, KeyRecords,
};
pub use self::error::SigningError;
pub use self::offline::{OfflineRecordStore, OfflineStoreError};
pub use self::rrsigs::rr_should_be_signed;

use crate::base::Rtype;
use crate::crypto::{PublicKey, SignRaw};
use crate::keys::{KeySet, ZoneKey};
use crate::policy::Policy;
use crate::rdata::Timestamp;
use crate::update::{Changeset, ZoneUpdate};
use crate::zonetree::{Rrset, ZoneContents};

//------------ SigningCtx ----------------------------------------------------

/// The shared, read-mostly state of one signing pass.
///
/// The current time is fixed once per pass, so every signature created in
/// the pass carries the same validity period.
#[derive(Clone, Debug)]
pub struct SigningCtx<'a> {
    pub(crate) policy: &'a Policy,
    pub(crate) now: Timestamp,
    pub(crate) offline_rrsig: Option<Rrset>,
}

impl<'a> SigningCtx<'a> {
    /// Creates a context for a pass starting now.
    #[must_use]
    pub fn new(policy: &'a Policy) -> Self {
        Self::with_now(policy, Timestamp::now())
    }

    /// Creates a context with an explicit current time.
    #[must_use]
    pub fn with_now(policy: &'a Policy, now: Timestamp) -> Self {
        SigningCtx {
            policy,
            now,
            offline_rrsig: None,
        }
    }

    pub fn policy(&self) -> &Policy {
        self.policy
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// The pre-made DNSKEY RRSIG loaded from the offline store, if any.
    pub fn offline_rrsig(&self) -> Option<&Rrset> {
        self.offline_rrsig.as_ref()
    }

    fn check_threads(&self) -> Result<(), SigningError> {
        if self.policy.signing_threads < 1 {
            return Err(SigningError::InvalidArgument(
                "signing threads must be at least one",
            ));
        }
        Ok(())
    }

    fn default_expire(&self) -> Timestamp {
        self.now.add(self.policy.rrsig_lifetime_secs())
    }
}

//------------ SignerCtx -----------------------------------------------------

/// A per-worker view of the key set, with verification state.
///
/// Workers never share one of these; each builds its own so signature
/// checks need no synchronization.
pub struct SignerCtx<'a, Inner> {
    pub(crate) ctx: &'a SigningCtx<'a>,
    keys: &'a KeySet<Inner>,
    verifiers: Vec<PublicKey>,
}

impl<'a, Inner: SignRaw> SignerCtx<'a, Inner> {
    /// Creates a signer context.
    ///
    /// Fails if any key in the set uses an algorithm the crate cannot
    /// verify.
    pub fn new(
        keys: &'a KeySet<Inner>,
        ctx: &'a SigningCtx<'a>,
    ) -> Result<Self, SigningError> {
        let verifiers = keys
            .iter()
            .map(|key| PublicKey::from_dnskey(key.dnskey()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SignerCtx {
            ctx,
            keys,
            verifiers,
        })
    }

    pub(crate) fn entries(
        &self,
    ) -> impl Iterator<Item = (&ZoneKey<Inner>, &PublicKey)> {
        self.keys.iter().zip(self.verifiers.iter())
    }
}

//------------ Zone-level entry points ---------------------------------------

/// Refreshes the signatures of the whole zone.
///
/// Returns the earliest expiration among the signatures now in the zone,
/// at most `now` plus the signature lifetime.
pub fn sign_zone<Inner: SignRaw + Sync>(
    update: &mut ZoneUpdate,
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
) -> Result<Timestamp, SigningError> {
    ctx.check_threads()?;
    let mut expires_at = Some(ctx.default_expire());
    tree::zone_tree_sign(
        update,
        tree::TreePart::Normal,
        keys,
        ctx,
        &mut expires_at,
    )?;
    tree::zone_tree_sign(
        update,
        tree::TreePart::Nsec3,
        keys,
        ctx,
        &mut expires_at,
    )?;
    Ok(expires_at.unwrap_or_else(|| ctx.default_expire()))
}

/// Returns whether the update changed the apex DNSKEY or NSEC3PARAM
/// RRset.
///
/// Unchanged remove-then-add rounds cancel out of the accumulated diff,
/// so any surviving entry is a real change.
fn apex_dnssec_changed(update: &ZoneUpdate) -> bool {
    update.change().touched().any(|rrset| {
        rrset.owner() == update.zone()
            && matches!(rrset.rtype(), Rtype::DNSKEY | Rtype::NSEC3PARAM)
    })
}

/// Refreshes the signatures an update calls for.
///
/// A full update, or one that changed the apex DNSKEY or NSEC3PARAM
/// RRset, signs the whole zone; any other update signs only what it
/// touched.
pub fn sign_zone_update<Inner: SignRaw + Sync>(
    update: &mut ZoneUpdate,
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
) -> Result<Timestamp, SigningError> {
    ctx.check_threads()?;
    if update.is_full() || apex_dnssec_changed(update) {
        sign_zone(update, keys, ctx)
    } else {
        let mut expires_at = Some(ctx.default_expire());
        tree::sign_changeset(update, keys, ctx, &mut expires_at)?;
        Ok(expires_at.unwrap_or_else(|| ctx.default_expire()))
    }
}

/// Unconditionally replaces the signatures on the apex SOA RRset.
pub fn sign_soa<Inner: SignRaw>(
    update: &mut ZoneUpdate,
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
) -> Result<(), SigningError> {
    let mut changeset = Changeset::new();
    {
        let apex = update.contents().apex_node().ok_or(
            SigningError::InvalidArgument("zone without apex node"),
        )?;
        let soa = apex
            .rrset(Rtype::SOA)
            .ok_or(SigningError::InvalidArgument("zone without SOA"))?;
        let rrsigs = apex.rrset(Rtype::RRSIG);
        let signer = SignerCtx::new(keys, ctx)?;
        rrsigs::force_resign_rrset(soa, rrsigs, &signer, &mut changeset)?;
    }
    update.apply_changeset(&changeset)?;
    Ok(())
}

/// Returns whether the apex SOA lacks a full set of fresh signatures.
///
/// Used as a cheap probe for whether a signing pass is due at all.
pub fn soa_is_expired<Inner: SignRaw>(
    contents: &ZoneContents,
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
) -> Result<bool, SigningError> {
    let apex = contents
        .apex_node()
        .ok_or(SigningError::InvalidArgument("zone without apex node"))?;
    let soa = apex
        .rrset(Rtype::SOA)
        .ok_or(SigningError::InvalidArgument("zone without SOA"))?;
    let signer = SignerCtx::new(keys, ctx)?;
    Ok(!rrsigs::all_signatures_exist(
        soa,
        apex.rrset(Rtype::RRSIG),
        &signer,
    ))
}

/// Signs the NSEC, NSEC3 and NSEC3PARAM records a changeset adds.
///
/// The signatures are appended to the same changeset, so freshly
/// generated denial records land in the zone already signed.
pub fn sign_nsecs_in_changeset<Inner: SignRaw>(
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
    changeset: &mut Changeset,
) -> Result<(), SigningError> {
    let signer = SignerCtx::new(keys, ctx)?;
    let targets: Vec<Rrset> = changeset
        .additions()
        .filter(|ch| {
            matches!(
                ch.rrset.rtype(),
                Rtype::NSEC | Rtype::NSEC3 | Rtype::NSEC3PARAM
            )
        })
        .map(|ch| ch.rrset.clone())
        .collect();
    for covered in &targets {
        rrsigs::add_missing_rrsigs(
            covered,
            None,
            &signer,
            changeset,
            &mut None,
        )?;
    }
    Ok(())
}

//============ Tests =========================================================
