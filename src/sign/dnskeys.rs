//! Maintenance of the apex DNSKEY, CDNSKEY and CDS RRsets.
//!
//! Before signatures are refreshed, the key RRsets at the apex are
//! rebuilt from the current key set (or loaded from the offline store).
//! The rebuild is expressed as remove-everything-then-add-back with
//! cancel-out merging, so unchanged records produce no churn.

use crate::base::name::Name;
use crate::base::{Class, Rtype, Ttl};
use crate::crypto::SignRaw;
use crate::keys::{KeySet, ZoneKey};
use crate::policy::{CdsPublish, Policy};
use crate::rdata::{ds_rdata_sha256, Timestamp};
use crate::sign::error::SigningError;
use crate::sign::offline::OfflineRecordStore;
use crate::sign::SigningCtx;
use crate::update::{ChangeFlags, Changeset, ZoneUpdate};
use crate::zonetree::Rrset;
use bytes::Bytes;
use tracing::{info, warn};

/// CDNSKEY record data of the RFC 8078 delete sentinel.
const CDNSKEY_DELETE: [u8; 5] = [0, 0, 3, 0, 0];

/// CDS record data of the RFC 8078 delete sentinel.
const CDS_DELETE: [u8; 5] = [0, 0, 0, 0, 0];

//------------ KeyRecords ----------------------------------------------------

/// The apex key RRsets of one zone.
#[derive(Clone, Debug)]
pub struct KeyRecords {
    pub dnskey: Rrset,
    pub cdnskey: Rrset,
    pub cds: Rrset,

    /// A pre-made RRSIG RRset covering the DNSKEY RRset, present when
    /// the records come from an offline signer.
    pub rrsig: Option<Rrset>,
}

impl KeyRecords {
    /// Creates empty key RRsets for the given apex.
    #[must_use]
    pub fn new(apex: Name, class: Class, ttl: Ttl) -> Self {
        let dnskey = Rrset::new(apex, Rtype::DNSKEY, class, ttl);
        let cdnskey = dnskey.init_from(Rtype::CDNSKEY, ttl);
        let cds = dnskey.init_from(Rtype::CDS, ttl);
        KeyRecords {
            dnskey,
            cdnskey,
            cds,
            rrsig: None,
        }
    }
}

//------------ CDS/CDNSKEY key selection -------------------------------------

/// Picks the keys to advertise through CDS and CDNSKEY records.
///
/// Ready keys come first; in the `Always` mode active key-signing keys
/// stand in when no key is ready, and in the `DoubleDs` mode they are
/// advertised alongside the ready ones.
pub fn collect_cds_keys<'a, Inner>(
    keys: &'a KeySet<Inner>,
    policy: &Policy,
    zone: &Name,
) -> Vec<&'a ZoneKey<Inner>> {
    let mut picked = Vec::new();
    let publish = policy.cds_cdnskey_publish;
    if !matches!(
        publish,
        CdsPublish::Rollover | CdsPublish::Always | CdsPublish::DoubleDs
    ) {
        return picked;
    }

    for key in keys.iter() {
        if key.is_ready() {
            debug_assert!(key.is_ksk());
            picked.push(key);
        }
    }

    if (publish == CdsPublish::Always && picked.is_empty())
        || publish == CdsPublish::DoubleDs
    {
        for key in keys.iter() {
            if key.is_ksk() && key.is_active() && !key.is_ready() {
                picked.push(key);
            }
        }
    }

    if (publish != CdsPublish::DoubleDs && picked.len() > 1)
        || picked.len() > 2
    {
        warn!(
            zone = %zone,
            count = picked.len(),
            "published CDS/CDNSKEY records for too many keys"
        );
    }

    picked
}

/// Fills the key RRsets from the key set, per the publication policy.
pub fn add_dnskeys<Inner>(
    keys: &KeySet<Inner>,
    policy: &Policy,
    records: &mut KeyRecords,
) {
    for key in keys.iter() {
        if key.is_public() {
            records.dnskey.push_rdata(key.dnskey_rdata().clone());
        }
    }

    let zone = records.dnskey.owner().clone();
    for key in collect_cds_keys(keys, policy, &zone) {
        records.cdnskey.push_rdata(key.dnskey_rdata().clone());
        records
            .cds
            .push_rdata(ds_rdata_sha256(&zone, key.dnskey()));
    }

    if policy.cds_cdnskey_publish == CdsPublish::Empty {
        records
            .cdnskey
            .push_rdata(Bytes::from_static(&CDNSKEY_DELETE));
        records.cds.push_rdata(Bytes::from_static(&CDS_DELETE));
    }
}

//------------ update_dnskeys ------------------------------------------------

/// Brings the apex DNSKEY, CDNSKEY and CDS RRsets up to date.
///
/// Returns the time at which the offline store expects the next record
/// set, if any, for scheduling. With [`Policy::offline_ksk`] set a store
/// must be supplied; the loaded DNSKEY RRSIG is kept in the signing
/// context so the signature refresh can use it verbatim. A failed store
/// lookup is logged and the records are built and signed live instead.
pub fn update_dnskeys<Inner: SignRaw>(
    update: &mut ZoneUpdate,
    keys: &KeySet<Inner>,
    ctx: &mut SigningCtx<'_>,
    store: Option<&dyn OfflineRecordStore>,
) -> Result<Option<Timestamp>, SigningError> {
    let apex = update
        .contents()
        .apex_node()
        .ok_or(SigningError::InvalidArgument("zone without apex node"))?;
    let soa = apex
        .rrset(Rtype::SOA)
        .ok_or(SigningError::InvalidArgument("zone without SOA"))?;
    let class = soa.class();
    let zone = update.zone().clone();

    let mut ch = Changeset::new();
    for rtype in [Rtype::DNSKEY, Rtype::CDNSKEY, Rtype::CDS] {
        if let Some(rrset) = apex.rrset(rtype) {
            ch.add_removal(rrset.clone(), ChangeFlags::NONE);
        }
    }

    let build_live = || {
        let mut records =
            KeyRecords::new(zone.clone(), class, ctx.policy.dnskey_ttl);
        add_dnskeys(keys, ctx.policy, &mut records);
        (records, None)
    };
    let (records, next_resign) = if ctx.policy.offline_ksk {
        let store = store.ok_or(SigningError::InvalidArgument(
            "offline KSK policy without a record store",
        ))?;
        match store.load_offline_records(&zone, ctx.now) {
            Ok((records, next_resign)) => {
                info!(zone = %zone, "using offline DNSKEY RRSIG");
                (records, next_resign)
            }
            Err(err) => {
                warn!(
                    zone = %zone,
                    error = %err,
                    "failed to load offline records, signing DNSKEY live"
                );
                build_live()
            }
        }
    } else {
        build_live()
    };

    ch.add_addition(records.cdnskey, ChangeFlags::CHECK_CANCELOUT);
    ch.add_addition(records.cds, ChangeFlags::CHECK_CANCELOUT);
    ch.add_addition(records.dnskey, ChangeFlags::CHECK_CANCELOUT);

    if records.rrsig.is_some() {
        ctx.offline_rrsig = records.rrsig;
    }

    update.apply_changeset(&ch)?;
    Ok(next_resign)
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::SecurityAlgorithm;
    use crate::crypto::KeyPair;
    use crate::sign::offline::OfflineStoreError;
    use crate::zonetree::ZoneContents;
    use rstest::rstest;

    fn apex() -> Name {
        "example.com.".parse().unwrap()
    }

    fn key(flags: fn(Name, KeyPair) -> ZoneKey<KeyPair>) -> ZoneKey<KeyPair> {
        flags(
            apex(),
            KeyPair::generate(SecurityAlgorithm::ED25519).unwrap(),
        )
    }

    fn contents() -> ZoneContents {
        let mut zone = ZoneContents::new(apex());
        zone.add_rdata(
            &apex(),
            Rtype::SOA,
            Class::IN,
            Ttl::from_secs(3600),
            Bytes::from_static(b"\x02ns\x07example\x03com\x00\x05admin\x07example\x03com\x00\x00\x00\x00\x01\x00\x00\x0e\x10\x00\x00\x03\x84\x00\x12\x75\x00\x00\x00\x0e\x10"),
        );
        zone
    }

    #[rstest]
    // No key is ready: only Always and DoubleDs fall back to active KSKs.
    #[case(CdsPublish::Rollover, false, 0)]
    #[case(CdsPublish::Always, false, 1)]
    #[case(CdsPublish::DoubleDs, false, 1)]
    #[case(CdsPublish::None, false, 0)]
    // A ready key exists: it is picked, DoubleDs adds the active KSK.
    #[case(CdsPublish::Rollover, true, 1)]
    #[case(CdsPublish::Always, true, 1)]
    #[case(CdsPublish::DoubleDs, true, 2)]
    fn cds_key_selection(
        #[case] publish: CdsPublish,
        #[case] with_ready: bool,
        #[case] expected: usize,
    ) {
        let mut keys = KeySet::new();
        keys.push(key(ZoneKey::new_zsk));
        keys.push(key(ZoneKey::new_ksk));
        if with_ready {
            keys.push(
                key(ZoneKey::new_ksk).with_active(false).with_ready(true),
            );
        }
        let policy = Policy {
            cds_cdnskey_publish: publish,
            ..Policy::default()
        };
        let picked = collect_cds_keys(&keys, &policy, &apex());
        assert_eq!(picked.len(), expected);
        if with_ready && expected >= 1 {
            assert!(picked[0].is_ready());
        }
    }

    #[test]
    fn empty_mode_publishes_delete_sentinels() {
        let mut keys = KeySet::new();
        keys.push(key(ZoneKey::new_zsk));
        keys.push(key(ZoneKey::new_ksk));
        let policy = Policy {
            cds_cdnskey_publish: CdsPublish::Empty,
            ..Policy::default()
        };
        let mut records =
            KeyRecords::new(apex(), Class::IN, Ttl::from_secs(3600));
        add_dnskeys(&keys, &policy, &mut records);
        assert_eq!(records.dnskey.len(), 2);
        assert_eq!(records.cdnskey.len(), 1);
        assert_eq!(records.cdnskey.rdatas()[0].as_ref(), CDNSKEY_DELETE);
        assert_eq!(records.cds.len(), 1);
        assert_eq!(records.cds.rdatas()[0].as_ref(), CDS_DELETE);
    }

    #[test]
    fn unpublished_keys_are_left_out() {
        let mut keys = KeySet::new();
        keys.push(key(ZoneKey::new_zsk));
        keys.push(key(ZoneKey::new_zsk).with_public(false));
        let policy = Policy::default();
        let mut records =
            KeyRecords::new(apex(), Class::IN, Ttl::from_secs(3600));
        add_dnskeys(&keys, &policy, &mut records);
        assert_eq!(records.dnskey.len(), 1);
    }

    #[test]
    fn update_publishes_new_keys() {
        let mut keys = KeySet::new();
        keys.push(key(ZoneKey::new_zsk));
        keys.push(key(ZoneKey::new_ksk));
        let policy = Policy::default();
        let mut ctx = SigningCtx::new(&policy);
        let mut update = ZoneUpdate::full(contents());

        let next =
            update_dnskeys(&mut update, &keys, &mut ctx, None).unwrap();
        assert!(next.is_none());
        let dnskeys = update
            .contents()
            .apex_node()
            .unwrap()
            .rrset(Rtype::DNSKEY)
            .unwrap();
        assert_eq!(dnskeys.len(), 2);
        assert_eq!(dnskeys.ttl(), policy.dnskey_ttl);
    }

    #[test]
    fn unchanged_keys_produce_no_churn() {
        let mut keys = KeySet::new();
        keys.push(key(ZoneKey::new_zsk));
        keys.push(key(ZoneKey::new_ksk));
        let policy = Policy::default();
        let mut ctx = SigningCtx::new(&policy);
        let mut update = ZoneUpdate::full(contents());
        update_dnskeys(&mut update, &keys, &mut ctx, None).unwrap();

        let after_first = update.change().touched().count();
        update_dnskeys(&mut update, &keys, &mut ctx, None).unwrap();
        // Remove-then-add of identical RRsets cancels out entirely.
        assert_eq!(update.change().touched().count(), after_first);
    }

    struct FixedStore {
        records: KeyRecords,
        next: Option<Timestamp>,
    }

    impl OfflineRecordStore for FixedStore {
        fn load_offline_records(
            &self,
            _zone: &Name,
            _now: Timestamp,
        ) -> Result<(KeyRecords, Option<Timestamp>), OfflineStoreError>
        {
            Ok((self.records.clone(), self.next))
        }
    }

    struct FailingStore;

    impl OfflineRecordStore for FailingStore {
        fn load_offline_records(
            &self,
            _zone: &Name,
            _now: Timestamp,
        ) -> Result<(KeyRecords, Option<Timestamp>), OfflineStoreError>
        {
            Err(OfflineStoreError::NotFound)
        }
    }

    #[test]
    fn offline_records_are_used_verbatim() {
        let ksk = key(ZoneKey::new_ksk);
        let mut records =
            KeyRecords::new(apex(), Class::IN, Ttl::from_secs(3600));
        records.dnskey.push_rdata(ksk.dnskey_rdata().clone());
        let mut rrsig =
            records.dnskey.init_from(Rtype::RRSIG, Ttl::from_secs(3600));
        rrsig.push_rdata(Bytes::from_static(&[0; 80]));
        records.rrsig = Some(rrsig);
        let store = FixedStore {
            records,
            next: Some(Timestamp::from(4711)),
        };

        let policy = Policy {
            offline_ksk: true,
            ..Policy::default()
        };
        let mut ctx = SigningCtx::new(&policy);
        let keys: KeySet<KeyPair> = KeySet::new();
        let mut update = ZoneUpdate::full(contents());

        let next =
            update_dnskeys(&mut update, &keys, &mut ctx, Some(&store))
                .unwrap();
        assert_eq!(next, Some(Timestamp::from(4711)));
        assert!(ctx.offline_rrsig.is_some());
        assert!(update
            .contents()
            .apex_node()
            .unwrap()
            .rrset(Rtype::DNSKEY)
            .is_some());
    }

    #[test]
    fn offline_store_failure_falls_back_to_live_signing() {
        let policy = Policy {
            offline_ksk: true,
            ..Policy::default()
        };
        let mut ctx = SigningCtx::new(&policy);
        let mut keys = KeySet::new();
        keys.push(key(ZoneKey::new_zsk));
        keys.push(key(ZoneKey::new_ksk));
        let mut update = ZoneUpdate::full(contents());

        let next =
            update_dnskeys(&mut update, &keys, &mut ctx, Some(&FailingStore))
                .unwrap();
        assert!(next.is_none());
        assert!(ctx.offline_rrsig.is_none());
        // The DNSKEY RRset was built from the key set instead.
        let dnskeys = update
            .contents()
            .apex_node()
            .unwrap()
            .rrset(Rtype::DNSKEY)
            .unwrap();
        assert_eq!(dnskeys.len(), 2);
    }

    #[test]
    fn offline_policy_requires_a_store() {
        let policy = Policy {
            offline_ksk: true,
            ..Policy::default()
        };
        let mut ctx = SigningCtx::new(&policy);
        let keys: KeySet<KeyPair> = KeySet::new();
        let mut update = ZoneUpdate::full(contents());

        let err = update_dnskeys(&mut update, &keys, &mut ctx, None)
            .unwrap_err();
        assert!(matches!(err, SigningError::InvalidArgument(_)));
    }
}
