//! Creation and validation of RRSIG records.
//!
//! The functions here work on one RRset at a time and never touch the
//! zone directly; every change goes into a caller-supplied changeset.
//! The tree and changeset walkers in [`super::tree`] drive them.

use crate::base::name::Name;
use crate::base::Rtype;
use crate::crypto::{AlgorithmError, PublicKey, SignRaw};
use crate::keys::ZoneKey;
use crate::rdata::{Rrsig, Timestamp};
use crate::sign::error::SigningError;
use crate::sign::{SignerCtx, SigningCtx};
use crate::update::{ChangeFlags, Changeset};
use crate::zonetree::{Rrset, ZoneNode};
use bytes::Bytes;
use tracing::debug;

//------------ Signed data and single signatures -----------------------------

/// Builds the data a signature covers, per RFC 4034 section 3.1.8.1.
///
/// That is the RRSIG record data without the signature field, followed by
/// the covered records in canonical form and order. Owner names and names
/// inside record data are stored lowercased throughout the crate, so no
/// further canonicalization happens here.
fn signed_data(covered: &Rrset, proto: &Rrsig) -> Vec<u8> {
    let mut buf = Vec::new();
    proto.compose(&mut buf);

    let mut rdatas: Vec<&Bytes> = covered.rdatas().iter().collect();
    rdatas.sort_unstable_by(|a, b| a.as_ref().cmp(b.as_ref()));
    for rdata in rdatas {
        covered.owner().compose(&mut buf);
        buf.extend_from_slice(&covered.rtype().to_int().to_be_bytes());
        buf.extend_from_slice(&covered.class().to_int().to_be_bytes());
        buf.extend_from_slice(
            &proto.original_ttl.as_secs().to_be_bytes(),
        );
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(rdata);
    }
    buf
}

/// Creates an RRSIG covering the given RRset with the given key.
///
/// Returns the new RRSIG record data. The validity period starts now and
/// runs for the policy's signature lifetime.
pub(super) fn sign_rrset<Inner: SignRaw>(
    key: &ZoneKey<Inner>,
    covered: &Rrset,
    ctx: &SigningCtx<'_>,
) -> Result<Bytes, SigningError> {
    if covered.rtype() == Rtype::RRSIG {
        return Err(SigningError::RrsigRrsMustNotBeSigned);
    }
    let inception = ctx.now;
    let expiration = ctx.now.add(ctx.policy.rrsig_lifetime_secs());
    if expiration < inception {
        return Err(SigningError::InvalidSignatureValidityPeriod(
            inception, expiration,
        ));
    }

    let mut rrsig = Rrsig {
        type_covered: covered.rtype(),
        algorithm: key.algorithm(),
        labels: covered.owner().rrsig_label_count(),
        original_ttl: covered.ttl(),
        expiration,
        inception,
        key_tag: key.key_tag(),
        signer_name: key.zone().clone(),
        signature: Bytes::new(),
    };
    let data = signed_data(covered, &rrsig);
    let signature = key.signer().sign_raw(&data)?;
    rrsig.signature = Bytes::copy_from_slice(signature.as_ref());

    let mut rdata = Vec::new();
    rrsig.compose(&mut rdata);
    Ok(Bytes::from(rdata))
}

/// Checks one existing signature over an RRset.
///
/// A signature that is outside its validity period or does not verify
/// fails with [`AlgorithmError::BadSig`]; any other error means the check
/// itself could not be carried out.
pub(super) fn check_signature(
    covered: &Rrset,
    rrsig_rdata: &[u8],
    verifier: &PublicKey,
    now: Timestamp,
) -> Result<(), SigningError> {
    let rrsig = Rrsig::parse(rrsig_rdata)?;
    if !(rrsig.inception <= now && now <= rrsig.expiration) {
        return Err(AlgorithmError::BadSig.into());
    }
    let proto = Rrsig {
        signature: Bytes::new(),
        ..rrsig.clone()
    };
    let data = signed_data(covered, &proto);
    verifier.verify(&data, &rrsig.signature)?;
    Ok(())
}

fn is_bad_sig(err: &SigningError) -> bool {
    matches!(
        err,
        SigningError::Verification(AlgorithmError::BadSig)
    )
}

//------------ Signature presence checks -------------------------------------

/// Returns whether a valid signature by the key exists among the RRSIGs.
pub(super) fn valid_signature_exists<Inner>(
    covered: &Rrset,
    rrsigs: Option<&Rrset>,
    key: &ZoneKey<Inner>,
    verifier: &PublicKey,
    now: Timestamp,
) -> bool {
    let Some(rrsigs) = rrsigs else {
        return false;
    };
    for rdata in rrsigs.rdatas() {
        if Rrsig::peek_key_tag(rdata) != Some(key.key_tag())
            || Rrsig::peek_type_covered(rdata) != Some(covered.rtype())
        {
            continue;
        }
        if check_signature(covered, rdata, verifier, now).is_ok() {
            return true;
        }
    }
    false
}

/// Returns whether every key that should sign the RRset has a valid
/// signature in place.
pub(super) fn all_signatures_exist<Inner: SignRaw>(
    covered: &Rrset,
    rrsigs: Option<&Rrset>,
    signer: &SignerCtx<'_, Inner>,
) -> bool {
    for (key, verifier) in signer.entries() {
        if !key.signs(covered, signer.ctx.policy.cds_sign_by_ksk) {
            continue;
        }
        if !valid_signature_exists(covered, rrsigs, key, verifier, signer.ctx.now)
        {
            return false;
        }
    }
    true
}

//------------ Per-RRset maintenance -----------------------------------------

/// Keeps the earliest of the seen expiration times.
pub(super) fn note_earliest_expiration(
    expires_at: &mut Option<Timestamp>,
    candidate: Timestamp,
) {
    match expires_at {
        Some(current) if !(candidate < *current) => {}
        _ => *expires_at = Some(candidate),
    }
}

/// Queues expired, invalid and orphaned signatures for removal.
///
/// A signature stays when some active or post-active key with a matching
/// key tag validates it; its expiration is then noted. A hard
/// verification failure (anything but an invalid signature) aborts the
/// pass.
pub(super) fn remove_expired_rrsigs<Inner: SignRaw>(
    covered: &Rrset,
    rrsigs: &Rrset,
    signer: &SignerCtx<'_, Inner>,
    changeset: &mut Changeset,
    expires_at: &mut Option<Timestamp>,
) -> Result<(), SigningError> {
    let mut to_remove = rrsigs.init_from(Rtype::RRSIG, rrsigs.ttl());

    'rrsig: for rdata in rrsigs.rdatas() {
        if Rrsig::peek_type_covered(rdata) != Some(covered.rtype()) {
            continue;
        }
        let key_tag = Rrsig::peek_key_tag(rdata);

        for (key, verifier) in signer.entries() {
            if (!key.is_active() && !key.is_post_active())
                || Some(key.key_tag()) != key_tag
            {
                continue;
            }
            match check_signature(covered, rdata, verifier, signer.ctx.now) {
                Ok(()) => {
                    if let Some(expiration) = Rrsig::peek_expiration(rdata)
                    {
                        note_earliest_expiration(expires_at, expiration);
                    }
                    continue 'rrsig;
                }
                Err(err) if is_bad_sig(&err) => continue,
                Err(err) => return Err(err),
            }
        }

        to_remove.push_rdata(rdata.clone());
    }

    changeset.add_removal(to_remove, ChangeFlags::NONE);
    Ok(())
}

/// Queues the signatures that are missing for the RRset.
///
/// The apex DNSKEY RRset is special in offline-KSK operation: its
/// pre-made signature from the offline signer is added verbatim.
pub(super) fn add_missing_rrsigs<Inner: SignRaw>(
    covered: &Rrset,
    rrsigs: Option<&Rrset>,
    signer: &SignerCtx<'_, Inner>,
    changeset: &mut Changeset,
    expires_at: &mut Option<Timestamp>,
) -> Result<(), SigningError> {
    if covered.rtype() == Rtype::DNSKEY {
        if let Some(offline) = &signer.ctx.offline_rrsig {
            if offline.owner() == covered.owner() {
                changeset
                    .add_addition(offline.clone(), ChangeFlags::CHECK);
                return Ok(());
            }
        }
    }

    let mut to_add = covered.init_from(Rtype::RRSIG, covered.ttl());
    for (key, verifier) in signer.entries() {
        if !key.signs(covered, signer.ctx.policy.cds_sign_by_ksk) {
            continue;
        }
        if valid_signature_exists(
            covered,
            rrsigs,
            key,
            verifier,
            signer.ctx.now,
        ) {
            continue;
        }
        debug!(
            owner = %covered.owner(),
            rtype = %covered.rtype(),
            key_tag = key.key_tag(),
            "creating RRSIG"
        );
        to_add.push_rdata(sign_rrset(key, covered, signer.ctx)?);
        note_earliest_expiration(
            expires_at,
            signer.ctx.now.add(signer.ctx.policy.rrsig_lifetime_secs()),
        );
    }

    changeset.add_addition(to_add, ChangeFlags::NONE);
    Ok(())
}

/// Queues every signature covering the given type for removal.
pub(super) fn remove_rrset_rrsigs(
    owner: &Name,
    rtype: Rtype,
    rrsigs: &Rrset,
    changeset: &mut Changeset,
) {
    let mut to_remove = rrsigs.init_from(Rtype::RRSIG, rrsigs.ttl());
    for rdata in rrsigs.rdatas() {
        if Rrsig::peek_type_covered(rdata) == Some(rtype) {
            to_remove.push_rdata(rdata.clone());
        }
    }
    debug_assert_eq!(to_remove.owner(), owner);
    changeset.add_removal(to_remove, ChangeFlags::NONE);
}

/// Drops all existing signatures for the RRset and creates fresh ones.
pub(super) fn force_resign_rrset<Inner: SignRaw>(
    covered: &Rrset,
    rrsigs: Option<&Rrset>,
    signer: &SignerCtx<'_, Inner>,
    changeset: &mut Changeset,
) -> Result<(), SigningError> {
    if let Some(rrsigs) = rrsigs {
        remove_rrset_rrsigs(
            covered.owner(),
            covered.rtype(),
            rrsigs,
            changeset,
        );
    }
    add_missing_rrsigs(covered, None, signer, changeset, &mut None)
}

/// The steady-state path: drop what no longer verifies, add what is
/// missing.
///
/// A signature removed for being invalid is re-added right away, because
/// the presence check runs against the zone as it was before the
/// removal only for signatures that still verify.
pub(super) fn resign_rrset<Inner: SignRaw>(
    covered: &Rrset,
    rrsigs: Option<&Rrset>,
    signer: &SignerCtx<'_, Inner>,
    changeset: &mut Changeset,
    expires_at: &mut Option<Timestamp>,
) -> Result<(), SigningError> {
    if let Some(rrsigs) = rrsigs {
        remove_expired_rrsigs(
            covered, rrsigs, signer, changeset, expires_at,
        )?;
    }
    add_missing_rrsigs(covered, rrsigs, signer, changeset, expires_at)
}

/// Queues signatures whose covered RRset is gone from the node.
fn remove_standalone_rrsigs(
    node: &ZoneNode,
    changeset: &mut Changeset,
) {
    let Some(rrsigs) = node.rrset(Rtype::RRSIG) else {
        return;
    };
    let mut to_remove = rrsigs.init_from(Rtype::RRSIG, rrsigs.ttl());
    for rdata in rrsigs.rdatas() {
        let covered = Rrsig::peek_type_covered(rdata);
        if covered.map_or(true, |rtype| node.rrset(rtype).is_none()) {
            to_remove.push_rdata(rdata.clone());
        }
    }
    changeset.add_removal(to_remove, ChangeFlags::NONE);
}

//------------ Node-level entry points ---------------------------------------

/// Decides whether an RRset takes signatures at all.
///
/// RRSIGs are never signed, and at a delegation only the NSEC and DS
/// RRsets are authoritative.
pub fn rr_should_be_signed(
    node: &ZoneNode,
    rrset: Option<&Rrset>,
) -> bool {
    let Some(rrset) = rrset else {
        return false;
    };
    if rrset.is_empty() || rrset.rtype() == Rtype::RRSIG {
        return false;
    }
    if node.is_delegation()
        && rrset.rtype() != Rtype::NSEC
        && rrset.rtype() != Rtype::DS
    {
        return false;
    }
    true
}

/// Refreshes the signatures of every RRset at one node.
pub(super) fn sign_node_rrsets<Inner: SignRaw>(
    node: &ZoneNode,
    signer: &SignerCtx<'_, Inner>,
    changeset: &mut Changeset,
    expires_at: &mut Option<Timestamp>,
) -> Result<(), SigningError> {
    let rrsigs = node.rrset(Rtype::RRSIG);
    for rrset in node.rrsets() {
        if rrset.rtype() == Rtype::RRSIG {
            continue;
        }
        if !rr_should_be_signed(node, Some(rrset)) {
            continue;
        }
        if signer.ctx.policy.rrsig_drop_existing {
            force_resign_rrset(rrset, rrsigs, signer, changeset)?;
        } else {
            resign_rrset(rrset, rrsigs, signer, changeset, expires_at)?;
        }
    }
    remove_standalone_rrsigs(node, changeset);
    Ok(())
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Class, SecurityAlgorithm, Ttl};
    use crate::crypto::KeyPair;
    use crate::keys::KeySet;
    use crate::policy::Policy;

    const NOW: u32 = 1_700_000_000;

    fn apex() -> Name {
        "example.com.".parse().unwrap()
    }

    fn zsk() -> ZoneKey<KeyPair> {
        ZoneKey::new_zsk(
            apex(),
            KeyPair::generate(SecurityAlgorithm::ED25519).unwrap(),
        )
    }

    fn a_rrset(owner: &str) -> Rrset {
        let mut rrset = Rrset::new(
            owner.parse().unwrap(),
            Rtype::A,
            Class::IN,
            Ttl::from_secs(300),
        );
        rrset.push_rdata(Bytes::from_static(&[192, 0, 2, 1]));
        rrset.push_rdata(Bytes::from_static(&[192, 0, 2, 2]));
        rrset
    }

    fn ctx(policy: &Policy) -> SigningCtx<'_> {
        SigningCtx::with_now(policy, Timestamp::from(NOW))
    }

    #[test]
    fn sign_and_check_roundtrip() {
        let policy = Policy::default();
        let ctx = ctx(&policy);
        let key = zsk();
        let covered = a_rrset("www.example.com.");

        let rdata = sign_rrset(&key, &covered, &ctx).unwrap();
        let rrsig = Rrsig::parse(&rdata).unwrap();
        assert_eq!(rrsig.type_covered, Rtype::A);
        assert_eq!(rrsig.key_tag, key.key_tag());
        assert_eq!(rrsig.labels, 3);
        assert_eq!(rrsig.original_ttl, covered.ttl());
        assert_eq!(rrsig.inception, Timestamp::from(NOW));
        assert_eq!(
            rrsig.expiration,
            Timestamp::from(NOW).add(policy.rrsig_lifetime_secs())
        );
        assert_eq!(rrsig.signer_name, apex());

        let verifier = PublicKey::from_dnskey(key.dnskey()).unwrap();
        check_signature(&covered, &rdata, &verifier, ctx.now).unwrap();
    }

    #[test]
    fn check_rejects_tampered_and_stale_signatures() {
        let policy = Policy::default();
        let ctx = ctx(&policy);
        let key = zsk();
        let covered = a_rrset("www.example.com.");
        let verifier = PublicKey::from_dnskey(key.dnskey()).unwrap();
        let rdata = sign_rrset(&key, &covered, &ctx).unwrap();

        // A record changed after signing.
        let mut other = covered.clone();
        other.push_rdata(Bytes::from_static(&[192, 0, 2, 3]));
        let err = check_signature(&other, &rdata, &verifier, ctx.now)
            .unwrap_err();
        assert!(is_bad_sig(&err));

        // Validity period ended.
        let late = Timestamp::from(NOW)
            .add(policy.rrsig_lifetime_secs())
            .add(1);
        let err = check_signature(&covered, &rdata, &verifier, late)
            .unwrap_err();
        assert!(is_bad_sig(&err));

        // Not yet valid.
        let early = Timestamp::from(NOW - 1);
        let err = check_signature(&covered, &rdata, &verifier, early)
            .unwrap_err();
        assert!(is_bad_sig(&err));
    }

    #[test]
    fn rrsigs_are_never_signed() {
        let policy = Policy::default();
        let ctx = ctx(&policy);
        let key = zsk();
        let rrsigs =
            a_rrset("www.example.com.").init_from(Rtype::RRSIG, Ttl::ZERO);
        assert!(matches!(
            sign_rrset(&key, &rrsigs, &ctx),
            Err(SigningError::RrsigRrsMustNotBeSigned)
        ));
    }

    fn signer<'a>(
        keys: &'a KeySet<KeyPair>,
        ctx: &'a SigningCtx<'a>,
    ) -> SignerCtx<'a, KeyPair> {
        SignerCtx::new(keys, ctx).unwrap()
    }

    fn rrsig_rrset(covered: &Rrset, rdatas: Vec<Bytes>) -> Rrset {
        let mut rrsigs = covered.init_from(Rtype::RRSIG, covered.ttl());
        for rdata in rdatas {
            rrsigs.push_rdata(rdata);
        }
        rrsigs
    }

    #[test]
    fn add_missing_skips_valid_signatures() {
        let policy = Policy::default();
        let ctx = ctx(&policy);
        let mut keys = KeySet::new();
        keys.push(zsk());
        let signer = signer(&keys, &ctx);
        let covered = a_rrset("www.example.com.");

        let mut ch = Changeset::new();
        let mut expires = None;
        add_missing_rrsigs(&covered, None, &signer, &mut ch, &mut expires)
            .unwrap();
        let added: Vec<_> = ch.additions().collect();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].rrset.len(), 1);
        assert_eq!(
            expires,
            Some(Timestamp::from(NOW).add(policy.rrsig_lifetime_secs()))
        );

        // With that signature in place, nothing more gets added.
        let rrsigs = rrsig_rrset(
            &covered,
            added[0].rrset.rdatas().to_vec(),
        );
        let mut ch = Changeset::new();
        add_missing_rrsigs(
            &covered,
            Some(&rrsigs),
            &signer,
            &mut ch,
            &mut None,
        )
        .unwrap();
        assert!(ch.is_empty());
    }

    #[test]
    fn remove_expired_keeps_valid_and_drops_the_rest() {
        let policy = Policy::default();
        let now_ctx = ctx(&policy);
        let mut keys = KeySet::new();
        keys.push(zsk());
        let covered = a_rrset("www.example.com.");

        // One valid signature, one expired one made earlier by the same
        // key, one by a key no longer in the set.
        let valid = {
            let signer = signer(&keys, &now_ctx);
            let mut ch = Changeset::new();
            add_missing_rrsigs(&covered, None, &signer, &mut ch, &mut None)
                .unwrap();
            let first =
                ch.additions().next().unwrap().rrset.rdatas()[0].clone();
            first
        };
        let expired = {
            let old = SigningCtx::with_now(
                &policy,
                Timestamp::from(NOW - 2 * policy.rrsig_lifetime_secs()),
            );
            sign_rrset(&keys.keys()[0], &covered, &old).unwrap()
        };
        let foreign = {
            let mut other_keys = KeySet::new();
            other_keys.push(zsk());
            sign_rrset(&other_keys.keys()[0], &covered, &now_ctx).unwrap()
        };

        let rrsigs = rrsig_rrset(
            &covered,
            vec![valid.clone(), expired.clone(), foreign.clone()],
        );
        let signer = signer(&keys, &now_ctx);
        let mut ch = Changeset::new();
        let mut expires = None;
        remove_expired_rrsigs(
            &covered,
            &rrsigs,
            &signer,
            &mut ch,
            &mut expires,
        )
        .unwrap();

        let removed: Vec<_> = ch.removals().collect();
        assert_eq!(removed.len(), 1);
        assert!(!removed[0].rrset.contains_rdata(&valid));
        assert!(removed[0].rrset.contains_rdata(&expired));
        assert!(removed[0].rrset.contains_rdata(&foreign));
        // The surviving signature's expiration was noted.
        assert_eq!(
            expires,
            Some(Timestamp::from(NOW).add(policy.rrsig_lifetime_secs()))
        );
    }

    #[test]
    fn resign_replaces_an_invalid_signature() {
        let policy = Policy::default();
        let ctx = ctx(&policy);
        let mut keys = KeySet::new();
        keys.push(zsk());
        let covered = a_rrset("www.example.com.");
        let signer = signer(&keys, &ctx);

        // Sign a different RRset with the same key: keytag and covered
        // type match after patching, but the signature is invalid.
        let mut bogus =
            sign_rrset(&keys.keys()[0], &covered, &ctx).unwrap().to_vec();
        let last = bogus.len() - 1;
        bogus[last] ^= 0xFF;
        let rrsigs = rrsig_rrset(&covered, vec![Bytes::from(bogus.clone())]);

        let mut ch = Changeset::new();
        resign_rrset(&covered, Some(&rrsigs), &signer, &mut ch, &mut None)
            .unwrap();
        let removed: Vec<_> = ch.removals().collect();
        assert_eq!(removed.len(), 1);
        assert!(removed[0].rrset.contains_rdata(&bogus));
        // A replacement was created in the same pass.
        assert_eq!(ch.additions().count(), 1);
    }

    #[test]
    fn force_resign_drops_valid_signatures_too() {
        let policy = Policy::default();
        let ctx = ctx(&policy);
        let mut keys = KeySet::new();
        keys.push(zsk());
        let covered = a_rrset("www.example.com.");
        let signer = signer(&keys, &ctx);

        let valid =
            sign_rrset(&keys.keys()[0], &covered, &ctx).unwrap();
        let rrsigs = rrsig_rrset(&covered, vec![valid.clone()]);

        let mut ch = Changeset::new();
        force_resign_rrset(&covered, Some(&rrsigs), &signer, &mut ch)
            .unwrap();
        assert!(ch
            .removals()
            .any(|entry| entry.rrset.contains_rdata(&valid)));
        assert_eq!(ch.additions().count(), 1);
    }

    #[test]
    fn offline_rrsig_is_added_verbatim() {
        let policy = Policy {
            offline_ksk: true,
            ..Policy::default()
        };
        let mut ctx = SigningCtx::with_now(&policy, Timestamp::from(NOW));
        let mut dnskeys = Rrset::new(
            apex(),
            Rtype::DNSKEY,
            Class::IN,
            Ttl::from_secs(3600),
        );
        dnskeys.push_rdata(Bytes::from_static(&[1, 1, 3, 15, 9, 9]));
        let mut offline =
            dnskeys.init_from(Rtype::RRSIG, dnskeys.ttl());
        offline.push_rdata(Bytes::from_static(&[0; 80]));
        ctx.offline_rrsig = Some(offline.clone());

        let keys: KeySet<KeyPair> = KeySet::new();
        let signer = SignerCtx::new(&keys, &ctx).unwrap();
        let mut ch = Changeset::new();
        add_missing_rrsigs(&dnskeys, None, &signer, &mut ch, &mut None)
            .unwrap();
        let added: Vec<_> = ch.additions().collect();
        assert_eq!(added.len(), 1);
        assert!(added[0].check);
        assert!(added[0].rrset.same_rdatas(&offline));
    }

    #[test]
    fn all_signatures_exist_checks_every_eligible_key() {
        let policy = Policy::default();
        let ctx = ctx(&policy);
        let mut keys = KeySet::new();
        keys.push(zsk());
        keys.push(zsk());
        let covered = a_rrset("www.example.com.");
        let signer = signer(&keys, &ctx);

        let first =
            sign_rrset(&keys.keys()[0], &covered, &ctx).unwrap();
        let rrsigs = rrsig_rrset(&covered, vec![first]);
        assert!(!all_signatures_exist(&covered, Some(&rrsigs), &signer));

        let second =
            sign_rrset(&keys.keys()[1], &covered, &ctx).unwrap();
        let mut rrsigs = rrsigs;
        rrsigs.push_rdata(second);
        assert!(all_signatures_exist(&covered, Some(&rrsigs), &signer));
    }
}
