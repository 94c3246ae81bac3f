//! Signing keys and key sets.
//!
//! A [`ZoneKey`] pairs a signer (anything implementing
//! [`SignRaw`]) with the rollover state the key manager computed for it.
//! The signing engine never changes that state; it only reads it to
//! decide which keys sign which RRsets and which keys get published.

use crate::base::name::Name;
use crate::base::{Rtype, SecurityAlgorithm};
use crate::crypto::SignRaw;
use crate::rdata::Dnskey;
use crate::zonetree::Rrset;
use bytes::Bytes;

//------------ ZoneKey -------------------------------------------------------

/// The flags field of a zone-signing DNSKEY.
const FLAGS_ZSK: u16 = 0b0000_0001_0000_0000;

/// The flags field of a key-signing DNSKEY (zone key + SEP).
const FLAGS_KSK: u16 = FLAGS_ZSK | 1;

/// One signing key of a zone, with its rollover state.
///
/// The state flags mirror a key's lifecycle: a *public* key appears in
/// the DNSKEY RRset; an *active* key creates signatures; a *post-active*
/// key no longer signs but its existing signatures are still honored; a
/// *ready* key is a key-signing key waiting for the parent to publish its
/// DS record.
#[derive(Debug)]
pub struct ZoneKey<Inner> {
    zone: Name,
    dnskey: Dnskey,
    dnskey_rdata: Bytes,
    key_tag: u16,
    is_ksk: bool,
    is_zsk: bool,
    is_active: bool,
    is_post_active: bool,
    is_ready: bool,
    is_public: bool,
    signer: Inner,
}

impl<Inner: SignRaw> ZoneKey<Inner> {
    fn new(zone: Name, signer: Inner, flags: u16) -> Self {
        let base = signer.dnskey();
        let dnskey = Dnskey::new(
            flags,
            base.protocol(),
            base.algorithm(),
            Bytes::copy_from_slice(base.public_key()),
        );
        let dnskey_rdata = dnskey.to_rdata();
        let key_tag = dnskey.key_tag();
        ZoneKey {
            zone,
            dnskey,
            dnskey_rdata,
            key_tag,
            is_ksk: flags == FLAGS_KSK,
            is_zsk: flags == FLAGS_ZSK,
            is_active: true,
            is_post_active: false,
            is_ready: false,
            is_public: true,
            signer,
        }
    }

    /// Creates an active, published zone-signing key.
    #[must_use]
    pub fn new_zsk(zone: Name, signer: Inner) -> Self {
        Self::new(zone, signer, FLAGS_ZSK)
    }

    /// Creates an active, published key-signing key.
    #[must_use]
    pub fn new_ksk(zone: Name, signer: Inner) -> Self {
        Self::new(zone, signer, FLAGS_KSK)
    }

    /// Creates an active, published combined signing key.
    ///
    /// The key carries the SEP flag and takes both roles.
    #[must_use]
    pub fn new_csk(zone: Name, signer: Inner) -> Self {
        let mut key = Self::new(zone, signer, FLAGS_KSK);
        key.is_zsk = true;
        key
    }
}

impl<Inner> ZoneKey<Inner> {
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    #[must_use]
    pub fn with_post_active(mut self, post_active: bool) -> Self {
        self.is_post_active = post_active;
        self
    }

    #[must_use]
    pub fn with_ready(mut self, ready: bool) -> Self {
        self.is_ready = ready;
        self
    }

    #[must_use]
    pub fn with_public(mut self, public: bool) -> Self {
        self.is_public = public;
        self
    }

    /// The apex of the zone this key signs.
    pub fn zone(&self) -> &Name {
        &self.zone
    }

    pub fn dnskey(&self) -> &Dnskey {
        &self.dnskey
    }

    /// The DNSKEY record data of the key.
    pub fn dnskey_rdata(&self) -> &Bytes {
        &self.dnskey_rdata
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    pub fn algorithm(&self) -> SecurityAlgorithm {
        self.dnskey.algorithm()
    }

    pub fn is_ksk(&self) -> bool {
        self.is_ksk
    }

    pub fn is_zsk(&self) -> bool {
        self.is_zsk
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_post_active(&self) -> bool {
        self.is_post_active
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn signer(&self) -> &Inner {
        &self.signer
    }

    /// Decides whether this key signs the given RRset.
    ///
    /// Only active and post-active keys sign at all. Away from the apex
    /// only the ZSK role applies. At the apex the DNSKEY RRset is signed
    /// by key-signing keys, CDS and CDNSKEY by key-signing keys unless
    /// `cds_sign_by_ksk` is off, and everything else (including the SOA)
    /// by zone-signing keys.
    #[must_use]
    pub fn signs(&self, covered: &Rrset, cds_sign_by_ksk: bool) -> bool {
        if !self.is_active && !self.is_post_active {
            return false;
        }
        if *covered.owner() != self.zone {
            return self.is_zsk;
        }
        match covered.rtype() {
            Rtype::DNSKEY => self.is_ksk,
            Rtype::CDS | Rtype::CDNSKEY => {
                if cds_sign_by_ksk {
                    self.is_ksk
                } else {
                    self.is_zsk
                }
            }
            _ => self.is_zsk,
        }
    }
}

//------------ KeySet --------------------------------------------------------

/// The keys of one zone, as computed by the key manager.
#[derive(Debug, Default)]
pub struct KeySet<Inner> {
    keys: Vec<ZoneKey<Inner>>,
}

impl<Inner> KeySet<Inner> {
    #[must_use]
    pub fn new() -> Self {
        KeySet { keys: Vec::new() }
    }

    pub fn push(&mut self, key: ZoneKey<Inner>) {
        self.keys.push(key);
    }

    pub fn keys(&self) -> &[ZoneKey<Inner>] {
        &self.keys
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ZoneKey<Inner>> {
        self.keys.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<Inner> FromIterator<ZoneKey<Inner>> for KeySet<Inner> {
    fn from_iter<T: IntoIterator<Item = ZoneKey<Inner>>>(iter: T) -> Self {
        KeySet {
            keys: iter.into_iter().collect(),
        }
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Class, Ttl};
    use crate::crypto::KeyPair;
    use rstest::rstest;

    fn apex() -> Name {
        "example.com.".parse().unwrap()
    }

    fn rrset(owner: &str, rtype: Rtype) -> Rrset {
        Rrset::new(
            owner.parse().unwrap(),
            rtype,
            Class::IN,
            Ttl::from_secs(300),
        )
    }

    fn zsk() -> ZoneKey<KeyPair> {
        ZoneKey::new_zsk(
            apex(),
            KeyPair::generate(SecurityAlgorithm::ED25519).unwrap(),
        )
    }

    fn ksk() -> ZoneKey<KeyPair> {
        ZoneKey::new_ksk(
            apex(),
            KeyPair::generate(SecurityAlgorithm::ED25519).unwrap(),
        )
    }

    #[test]
    fn flags_follow_role() {
        assert_eq!(zsk().dnskey().flags(), 256);
        assert_eq!(ksk().dnskey().flags(), 257);
        assert!(ksk().dnskey().is_secure_entry_point());
        let csk = ZoneKey::new_csk(
            apex(),
            KeyPair::generate(SecurityAlgorithm::ED25519).unwrap(),
        );
        assert!(csk.is_ksk() && csk.is_zsk());
    }

    #[rstest]
    // Away from the apex only the ZSK signs, whatever the type.
    #[case("www.example.com.", Rtype::A, true, false)]
    #[case("www.example.com.", Rtype::DNSKEY, true, false)]
    // Apex DNSKEY belongs to the KSK.
    #[case("example.com.", Rtype::DNSKEY, false, true)]
    // Other apex types, including SOA, belong to the ZSK.
    #[case("example.com.", Rtype::SOA, true, false)]
    #[case("example.com.", Rtype::NS, true, false)]
    fn role_selection(
        #[case] owner: &str,
        #[case] rtype: Rtype,
        #[case] by_zsk: bool,
        #[case] by_ksk: bool,
    ) {
        let covered = rrset(owner, rtype);
        assert_eq!(zsk().signs(&covered, true), by_zsk);
        assert_eq!(ksk().signs(&covered, true), by_ksk);
    }

    #[test]
    fn cds_signer_follows_policy() {
        let cds = rrset("example.com.", Rtype::CDS);
        let cdnskey = rrset("example.com.", Rtype::CDNSKEY);
        assert!(ksk().signs(&cds, true));
        assert!(!zsk().signs(&cds, true));
        assert!(!ksk().signs(&cdnskey, false));
        assert!(zsk().signs(&cdnskey, false));
    }

    #[test]
    fn inactive_keys_do_not_sign() {
        let covered = rrset("www.example.com.", Rtype::A);
        let retired = zsk().with_active(false);
        assert!(!retired.signs(&covered, true));
        let post_active = zsk().with_active(false).with_post_active(true);
        assert!(post_active.signs(&covered, true));
    }
}
