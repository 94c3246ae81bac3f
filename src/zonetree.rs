//! In-memory zone contents.
//!
//! A zone is a pair of trees of nodes keyed by owner name: the regular
//! tree and a separate tree for NSEC3 records and their signatures, which
//! live at hashed owner names that never carry other data. Each node holds
//! one [`Rrset`] per record type, with record data stored as wire-format
//! octets.

use crate::base::name::Name;
use crate::base::{Class, Rtype, Ttl};
use crate::rdata::Rrsig;
use bytes::Bytes;
use std::collections::btree_map::{self, BTreeMap};
use std::vec::Vec;

//------------ Rrset ---------------------------------------------------------

/// A set of resource records sharing owner, class, and type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rrset {
    owner: Name,
    rtype: Rtype,
    class: Class,
    ttl: Ttl,
    rdatas: Vec<Bytes>,
}

impl Rrset {
    /// Creates a new, empty RRset.
    #[must_use]
    pub fn new(owner: Name, rtype: Rtype, class: Class, ttl: Ttl) -> Self {
        Rrset {
            owner,
            rtype,
            class,
            ttl,
            rdatas: Vec::new(),
        }
    }

    /// Creates an empty RRset at the same owner and class as this one.
    #[must_use]
    pub fn init_from(&self, rtype: Rtype, ttl: Ttl) -> Self {
        Rrset::new(self.owner.clone(), rtype, self.class, ttl)
    }

    pub fn owner(&self) -> &Name {
        &self.owner
    }

    pub fn rtype(&self) -> Rtype {
        self.rtype
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn rdatas(&self) -> &[Bytes] {
        &self.rdatas
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rdatas.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rdatas.len()
    }

    #[must_use]
    pub fn contains_rdata(&self, rdata: &[u8]) -> bool {
        self.rdatas.iter().any(|r| r.as_ref() == rdata)
    }

    /// Adds a record, ignoring exact duplicates.
    pub fn push_rdata(&mut self, rdata: Bytes) {
        if !self.contains_rdata(&rdata) {
            self.rdatas.push(rdata);
        }
    }

    /// Removes a record. Returns whether it was present.
    pub fn remove_rdata(&mut self, rdata: &[u8]) -> bool {
        match self.rdatas.iter().position(|r| r.as_ref() == rdata) {
            Some(pos) => {
                self.rdatas.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns whether both RRsets hold the same records, in any order.
    #[must_use]
    pub fn same_rdatas(&self, other: &Rrset) -> bool {
        if self.rdatas.len() != other.rdatas.len() {
            return false;
        }
        let mut left: Vec<&Bytes> = self.rdatas.iter().collect();
        let mut right: Vec<&Bytes> = other.rdatas.iter().collect();
        left.sort_unstable();
        right.sort_unstable();
        left == right
    }
}

//------------ ZoneNode ------------------------------------------------------

/// All RRsets at one owner name.
#[derive(Clone, Debug, Default)]
pub struct ZoneNode {
    rrsets: BTreeMap<Rtype, Rrset>,

    /// The node is at or below a zone cut and not authoritative data.
    /// Maintained by [`ZoneContents::adjust()`].
    non_auth: bool,

    /// The node is a zone cut. Maintained by [`ZoneContents::adjust()`].
    delegation: bool,
}

impl ZoneNode {
    /// Returns the RRset of the given type, if present.
    pub fn rrset(&self, rtype: Rtype) -> Option<&Rrset> {
        self.rrsets.get(&rtype)
    }

    /// Returns an iterator over the RRsets, in record type order.
    pub fn rrsets(&self) -> impl Iterator<Item = &Rrset> {
        self.rrsets.values()
    }

    /// Returns the number of RRsets at this node.
    #[must_use]
    pub fn rrset_count(&self) -> usize {
        self.rrsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }

    #[must_use]
    pub fn is_non_auth(&self) -> bool {
        self.non_auth
    }

    #[must_use]
    pub fn is_delegation(&self) -> bool {
        self.delegation
    }

    /// Returns the RRSIGs at this node that cover the given type.
    ///
    /// The result is a synthesized RRset; `None` if there are none.
    #[must_use]
    pub fn rrsigs_covering(&self, covered: Rtype) -> Option<Rrset> {
        let rrsigs = self.rrset(Rtype::RRSIG)?;
        let mut out = rrsigs.init_from(Rtype::RRSIG, rrsigs.ttl());
        for rdata in rrsigs.rdatas() {
            if Rrsig::peek_type_covered(rdata) == Some(covered) {
                out.push_rdata(rdata.clone());
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

//------------ ZoneTree ------------------------------------------------------

/// A tree of zone nodes keyed by owner name.
#[derive(Clone, Debug, Default)]
pub struct ZoneTree {
    nodes: BTreeMap<Name, ZoneNode>,
}

impl ZoneTree {
    pub fn get(&self, owner: &Name) -> Option<&ZoneNode> {
        self.nodes.get(owner)
    }

    pub fn get_mut(&mut self, owner: &Name) -> Option<&mut ZoneNode> {
        self.nodes.get_mut(owner)
    }

    /// Returns the node at the owner, creating it if necessary.
    pub fn get_or_insert(&mut self, owner: &Name) -> &mut ZoneNode {
        self.nodes.entry(owner.clone()).or_default()
    }

    /// Returns an iterator over all nodes, in owner name order.
    pub fn iter(&self) -> btree_map::Iter<'_, Name, ZoneNode> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn remove_if_empty(&mut self, owner: &Name) {
        if self.nodes.get(owner).is_some_and(ZoneNode::is_empty) {
            self.nodes.remove(owner);
        }
    }
}

impl<'a> IntoIterator for &'a ZoneTree {
    type Item = (&'a Name, &'a ZoneNode);
    type IntoIter = btree_map::Iter<'a, Name, ZoneNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

//------------ ZoneContents --------------------------------------------------

/// The complete contents of one zone.
#[derive(Clone, Debug)]
pub struct ZoneContents {
    apex: Name,
    nodes: ZoneTree,
    nsec3_nodes: ZoneTree,
}

impl ZoneContents {
    /// Creates empty contents for a zone with the given apex.
    #[must_use]
    pub fn new(apex: Name) -> Self {
        ZoneContents {
            apex,
            nodes: ZoneTree::default(),
            nsec3_nodes: ZoneTree::default(),
        }
    }

    pub fn apex(&self) -> &Name {
        &self.apex
    }

    /// Returns the node at the zone apex, if any data has been added.
    pub fn apex_node(&self) -> Option<&ZoneNode> {
        self.nodes.get(&self.apex)
    }

    /// The regular node tree.
    pub fn nodes(&self) -> &ZoneTree {
        &self.nodes
    }

    /// The tree of NSEC3 nodes.
    pub fn nsec3_nodes(&self) -> &ZoneTree {
        &self.nsec3_nodes
    }

    /// Looks up a node in whichever tree holds it.
    pub fn find_node(&self, owner: &Name) -> Option<&ZoneNode> {
        self.nodes
            .get(owner)
            .or_else(|| self.nsec3_nodes.get(owner))
    }

    /// Returns whether a record belongs in the NSEC3 tree.
    ///
    /// That is NSEC3 records themselves and RRSIGs covering them; nothing
    /// else ever lives at a hashed owner name.
    fn is_nsec3_record(rtype: Rtype, rdata: &[u8]) -> bool {
        rtype == Rtype::NSEC3
            || (rtype == Rtype::RRSIG
                && Rrsig::peek_type_covered(rdata) == Some(Rtype::NSEC3))
    }

    fn tree_for_mut(&mut self, rtype: Rtype, rdata: &[u8]) -> &mut ZoneTree {
        if Self::is_nsec3_record(rtype, rdata) {
            &mut self.nsec3_nodes
        } else {
            &mut self.nodes
        }
    }

    /// Adds a single record.
    pub fn add_rdata(
        &mut self,
        owner: &Name,
        rtype: Rtype,
        class: Class,
        ttl: Ttl,
        rdata: Bytes,
    ) {
        let tree = self.tree_for_mut(rtype, &rdata);
        let node = tree.get_or_insert(owner);
        node.rrsets
            .entry(rtype)
            .or_insert_with(|| Rrset::new(owner.clone(), rtype, class, ttl))
            .push_rdata(rdata);
    }

    /// Removes a single record. Returns whether it was present.
    ///
    /// Empty RRsets and nodes are pruned.
    pub fn remove_rdata(
        &mut self,
        owner: &Name,
        rtype: Rtype,
        rdata: &[u8],
    ) -> bool {
        let tree = self.tree_for_mut(rtype, rdata);
        let Some(node) = tree.get_mut(owner) else {
            return false;
        };
        let Some(rrset) = node.rrsets.get_mut(&rtype) else {
            return false;
        };
        let removed = rrset.remove_rdata(rdata);
        if rrset.is_empty() {
            node.rrsets.remove(&rtype);
        }
        tree.remove_if_empty(owner);
        removed
    }

    /// Recomputes the delegation and non-authoritative node flags.
    ///
    /// Must run after any structural change before the contents are used
    /// for signing decisions.
    pub fn adjust(&mut self) {
        let cuts: Vec<Name> = self
            .nodes
            .iter()
            .filter(|(owner, node)| {
                **owner != self.apex && node.rrset(Rtype::NS).is_some()
            })
            .map(|(owner, _)| owner.clone())
            .collect();

        let apex = self.apex.clone();
        for (owner, node) in self.nodes.nodes.iter_mut() {
            // A node is occluded when a zone cut lies strictly between
            // it and the apex.
            let occluded = cuts
                .iter()
                .any(|cut| *owner != *cut && owner.ends_with(cut));
            node.non_auth = occluded;
            node.delegation = !occluded
                && *owner != apex
                && node.rrset(Rtype::NS).is_some();
        }
        for (_, node) in self.nsec3_nodes.nodes.iter_mut() {
            node.non_auth = false;
            node.delegation = false;
        }
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn contents() -> ZoneContents {
        let mut zone = ZoneContents::new(name("example.com."));
        zone.add_rdata(
            &name("example.com."),
            Rtype::SOA,
            Class::IN,
            Ttl::from_secs(3600),
            Bytes::from_static(b"\x02ns\x07example\x03com\x00\x05admin\x07example\x03com\x00\x00\x00\x00\x01\x00\x00\x0e\x10\x00\x00\x03\x84\x00\x12\x75\x00\x00\x00\x0e\x10"),
        );
        zone
    }

    #[test]
    fn rrset_rdata_handling() {
        let mut rrset = Rrset::new(
            name("example.com."),
            Rtype::TXT,
            Class::IN,
            Ttl::from_secs(300),
        );
        rrset.push_rdata(Bytes::from_static(b"\x03abc"));
        rrset.push_rdata(Bytes::from_static(b"\x03abc"));
        rrset.push_rdata(Bytes::from_static(b"\x03def"));
        assert_eq!(rrset.len(), 2);
        assert!(rrset.remove_rdata(b"\x03abc"));
        assert!(!rrset.remove_rdata(b"\x03abc"));
        assert_eq!(rrset.len(), 1);
    }

    #[test]
    fn same_rdatas_ignores_order() {
        let mut a = Rrset::new(
            name("example.com."),
            Rtype::TXT,
            Class::IN,
            Ttl::from_secs(300),
        );
        let mut b = a.clone();
        a.push_rdata(Bytes::from_static(b"\x01x"));
        a.push_rdata(Bytes::from_static(b"\x01y"));
        b.push_rdata(Bytes::from_static(b"\x01y"));
        b.push_rdata(Bytes::from_static(b"\x01x"));
        assert!(a.same_rdatas(&b));
        b.push_rdata(Bytes::from_static(b"\x01z"));
        assert!(!a.same_rdatas(&b));
    }

    #[test]
    fn nsec3_records_go_to_their_own_tree() {
        let mut zone = contents();
        let hashed = name("0p9mhaveqvm6t7vbl5lop2u3t2rp3tom.example.com.");
        zone.add_rdata(
            &hashed,
            Rtype::NSEC3,
            Class::IN,
            Ttl::ZERO,
            Bytes::from_static(b"\x01\x00\x00\x0a\x00\x00"),
        );
        // An RRSIG covering NSEC3 (type 50) follows its record.
        let mut rrsig_rdata = vec![0, 50];
        rrsig_rdata.extend_from_slice(&[0; 70]);
        zone.add_rdata(
            &hashed,
            Rtype::RRSIG,
            Class::IN,
            Ttl::ZERO,
            Bytes::from(rrsig_rdata),
        );
        assert!(zone.nodes.get(&hashed).is_none());
        let node = zone.nsec3_nodes.get(&hashed).unwrap();
        assert_eq!(node.rrset_count(), 2);
        assert!(zone.find_node(&hashed).is_some());
    }

    #[test]
    fn remove_prunes_empty_nodes() {
        let mut zone = contents();
        let www = name("www.example.com.");
        zone.add_rdata(
            &www,
            Rtype::A,
            Class::IN,
            Ttl::from_secs(300),
            Bytes::from_static(&[192, 0, 2, 1]),
        );
        assert!(zone.remove_rdata(&www, Rtype::A, &[192, 0, 2, 1]));
        assert!(zone.nodes.get(&www).is_none());
        assert!(!zone.remove_rdata(&www, Rtype::A, &[192, 0, 2, 1]));
    }

    #[test]
    fn adjust_marks_delegations_and_glue() {
        let mut zone = contents();
        let sub = name("sub.example.com.");
        let glue = name("ns.sub.example.com.");
        zone.add_rdata(
            &sub,
            Rtype::NS,
            Class::IN,
            Ttl::from_secs(3600),
            Bytes::from_static(b"\x02ns\x03sub\x07example\x03com\x00"),
        );
        zone.add_rdata(
            &glue,
            Rtype::A,
            Class::IN,
            Ttl::from_secs(3600),
            Bytes::from_static(&[192, 0, 2, 53]),
        );
        zone.adjust();
        let sub_node = zone.nodes.get(&sub).unwrap();
        assert!(sub_node.is_delegation());
        assert!(!sub_node.is_non_auth());
        let glue_node = zone.nodes.get(&glue).unwrap();
        assert!(glue_node.is_non_auth());
        assert!(!glue_node.is_delegation());
        assert!(!zone.apex_node().unwrap().is_non_auth());
    }

    #[test]
    fn rrsigs_covering_filters_by_type() {
        let mut zone = contents();
        let apex = name("example.com.");
        for covered in [6u16, 2, 48] {
            let mut rdata = covered.to_be_bytes().to_vec();
            rdata.extend_from_slice(&[0; 70]);
            zone.add_rdata(
                &apex,
                Rtype::RRSIG,
                Class::IN,
                Ttl::from_secs(3600),
                Bytes::from(rdata),
            );
        }
        let node = zone.apex_node().unwrap();
        let soa_sigs = node.rrsigs_covering(Rtype::SOA).unwrap();
        assert_eq!(soa_sigs.len(), 1);
        assert!(node.rrsigs_covering(Rtype::MX).is_none());
    }
}
