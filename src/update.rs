//! Zone changesets and update transactions.
//!
//! Every mutation the signing engine produces is expressed as a
//! [`Changeset`], a list of RRset removals and additions. Changesets are
//! merged into a [`ZoneUpdate`], which owns the working copy of the zone
//! contents; a batch of changesets applies completely or not at all.

use crate::base::name::Name;
use crate::base::Rtype;
use crate::zonetree::{Rrset, ZoneContents};
use core::fmt;
use std::vec::Vec;

//------------ ApplyError ----------------------------------------------------

/// An error applying a changeset to zone contents.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApplyError {
    /// An unchecked removal named a record that is not in the zone.
    RemovalMismatch(Name, Rtype),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyError::RemovalMismatch(owner, rtype) => {
                write!(f, "removed record not in zone: {} {}", owner, rtype)
            }
        }
    }
}

impl std::error::Error for ApplyError {}

//------------ ChangeFlags ---------------------------------------------------

/// How a changeset entry is merged and later applied.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChangeFlags {
    /// Tolerate records that are already present (for additions) or
    /// already gone (for removals) when the entry is applied.
    pub check: bool,

    /// When the opposite part of the changeset holds an entry for the
    /// same owner and type, drop the records common to both, so that
    /// remove-then-add of an unchanged RRset nets out to nothing.
    pub cancel_out: bool,
}

impl ChangeFlags {
    pub const NONE: ChangeFlags = ChangeFlags {
        check: false,
        cancel_out: false,
    };
    pub const CHECK: ChangeFlags = ChangeFlags {
        check: true,
        cancel_out: false,
    };
    pub const CHECK_CANCELOUT: ChangeFlags = ChangeFlags {
        check: true,
        cancel_out: true,
    };
}

//------------ Change --------------------------------------------------------

/// One entry of a changeset.
#[derive(Clone, Debug)]
pub struct Change {
    pub rrset: Rrset,
    pub check: bool,
}

//------------ Changeset -----------------------------------------------------

/// An ordered set of removals and additions for one zone.
///
/// SOA records are kept apart from the entry lists: an update changes the
/// SOA exactly once, from `soa_from` to `soa_to`.
#[derive(Clone, Debug, Default)]
pub struct Changeset {
    removals: Vec<Change>,
    additions: Vec<Change>,
    soa_from: Option<Rrset>,
    soa_to: Option<Rrset>,
}

impl Changeset {
    /// Creates an empty changeset.
    #[must_use]
    pub fn new() -> Self {
        Changeset::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
            && self.additions.is_empty()
            && self.soa_from.is_none()
            && self.soa_to.is_none()
    }

    pub fn removals(&self) -> impl Iterator<Item = &Change> {
        self.removals.iter()
    }

    pub fn additions(&self) -> impl Iterator<Item = &Change> {
        self.additions.iter()
    }

    pub fn soa_from(&self) -> Option<&Rrset> {
        self.soa_from.as_ref()
    }

    pub fn soa_to(&self) -> Option<&Rrset> {
        self.soa_to.as_ref()
    }

    /// Records the removal of an RRset.
    pub fn add_removal(&mut self, rrset: Rrset, flags: ChangeFlags) {
        Self::add(
            &mut self.removals,
            &mut self.additions,
            &mut self.soa_from,
            rrset,
            flags,
        );
    }

    /// Records the addition of an RRset.
    pub fn add_addition(&mut self, rrset: Rrset, flags: ChangeFlags) {
        Self::add(
            &mut self.additions,
            &mut self.removals,
            &mut self.soa_to,
            rrset,
            flags,
        );
    }

    fn add(
        into: &mut Vec<Change>,
        opposite: &mut Vec<Change>,
        soa: &mut Option<Rrset>,
        mut rrset: Rrset,
        flags: ChangeFlags,
    ) {
        if rrset.is_empty() {
            return;
        }
        if rrset.rtype() == Rtype::SOA {
            *soa = Some(rrset);
            return;
        }
        if flags.cancel_out {
            if let Some(other) = opposite.iter_mut().find(|ch| {
                ch.rrset.owner() == rrset.owner()
                    && ch.rrset.rtype() == rrset.rtype()
            }) {
                let common: Vec<_> = rrset
                    .rdatas()
                    .iter()
                    .filter(|rd| other.rrset.contains_rdata(rd))
                    .cloned()
                    .collect();
                for rd in common {
                    rrset.remove_rdata(&rd);
                    other.rrset.remove_rdata(&rd);
                }
                opposite.retain(|ch| !ch.rrset.is_empty());
                if rrset.is_empty() {
                    return;
                }
            }
        }
        match into.iter_mut().find(|ch| {
            ch.rrset.owner() == rrset.owner()
                && ch.rrset.rtype() == rrset.rtype()
        }) {
            Some(existing) => {
                for rd in rrset.rdatas() {
                    existing.rrset.push_rdata(rd.clone());
                }
                existing.check |= flags.check;
            }
            None => into.push(Change {
                rrset,
                check: flags.check,
            }),
        }
    }

    /// Returns the RRsets this changeset touches, removals first.
    ///
    /// The SOA change is not included.
    pub fn touched(&self) -> impl Iterator<Item = &Rrset> {
        self.removals
            .iter()
            .chain(self.additions.iter())
            .map(|ch| &ch.rrset)
    }

    /// Merges another changeset into this one.
    ///
    /// Entries cancel against pending opposite entries, so removing and
    /// re-adding the same record across two changesets nets out.
    pub fn merge(&mut self, other: &Changeset) {
        for ch in &other.removals {
            self.add_removal(
                ch.rrset.clone(),
                ChangeFlags {
                    check: ch.check,
                    cancel_out: true,
                },
            );
        }
        for ch in &other.additions {
            self.add_addition(
                ch.rrset.clone(),
                ChangeFlags {
                    check: ch.check,
                    cancel_out: true,
                },
            );
        }
        if let Some(soa) = &other.soa_from {
            if self.soa_from.is_none() {
                self.soa_from = Some(soa.clone());
            }
        }
        if let Some(soa) = &other.soa_to {
            self.soa_to = Some(soa.clone());
        }
    }
}

//------------ ZoneUpdate ----------------------------------------------------

/// An in-progress update of one zone.
///
/// Holds the working copy of the zone contents plus the accumulated
/// changeset describing how it differs from the currently served version.
#[derive(Clone, Debug)]
pub struct ZoneUpdate {
    contents: ZoneContents,
    change: Changeset,
    full: bool,
}

impl ZoneUpdate {
    /// Starts a full update: the contents replace the zone wholesale.
    #[must_use]
    pub fn full(contents: ZoneContents) -> Self {
        ZoneUpdate {
            contents,
            change: Changeset::new(),
            full: true,
        }
    }

    /// Starts an incremental update from already-updated contents and the
    /// diff that produced them.
    #[must_use]
    pub fn incremental(contents: ZoneContents, change: Changeset) -> Self {
        ZoneUpdate {
            contents,
            change,
            full: false,
        }
    }

    pub fn zone(&self) -> &Name {
        self.contents.apex()
    }

    pub fn contents(&self) -> &ZoneContents {
        &self.contents
    }

    pub fn change(&self) -> &Changeset {
        &self.change
    }

    /// Returns whether this update replaces the whole zone.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Applies a single changeset to the working contents.
    ///
    /// On success the changeset is also merged into the accumulated diff.
    /// On error the working contents are left unchanged.
    pub fn apply_changeset(
        &mut self,
        changeset: &Changeset,
    ) -> Result<(), ApplyError> {
        self.apply_all(std::slice::from_ref(changeset))
    }

    /// Applies a batch of changesets, all or nothing.
    pub fn apply_changesets(
        &mut self,
        changesets: &[Changeset],
    ) -> Result<(), ApplyError> {
        self.apply_all(changesets)
    }

    fn apply_all(
        &mut self,
        changesets: &[Changeset],
    ) -> Result<(), ApplyError> {
        let mut working = self.contents.clone();
        for changeset in changesets {
            Self::apply_to(&mut working, changeset)?;
        }
        working.adjust();
        self.contents = working;
        for changeset in changesets {
            self.change.merge(changeset);
        }
        Ok(())
    }

    fn apply_to(
        contents: &mut ZoneContents,
        changeset: &Changeset,
    ) -> Result<(), ApplyError> {
        let soa_changes = changeset
            .soa_from
            .iter()
            .map(|rrset| (rrset, false))
            .chain(changeset.soa_to.iter().map(|rrset| (rrset, true)));
        let entries = changeset
            .removals
            .iter()
            .map(|ch| (ch, false))
            .chain(changeset.additions.iter().map(|ch| (ch, true)));

        for (rrset, is_addition) in soa_changes {
            Self::apply_rrset(contents, rrset, is_addition, true)?;
        }
        for (ch, is_addition) in entries {
            Self::apply_rrset(contents, &ch.rrset, is_addition, ch.check)?;
        }
        Ok(())
    }

    fn apply_rrset(
        contents: &mut ZoneContents,
        rrset: &Rrset,
        is_addition: bool,
        check: bool,
    ) -> Result<(), ApplyError> {
        for rdata in rrset.rdatas() {
            if is_addition {
                contents.add_rdata(
                    rrset.owner(),
                    rrset.rtype(),
                    rrset.class(),
                    rrset.ttl(),
                    rdata.clone(),
                );
            } else {
                let removed = contents.remove_rdata(
                    rrset.owner(),
                    rrset.rtype(),
                    rdata,
                );
                if !removed && !check {
                    return Err(ApplyError::RemovalMismatch(
                        rrset.owner().clone(),
                        rrset.rtype(),
                    ));
                }
            }
        }
        Ok(())
    }
}

//============ Tests =========================================================
