//! Parallel signing of zone trees and changesets.
//!
//! Work is partitioned round-robin over the worker threads: every worker
//! walks the same node (or changeset entry) sequence and picks the items
//! whose running index falls to it. Workers share nothing mutable; each
//! accumulates its own changeset, and the results are merged into the
//! zone update only after all workers finished without error.

use crate::base::name::Name;
use crate::base::Rtype;
use crate::crypto::SignRaw;
use crate::keys::KeySet;
use crate::rdata::Timestamp;
use crate::sign::error::SigningError;
use crate::sign::rrsigs::{
    note_earliest_expiration, remove_rrset_rrsigs, resign_rrset,
    rr_should_be_signed, sign_node_rrsets,
};
use crate::sign::{SignerCtx, SigningCtx};
use crate::update::{Changeset, ZoneUpdate};
use crate::zonetree::{ZoneContents, ZoneTree};
use std::collections::BTreeSet;
use std::thread;
use tracing::debug;

type WorkerResult = Result<(Changeset, Option<Timestamp>), SigningError>;

/// Which of the zone's two node trees to sign.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum TreePart {
    Normal,
    Nsec3,
}

//------------ Tree signing --------------------------------------------------

/// Refreshes the signatures of one node tree.
///
/// The earliest expiration among kept and created signatures is merged
/// into `expires_at`.
pub(super) fn zone_tree_sign<Inner: SignRaw + Sync>(
    update: &mut ZoneUpdate,
    part: TreePart,
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
    expires_at: &mut Option<Timestamp>,
) -> Result<(), SigningError> {
    let num_threads = ctx.policy.signing_threads;
    let results: Vec<WorkerResult> = {
        let tree = match part {
            TreePart::Normal => update.contents().nodes(),
            TreePart::Nsec3 => update.contents().nsec3_nodes(),
        };
        debug!(
            zone = %update.zone(),
            part = ?part,
            nodes = tree.len(),
            threads = num_threads,
            "signing zone tree"
        );
        run_workers(num_threads, |index| {
            tree_sign_worker(tree, keys, ctx, num_threads, index)
        })
    };
    merge_results(update, results, expires_at)
}

fn tree_sign_worker<Inner: SignRaw>(
    tree: &ZoneTree,
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
    num_threads: usize,
    index: usize,
) -> WorkerResult {
    let signer = SignerCtx::new(keys, ctx)?;
    let mut changeset = Changeset::new();
    let mut expires_at = None;
    let mut counter = 0usize;
    for (_, node) in tree {
        if node.is_empty() || node.is_non_auth() {
            continue;
        }
        let picked = counter % num_threads == index;
        counter += 1;
        if !picked {
            continue;
        }
        sign_node_rrsets(node, &signer, &mut changeset, &mut expires_at)?;
    }
    Ok((changeset, expires_at))
}

//------------ Changeset signing ---------------------------------------------

/// Refreshes the signatures of everything an update touched.
///
/// The SOA is handled separately after the parallel phase: an update
/// changes it exactly once, so its signature is refreshed exactly once.
pub(super) fn sign_changeset<Inner: SignRaw + Sync>(
    update: &mut ZoneUpdate,
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
    expires_at: &mut Option<Timestamp>,
) -> Result<(), SigningError> {
    let num_threads = ctx.policy.signing_threads;

    // Deduplicated snapshot of the touched owner/type pairs; an RRset
    // listed in both the removals and the additions is signed once.
    let mut seen = BTreeSet::new();
    let entries: Vec<(Name, Rtype)> = update
        .change()
        .touched()
        .map(|rrset| (rrset.owner().clone(), rrset.rtype()))
        .filter(|entry| seen.insert(entry.clone()))
        .collect();
    let soa_owner = update
        .change()
        .soa_to()
        .or_else(|| update.change().soa_from())
        .map(|rrset| rrset.owner().clone());

    let results: Vec<WorkerResult> = {
        let contents = update.contents();
        run_workers(num_threads, |index| {
            changeset_sign_worker(
                contents,
                &entries,
                keys,
                ctx,
                num_threads,
                index,
            )
        })
    };

    let mut changesets = Vec::with_capacity(results.len());
    for result in results {
        let (changeset, expire) = result?;
        if let Some(expire) = expire {
            note_earliest_expiration(expires_at, expire);
        }
        changesets.push(changeset);
    }

    if let Some(owner) = soa_owner {
        let signer = SignerCtx::new(keys, ctx)?;
        let mut soa_expire = None;
        sign_changeset_entry(
            update.contents(),
            &owner,
            Rtype::SOA,
            &signer,
            &mut changesets[0],
            &mut soa_expire,
        )?;
        if let Some(expire) = soa_expire {
            note_earliest_expiration(expires_at, expire);
        }
    }

    update.apply_changesets(&changesets)?;
    Ok(())
}

fn changeset_sign_worker<Inner: SignRaw>(
    contents: &ZoneContents,
    entries: &[(Name, Rtype)],
    keys: &KeySet<Inner>,
    ctx: &SigningCtx<'_>,
    num_threads: usize,
    index: usize,
) -> WorkerResult {
    let signer = SignerCtx::new(keys, ctx)?;
    let mut changeset = Changeset::new();
    let mut expires_at = None;
    for (i, (owner, rtype)) in entries.iter().enumerate() {
        if i % num_threads != index {
            continue;
        }
        sign_changeset_entry(
            contents,
            owner,
            *rtype,
            &signer,
            &mut changeset,
            &mut expires_at,
        )?;
    }
    Ok((changeset, expires_at))
}

/// Refreshes the signatures for one touched owner/type pair.
///
/// When the node is gone all its signatures went with it. When the RRset
/// no longer takes signatures (removed, or turned non-authoritative by
/// the update) its leftover signatures are dropped.
pub(super) fn sign_changeset_entry<Inner: SignRaw>(
    contents: &ZoneContents,
    owner: &Name,
    rtype: Rtype,
    signer: &SignerCtx<'_, Inner>,
    changeset: &mut Changeset,
    expires_at: &mut Option<Timestamp>,
) -> Result<(), SigningError> {
    let Some(node) = contents.find_node(owner) else {
        return Ok(());
    };
    let rrsigs = node.rrset(Rtype::RRSIG);
    match node.rrset(rtype) {
        Some(rrset) if rr_should_be_signed(node, Some(rrset)) => {
            resign_rrset(rrset, rrsigs, signer, changeset, expires_at)
        }
        _ => {
            if let Some(rrsigs) = rrsigs {
                remove_rrset_rrsigs(owner, rtype, rrsigs, changeset);
            }
            Ok(())
        }
    }
}

//------------ Worker plumbing -----------------------------------------------

/// Runs the worker closure once per thread index and collects the
/// results in worker order.
fn run_workers<F>(num_threads: usize, worker: F) -> Vec<WorkerResult>
where
    F: Fn(usize) -> WorkerResult + Sync,
{
    if num_threads == 1 {
        return vec![worker(0)];
    }
    thread::scope(|scope| {
        let handles: Vec<_> = (0..num_threads)
            .map(|index| {
                let worker = &worker;
                thread::Builder::new()
                    .name(format!("zonesign-{}", index))
                    .spawn_scoped(scope, move || worker(index))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or(Err(SigningError::ThreadFailure)),
                Err(_) => Err(SigningError::ThreadFailure),
            })
            .collect()
    })
}

fn merge_results(
    update: &mut ZoneUpdate,
    results: Vec<WorkerResult>,
    expires_at: &mut Option<Timestamp>,
) -> Result<(), SigningError> {
    let mut changesets = Vec::with_capacity(results.len());
    for result in results {
        let (changeset, expire) = result?;
        if let Some(expire) = expire {
            note_earliest_expiration(expires_at, expire);
        }
        changesets.push(changeset);
    }
    update.apply_changesets(&changesets)?;
    Ok(())
}
