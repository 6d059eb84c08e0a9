// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use log::{info, warn};
use tangle::{CachedTransaction, Tangle};
use transactions::MilestoneIndex;

use crate::abort::AbortSignal;
use crate::events::{Publisher, TangleEvent};
use crate::network_context::SyncNetworkContext;
use crate::propagation::PropagationPool;

/// Outcome of a solid queue check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WalkStatus {
    /// Every ancestor up to the solid entry points is present and solid.
    Solid,
    /// The milestone could not be solidified this pass; missing ancestors
    /// were requested from the network.
    Incomplete,
    /// The abort signal fired before the walk completed.
    Aborted,
}

/// Checks if a single transaction is solid: either already marked, or every
/// approvee is a solid entry point or present and solid. Marks the
/// transaction and publishes [`TangleEvent::TransactionSolid`] on the
/// false-to-true transition. Returns `(solid, newly_solid)`.
pub(crate) fn check_solidity(
    tangle: &Tangle,
    cached: &CachedTransaction,
    add_to_approvers: bool,
    events: &Publisher<TangleEvent>,
) -> (bool, bool) {
    let tx = cached.transaction();
    if tx.is_solid() {
        return (true, false);
    }

    let mut is_solid = true;
    for approvee in tx.approvees() {
        if tangle.solid_entry_points_contains(approvee) {
            // The snapshot boundary counts as solid.
            continue;
        }

        let approvee_tx = tangle.get_cached(approvee);
        if !approvee_tx.exists() || !approvee_tx.transaction().is_solid() {
            is_solid = false;
            if add_to_approvers {
                // Register this transaction as approver of the unknown or
                // unsolid approvee so solidity can ripple back to it later.
                tangle.approvers(approvee).lock().insert(tx.hash().clone());
            }
            break;
        }
    }

    if is_solid {
        tx.set_solid();
        let _ = events.send(TangleEvent::TransactionSolid(tx.clone()));
    }

    (is_solid, is_solid)
}

/// Traverses the past cone of a milestone tail and checks if the milestone
/// is solid. Missing transactions are requested from the network in one
/// batch. Can be pre-empted through `abort`.
///
/// Phase 1 collects every ancestor down to the solid frontier, so that
/// phase 2 propagates solidity over a closed, fully local set and never
/// touches the network.
pub(crate) async fn solid_queue_check(
    tangle: &Tangle,
    network: &SyncNetworkContext,
    propagation: &PropagationPool,
    events: &Publisher<TangleEvent>,
    milestone_index: MilestoneIndex,
    milestone_tail: &CachedTransaction,
    abort: &AbortSignal,
) -> WalkStatus {
    let ts = Instant::now();

    let mut txs_checked: HashMap<transactions::Hash, bool> = HashMap::new();
    let mut txs_to_traverse = HashSet::new();
    let mut approvers: HashMap<_, HashSet<_>> = HashMap::new();
    let mut entry_txs = HashSet::new();
    let mut txs_to_request = HashSet::new();
    txs_to_traverse.insert(milestone_tail.transaction().hash().clone());

    // Collect all transactions to check by traversing the tangle, looping as
    // long as the previous cycle discovered unsolid approvees.
    while !txs_to_traverse.is_empty() {
        for tx_hash in std::mem::take(&mut txs_to_traverse) {
            if abort.is_aborted() {
                return WalkStatus::Aborted;
            }

            let cached = tangle.get_cached(&tx_hash);
            if !cached.exists() {
                panic!("solid queue check: transaction not found: {}", tx_hash);
            }
            let tx = cached.transaction();

            let mut is_entry_tx = true;
            for approvee in tx.approvees() {
                if tangle.solid_entry_points_contains(approvee) {
                    continue;
                }

                // Track the approver relation for every approvee, present or
                // not; phase 2 walks these edges in reverse.
                approvers
                    .entry(approvee.clone())
                    .or_default()
                    .insert(tx_hash.clone());

                if let Some(&is_solid) = txs_checked.get(approvee) {
                    if !is_solid {
                        is_entry_tx = false;
                    }
                    continue;
                }

                let approvee_tx = tangle.get_cached(approvee);
                if !approvee_tx.exists() {
                    is_entry_tx = false;
                    txs_to_request.insert(approvee.clone());
                    txs_checked.insert(approvee.clone(), false);
                    continue;
                }

                let is_solid = approvee_tx.transaction().is_solid();
                txs_checked.insert(approvee.clone(), is_solid);
                if !is_solid {
                    is_entry_tx = false;
                    txs_to_traverse.insert(approvee.clone());
                }
            }

            if is_entry_tx {
                // Trunk and branch are solid; start the solidification walk
                // from here.
                entry_txs.insert(tx_hash);
            }
        }
    }
    let collect_time = ts.elapsed();

    if !txs_to_request.is_empty() {
        let hashes: Vec<_> = txs_to_request.into_iter().collect();
        warn!(
            "Stopped solidifier due to missing transactions; requested {} from the network",
            hashes.len()
        );
        network.request_transactions(hashes, milestone_index).await;
        return WalkStatus::Incomplete;
    }

    if entry_txs.is_empty() {
        panic!(
            "solid queue check: no solid entry points below milestone {}",
            milestone_index
        );
    }

    // Propagate solidity from the entry transactions toward the milestone
    // tail, looping as long as a cycle finds new solid transactions.
    let mut loop_cnt = 0;
    let mut new_solid_found = true;
    while new_solid_found {
        loop_cnt += 1;
        new_solid_found = false;

        for entry_tx_hash in entry_txs.iter().cloned().collect::<Vec<_>>() {
            if abort.is_aborted() {
                return WalkStatus::Aborted;
            }

            let cached = tangle.get_cached(&entry_tx_hash);
            if !cached.exists() {
                panic!("solid queue check: transaction not found: {}", entry_tx_hash);
            }

            let (is_solid, newly_solid) = check_solidity(tangle, &cached, false, events);
            if is_solid {
                // Re-examine everything that approves this transaction.
                if let Some(approver_hashes) = approvers.get(&entry_tx_hash) {
                    entry_txs.extend(approver_hashes.iter().cloned());
                }

                if newly_solid && tangle.is_synced() {
                    // Spread the new solidity into the future cone.
                    propagation.submit(cached.transaction().clone()).await;
                }

                entry_txs.remove(&entry_tx_hash);
                new_solid_found = true;
            }
        }
    }

    let solid = entry_txs.is_empty();
    info!(
        "Solidifier finished ({}): solid: {}, checked: {}, collect: {:?}, total: {:?}, entry transactions left: {}",
        loop_cnt,
        solid,
        txs_checked.len(),
        collect_time,
        ts.elapsed(),
        entry_txs.len()
    );

    if solid {
        WalkStatus::Solid
    } else {
        WalkStatus::Incomplete
    }
}
