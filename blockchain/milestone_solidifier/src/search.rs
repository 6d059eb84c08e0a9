// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashSet;
use std::time::Instant;

use log::info;
use tangle::{CachedTransaction, Tangle};
use transactions::MilestoneIndex;

use crate::abort::AbortSignal;

/// Outcome of a missing milestone search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SearchStatus {
    /// A milestone strictly between the confirmed tip and the target was
    /// recovered and registered.
    Found,
    /// The bounded walk exhausted the cone or the depth limit without a hit.
    NotFound,
    /// The abort signal fired mid-search.
    Aborted,
}

/// Walks the solid cone below a milestone tail looking for milestones whose
/// indices fall between the confirmed tip and the target. The walk is
/// bounded by `max_search_depth` frontier expansions; the cone was
/// established fully present by the preceding solidity walk, so a missing
/// transaction is store corruption.
pub(crate) fn search_missing_milestone(
    tangle: &Tangle,
    solid_milestone_index: MilestoneIndex,
    target_index: MilestoneIndex,
    milestone_tail: &CachedTransaction,
    max_search_depth: usize,
    abort: &AbortSignal,
) -> SearchStatus {
    let ts = Instant::now();

    let mut txs_checked = HashSet::new();
    let mut txs_to_traverse = HashSet::new();
    txs_to_traverse.insert(milestone_tail.transaction().hash().clone());

    let mut loop_cnt = 0;
    while !txs_to_traverse.is_empty() && loop_cnt < max_search_depth {
        loop_cnt += 1;

        for tx_hash in std::mem::take(&mut txs_to_traverse) {
            if abort.is_aborted() {
                return SearchStatus::Aborted;
            }

            let cached = tangle.get_cached(&tx_hash);
            if !cached.exists() {
                panic!("missing milestone search: transaction not found: {}", tx_hash);
            }

            for approvee in cached.transaction().approvees() {
                if tangle.solid_entry_points_contains(approvee) {
                    continue;
                }
                if txs_checked.contains(approvee) {
                    continue;
                }

                let approvee_tx = tangle.get_cached(approvee);
                if !approvee_tx.exists() {
                    panic!("missing milestone search: transaction not found: {}", approvee);
                }
                let approvee_tx = approvee_tx.transaction();

                if approvee_tx.is_tail() && tangle.is_maybe_milestone(approvee_tx) {
                    // Candidate tail; load its bundle and run the full check.
                    let bundle = tangle
                        .bundle_of_tail(approvee_tx.bundle(), approvee_tx.hash())
                        .unwrap_or_else(|| {
                            panic!(
                                "missing milestone search: bundle {} not found for tail {}",
                                approvee_tx.bundle(),
                                approvee_tx.hash()
                            )
                        });

                    match tangle.check_if_milestone(&bundle) {
                        Ok(milestone) => {
                            let index = milestone.index();
                            if index > solid_milestone_index && index < target_index {
                                info!(
                                    "Found missing milestone {} between {} and {}",
                                    index, solid_milestone_index, target_index
                                );
                                tangle.add_milestone(milestone);
                                return SearchStatus::Found;
                            }
                        }
                        Err(e) => info!("Milestone check failed: {}", e),
                    }
                }

                txs_to_traverse.insert(approvee.clone());
                txs_checked.insert(approvee.clone());
            }
        }
    }

    info!(
        "Missing milestone search finished ({}): checked {} transactions in {:?}",
        loop_cnt,
        txs_checked.len(),
        ts.elapsed()
    );
    SearchStatus::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{milestone_tail, tangle_with_entry_point, transaction};
    use transactions::Hash;

    /// E <- M4 <- T <- M6, with only milestone 6 registered.
    fn gapped_tangle() -> Tangle {
        let tangle = tangle_with_entry_point("E");
        tangle.insert(milestone_tail("M4", "E", "E", 4));
        tangle.insert(transaction("T", "M4", "E"));
        tangle.insert(milestone_tail("M6", "T", "M4", 6));
        tangle
    }

    #[test]
    fn recovers_a_milestone_inside_the_gap() {
        let tangle = gapped_tangle();
        let tail = tangle.get_cached(&Hash::from("M6"));

        let status = search_missing_milestone(
            &tangle,
            MilestoneIndex(3),
            MilestoneIndex(6),
            &tail,
            120_000,
            &AbortSignal::new(),
        );

        assert_eq!(status, SearchStatus::Found);
        assert_eq!(
            tangle
                .find_closest_next_milestone(MilestoneIndex(3))
                .map(|ms| ms.index()),
            Some(MilestoneIndex(4))
        );
    }

    #[test]
    fn milestones_outside_the_gap_are_ignored() {
        let tangle = gapped_tangle();
        let tail = tangle.get_cached(&Hash::from("M6"));

        // Milestone 4 is below the confirmed tip here, so nothing qualifies.
        let status = search_missing_milestone(
            &tangle,
            MilestoneIndex(4),
            MilestoneIndex(6),
            &tail,
            120_000,
            &AbortSignal::new(),
        );

        assert_eq!(status, SearchStatus::NotFound);
    }

    #[test]
    fn depth_exhaustion_returns_not_found() {
        let tangle = tangle_with_entry_point("E");
        // A chain deeper than the search limit, milestone at the far end.
        tangle.insert(milestone_tail("M4", "E", "E", 4));
        let mut parent = "M4".to_owned();
        for i in 0..10 {
            let hash = format!("T{}", i);
            tangle.insert(transaction(&hash, &parent, "E"));
            parent = hash;
        }
        tangle.insert(milestone_tail("M6", &parent, "E", 6));

        let tail = tangle.get_cached(&Hash::from("M6"));
        let status = search_missing_milestone(
            &tangle,
            MilestoneIndex(3),
            MilestoneIndex(6),
            &tail,
            2,
            &AbortSignal::new(),
        );

        assert_eq!(status, SearchStatus::NotFound);
    }

    #[test]
    fn aborted_search_stops_immediately() {
        let tangle = gapped_tangle();
        let tail = tangle.get_cached(&Hash::from("M6"));

        let abort = AbortSignal::new();
        abort.abort();

        let status = search_missing_milestone(
            &tangle,
            MilestoneIndex(3),
            MilestoneIndex(6),
            &tail,
            120_000,
            &abort,
        );
        assert_eq!(status, SearchStatus::Aborted);
        // Nothing was registered by the aborted pass.
        assert!(tangle.find_closest_next_milestone(MilestoneIndex(3)).is_none());
    }
}
