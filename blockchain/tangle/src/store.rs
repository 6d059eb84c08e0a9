// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use transactions::{Hash, Milestone, MilestoneIndex, Transaction};

use crate::{CachedTransaction, Error};

/// Shared in-memory tangle store.
///
/// Holds the transaction cache, the persistent approver index, the solid
/// entry points established by the last snapshot, the registered milestones
/// and the ledger tip. All locks are short-held; none is held across I/O.
pub struct Tangle {
    /// Transaction cache, keyed by transaction hash.
    txs: RwLock<HashMap<Hash, Arc<Transaction>>>,

    /// Approver index: approvee hash to the set of transactions referencing
    /// it as trunk or branch. Entries carry their own lock so concurrent
    /// writers for distinct approvees do not contend.
    approvers: RwLock<HashMap<Hash, Arc<Mutex<HashSet<Hash>>>>>,

    /// Transactions of each bundle, keyed by bundle hash, in insertion order.
    bundles: RwLock<HashMap<Hash, Vec<Hash>>>,

    /// Snapshot boundary hashes, treated as implicit solid leaves.
    solid_entry_points: RwLock<HashSet<Hash>>,

    /// Milestones registered so far, keyed by index.
    milestones: RwLock<BTreeMap<MilestoneIndex, Milestone>>,

    /// Address the coordinator issues milestone bundles from.
    coordinator_address: Hash,

    /// Index of the latest solid (confirmed) milestone.
    solid_milestone_index: RwLock<MilestoneIndex>,

    /// Highest milestone index seen so far.
    latest_milestone_index: RwLock<MilestoneIndex>,

    /// Guards ledger mutation during milestone confirmation.
    ledger: RwLock<()>,

    /// Milestone indices confirmed so far, in confirmation order.
    confirmed: Mutex<Vec<MilestoneIndex>>,

    /// Milestone indices handed to the persistence layer.
    persisted: Mutex<HashSet<MilestoneIndex>>,

    /// Whether the node considers itself in sync with the network.
    synced: AtomicBool,
}

impl Tangle {
    pub fn new(coordinator_address: Hash) -> Self {
        Self {
            txs: Default::default(),
            approvers: Default::default(),
            bundles: Default::default(),
            solid_entry_points: Default::default(),
            milestones: Default::default(),
            coordinator_address,
            solid_milestone_index: Default::default(),
            latest_milestone_index: Default::default(),
            ledger: Default::default(),
            confirmed: Default::default(),
            persisted: Default::default(),
            synced: AtomicBool::new(false),
        }
    }

    /// Stores a transaction and files it into its bundle bucket. Returns the
    /// shared reference; re-inserting a known hash returns the existing one.
    pub fn insert(&self, tx: Transaction) -> Arc<Transaction> {
        let mut txs = self.txs.write();
        if let Some(existing) = txs.get(tx.hash()) {
            return existing.clone();
        }
        let tx = Arc::new(tx);
        txs.insert(tx.hash().clone(), tx.clone());
        drop(txs);

        self.bundles
            .write()
            .entry(tx.bundle().clone())
            .or_default()
            .push(tx.hash().clone());
        tx
    }

    /// Acquires a cached handle for the given hash. The handle reports
    /// non-existence instead of failing when the transaction is unknown.
    pub fn get_cached(&self, hash: &Hash) -> CachedTransaction {
        CachedTransaction::new(self.txs.read().get(hash).cloned())
    }

    pub fn add_solid_entry_point(&self, hash: Hash) {
        self.solid_entry_points.write().insert(hash);
    }

    pub fn solid_entry_points_contains(&self, hash: &Hash) -> bool {
        self.solid_entry_points.read().contains(hash)
    }

    /// The mutable approver set of the given approvee, created on demand.
    pub fn approvers(&self, hash: &Hash) -> Arc<Mutex<HashSet<Hash>>> {
        if let Some(set) = self.approvers.read().get(hash) {
            return set.clone();
        }
        self.approvers
            .write()
            .entry(hash.clone())
            .or_default()
            .clone()
    }

    /// Registers a validated milestone and ratchets the latest known index.
    /// Indices are unique; a duplicate registration keeps the first.
    pub fn add_milestone(&self, milestone: Milestone) {
        let index = milestone.index();
        {
            let mut milestones = self.milestones.write();
            if milestones.contains_key(&index) {
                debug!("milestone {} already registered", index);
            } else {
                milestones.insert(index, milestone);
            }
        }
        let mut latest = self.latest_milestone_index.write();
        if index > *latest {
            *latest = index;
        }
    }

    /// The registered milestone with the smallest index strictly greater
    /// than `index`.
    pub fn find_closest_next_milestone(&self, index: MilestoneIndex) -> Option<Milestone> {
        self.milestones
            .read()
            .range(index + 1..)
            .next()
            .map(|(_, ms)| ms.clone())
    }

    pub fn solid_milestone_index(&self) -> MilestoneIndex {
        *self.solid_milestone_index.read()
    }

    pub fn latest_milestone_index(&self) -> MilestoneIndex {
        *self.latest_milestone_index.read()
    }

    /// Sets the solid milestone tip. Used at snapshot load and on promotion.
    pub fn set_solid_milestone_index(&self, index: MilestoneIndex) {
        *self.solid_milestone_index.write() = index;
    }

    /// Takes the ledger write lock. Confirmation and tip promotion happen
    /// under this guard.
    pub fn write_lock_ledger(&self) -> RwLockWriteGuard<'_, ()> {
        self.ledger.write()
    }

    /// Applies the milestone to the ledger. Balance reconciliation is
    /// delegated; the store records the confirmation order.
    pub fn confirm_milestone(&self, milestone: &Milestone) {
        self.confirmed.lock().push(milestone.index());
    }

    /// Milestone indices confirmed so far, in confirmation order.
    pub fn confirmed_milestones(&self) -> Vec<MilestoneIndex> {
        self.confirmed.lock().clone()
    }

    /// Hands the milestone to the persistence layer.
    pub fn store_milestone(&self, milestone: &Milestone) {
        self.persisted.lock().insert(milestone.index());
    }

    pub fn is_milestone_persisted(&self, index: MilestoneIndex) -> bool {
        self.persisted.lock().contains(&index)
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Relaxed)
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Relaxed);
    }

    /// The transactions of the bundle the given tail belongs to, tail first.
    /// Returns `None` when the bucket is unknown, the tail is not filed in it
    /// or a member transaction is missing from the cache.
    pub fn bundle_of_tail(&self, bundle: &Hash, tail: &Hash) -> Option<Vec<Arc<Transaction>>> {
        let bundles = self.bundles.read();
        let bucket = bundles.get(bundle)?;
        if !bucket.contains(tail) {
            return None;
        }

        let txs = self.txs.read();
        let mut members = Vec::with_capacity(bucket.len());
        for hash in bucket {
            members.push(txs.get(hash)?.clone());
        }
        // The tail leads the bundle regardless of insertion order.
        members.sort_by_key(|tx| tx.hash() != tail);
        Some(members)
    }

    /// Cheap prefilter for milestone candidates: bundle tails issued from
    /// the coordinator address.
    pub fn is_maybe_milestone(&self, tx: &Transaction) -> bool {
        tx.is_tail() && tx.address() == &self.coordinator_address
    }

    /// Validates a bundle as a milestone and extracts it. Signature
    /// enforcement is delegated; this checks the structure the solidifier
    /// relies on.
    pub fn check_if_milestone(&self, bundle: &[Arc<Transaction>]) -> Result<Milestone, Error> {
        let tail = bundle
            .first()
            .ok_or_else(|| Error::InvalidMilestone("empty bundle".to_owned()))?;
        if !tail.is_tail() {
            return Err(Error::InvalidMilestone(format!(
                "head transaction {} is not a tail",
                tail.hash()
            )));
        }
        if tail.address() != &self.coordinator_address {
            return Err(Error::InvalidMilestone(format!(
                "tail {} was not issued by the coordinator",
                tail.hash()
            )));
        }
        let index = tail.tag();
        if index == MilestoneIndex(0) {
            return Err(Error::InvalidMilestone(format!(
                "tail {} carries the reserved index 0",
                tail.hash()
            )));
        }
        Ok(Milestone::new(index, tail.hash().clone()))
    }
}
