// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use async_std::channel::{bounded, Receiver, Sender};
use async_std::sync::Mutex as AsyncMutex;
use async_std::task::{self, JoinHandle};
use log::{info, trace};
use parking_lot::{Mutex, RwLock};
use tangle::Tangle;
use tokio::sync::broadcast;
use transactions::{MilestoneIndex, Transaction};

use crate::abort::AbortSignal;
use crate::config::SolidifierConfig;
use crate::events::{Publisher, Subscriber, TangleEvent};
use crate::network_context::{NetworkMessage, SyncNetworkContext};
use crate::propagation::{self, PropagationPool};
use crate::search::{search_missing_milestone, SearchStatus};
use crate::solidify::{solid_queue_check, WalkStatus};

/// Number of solidification workers. Must be two: one worker can sit inside
/// an attempt holding the solidifier lock while the second picks up an
/// older-milestone trigger and fires the abort signal for the first.
const SOLIDIFIER_WORKER_COUNT: usize = 2;

/// Bounded trigger queue; submissions beyond this are dropped, since the
/// retry path re-triggers on its own.
const SOLIDIFIER_QUEUE_SIZE: usize = 100;

/// Capacity of the event stream handed to subscribers.
const EVENT_STREAM_CAPACITY: usize = 100;

/// Orchestrates milestone solidification: always works on the oldest known
/// non-solid milestone, requests whatever its past cone is missing, recovers
/// milestones skipped by the gossip layer and promotes the solid milestone
/// tip strictly in index order.
pub struct MilestoneSolidifier {
    /// Access and store transactions / bundles / milestones.
    tangle: Arc<Tangle>,

    /// Context to be able to send requests to the p2p network.
    network: SyncNetworkContext,

    config: SolidifierConfig,

    /// Event stream for solid transactions and tip movements.
    events: Publisher<TangleEvent>,

    /// Submission half of the future-cone propagation pool.
    propagation: PropagationPool,
    propagation_recv: Receiver<Arc<Transaction>>,

    /// Index currently being solidified; 0 while idle.
    solidifier_milestone_index: RwLock<MilestoneIndex>,

    /// Abort signal of the attempt in flight. Replaced wholesale for every
    /// attempt, never re-armed.
    abort_signal: Mutex<AbortSignal>,

    /// Serializes the body of solidification attempts.
    solidifier_lock: AsyncMutex<()>,

    trigger_send: Sender<MilestoneIndex>,
    trigger_recv: Receiver<MilestoneIndex>,
}

impl MilestoneSolidifier {
    pub fn new(
        tangle: Arc<Tangle>,
        network_send: Sender<NetworkMessage>,
        config: SolidifierConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_STREAM_CAPACITY);
        let (trigger_send, trigger_recv) = bounded(SOLIDIFIER_QUEUE_SIZE);
        let (propagation, propagation_recv) = PropagationPool::channel();

        Arc::new(Self {
            tangle,
            network: SyncNetworkContext::new(network_send),
            config,
            events,
            propagation,
            propagation_recv,
            solidifier_milestone_index: Default::default(),
            abort_signal: Default::default(),
            solidifier_lock: AsyncMutex::new(()),
            trigger_send,
            trigger_recv,
        })
    }

    /// Spawns the solidification workers and the future-cone propagation
    /// worker. The handles resolve after [`Self::shutdown`] once the queues
    /// have drained.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(SOLIDIFIER_WORKER_COUNT + 1);
        for _ in 0..SOLIDIFIER_WORKER_COUNT {
            let this = Arc::clone(self);
            let trigger_recv = self.trigger_recv.clone();
            handles.push(task::spawn(async move {
                while let Ok(index) = trigger_recv.recv().await {
                    this.solidify_milestone(index).await;
                }
            }));
        }
        handles.push(propagation::spawn_worker(
            self.tangle.clone(),
            self.events.clone(),
            self.propagation.clone(),
            self.propagation_recv.clone(),
        ));
        handles
    }

    /// Submits a solidification trigger; index 0 requests a generic retry.
    /// Triggers that would overflow the queue are dropped.
    pub fn try_submit(&self, index: MilestoneIndex) {
        if self.trigger_send.try_send(index).is_err() {
            trace!("Dropped solidification trigger for {}", index);
        }
    }

    /// The milestone index currently being solidified, or 0 while idle.
    pub fn solidifier_milestone_index(&self) -> MilestoneIndex {
        *self.solidifier_milestone_index.read()
    }

    /// Subscribes to solidifier events.
    pub fn subscribe(&self) -> Subscriber<TangleEvent> {
        self.events.subscribe()
    }

    /// Closes the trigger and propagation queues. Workers drain what is left
    /// and exit.
    pub fn shutdown(&self) {
        self.trigger_send.close();
        self.propagation.close();
    }

    fn set_solidifier_milestone_index(&self, index: MilestoneIndex) {
        *self.solidifier_milestone_index.write() = index;
    }

    /// Fires the abort signal of whatever attempt is currently in flight.
    fn abort_solidification(&self) {
        self.abort_signal.lock().abort();
    }

    /// Installs a fresh abort signal for the next attempt.
    fn install_abort_signal(&self) -> AbortSignal {
        let signal = AbortSignal::new();
        *self.abort_signal.lock() = signal.clone();
        signal
    }

    /// Tries to solidify the oldest known non-solid milestone, requesting
    /// missing transactions along the way.
    async fn solidify_milestone(&self, trigger_index: MilestoneIndex) {
        {
            let running = *self.solidifier_milestone_index.read();
            if running != MilestoneIndex(0)
                && trigger_index != MilestoneIndex(0)
                && running < trigger_index
            {
                // An older milestone is already being solidified; it keeps
                // priority over this trigger.
                return;
            }
        }

        // Pre-empt a possible newer solidification in flight.
        self.abort_solidification();

        let _lock = self.solidifier_lock.lock().await;

        let current_solid_index = self.tangle.solid_milestone_index();
        let latest_index = self.tangle.latest_milestone_index();
        if current_solid_index == latest_index && latest_index != MilestoneIndex(0) {
            // Latest known milestone is already solid.
            return;
        }

        // Always walk the oldest non-solid milestone: either it becomes
        // solid, or whatever it is missing gets requested.
        let milestone = match self.tangle.find_closest_next_milestone(current_solid_index) {
            Some(milestone) => milestone,
            None => return,
        };
        let index = milestone.index();
        self.set_solidifier_milestone_index(index);
        let abort = self.install_abort_signal();

        info!("Run solidity check for milestone {}", index);
        let tail = self.tangle.get_cached(milestone.tail());

        match solid_queue_check(
            &self.tangle,
            &self.network,
            &self.propagation,
            &self.events,
            index,
            &tail,
            &abort,
        )
        .await
        {
            WalkStatus::Aborted => {
                // An older milestone pre-empted this attempt.
                info!("Aborted solid queue check for milestone {}", index);
                self.set_solidifier_milestone_index(MilestoneIndex(0));
                return;
            }
            WalkStatus::Incomplete => {
                // Missing transactions were requested; the gossip layer
                // re-triggers once its request queue drains.
                info!("Milestone {} could not be solidified yet", index);
                self.set_solidifier_milestone_index(MilestoneIndex(0));
                return;
            }
            WalkStatus::Solid => {}
        }

        if current_solid_index + 1 < index {
            // The cone is solid but milestone indices in between were never
            // registered. Unless one turned up concurrently, recover it from
            // the freshly solidified cone.
            if self
                .tangle
                .find_closest_next_milestone(current_solid_index)
                .map(|ms| ms.index())
                == Some(index)
            {
                info!(
                    "Milestones missing between {} and {}; searching the solid cone",
                    current_solid_index, index
                );
                match search_missing_milestone(
                    &self.tangle,
                    current_solid_index,
                    index,
                    &tail,
                    self.config.max_missing_milestone_search_depth,
                    &abort,
                ) {
                    SearchStatus::Aborted => {
                        info!(
                            "Aborted missing milestone search between {} and {}",
                            current_solid_index, index
                        );
                    }
                    SearchStatus::NotFound => panic!(
                        "milestones missing between {} and {}",
                        current_solid_index, index
                    ),
                    SearchStatus::Found => {}
                }
            }

            // Rerun to solidify the older one.
            self.set_solidifier_milestone_index(MilestoneIndex(0));
            self.try_submit(MilestoneIndex(0));
            return;
        }

        {
            let _ledger = self.tangle.write_lock_ledger();
            self.tangle.confirm_milestone(&milestone);
            self.tangle.set_solid_milestone_index(index);
            self.tangle.store_milestone(&milestone);
        }
        let _ = self
            .events
            .send(TangleEvent::SolidMilestoneChanged(milestone));
        info!("New solid milestone: {}", index);

        // Run the check for the next milestone.
        self.set_solidifier_milestone_index(MilestoneIndex(0));
        self.try_submit(MilestoneIndex(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{milestone_tail, tangle_with_entry_point, transaction, try_events};
    use transactions::{Hash, Milestone};

    fn solidifier_setup() -> (Arc<MilestoneSolidifier>, Receiver<NetworkMessage>) {
        let (network_send, network_recv) = bounded(20);
        let tangle = Arc::new(tangle_with_entry_point("E"));
        (
            MilestoneSolidifier::new(tangle, network_send, SolidifierConfig::default()),
            network_recv,
        )
    }

    #[test]
    fn newer_triggers_yield_to_a_running_older_attempt() {
        let (solidifier, _network_recv) = solidifier_setup();
        solidifier.set_solidifier_milestone_index(MilestoneIndex(4));
        let running_signal = solidifier.install_abort_signal();

        task::block_on(solidifier.solidify_milestone(MilestoneIndex(7)));

        // The newer trigger backed off without touching the running attempt.
        assert_eq!(solidifier.solidifier_milestone_index(), MilestoneIndex(4));
        assert!(!running_signal.is_aborted());
    }

    #[test]
    fn older_triggers_pre_empt_a_running_newer_attempt() {
        let (solidifier, _network_recv) = solidifier_setup();
        solidifier.tangle.insert(milestone_tail("M4", "E", "E", 4));
        solidifier
            .tangle
            .add_milestone(Milestone::new(MilestoneIndex(4), Hash::from("M4")));
        solidifier
            .tangle
            .set_solid_milestone_index(MilestoneIndex(3));

        solidifier.set_solidifier_milestone_index(MilestoneIndex(7));
        let newer_signal = solidifier.install_abort_signal();

        task::block_on(solidifier.solidify_milestone(MilestoneIndex(4)));

        assert!(newer_signal.is_aborted());
        // The older trigger went on to solidify milestone 4.
        assert_eq!(
            solidifier.tangle.solid_milestone_index(),
            MilestoneIndex(4)
        );
        assert_eq!(solidifier.solidifier_milestone_index(), MilestoneIndex(0));
    }

    #[test]
    fn attempt_without_milestones_returns_idle() {
        let (solidifier, _network_recv) = solidifier_setup();
        task::block_on(solidifier.solidify_milestone(MilestoneIndex(0)));
        assert_eq!(solidifier.solidifier_milestone_index(), MilestoneIndex(0));
    }

    #[test]
    fn promotion_is_skipped_when_latest_is_already_solid() {
        let (solidifier, _network_recv) = solidifier_setup();
        let mut subscriber = solidifier.subscribe();
        solidifier.tangle.insert(milestone_tail("M1", "E", "E", 1));
        solidifier
            .tangle
            .add_milestone(Milestone::new(MilestoneIndex(1), Hash::from("M1")));
        solidifier
            .tangle
            .set_solid_milestone_index(MilestoneIndex(1));

        task::block_on(solidifier.solidify_milestone(MilestoneIndex(0)));

        assert!(try_events(&mut subscriber).is_empty());
        assert_eq!(
            solidifier.tangle.confirmed_milestones(),
            Vec::<MilestoneIndex>::new()
        );
    }

    #[test]
    fn gap_recovery_registers_the_intermediate_milestone() {
        let (solidifier, _network_recv) = solidifier_setup();
        let tangle = &solidifier.tangle;
        tangle.insert(milestone_tail("M1", "E", "E", 1));
        tangle.insert(transaction("T", "M1", "E"));
        tangle.insert(milestone_tail("M3", "T", "M1", 3));
        // Milestone 1 was never seen by the validator; only 3 is known.
        tangle.add_milestone(Milestone::new(MilestoneIndex(3), Hash::from("M3")));

        task::block_on(solidifier.solidify_milestone(MilestoneIndex(3)));

        // The walk was solid but gapped: milestone 1 is recovered from the
        // cone and a retry is queued instead of promoting 3 out of order.
        assert_eq!(
            tangle
                .find_closest_next_milestone(MilestoneIndex(0))
                .map(|ms| ms.index()),
            Some(MilestoneIndex(1))
        );
        assert_eq!(tangle.solid_milestone_index(), MilestoneIndex(0));
        assert_eq!(
            solidifier.trigger_recv.try_recv().unwrap(),
            MilestoneIndex(0)
        );
    }
}
