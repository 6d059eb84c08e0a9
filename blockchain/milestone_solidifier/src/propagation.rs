// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use async_std::channel::{bounded, Receiver, Sender};
use async_std::task::{self, JoinHandle};
use log::debug;
use tangle::Tangle;
use transactions::Transaction;

use crate::events::{Publisher, TangleEvent};
use crate::solidify::check_solidity;

const PROPAGATION_QUEUE_SIZE: usize = 1000;

/// Submission half of the future-cone propagation pool. The walk hands newly
/// solid transactions here; the worker then re-checks their approvers so
/// solidity spreads to transactions attached between milestones.
#[derive(Clone)]
pub(crate) struct PropagationPool {
    solid_send: Sender<Arc<Transaction>>,
}

impl PropagationPool {
    pub fn channel() -> (Self, Receiver<Arc<Transaction>>) {
        let (solid_send, solid_recv) = bounded(PROPAGATION_QUEUE_SIZE);
        (Self { solid_send }, solid_recv)
    }

    /// Queues a newly solid transaction for future-cone propagation.
    pub async fn submit(&self, tx: Arc<Transaction>) {
        if self.solid_send.send(tx).await.is_err() {
            debug!("Propagation pool is shut down; dropped transaction");
        }
    }

    pub fn close(&self) {
        self.solid_send.close();
    }
}

/// Spawns the propagation worker. It drains the pool queue and checks the
/// solidity of every approver recorded for each solid transaction,
/// re-submitting approvers that become solid themselves.
pub(crate) fn spawn_worker(
    tangle: Arc<Tangle>,
    events: Publisher<TangleEvent>,
    pool: PropagationPool,
    solid_recv: Receiver<Arc<Transaction>>,
) -> JoinHandle<()> {
    task::spawn(async move {
        while let Ok(tx) = solid_recv.recv().await {
            let approver_hashes: Vec<_> =
                tangle.approvers(tx.hash()).lock().iter().cloned().collect();

            for approver_hash in approver_hashes {
                let approver = tangle.get_cached(&approver_hash);
                if !approver.exists() {
                    continue;
                }

                let (_, newly_solid) = check_solidity(&tangle, &approver, true, &events);
                if newly_solid {
                    // Ripple further; a saturated queue is fine to drop on,
                    // the next milestone walk re-checks the cone.
                    if pool
                        .solid_send
                        .try_send(approver.transaction().clone())
                        .is_err()
                    {
                        debug!("Propagation queue full; dropped approver {}", approver_hash);
                    }
                }
            }
        }
    })
}
