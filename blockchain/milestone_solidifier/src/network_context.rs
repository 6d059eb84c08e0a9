// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_std::channel::Sender;
use log::{trace, warn};
use transactions::{Hash, MilestoneIndex};

/// Messages sent to the gossip layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkMessage {
    /// Batched request for transactions missing from the local store, tagged
    /// with the milestone whose solidification needs them.
    Transactions {
        hashes: Vec<Hash>,
        milestone_index: MilestoneIndex,
    },
}

/// Context used by the solidifier to issue requests to the p2p network.
#[derive(Clone)]
pub struct SyncNetworkContext {
    /// Channel to send network messages through the p2p service.
    network_send: Sender<NetworkMessage>,
}

impl SyncNetworkContext {
    pub fn new(network_send: Sender<NetworkMessage>) -> Self {
        Self { network_send }
    }

    /// Requests a batch of missing transactions. Fire and forget; the gossip
    /// layer re-requests until fulfilled and re-triggers the solidifier when
    /// its request queue drains.
    pub async fn request_transactions(&self, hashes: Vec<Hash>, milestone_index: MilestoneIndex) {
        trace!(
            "Requesting {} transactions for milestone {}",
            hashes.len(),
            milestone_index
        );
        if self
            .network_send
            .send(NetworkMessage::Transactions {
                hashes,
                milestone_index,
            })
            .await
            .is_err()
        {
            warn!("Network service unavailable; dropped transaction request");
        }
    }
}
