// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use tangle::Tangle;
use transactions::{Hash, MilestoneIndex, Transaction};

use crate::events::{Publisher, Subscriber, TangleEvent};

pub(crate) const COORDINATOR: &str = "COORDINATOR";

/// A fresh tangle whose snapshot boundary consists of the given hash.
pub(crate) fn tangle_with_entry_point(hash: &str) -> Tangle {
    let tangle = Tangle::new(Hash::from(COORDINATOR));
    tangle.add_solid_entry_point(Hash::from(hash));
    tangle
}

pub(crate) fn transaction(hash: &str, trunk: &str, branch: &str) -> Transaction {
    Transaction::builder()
        .hash(Hash::from(hash))
        .trunk(Hash::from(trunk))
        .branch(Hash::from(branch))
        .build()
        .unwrap()
}

/// A coordinator-issued single-transaction milestone bundle tail.
pub(crate) fn milestone_tail(hash: &str, trunk: &str, branch: &str, index: u32) -> Transaction {
    Transaction::builder()
        .hash(Hash::from(hash))
        .trunk(Hash::from(trunk))
        .branch(Hash::from(branch))
        .address(Hash::from(COORDINATOR))
        .bundle(Hash::from(hash))
        .is_tail(true)
        .tag(MilestoneIndex(index))
        .build()
        .unwrap()
}

pub(crate) fn publisher() -> (Publisher<TangleEvent>, Subscriber<TangleEvent>) {
    tokio::sync::broadcast::channel(100)
}

/// Drains every event already published to the subscriber.
pub(crate) fn try_events(subscriber: &mut Subscriber<TangleEvent>) -> Vec<TangleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = subscriber.try_recv() {
        events.push(event);
    }
    events
}
