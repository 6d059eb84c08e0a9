// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use transactions::{Milestone, Transaction};

pub use tokio::sync::broadcast::{Receiver as Subscriber, Sender as Publisher};

/// Events published by the solidifier.
#[derive(Clone, Debug)]
pub enum TangleEvent {
    /// All ancestors of this transaction are known and solid.
    TransactionSolid(Arc<Transaction>),
    /// The solid milestone tip moved to this milestone.
    SolidMilestoneChanged(Milestone),
}
