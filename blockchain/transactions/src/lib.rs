// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod milestone;
mod transaction;

pub use self::milestone::{Milestone, MilestoneIndex};
pub use self::transaction::{Hash, Transaction, TransactionBuilder, HASH_LENGTH};
