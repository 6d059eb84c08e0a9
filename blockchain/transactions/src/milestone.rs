// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::Hash;

/// Monotonic index assigned to a milestone by the coordinator.
/// Index 0 is reserved and never carried by a valid milestone.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MilestoneIndex(pub u32);

impl fmt::Display for MilestoneIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u32> for MilestoneIndex {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self(self.0 + rhs)
    }
}

/// A checkpoint emitted by the coordinator: a validated bundle whose tail
/// transaction is the entry point for traversing the milestone's past cone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Milestone {
    index: MilestoneIndex,
    tail: Hash,
}

impl Milestone {
    pub fn new(index: MilestoneIndex, tail: Hash) -> Self {
        Self { index, tail }
    }

    pub fn index(&self) -> MilestoneIndex {
        self.index
    }

    /// Hash of the tail transaction of the milestone bundle.
    pub fn tail(&self) -> &Hash {
        &self.tail
    }
}
