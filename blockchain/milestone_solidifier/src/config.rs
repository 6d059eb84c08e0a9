// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::Deserialize;

// 1000 TPS at a 2 min milestone interval.
const DEFAULT_MAX_MISSING_MILESTONE_SEARCH_DEPTH: usize = 120_000;

/// Struct that defines milestone solidifier configuration options
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SolidifierConfig {
    /// Maximum number of frontier expansions when searching the solid cone
    /// for milestones missing between the confirmed tip and a solid target.
    pub max_missing_milestone_search_depth: usize,
}

impl Default for SolidifierConfig {
    fn default() -> Self {
        Self {
            max_missing_milestone_search_depth: DEFAULT_MAX_MISSING_MILESTONE_SEARCH_DEPTH,
        }
    }
}
