// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;
use transactions::Hash;

/// Tangle store error
#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The referenced bundle has no transactions in the store.
    #[error("Bundle not found: {0}")]
    BundleNotFound(Hash),
    /// The bundle does not form a valid milestone, as described by the string
    /// parameter.
    #[error("Invalid milestone bundle: {0}")]
    InvalidMilestone(String),
}
