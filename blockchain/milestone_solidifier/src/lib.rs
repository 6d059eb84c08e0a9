// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod abort;
mod config;
mod events;
mod network_context;
mod propagation;
mod search;
mod solidifier;
mod solidify;
#[cfg(test)]
mod test_utils;

pub use self::config::SolidifierConfig;
pub use self::events::{Publisher, Subscriber, TangleEvent};
pub use self::network_context::{NetworkMessage, SyncNetworkContext};
pub use self::solidifier::MilestoneSolidifier;
