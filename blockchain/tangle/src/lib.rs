// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod cached;
mod errors;
mod store;

pub use self::cached::CachedTransaction;
pub use self::errors::Error;
pub use self::store::Tangle;
