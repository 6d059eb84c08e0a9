// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use transactions::Transaction;

/// Shared handle into the transaction cache.
///
/// Holding the handle keeps the underlying transaction alive even if the
/// store entry is pruned concurrently; dropping it releases the reference.
/// The handle may refer to a transaction that is not known locally, which
/// callers must check through [`CachedTransaction::exists`].
#[derive(Clone, Debug)]
pub struct CachedTransaction {
    inner: Option<Arc<Transaction>>,
}

impl CachedTransaction {
    pub(crate) fn new(inner: Option<Arc<Transaction>>) -> Self {
        Self { inner }
    }

    /// Whether the transaction is present in the local store.
    pub fn exists(&self) -> bool {
        self.inner.is_some()
    }

    /// The underlying transaction.
    ///
    /// # Panics
    /// Panics if the handle reports non-existence; check [`Self::exists`]
    /// first.
    pub fn transaction(&self) -> &Arc<Transaction> {
        self.inner
            .as_ref()
            .expect("attempted to read a transaction that does not exist locally")
    }
}
