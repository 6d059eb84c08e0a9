// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::MilestoneIndex;

/// Length in trytes of a 243-trit hash.
pub const HASH_LENGTH: usize = 81;

/// Tryte-encoded hash. Used for transaction hashes, bundle hashes and
/// addresses alike; a canonical value is [`HASH_LENGTH`] trytes long.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(String);

impl Hash {
    pub fn new(trytes: impl Into<String>) -> Self {
        Self(trytes.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Hash {
    fn from(trytes: &str) -> Self {
        Self(trytes.to_owned())
    }
}

impl From<String> for Hash {
    fn from(trytes: String) -> Self {
        Self(trytes)
    }
}

/// A transaction in the tangle. Every transaction approves two others, its
/// trunk and its branch.
///
/// Usage of the builder:
/// ```
/// use transactions::{Hash, Transaction};
///
/// let tx = Transaction::builder()
///     .hash(Hash::from("A"))
///     .trunk(Hash::from("B"))
///     .branch(Hash::from("C"))
///     .is_tail(true) // optional
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Builder)]
#[builder(name = "TransactionBuilder")]
pub struct Transaction {
    /// Hash of this transaction.
    hash: Hash,

    /// Hash of the trunk transaction, the first approvee.
    trunk: Hash,

    /// Hash of the branch transaction, the second approvee.
    branch: Hash,

    /// Address this transaction operates on. Milestone bundles are issued
    /// from the coordinator address.
    #[builder(default)]
    address: Hash,

    /// Hash of the bundle this transaction belongs to.
    #[builder(default)]
    bundle: Hash,

    /// Whether this transaction is the tail (index zero) of its bundle.
    #[builder(default)]
    is_tail: bool,

    /// Bundle tag. Coordinator bundles encode the milestone index here.
    #[builder(default)]
    tag: MilestoneIndex,

    /// Solidity flag. Set at most once, never cleared.
    #[builder(default, setter(skip))]
    solid: AtomicBool,
}

impl Transaction {
    /// Generates a [`Transaction`] builder as a constructor.
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::default()
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn trunk(&self) -> &Hash {
        &self.trunk
    }

    pub fn branch(&self) -> &Hash {
        &self.branch
    }

    pub fn address(&self) -> &Hash {
        &self.address
    }

    pub fn bundle(&self) -> &Hash {
        &self.bundle
    }

    pub fn is_tail(&self) -> bool {
        self.is_tail
    }

    pub fn tag(&self) -> MilestoneIndex {
        self.tag
    }

    /// The hashes this transaction approves: trunk first, then the branch if
    /// it differs from the trunk.
    pub fn approvees(&self) -> Vec<&Hash> {
        if self.trunk == self.branch {
            vec![&self.trunk]
        } else {
            vec![&self.trunk, &self.branch]
        }
    }

    /// Whether all ancestors of this transaction are known and solid.
    /// Readable without locking; the flag only ever transitions false to true.
    pub fn is_solid(&self) -> bool {
        self.solid.load(Ordering::Acquire)
    }

    /// Marks this transaction solid. The transition is irreversible.
    pub fn set_solid(&self) {
        self.solid.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let tx = Transaction::builder()
            .hash(Hash::from("TX"))
            .trunk(Hash::from("TRUNK"))
            .branch(Hash::from("BRANCH"))
            .build()
            .unwrap();

        assert!(!tx.is_tail());
        assert!(!tx.is_solid());
        assert_eq!(tx.tag(), MilestoneIndex(0));
        assert_eq!(tx.bundle(), &Hash::default());
    }

    #[test]
    fn approvees_collapse_when_trunk_equals_branch() {
        let tx = Transaction::builder()
            .hash(Hash::from("TX"))
            .trunk(Hash::from("PARENT"))
            .branch(Hash::from("PARENT"))
            .build()
            .unwrap();

        assert_eq!(tx.approvees(), vec![&Hash::from("PARENT")]);
    }

    #[test]
    fn approvees_ordered_trunk_first() {
        let tx = Transaction::builder()
            .hash(Hash::from("TX"))
            .trunk(Hash::from("TRUNK"))
            .branch(Hash::from("BRANCH"))
            .build()
            .unwrap();

        assert_eq!(
            tx.approvees(),
            vec![&Hash::from("TRUNK"), &Hash::from("BRANCH")]
        );
    }

    #[test]
    fn solidity_is_sticky() {
        let tx = Transaction::builder()
            .hash(Hash::from("TX"))
            .trunk(Hash::from("TRUNK"))
            .branch(Hash::from("BRANCH"))
            .build()
            .unwrap();

        assert!(!tx.is_solid());
        tx.set_solid();
        assert!(tx.is_solid());
        tx.set_solid();
        assert!(tx.is_solid());
    }
}
