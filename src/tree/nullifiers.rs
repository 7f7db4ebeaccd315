//! Nullifier tree keyed by the low bits of each nullifier, and the overlay of
//! insertions that are pending confirmation.
use super::sparse::SparseMerkleTree;
use crate::{errors::ShroudError, field::Word};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sibling path proving a nullifier's key is empty under `root`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonMembershipWitness {
  /// Root the path resolves to with an empty leaf
  pub root: Word,
  /// Bottom-up sibling path
  pub path: Vec<Word>,
}

/// Sparse tree where nullifier `n` lives at position `low_bits(n, height)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierTree {
  tree: SparseMerkleTree,
}

impl NullifierTree {
  /// An empty tree of `height` levels.
  pub fn new(height: usize) -> Result<Self, ShroudError> {
    Ok(NullifierTree {
      tree: SparseMerkleTree::new(height)?,
    })
  }

  /// Position of `nullifier`.
  pub fn key(&self, nullifier: &Word) -> u64 {
    nullifier.low_bits(self.tree.height())
  }

  /// Whether `nullifier` has been inserted.
  pub fn contains(&self, nullifier: &Word) -> bool {
    self.tree.get(self.key(nullifier)) == Some(nullifier)
  }

  /// Number of nullifiers.
  pub fn len(&self) -> usize {
    self.tree.len()
  }

  /// Whether no nullifier has been inserted.
  pub fn is_empty(&self) -> bool {
    self.tree.is_empty()
  }

  /// Current root.
  pub fn root(&self) -> Word {
    self.tree.root()
  }

  /// Non-membership witness for `nullifier`.
  pub fn witness(&self, nullifier: &Word) -> Result<NonMembershipWitness, ShroudError> {
    let key = self.key(nullifier);
    if self.tree.get(key).is_some() {
      return Err(ShroudError::AssertionViolation {
        label: format!("nullifier {nullifier} already used"),
      });
    }
    Ok(NonMembershipWitness {
      root: self.tree.root(),
      path: self.tree.path(key)?,
    })
  }

  /// Inserts `nullifier`, returning the new root.
  pub fn insert(&mut self, nullifier: Word) -> Result<Word, ShroudError> {
    let key = self.key(&nullifier);
    if self.tree.get(key).is_some() {
      return Err(ShroudError::AssertionViolation {
        label: format!("nullifier {nullifier} already used"),
      });
    }
    self.tree.set(key, nullifier)?;
    Ok(self.tree.root())
  }
}

/// Insertions applied locally ahead of confirmation, in program order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierOverlay {
  pending: Vec<Word>,
}

impl NullifierOverlay {
  /// Pending nullifiers, oldest first.
  pub fn pending(&self) -> &[Word] {
    &self.pending
  }

  /// `confirmed` with every pending insertion applied.
  pub fn view(&self, confirmed: &NullifierTree) -> Result<NullifierTree, ShroudError> {
    let mut tree = confirmed.clone();
    for n in &self.pending {
      tree.insert(*n)?;
    }
    Ok(tree)
  }

  /// Non-membership witness against the speculative view.
  pub fn witness(
    &self,
    confirmed: &NullifierTree,
    nullifier: &Word,
  ) -> Result<NonMembershipWitness, ShroudError> {
    self.view(confirmed)?.witness(nullifier)
  }

  /// Records `nullifier` as pending, returning the speculative root.
  pub fn speculative_insert(
    &mut self,
    confirmed: &NullifierTree,
    nullifier: Word,
  ) -> Result<Word, ShroudError> {
    let root = self.view(confirmed)?.insert(nullifier)?;
    self.pending.push(nullifier);
    Ok(root)
  }

  /// Discards every pending insertion.
  pub fn rollback(&mut self) -> usize {
    let dropped = self.pending.len();
    if dropped > 0 {
      debug!(dropped, "nullifier overlay rolled back");
    }
    self.pending.clear();
    dropped
  }

  /// Drops pending insertions that `confirmed` now contains.
  pub fn settle(&mut self, confirmed: &NullifierTree) {
    self.pending.retain(|n| !confirmed.contains(n));
  }
}
