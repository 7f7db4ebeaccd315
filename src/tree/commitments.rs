//! Append-only commitment tree.
use super::sparse::SparseMerkleTree;
use crate::{errors::ShroudError, field::Word};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Position and sibling path of a commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipWitness {
  /// Leaf position
  pub index: u64,
  /// Bottom-up sibling path
  pub path: Vec<Word>,
}

/// Commitments in insertion order, with every root the tree has had.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentTree {
  tree: SparseMerkleTree,
  positions: BTreeMap<Word, u64>,
  roots: BTreeSet<Word>,
}

impl CommitmentTree {
  /// An empty tree of `height` levels.
  pub fn new(height: usize) -> Result<Self, ShroudError> {
    let tree = SparseMerkleTree::new(height)?;
    let roots = BTreeSet::from([tree.root()]);
    Ok(CommitmentTree {
      tree,
      positions: BTreeMap::new(),
      roots,
    })
  }

  /// Number of commitments.
  pub fn len(&self) -> usize {
    self.positions.len()
  }

  /// Whether the tree holds no commitment.
  pub fn is_empty(&self) -> bool {
    self.positions.is_empty()
  }

  /// Appends `commitment`, returning its position.
  pub fn insert(&mut self, commitment: Word) -> Result<u64, ShroudError> {
    if self.positions.contains_key(&commitment) {
      return Err(ShroudError::AssertionViolation {
        label: format!("commitment {commitment} already in tree"),
      });
    }
    let position = self.positions.len() as u64;
    self.tree.set(position, commitment)?;
    self.positions.insert(commitment, position);
    self.roots.insert(self.tree.root());
    Ok(position)
  }

  /// Current root.
  pub fn root(&self) -> Word {
    self.tree.root()
  }

  /// Whether `root` is the current or a past root.
  pub fn is_known_root(&self, root: &Word) -> bool {
    self.roots.contains(root)
  }

  /// Whether `commitment` has been appended.
  pub fn contains(&self, commitment: &Word) -> bool {
    self.positions.contains_key(commitment)
  }

  /// Membership witness of `commitment` against the current root.
  pub fn witness(&self, commitment: &Word) -> Result<MembershipWitness, ShroudError> {
    let index = *self
      .positions
      .get(commitment)
      .ok_or_else(|| ShroudError::WitnessUnavailable {
        reason: format!("commitment {commitment} not in tree"),
      })?;
    Ok(MembershipWitness {
      index,
      path: self.tree.path(index)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tree::sparse::root_from_path;

  #[test]
  fn test_witness_resolves_to_current_root() {
    let mut tree = CommitmentTree::new(8).unwrap();
    let first = tree.root();
    for v in 1..=5u64 {
      tree.insert(Word::from_u64(v * 11)).unwrap();
    }
    let w = tree.witness(&Word::from_u64(33)).unwrap();
    assert_eq!(w.index, 2);
    assert_eq!(root_from_path(Word::from_u64(33), w.index, &w.path), tree.root());
    assert!(tree.is_known_root(&first));
    assert!(tree.is_known_root(&tree.root()));
  }

  #[test]
  fn test_duplicates_and_unknowns_rejected() {
    let mut tree = CommitmentTree::new(4).unwrap();
    tree.insert(Word::from_u64(1)).unwrap();
    assert!(tree.insert(Word::from_u64(1)).is_err());
    assert!(matches!(
      tree.witness(&Word::from_u64(2)),
      Err(ShroudError::WitnessUnavailable { .. })
    ));
  }
}
