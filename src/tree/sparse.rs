//! A sparse binary Merkle tree over `u64` positions.
use crate::{
  config::MAX_TREE_HEIGHT,
  digest::hash,
  errors::ShroudError,
  field::Word,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Roots of empty subtrees; `ZEROS[0]` is the empty leaf.
static ZEROS: Lazy<Vec<Word>> = Lazy::new(|| {
  let mut zeros = vec![Word::ZERO];
  for level in 0..MAX_TREE_HEIGHT {
    let z = zeros[level];
    zeros.push(node_hash(&z, &z));
  }
  zeros
});

/// Hash of an inner node.
pub fn node_hash(left: &Word, right: &Word) -> Word {
  hash(&[*left, *right])
}

/// Root reached from `leaf` at `position` via the bottom-up sibling `path`.
pub fn root_from_path(leaf: Word, position: u64, path: &[Word]) -> Word {
  path.iter().enumerate().fold(leaf, |cur, (level, sibling)| {
    if (position >> level) & 1 == 0 {
      node_hash(&cur, sibling)
    } else {
      node_hash(sibling, &cur)
    }
  })
}

/// Sparse Merkle tree storing only non-empty leaves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseMerkleTree {
  height: usize,
  leaves: BTreeMap<u64, Word>,
}

impl SparseMerkleTree {
  /// An empty tree of `height` levels.
  pub fn new(height: usize) -> Result<Self, ShroudError> {
    if height == 0 || height > MAX_TREE_HEIGHT {
      return Err(ShroudError::InvalidConfig {
        reason: format!("tree height {height} outside 1..={MAX_TREE_HEIGHT}"),
      });
    }
    Ok(SparseMerkleTree {
      height,
      leaves: BTreeMap::new(),
    })
  }

  /// Number of levels.
  pub fn height(&self) -> usize {
    self.height
  }

  /// Number of addressable leaves.
  pub fn capacity(&self) -> u64 {
    1u64 << self.height
  }

  /// Number of stored leaves.
  pub fn len(&self) -> usize {
    self.leaves.len()
  }

  /// Whether no leaf is stored.
  pub fn is_empty(&self) -> bool {
    self.leaves.is_empty()
  }

  /// Leaf at `position`, if one was stored.
  pub fn get(&self, position: u64) -> Option<&Word> {
    self.leaves.get(&position)
  }

  fn check(&self, position: u64) -> Result<(), ShroudError> {
    if position >= self.capacity() {
      return Err(ShroudError::WitnessUnavailable {
        reason: format!("position {position} outside a tree of height {}", self.height),
      });
    }
    Ok(())
  }

  /// Stores `leaf` at `position`.
  pub fn set(&mut self, position: u64, leaf: Word) -> Result<(), ShroudError> {
    self.check(position)?;
    self.leaves.insert(position, leaf);
    Ok(())
  }

  fn node(&self, level: usize, index: u64) -> Word {
    let start = index << level;
    let end = start + (1u64 << level);
    if self.leaves.range(start..end).next().is_none() {
      return ZEROS[level];
    }
    if level == 0 {
      return self.leaves.get(&start).copied().unwrap_or(Word::ZERO);
    }
    node_hash(
      &self.node(level - 1, index << 1),
      &self.node(level - 1, (index << 1) | 1),
    )
  }

  /// Current root.
  pub fn root(&self) -> Word {
    self.node(self.height, 0)
  }

  /// Bottom-up sibling path of `position`.
  pub fn path(&self, position: u64) -> Result<Vec<Word>, ShroudError> {
    self.check(position)?;
    Ok(
      (0..self.height)
        .map(|level| self.node(level, (position >> level) ^ 1))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_root_is_zero_table() {
    let tree = SparseMerkleTree::new(4).unwrap();
    assert_eq!(tree.root(), ZEROS[4]);
    assert!(tree.is_empty());
  }

  #[test]
  fn test_path_recomputes_root() {
    let mut tree = SparseMerkleTree::new(5).unwrap();
    for (pos, v) in [(0u64, 7u64), (3, 9), (17, 2), (31, 4)] {
      tree.set(pos, Word::from_u64(v)).unwrap();
    }
    let root = tree.root();
    for pos in [0u64, 3, 17, 31, 12] {
      let leaf = tree.get(pos).copied().unwrap_or(Word::ZERO);
      let path = tree.path(pos).unwrap();
      assert_eq!(path.len(), 5);
      assert_eq!(root_from_path(leaf, pos, &path), root);
    }
  }

  #[test]
  fn test_sibling_path_is_unchanged_by_own_leaf() {
    let mut tree = SparseMerkleTree::new(6).unwrap();
    tree.set(9, Word::from_u64(1)).unwrap();
    let before = tree.path(20).unwrap();
    tree.set(20, Word::from_u64(5)).unwrap();
    assert_eq!(tree.path(20).unwrap(), before);
    assert_eq!(root_from_path(Word::from_u64(5), 20, &before), tree.root());
  }

  #[test]
  fn test_rejects_out_of_range_positions() {
    let mut tree = SparseMerkleTree::new(3).unwrap();
    assert!(tree.set(8, Word::from_u64(1)).is_err());
    assert!(tree.path(8).is_err());
    assert!(SparseMerkleTree::new(49).is_err());
  }
}
