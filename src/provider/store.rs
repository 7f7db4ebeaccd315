//! In-memory commitment store.
use crate::{
  commitment::{Bucket, Commitment},
  errors::ShroudError,
  field::Word,
  traits::CommitmentStore,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Commitments keyed by hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
  commitments: BTreeMap<Word, Commitment>,
}

impl MemoryStore {
  /// An empty store.
  pub fn new() -> Self {
    MemoryStore::default()
  }

  /// Looks up a commitment by hash, spent or not.
  pub fn find(&self, hash: &Word) -> Option<&Commitment> {
    self.commitments.get(hash)
  }

  /// Every stored commitment.
  pub fn all(&self) -> impl Iterator<Item = &Commitment> {
    self.commitments.values()
  }

  /// Number of stored commitments.
  pub fn len(&self) -> usize {
    self.commitments.len()
  }

  /// Whether nothing is stored.
  pub fn is_empty(&self) -> bool {
    self.commitments.is_empty()
  }
}

impl CommitmentStore for MemoryStore {
  fn get(&self, bucket: &Bucket) -> Result<Vec<Commitment>, ShroudError> {
    Ok(
      self
        .commitments
        .values()
        .filter(|c| !c.is_nullified && c.bucket() == *bucket)
        .cloned()
        .collect(),
    )
  }

  fn put(&mut self, commitment: Commitment) -> Result<(), ShroudError> {
    if !commitment.is_consistent() {
      return Err(ShroudError::StoreError {
        reason: format!("commitment {} does not match its preimage", commitment.hash),
      });
    }
    if self.commitments.contains_key(&commitment.hash) {
      return Err(ShroudError::StoreError {
        reason: format!("commitment {} already stored", commitment.hash),
      });
    }
    self.commitments.insert(commitment.hash, commitment);
    Ok(())
  }

  fn contains(&self, hash: &Word) -> Result<bool, ShroudError> {
    Ok(self.commitments.contains_key(hash))
  }

  fn mark_nullified(&mut self, hash: &Word) -> Result<(), ShroudError> {
    match self.commitments.get_mut(hash) {
      None => Err(ShroudError::StoreError {
        reason: format!("commitment {hash} not stored"),
      }),
      Some(c) if c.is_nullified => Err(ShroudError::StoreError {
        reason: format!("commitment {hash} already nullified"),
      }),
      Some(c) => {
        c.is_nullified = true;
        Ok(())
      }
    }
  }
}
