//! Commitments, nullifiers and the identifiers they are bound to.
use crate::{digest::hash, field::Word};
use serde::{Deserialize, Serialize};

/// `ownerPublicKey = H(ownerSecretKey)`.
pub fn public_key(secret_key: &Word) -> Word {
  hash(&[*secret_key])
}

/// `stateVarId = H(mappingId, mappingKey)` for an entry of a mapping.
pub fn mapping_state_var_id(mapping_id: &Word, key: &Word) -> Word {
  hash(&[*mapping_id, *key])
}

/// `H(stateVarId, value, ownerPublicKey, salt)`.
pub fn commitment_hash(state_var_id: &Word, value: &Word, owner_public_key: &Word, salt: &Word) -> Word {
  hash(&[*state_var_id, *value, *owner_public_key, *salt])
}

/// `H(stateVarId, ownerSecretKey, salt)`.
pub fn nullifier_hash(state_var_id: &Word, secret_key: &Word, salt: &Word) -> Word {
  hash(&[*state_var_id, *secret_key, *salt])
}

/// The set of commitments that together represent one state variable (or one
/// entry of a mapping).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bucket {
  /// Effective identifier: the declared id, or `H(mappingId, key)` for mappings
  pub state_var_id: Word,
  /// The mapping key, when the variable is a mapping
  pub mapping_key: Option<Word>,
}

impl Bucket {
  /// Bucket of a plain state variable.
  pub fn plain(state_var_id: Word) -> Self {
    Bucket {
      state_var_id,
      mapping_key: None,
    }
  }

  /// Bucket of one mapping entry.
  pub fn mapping(mapping_id: Word, key: Word) -> Self {
    Bucket {
      state_var_id: mapping_state_var_id(&mapping_id, &key),
      mapping_key: Some(key),
    }
  }
}

/// A commitment preimage together with its hash and lifecycle flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
  /// Effective state variable identifier
  pub state_var_id: Word,
  /// The mapping key, when the variable is a mapping
  pub mapping_key: Option<Word>,
  /// Committed value
  pub value: Word,
  /// Blinding salt
  pub salt: Word,
  /// Public key of the owner
  pub owner_public_key: Word,
  /// `H(stateVarId, value, ownerPublicKey, salt)`
  pub hash: Word,
  /// Set exactly once, when the commitment is spent
  pub is_nullified: bool,
}

impl Commitment {
  /// Creates a live commitment, computing its hash.
  pub fn new(bucket: Bucket, value: Word, owner_public_key: Word, salt: Word) -> Self {
    Commitment {
      state_var_id: bucket.state_var_id,
      mapping_key: bucket.mapping_key,
      value,
      salt,
      owner_public_key,
      hash: commitment_hash(&bucket.state_var_id, &value, &owner_public_key, &salt),
      is_nullified: false,
    }
  }

  /// The bucket this commitment belongs to.
  pub fn bucket(&self) -> Bucket {
    Bucket {
      state_var_id: self.state_var_id,
      mapping_key: self.mapping_key,
    }
  }

  /// Whether the stored hash matches the preimage.
  pub fn is_consistent(&self) -> bool {
    self.hash == commitment_hash(&self.state_var_id, &self.value, &self.owner_public_key, &self.salt)
  }

  /// The nullifier that spends this commitment.
  pub fn nullifier(&self, secret_key: &Word) -> Nullifier {
    Nullifier {
      state_var_id: self.state_var_id,
      hash: nullifier_hash(&self.state_var_id, secret_key, &self.salt),
    }
  }
}

/// A one-time spend token for a commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nullifier {
  /// Effective state variable identifier
  pub state_var_id: Word,
  /// `H(stateVarId, ownerSecretKey, salt)`
  pub hash: Word,
}
