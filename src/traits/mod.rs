//! This module defines the services the runtime consumes. Callers plug in their
//! own store, tree services, prover and ledger; `crate::provider` has in-memory
//! versions of each.
use crate::{
  commitment::{Bucket, Commitment},
  errors::ShroudError,
  eval::Value,
  field::Word,
};
use serde::{Deserialize, Serialize};

pub mod ledger;

pub use ledger::{Ledger, LedgerSubmission, MembershipService, NullifierService};

/// What the owner of a commitment needs to spend it, besides their secret key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preimage {
  /// Bucket of the commitment
  pub bucket: Bucket,
  /// Committed value
  pub value: Word,
  /// Salt
  pub salt: Word,
}

impl Preimage {
  /// The preimage of `commitment`, without its owner.
  pub fn of(commitment: &Commitment) -> Self {
    Preimage {
      bucket: commitment.bucket(),
      value: commitment.value,
      salt: commitment.salt,
    }
  }
}

/// A preimage sealed for the owner of `commitment`, as published by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPreimage {
  /// Hash of the commitment the preimage opens
  pub commitment: Word,
  /// Opaque ciphertext
  pub ciphertext: Vec<u8>,
}

/// Encryption of preimages to the owners of new commitments.
pub trait PreimageCipher {
  /// Seals `preimage` for the holder of the secret key behind
  /// `owner_public_key`, using fresh `ephemeral` randomness.
  fn seal(
    &self,
    owner_public_key: &Word,
    ephemeral: &Word,
    preimage: &Preimage,
  ) -> Result<Vec<u8>, ShroudError>;

  /// Opens `ciphertext` with `secret_key`; `None` when it was not sealed for
  /// that key.
  fn open(&self, secret_key: &Word, ciphertext: &[u8]) -> Option<Preimage>;
}

/// Local persistence of commitment preimages.
pub trait CommitmentStore {
  /// Live (not nullified) commitments of `bucket`, in a stable order.
  fn get(&self, bucket: &Bucket) -> Result<Vec<Commitment>, ShroudError>;

  /// Stores a new commitment.
  fn put(&mut self, commitment: Commitment) -> Result<(), ShroudError>;

  /// Whether a commitment with hash `hash` is stored, spent or not.
  fn contains(&self, hash: &Word) -> Result<bool, ShroudError>;

  /// Marks the commitment with hash `hash` as spent. Fails if the commitment is
  /// unknown or already spent.
  fn mark_nullified(&mut self, hash: &Word) -> Result<(), ShroudError>;
}

/// An opaque proof for one function call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
  /// Function the proof is for
  pub function: String,
  /// Proof bytes
  pub bytes: Vec<u8>,
}

/// Produces proofs from ordered input vectors.
pub trait ProofService {
  /// Proves `function` on `inputs`, given in parameter order.
  fn prove(&self, function: &str, inputs: &[Value]) -> Result<Proof, ShroudError>;
}

/// What the ledger recorded for an accepted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
  /// Function executed
  pub function: String,
  /// Height of the block that included the transaction
  pub block: u64,
  /// Commitments appended, in order
  pub commitments: Vec<Word>,
  /// Nullifiers recorded, in order
  pub nullifiers: Vec<Word>,
  /// Preimages published for their owners, in order
  pub encrypted: Vec<EncryptedPreimage>,
}
