//! Ledger-side services: tree witnesses and transaction submission.
use super::{EncryptedPreimage, Proof, Receipt};
use crate::{
  errors::ShroudError,
  eval::Value,
  field::Word,
  tree::{MembershipWitness, NonMembershipWitness},
};

/// Membership witnesses against the commitment tree.
pub trait MembershipService {
  /// Position and sibling path of `commitment` under the current root.
  fn membership_witness(&self, commitment: &Word) -> Result<MembershipWitness, ShroudError>;

  /// Current commitment tree root.
  fn commitment_root(&self) -> Word;
}

/// Non-membership witnesses against the nullifier tree, with a local overlay of
/// insertions that are not yet confirmed.
pub trait NullifierService {
  /// Witness that `nullifier` is absent, taken against the confirmed tree with
  /// every pending insertion applied.
  fn non_membership_witness(&self, nullifier: &Word)
  -> Result<NonMembershipWitness, ShroudError>;

  /// Records `nullifier` as pending and returns the resulting speculative root.
  fn speculative_insert(&mut self, nullifier: Word) -> Result<Word, ShroudError>;

  /// Confirmed nullifier tree root.
  fn nullifier_root(&self) -> Word;

  /// Discards every pending insertion, returning how many were dropped.
  fn rollback(&mut self) -> usize;
}

/// Submission of proven transactions.
pub trait LedgerSubmission {
  /// Submits a call of `function` together with the sealed preimages its
  /// contract publishes. On success the ledger state is durable and the call's
  /// pending nullifiers are confirmed.
  fn submit(
    &mut self,
    function: &str,
    public_inputs: &[Value],
    proof: &Proof,
    encrypted: &[EncryptedPreimage],
  ) -> Result<Receipt, ShroudError>;

  /// Preimages published in blocks after `block`, with their block heights.
  fn encrypted_since(&self, block: u64) -> Vec<(u64, EncryptedPreimage)>;
}

/// Everything the runtime needs from the ledger side.
pub trait Ledger: MembershipService + NullifierService + LedgerSubmission {}

impl<T: MembershipService + NullifierService + LedgerSubmission> Ledger for T {}
