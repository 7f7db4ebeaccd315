//! An in-process ledger that runs the synthesized verifier contracts.
use super::prover::MockVerifier;
use crate::{
  assembler::{Program, Target},
  catalog::ir::{LedgerOp, Stmt},
  config::Config,
  errors::ShroudError,
  eval::{Env, Value, bind_params},
  field::Word,
  traits::{
    EncryptedPreimage, LedgerSubmission, MembershipService, NullifierService, Proof, Receipt,
  },
  tree::{
    CommitmentTree, MembershipWitness, NonMembershipWitness, NullifierOverlay, NullifierTree,
  },
};
use std::sync::Arc;
use tracing::{info, warn};

/// Commitment and nullifier trees plus the contracts that update them.
///
/// A submission is applied to copies of both trees and swapped in only when
/// every ledger operation of the contract succeeds, so a rejected call leaves
/// no trace.
#[derive(Clone, Debug)]
pub struct LocalChain {
  program: Arc<Program>,
  verifier: MockVerifier,
  commitments: CommitmentTree,
  nullifiers: NullifierTree,
  overlay: NullifierOverlay,
  published: Vec<(u64, EncryptedPreimage)>,
  block: u64,
  failures: usize,
}

impl LocalChain {
  /// An empty ledger running the contracts of `program`.
  pub fn new(program: Arc<Program>, config: &Config) -> Result<Self, ShroudError> {
    config.validate()?;
    Ok(LocalChain {
      program,
      verifier: MockVerifier,
      commitments: CommitmentTree::new(config.commitment_tree_height)?,
      nullifiers: NullifierTree::new(config.nullifier_tree_height)?,
      overlay: NullifierOverlay::default(),
      published: vec![],
      block: 0,
      failures: 0,
    })
  }

  /// Rejects the next `n` submissions, as a congested or reorganizing ledger
  /// would.
  pub fn fail_next(&mut self, n: usize) {
    self.failures = n;
  }

  /// Number of accepted transactions.
  pub fn height(&self) -> u64 {
    self.block
  }

  /// The confirmed commitment tree.
  pub fn commitments(&self) -> &CommitmentTree {
    &self.commitments
  }

  /// The confirmed nullifier tree.
  pub fn nullifiers(&self) -> &NullifierTree {
    &self.nullifiers
  }

  /// Nullifiers inserted locally but not yet confirmed.
  pub fn pending(&self) -> &[Word] {
    self.overlay.pending()
  }
}

struct Staged {
  commitments: CommitmentTree,
  nullifiers: NullifierTree,
  receipt: Receipt,
}

impl LocalChain {
  fn apply(
    &self,
    function: &str,
    op: &LedgerOp,
    env: &Env,
    proof: &Proof,
    encrypted: &[EncryptedPreimage],
    staged: &mut Staged,
  ) -> Result<(), ShroudError> {
    let reject = |reason: String| ShroudError::TransactionFailed {
      function: function.to_string(),
      reason,
    };
    match op {
      LedgerOp::VerifyProof { inputs } => {
        let values = inputs
          .iter()
          .map(|name| env.get(name).cloned())
          .collect::<Result<Vec<_>, _>>()?;
        if !self.verifier.verify(function, &values, proof)? {
          return Err(reject("proof does not verify".to_string()));
        }
      }
      LedgerOp::NullifierRootMatches { root } => {
        if env.word(root)? != staged.nullifiers.root() {
          return Err(reject(format!("{root} is not the stored nullifier root")));
        }
      }
      LedgerOp::NullifierUnused { nullifier } => {
        let n = env.word(nullifier)?;
        staged
          .nullifiers
          .insert(n)
          .map_err(|e| reject(e.to_string()))?;
        staged.receipt.nullifiers.push(n);
      }
      LedgerOp::AdvanceNullifierRoot { latest } => {
        if env.word(latest)? != staged.nullifiers.root() {
          return Err(reject(format!("{latest} does not match the updated tree")));
        }
      }
      LedgerOp::KnownCommitmentRoot { root } => {
        if !self.commitments.is_known_root(&env.word(root)?) {
          return Err(reject(format!("{root} is not a known commitment root")));
        }
      }
      LedgerOp::InsertCommitment { commitment } => {
        let c = env.word(commitment)?;
        staged
          .commitments
          .insert(c)
          .map_err(|e| reject(e.to_string()))?;
        staged.receipt.commitments.push(c);
      }
      LedgerOp::EmitEncrypted { commitment } => {
        let c = env.word(commitment)?;
        let sealed = encrypted
          .iter()
          .find(|e| e.commitment == c)
          .ok_or_else(|| reject(format!("no ciphertext for {commitment}")))?;
        staged.receipt.encrypted.push(sealed.clone());
      }
    }
    Ok(())
  }
}

impl MembershipService for LocalChain {
  fn membership_witness(&self, commitment: &Word) -> Result<MembershipWitness, ShroudError> {
    self.commitments.witness(commitment)
  }

  fn commitment_root(&self) -> Word {
    self.commitments.root()
  }
}

impl NullifierService for LocalChain {
  fn non_membership_witness(
    &self,
    nullifier: &Word,
  ) -> Result<NonMembershipWitness, ShroudError> {
    self.overlay.witness(&self.nullifiers, nullifier)
  }

  fn speculative_insert(&mut self, nullifier: Word) -> Result<Word, ShroudError> {
    self.overlay.speculative_insert(&self.nullifiers, nullifier)
  }

  fn nullifier_root(&self) -> Word {
    self.nullifiers.root()
  }

  fn rollback(&mut self) -> usize {
    self.overlay.rollback()
  }
}

impl LedgerSubmission for LocalChain {
  fn submit(
    &mut self,
    function: &str,
    public_inputs: &[Value],
    proof: &Proof,
    encrypted: &[EncryptedPreimage],
  ) -> Result<Receipt, ShroudError> {
    if self.failures > 0 {
      self.failures -= 1;
      warn!(function, remaining = self.failures, "submission rejected");
      return Err(ShroudError::TransactionFailed {
        function: function.to_string(),
        reason: "ledger unavailable".to_string(),
      });
    }
    let contract = self.program.require(function, Target::Contract)?;
    let env = bind_params(contract.params(), public_inputs)?;
    let mut staged = Staged {
      commitments: self.commitments.clone(),
      nullifiers: self.nullifiers.clone(),
      receipt: Receipt {
        function: function.to_string(),
        block: self.block + 1,
        commitments: vec![],
        nullifiers: vec![],
        encrypted: vec![],
      },
    };
    for stmt in contract.statements() {
      if let Stmt::Ledger(op) = stmt {
        self.apply(function, op, &env, proof, encrypted, &mut staged)?;
      }
    }
    if staged.receipt.encrypted.len() != encrypted.len() {
      return Err(ShroudError::TransactionFailed {
        function: function.to_string(),
        reason: format!(
          "{} ciphertexts supplied, contract publishes {}",
          encrypted.len(),
          staged.receipt.encrypted.len()
        ),
      });
    }

    self.commitments = staged.commitments;
    self.nullifiers = staged.nullifiers;
    self.block = staged.receipt.block;
    self.overlay.settle(&self.nullifiers);
    let block = self.block;
    self
      .published
      .extend(staged.receipt.encrypted.iter().map(|e| (block, e.clone())));
    info!(
      function,
      block = self.block,
      commitments = staged.receipt.commitments.len(),
      nullifiers = staged.receipt.nullifiers.len(),
      encrypted = staged.receipt.encrypted.len(),
      "transaction accepted"
    );
    Ok(staged.receipt)
  }

  fn encrypted_since(&self, block: u64) -> Vec<(u64, EncryptedPreimage)> {
    self
      .published
      .iter()
      .filter(|(b, _)| *b > block)
      .cloned()
      .collect()
  }
}
