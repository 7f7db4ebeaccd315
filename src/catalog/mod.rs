//! The protocol step catalog.
//!
//! Every `(StepKind, Section)` pair maps to a pure function of the step
//! arguments. The dispatch below is a closed match with no fallback arm, so a
//! new step or section cannot be added without deciding what it emits.
use crate::{
  errors::ShroudError,
  field::Word,
  indicator::{Owner, Variant},
};
use core::fmt;
use serde::{Deserialize, Serialize};

pub mod ir;
mod steps;

pub use steps::{
  COMMITMENT_ROOT, LATEST_NULLIFIER_ROOT, NULLIFIER_ROOT, SlotVars, nullifier_root_at,
};

use ir::{BucketRef, Expr, Stmt};

/// Protocol steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepKind {
  /// `stateVarId = H(mappingId, mappingKey)`
  MappingKeyDerivation,
  /// `ownerPublicKey = H(ownerSecretKey)`
  PoKoSK,
  /// `nullifier = H(stateVarId, secretKey, salt)` plus nullifier tree bookkeeping
  Nullification,
  /// Recomputes the old commitment from its preimage
  OldCommitmentPreimage,
  /// Merkle membership of the old commitment
  OldCommitmentExistence,
  /// Computes and binds a new commitment
  NewCommitment,
  /// Input selection and the underflow check of one decrement block.
  ///
  /// The check is `old0 + old1 >= amount`, not a strict inequality: a zero
  /// change commitment is valid, and reconciliation may hand over an exact
  /// match paired with any other input.
  Decrementation,
}

impl StepKind {
  /// Whether the step applies to a whole decrement block rather than one slot.
  pub fn is_block(&self) -> bool {
    matches!(self, StepKind::Decrementation)
  }
}

impl fmt::Display for StepKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{self:?}")
  }
}

/// Fragment sections of a synthesized function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
  /// Library imports
  ImportStatements,
  /// Parameter declarations
  Parameters,
  /// Statements before the function body
  PreStatements,
  /// Statements after the function body
  PostStatements,
  /// Statements inside the function body
  Statements,
}

impl Section {
  /// The sections every slot step is asked for, in emission order.
  pub const FRAGMENTS: [Section; 4] = [
    Section::ImportStatements,
    Section::Parameters,
    Section::PreStatements,
    Section::PostStatements,
  ];
}

impl fmt::Display for Section {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{self:?}")
  }
}

/// How the value of a new commitment is obtained.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NewValue {
  /// The variable's in-scope value (whole variables)
  Current,
  /// The named amount (increments and split outputs)
  Amount(String),
  /// Sum of the input slots' old values, less an optional amount
  Remainder {
    /// Input slots whose values are summed
    inputs: Vec<String>,
    /// Amount subtracted from the sum
    amount: Option<String>,
  },
}

/// Position of a nullification in the function's chain of nullifier roots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierChain {
  /// Number of inserting nullifications before this one
  pub position: usize,
  /// Number of inserting nullifications in the function
  pub total: usize,
}

/// Arguments of a decrement block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecrementArgs {
  /// Input slots
  pub inputs: Vec<String>,
  /// Name of the amount removed
  pub amount: String,
  /// Whether inputs are selected at run time, rather than supplied by the caller
  pub reconcile: bool,
}

/// Arguments of a protocol request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepArgs {
  /// Allocated slot name
  pub name: String,
  /// Variable base name
  pub state: String,
  /// Declared identifier
  pub state_var_id: Word,
  /// Whole or partitioned
  pub variant: Variant,
  /// In-scope mapping key, for mappings
  pub mapping_key: Option<String>,
  /// The nullifier is published and inserted (false for read-only access)
  pub nullifies: bool,
  /// A missing commitment may be replaced by the zero dummy
  pub dummy: bool,
  /// Owner of a new commitment
  pub owner: Owner,
  /// Value of a new commitment
  pub new_value: NewValue,
  /// Nullifier root chaining
  pub chain: NullifierChain,
  /// Present for decrement blocks
  pub block: Option<DecrementArgs>,
  /// Commitment tree height
  pub commitment_tree_height: usize,
  /// Nullifier tree height
  pub nullifier_tree_height: usize,
}

impl StepArgs {
  /// Expression for the effective state variable id inside the slot.
  pub fn state_var_id_expr(&self) -> Expr {
    match &self.mapping_key {
      Some(_) => Expr::var(SlotVars::new(&self.name).state_var_id()),
      None => Expr::Const(self.state_var_id),
    }
  }

  /// The bucket, in terms of function inputs only.
  pub fn bucket(&self) -> BucketRef {
    let state_var_id = match &self.mapping_key {
      Some(key) => Expr::Hash(vec![Expr::Const(self.state_var_id), Expr::var(key)]),
      None => Expr::Const(self.state_var_id),
    };
    BucketRef {
      state_var_id,
      mapping_key: self.mapping_key.clone(),
    }
  }
}

/// Name of the built-in that merges two commitments of `state`.
pub fn join_function(state: &str) -> String {
  format!("join_{state}")
}

/// Name of the built-in that splits one commitment of `state`.
pub fn split_function(state: &str) -> String {
  format!("split_{state}")
}

/// One request to the catalog.
#[derive(Clone, Copy, Debug)]
pub struct ProtocolRequest<'a> {
  /// Step
  pub step: StepKind,
  /// Section
  pub section: Section,
  /// Arguments
  pub args: &'a StepArgs,
}

fn unknown(step: StepKind, section: Section) -> ShroudError {
  ShroudError::UnknownProtocolStep {
    step: step.to_string(),
    section: section.to_string(),
  }
}

/// Produces the statements of one step for one section.
pub fn synthesize(request: &ProtocolRequest<'_>) -> Result<Vec<Stmt>, ShroudError> {
  use Section::*;
  use StepKind::*;
  let a = request.args;
  match (request.step, request.section) {
    (MappingKeyDerivation, ImportStatements) => Ok(steps::mapping_imports()),
    (MappingKeyDerivation, Parameters) => Ok(vec![]),
    (MappingKeyDerivation, PreStatements) => steps::mapping_pre(a),
    (MappingKeyDerivation, PostStatements) => Ok(vec![]),
    (MappingKeyDerivation, Statements) => Err(unknown(MappingKeyDerivation, Statements)),

    (PoKoSK, ImportStatements) => Ok(steps::pokosk_imports()),
    (PoKoSK, Parameters) => Ok(steps::pokosk_params(a)),
    (PoKoSK, PreStatements) => Ok(steps::pokosk_pre(a)),
    (PoKoSK, PostStatements) => Ok(vec![]),
    (PoKoSK, Statements) => Err(unknown(PoKoSK, Statements)),

    (Nullification, ImportStatements) => Ok(steps::nullification_imports()),
    (Nullification, Parameters) => Ok(steps::nullification_params(a)),
    (Nullification, PreStatements) => Ok(steps::nullification_pre(a)),
    (Nullification, PostStatements) => Ok(steps::nullification_post(a)),
    (Nullification, Statements) => Err(unknown(Nullification, Statements)),

    (OldCommitmentPreimage, ImportStatements) => Ok(steps::preimage_imports()),
    (OldCommitmentPreimage, Parameters) => Ok(steps::preimage_params(a)),
    (OldCommitmentPreimage, PreStatements) => Ok(steps::preimage_pre(a)),
    (OldCommitmentPreimage, PostStatements) => Ok(vec![]),
    (OldCommitmentPreimage, Statements) => Err(unknown(OldCommitmentPreimage, Statements)),

    (OldCommitmentExistence, ImportStatements) => Ok(steps::existence_imports()),
    (OldCommitmentExistence, Parameters) => Ok(steps::existence_params(a)),
    (OldCommitmentExistence, PreStatements) => Ok(steps::existence_pre(a)),
    (OldCommitmentExistence, PostStatements) => Ok(vec![]),
    (OldCommitmentExistence, Statements) => Err(unknown(OldCommitmentExistence, Statements)),

    (NewCommitment, ImportStatements) => Ok(steps::new_commitment_imports()),
    (NewCommitment, Parameters) => Ok(steps::new_commitment_params(a)),
    (NewCommitment, PreStatements) => Ok(vec![]),
    (NewCommitment, PostStatements) => Ok(steps::new_commitment_post(a)),
    (NewCommitment, Statements) => Err(unknown(NewCommitment, Statements)),

    (Decrementation, ImportStatements) => Ok(steps::decrementation_imports()),
    (Decrementation, Parameters) => Ok(vec![]),
    (Decrementation, PreStatements) => steps::decrementation_pre(a),
    (Decrementation, PostStatements) => Ok(vec![]),
    (Decrementation, Statements) => steps::decrementation_statements(a),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args() -> StepArgs {
    StepArgs {
      name: "a".to_string(),
      state: "a".to_string(),
      state_var_id: Word::from_u64(4),
      variant: Variant::Whole,
      mapping_key: None,
      nullifies: true,
      dummy: false,
      owner: Owner::Caller,
      new_value: NewValue::Current,
      chain: NullifierChain {
        position: 0,
        total: 1,
      },
      block: None,
      commitment_tree_height: 8,
      nullifier_tree_height: 8,
    }
  }

  #[test]
  fn test_slot_steps_have_no_inline_statements() {
    let args = args();
    for step in [
      StepKind::MappingKeyDerivation,
      StepKind::PoKoSK,
      StepKind::Nullification,
      StepKind::OldCommitmentPreimage,
      StepKind::OldCommitmentExistence,
      StepKind::NewCommitment,
    ] {
      let request = ProtocolRequest {
        step,
        section: Section::Statements,
        args: &args,
      };
      assert!(matches!(
        synthesize(&request),
        Err(ShroudError::UnknownProtocolStep { .. })
      ));
    }
  }

  #[test]
  fn test_mapping_step_needs_a_key() {
    let args = args();
    let request = ProtocolRequest {
      step: StepKind::MappingKeyDerivation,
      section: Section::PreStatements,
      args: &args,
    };
    assert!(matches!(
      synthesize(&request),
      Err(ShroudError::InvalidIndicator { .. })
    ));
  }

  #[test]
  fn test_synthesis_is_pure() {
    let args = args();
    for section in Section::FRAGMENTS {
      let request = ProtocolRequest {
        step: StepKind::Nullification,
        section,
        args: &args,
      };
      assert_eq!(synthesize(&request).unwrap(), synthesize(&request).unwrap());
    }
  }
}
