//! This module defines errors returned by the library.
use num_bigint::BigUint;
use thiserror::Error;

/// Errors returned by shroud
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ShroudError {
  /// returned when a protocol step is asked for a section it has no mapping for
  #[error("UnknownProtocolStep: {step} has no {section} fragment")]
  UnknownProtocolStep {
    /// The protocol step requested
    step: String,
    /// The section requested
    section: String,
  },
  /// returned when an indicator violates the classification invariants
  #[error("InvalidIndicator: {name}: {reason}")]
  InvalidIndicator {
    /// The state variable the indicator describes
    name: String,
    /// The violated invariant
    reason: String,
  },
  /// returned when a configuration value is out of range
  #[error("InvalidConfig: {reason}")]
  InvalidConfig {
    /// The reason the configuration was rejected
    reason: String,
  },
  /// returned when a protocol assertion does not hold for the supplied values
  #[error("AssertionViolation: {label}")]
  AssertionViolation {
    /// The label of the failing assertion
    label: String,
  },
  /// returned when reconciliation cannot reach the requested amount
  #[error(
    "InsufficientFunds: {state} needs {amount}, only {available} available ({reserved} held by earlier inputs of the same call)"
  )]
  InsufficientFunds {
    /// The partitioned state being decremented
    state: String,
    /// The amount requested
    amount: BigUint,
    /// The total of all usable commitments
    available: BigUint,
    /// The total of commitments of the same bucket already claimed by the call
    reserved: BigUint,
  },
  /// returned when a tree service or store cannot resolve a witness
  #[error("WitnessUnavailable: {reason}")]
  WitnessUnavailable {
    /// The reason the witness could not be produced
    reason: String,
  },
  /// returned when a submission is rejected by the ledger
  #[error("TransactionFailed: {function}: {reason}")]
  TransactionFailed {
    /// The function whose transaction was rejected
    function: String,
    /// The reason for rejection
    reason: String,
  },
  /// returned when the retry budget or step ceiling is spent
  #[error("RetriesExhausted after {attempts} attempts: {reason}")]
  RetriesExhausted {
    /// Number of attempts made
    attempts: usize,
    /// The last error observed
    reason: String,
  },
  /// returned when an expression references a name that is not in scope
  #[error("UnboundVariable: {name}")]
  UnboundVariable {
    /// The unbound name
    name: String,
  },
  /// returned when a value has the wrong shape for its use
  #[error("TypeMismatch: {name} expected {expected}")]
  TypeMismatch {
    /// The offending name or expression
    name: String,
    /// The expected type
    expected: String,
  },
  /// returned if the supplied input vector is not of the right length
  #[error("InvalidInputLength: expected {expected}, got {actual}")]
  InvalidInputLength {
    /// Number of declared parameters
    expected: usize,
    /// Number of supplied inputs
    actual: usize,
  },
  /// returned when a call names a function the program does not contain
  #[error("UnknownFunction: {function}")]
  UnknownFunction {
    /// The requested function
    function: String,
  },
  /// returned when the commitment store rejects an update
  #[error("StoreError: {reason}")]
  StoreError {
    /// The reason for the store error
    reason: String,
  },
  /// returned when a preimage cannot be sealed for its owner
  #[error("CipherError: {reason}")]
  CipherError {
    /// The reason sealing failed
    reason: String,
  },
  /// returned when there is an error creating a digest
  #[error("DigestError")]
  DigestError {
    /// The reason for the digest error
    reason: String,
  },
}

impl ShroudError {
  /// Whether a caller may retry the operation that produced this error.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ShroudError::WitnessUnavailable { .. } | ShroudError::TransactionFailed { .. }
    )
  }
}
