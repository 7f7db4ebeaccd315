//! A transparent prover and its verifier.
//!
//! The prover checks every circuit constraint directly and then commits to the
//! public inputs; the verifier recomputes that commitment. Neither hides
//! anything, which is enough to drive the protocol end to end.
use crate::{
  assembler::{Program, Target},
  catalog::ir::Visibility,
  digest::{DigestComputer, SimpleDigestible},
  errors::ShroudError,
  eval::{Value, check_circuit},
  start_span,
  traits::{Proof, ProofService},
};
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use tracing::{debug, info_span};

#[derive(Serialize)]
struct Claim<'a> {
  function: &'a str,
  public_inputs: &'a [Value],
}

impl SimpleDigestible for Claim<'_> {}

fn claim_bytes(function: &str, public_inputs: &[Value]) -> Result<Vec<u8>, ShroudError> {
  let claim = Claim {
    function,
    public_inputs,
  };
  Ok(DigestComputer::new(&claim).digest()?.0.to_vec())
}

/// Checks constraints, then emits a digest of the public inputs.
#[derive(Clone, Debug)]
pub struct MockProver {
  program: Arc<Program>,
}

impl MockProver {
  /// A prover for the circuits of `program`.
  pub fn new(program: Arc<Program>) -> Self {
    MockProver { program }
  }
}

impl ProofService for MockProver {
  fn prove(&self, function: &str, inputs: &[Value]) -> Result<Proof, ShroudError> {
    let (_span, t) = start_span!("prove", function = %function);
    let circuit = self.program.require(function, Target::Circuit)?;
    check_circuit(circuit, inputs)?;
    let public: Vec<Value> = circuit
      .params()
      .zip(inputs)
      .filter(|(p, _)| p.visibility == Visibility::Public)
      .map(|(_, v)| v.clone())
      .collect();
    let bytes = claim_bytes(function, &public)?;
    debug!(elapsed_ms = %t.elapsed().as_millis(), "prove");
    Ok(Proof {
      function: function.to_string(),
      bytes,
    })
  }
}

/// Accepts proofs made by [`MockProver`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MockVerifier;

impl MockVerifier {
  /// Whether `proof` attests `function` on `public_inputs`.
  pub fn verify(
    &self,
    function: &str,
    public_inputs: &[Value],
    proof: &Proof,
  ) -> Result<bool, ShroudError> {
    Ok(proof.function == function && proof.bytes == claim_bytes(function, public_inputs)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    catalog::ir::Param,
    config::Config,
    field::Word,
    indicator::{FunctionIndicators, Indicator},
  };

  #[test]
  fn test_prover_rejects_inconsistent_inputs() {
    let f = FunctionIndicators::new(
      "mint",
      vec![Param::private("amount")],
      vec![Indicator::partitioned("supply", Word::from_u64(5)).increment("amount")],
    );
    let config = Config {
      commitment_tree_height: 4,
      nullifier_tree_height: 4,
      ..Config::default()
    };
    let program = Arc::new(Program::synthesize(&[f], &config).unwrap());
    let prover = MockProver::new(program);

    // amount, owner, salt, commitment
    let good = vec![
      Value::from(7u64),
      Value::from(1u64),
      Value::from(2u64),
      Value::from(crate::commitment::commitment_hash(
        &Word::from_u64(5),
        &Word::from_u64(7),
        &Word::from_u64(1),
        &Word::from_u64(2),
      )),
    ];
    let proof = prover.prove("mint", &good).unwrap();
    assert!(MockVerifier.verify("mint", &good[3..], &proof).unwrap());
    assert!(!MockVerifier.verify("mint", &good[..1], &proof).unwrap());

    let mut bad = good.clone();
    bad[0] = Value::from(8u64);
    assert!(matches!(
      prover.prove("mint", &bad),
      Err(ShroudError::AssertionViolation { .. })
    ));
  }
}
