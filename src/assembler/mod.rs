//! Target assemblers.
//!
//! All three targets walk the same [`FunctionPlan`] and ask the catalog for the
//! same sections; they differ in which statements they keep and in what they
//! append once the walk is done. Output for a given plan is deterministic.
use crate::{
  catalog::{
    self, ProtocolRequest, Section,
    ir::{Import, LedgerOp, Param, Stmt, Visibility},
  },
  config::Config,
  digest::{DigestComputer, SimpleDigestible},
  errors::ShroudError,
  field::Word,
  indicator::{FunctionIndicators, Indicator, Variant},
  slots::{self, FunctionPlan},
  start_span,
};
use core::fmt;
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Instant};
use tracing::{debug, info, info_span};

pub mod render;

/// Output targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
  /// Zero-knowledge circuit
  Circuit,
  /// On-ledger verifier contract
  Contract,
  /// Off-chain orchestration program
  Orchestration,
}

impl Target {
  /// Every target.
  pub const ALL: [Target; 3] = [Target::Circuit, Target::Contract, Target::Orchestration];
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Target::Circuit => write!(f, "circuit"),
      Target::Contract => write!(f, "contract"),
      Target::Orchestration => write!(f, "orchestration"),
    }
  }
}

/// The fragment lists of one function for one target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFragments {
  /// Function name
  pub function: String,
  /// Target
  pub target: Target,
  /// Import statements
  pub imports: Vec<Stmt>,
  /// Parameter declarations, in input-vector order
  pub parameters: Vec<Stmt>,
  /// Statements before the body
  pub pre: Vec<Stmt>,
  /// Statements of the body
  pub inline: Vec<Stmt>,
  /// Statements after the body
  pub post: Vec<Stmt>,
}

impl SimpleDigestible for FunctionFragments {}

impl FunctionFragments {
  /// Declared parameters, in order.
  pub fn params(&self) -> impl Iterator<Item = &Param> {
    self.parameters.iter().filter_map(|s| match s {
      Stmt::Param(p) => Some(p),
      _ => None,
    })
  }

  /// Public parameters, in order.
  pub fn public_params(&self) -> impl Iterator<Item = &Param> {
    self.params().filter(|p| p.visibility == Visibility::Public)
  }

  /// Executable statements: pre, then body, then post.
  pub fn statements(&self) -> impl Iterator<Item = &Stmt> {
    self.pre.iter().chain(&self.inline).chain(&self.post)
  }

  /// SHA3-256 digest of the fragments.
  pub fn digest(&self) -> Result<Word, ShroudError> {
    DigestComputer::new(self).digest()
  }
}

/// Per-target behavior of an assembler.
pub trait TargetAssembler: Sync {
  /// Target produced
  fn target(&self) -> Target;

  /// Whether the target keeps `stmt`.
  fn admits(&self, stmt: &Stmt) -> bool;

  /// Appends target-specific statements after the walk.
  fn finish(&self, _fragments: &mut FunctionFragments) {}
}

/// Assembles circuits: parameters, bindings and assertions.
#[derive(Clone, Copy, Debug, Default)]
pub struct CircuitAssembler;

/// Assembles verifier contracts: public parameters and ledger operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContractAssembler;

/// Assembles orchestration programs: everything needed to build the inputs.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrchestrationAssembler;

impl TargetAssembler for CircuitAssembler {
  fn target(&self) -> Target {
    Target::Circuit
  }

  fn admits(&self, stmt: &Stmt) -> bool {
    match stmt {
      Stmt::Import(i) => matches!(
        i,
        Import::Hash | Import::CommitmentTree | Import::NullifierTree
      ),
      Stmt::Param(_)
      | Stmt::Let { .. }
      | Stmt::Reassign { .. }
      | Stmt::Assert { .. }
      | Stmt::Constrain { .. } => true,
      Stmt::Fetch { .. } | Stmt::Reconcile { .. } | Stmt::Ledger(_) | Stmt::Persist(_) => false,
    }
  }
}

impl TargetAssembler for ContractAssembler {
  fn target(&self) -> Target {
    Target::Contract
  }

  fn admits(&self, stmt: &Stmt) -> bool {
    match stmt {
      Stmt::Import(i) => matches!(
        i,
        Import::CommitmentTree | Import::NullifierTree | Import::Verifier
      ),
      Stmt::Param(p) => p.visibility == Visibility::Public,
      Stmt::Ledger(_) => true,
      Stmt::Let { .. }
      | Stmt::Reassign { .. }
      | Stmt::Assert { .. }
      | Stmt::Constrain { .. }
      | Stmt::Fetch { .. }
      | Stmt::Reconcile { .. }
      | Stmt::Persist(_) => false,
    }
  }

  fn finish(&self, fragments: &mut FunctionFragments) {
    fragments.imports.push(Stmt::Import(Import::Verifier));
    let inputs = fragments.public_params().map(|p| p.name.clone()).collect();
    fragments
      .pre
      .push(Stmt::Ledger(LedgerOp::VerifyProof { inputs }));
  }
}

impl TargetAssembler for OrchestrationAssembler {
  fn target(&self) -> Target {
    Target::Orchestration
  }

  fn admits(&self, stmt: &Stmt) -> bool {
    match stmt {
      Stmt::Import(i) => !matches!(i, Import::Verifier),
      Stmt::Ledger(_) => false,
      Stmt::Param(_)
      | Stmt::Let { .. }
      | Stmt::Reassign { .. }
      | Stmt::Assert { .. }
      | Stmt::Constrain { .. }
      | Stmt::Fetch { .. }
      | Stmt::Reconcile { .. }
      | Stmt::Persist(_) => true,
    }
  }

  fn finish(&self, fragments: &mut FunctionFragments) {
    fragments.imports.push(Stmt::Import(Import::Prover));
  }
}

fn collect_section<A: TargetAssembler + ?Sized>(
  assembler: &A,
  plan: &FunctionPlan,
  section: Section,
) -> Result<Vec<Stmt>, ShroudError> {
  let mut out = vec![];
  if section == Section::Parameters {
    out.extend(plan.inputs.iter().cloned().map(Stmt::Param));
  }
  for inv in &plan.invocations {
    if section == Section::Statements && !inv.step.is_block() {
      continue;
    }
    out.extend(catalog::synthesize(&ProtocolRequest {
      step: inv.step,
      section,
      args: &inv.args,
    })?);
  }
  if section == Section::Statements {
    out.extend(plan.body.iter().cloned());
  }
  Ok(
    out
      .into_iter()
      .filter(|s| assembler.admits(s))
      .unique()
      .collect(),
  )
}

/// Assembles `plan` for one target.
pub fn assemble<A: TargetAssembler + ?Sized>(
  assembler: &A,
  plan: &FunctionPlan,
) -> Result<FunctionFragments, ShroudError> {
  let mut fragments = FunctionFragments {
    function: plan.name.clone(),
    target: assembler.target(),
    imports: collect_section(assembler, plan, Section::ImportStatements)?,
    parameters: collect_section(assembler, plan, Section::Parameters)?,
    pre: collect_section(assembler, plan, Section::PreStatements)?,
    inline: collect_section(assembler, plan, Section::Statements)?,
    post: collect_section(assembler, plan, Section::PostStatements)?,
  };
  assembler.finish(&mut fragments);
  debug!(
    function = %plan.name,
    target = %fragments.target,
    params = fragments.parameters.len(),
    statements = fragments.statements().count(),
    "assembled"
  );
  Ok(fragments)
}

/// Assembles `plan` for every target, the targets in parallel.
pub fn assemble_all(plan: &FunctionPlan) -> Result<Vec<FunctionFragments>, ShroudError> {
  let (circuit, (contract, orchestration)) = rayon::join(
    || assemble(&CircuitAssembler, plan),
    || {
      rayon::join(
        || assemble(&ContractAssembler, plan),
        || assemble(&OrchestrationAssembler, plan),
      )
    },
  );
  Ok(vec![circuit?, contract?, orchestration?])
}

/// Fragments of every function and built-in, keyed by `(function, target)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
  fragments: BTreeMap<(String, Target), FunctionFragments>,
}

impl SimpleDigestible for Program {}

impl Program {
  /// Synthesizes `functions` and the join/split built-ins of every
  /// decremented partitioned variable.
  pub fn synthesize(
    functions: &[FunctionIndicators],
    config: &Config,
  ) -> Result<Self, ShroudError> {
    let (_span, t) = start_span!("synthesize", functions = functions.len());
    config.validate()?;

    let mut builtins: BTreeMap<&str, &Indicator> = BTreeMap::new();
    for f in functions {
      for ind in &f.indicators {
        if ind.variant == Variant::Partitioned && !ind.decrements.is_empty() {
          builtins.entry(ind.name.as_str()).or_insert(ind);
        }
      }
    }

    let mut plans = functions
      .iter()
      .map(|f| slots::plan_function(f, config))
      .collect::<Result<Vec<_>, _>>()?;
    for ind in builtins.values() {
      plans.push(slots::plan_join(ind, config));
      plans.push(slots::plan_split(ind, config));
    }

    let assembled = plans
      .par_iter()
      .map(assemble_all)
      .collect::<Result<Vec<_>, _>>()?;

    let mut fragments = BTreeMap::new();
    for f in assembled.into_iter().flatten() {
      let key = (f.function.clone(), f.target);
      if fragments.insert(key, f).is_some() {
        return Err(ShroudError::InvalidIndicator {
          name: "program".to_string(),
          reason: "duplicate function name".to_string(),
        });
      }
    }
    info!(
      elapsed_ms = %t.elapsed().as_millis(),
      fragments = fragments.len(),
      "synthesize"
    );
    Ok(Program { fragments })
  }

  /// Fragments of `function` for `target`.
  pub fn get(&self, function: &str, target: Target) -> Option<&FunctionFragments> {
    self.fragments.get(&(function.to_string(), target))
  }

  /// Like [`Program::get`], failing with `UnknownFunction`.
  pub fn require(&self, function: &str, target: Target) -> Result<&FunctionFragments, ShroudError> {
    self
      .get(function, target)
      .ok_or_else(|| ShroudError::UnknownFunction {
        function: function.to_string(),
      })
  }

  /// Function names, each once, in order.
  pub fn functions(&self) -> Vec<&str> {
    self
      .fragments
      .keys()
      .map(|(f, _)| f.as_str())
      .dedup()
      .collect()
  }

  /// Every fragment set for `target`.
  pub fn for_target(&self, target: Target) -> impl Iterator<Item = &FunctionFragments> {
    self.fragments.values().filter(move |f| f.target == target)
  }

  /// SHA3-256 digest of the whole program.
  pub fn digest(&self) -> Result<Word, ShroudError> {
    DigestComputer::new(self).digest()
  }
}
