//! Slot allocation and per-function step planning.
//!
//! A partitioned variable's increments take indices `0..m` in declaration
//! order. Decrement `j` then takes the block
//! `m + j * BLOCK_SIZE .. m + (j + 1) * BLOCK_SIZE`, one index per
//! [`DecrementRole`]: two nullified inputs and one change output. Blocks are
//! disjoint by construction and together with the increments cover exactly
//! `m + n * BLOCK_SIZE` indices.
use crate::{
  catalog::{
    DecrementArgs, NewValue, NullifierChain, StepArgs, StepKind,
    ir::{Param, Stmt},
  },
  config::Config,
  errors::ShroudError,
  indicator::{FunctionIndicators, Indicator, Owner, Variant},
};
use core::fmt;
use serde::{Deserialize, Serialize};

/// A physical commitment slot of a variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotName {
  /// Variable name
  pub base: String,
  /// Index within the function; whole variables have a single unindexed slot
  pub index: Option<usize>,
}

impl SlotName {
  /// The only slot of a whole variable.
  pub fn whole(base: &str) -> Self {
    SlotName {
      base: base.to_string(),
      index: None,
    }
  }

  /// Slot `index` of a partitioned variable.
  pub fn indexed(base: &str, index: usize) -> Self {
    SlotName {
      base: base.to_string(),
      index: Some(index),
    }
  }
}

impl fmt::Display for SlotName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.index {
      Some(i) => write!(f, "{}_{i}", self.base),
      None => write!(f, "{}", self.base),
    }
  }
}

/// Role of a slot within a decrement block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecrementRole {
  /// First nullified input
  Input0,
  /// Second nullified input
  Input1,
  /// Change output
  Change,
}

impl DecrementRole {
  /// Every role, in index order.
  pub const ALL: [DecrementRole; 3] = [
    DecrementRole::Input0,
    DecrementRole::Input1,
    DecrementRole::Change,
  ];

  /// Offset of the role inside its block.
  pub fn offset(&self) -> usize {
    match self {
      DecrementRole::Input0 => 0,
      DecrementRole::Input1 => 1,
      DecrementRole::Change => 2,
    }
  }
}

/// Number of slot indices one decrement consumes.
pub const BLOCK_SIZE: usize = DecrementRole::ALL.len();

/// Slots of one decrement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecrementSlots {
  /// First index of the block
  pub start: usize,
  /// Amount removed
  pub amount: String,
}

impl DecrementSlots {
  /// Slot playing `role`.
  pub fn slot(&self, base: &str, role: DecrementRole) -> SlotName {
    SlotName::indexed(base, self.start + role.offset())
  }

  /// Both input slots.
  pub fn inputs(&self, base: &str) -> [SlotName; 2] {
    [
      self.slot(base, DecrementRole::Input0),
      self.slot(base, DecrementRole::Input1),
    ]
  }
}

/// Slots of one partitioned variable in one function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAllocation {
  /// Variable name
  pub base: String,
  /// One slot per increment, with its amount
  pub increments: Vec<(SlotName, String)>,
  /// One block per decrement
  pub decrements: Vec<DecrementSlots>,
}

impl SlotAllocation {
  /// Allocates slots for `indicator`.
  pub fn for_indicator(indicator: &Indicator) -> Self {
    let base = indicator.name.as_str();
    let m = indicator.increments.len();
    SlotAllocation {
      base: base.to_string(),
      increments: indicator
        .increments
        .iter()
        .enumerate()
        .map(|(i, r)| (SlotName::indexed(base, i), r.amount.clone()))
        .collect(),
      decrements: indicator
        .decrements
        .iter()
        .enumerate()
        .map(|(j, r)| DecrementSlots {
          start: m + j * BLOCK_SIZE,
          amount: r.amount.clone(),
        })
        .collect(),
    }
  }

  /// Every allocated index, in allocation order.
  pub fn indices(&self) -> Vec<usize> {
    let incs = self.increments.iter().filter_map(|(s, _)| s.index);
    let decs = self.decrements.iter().flat_map(|d| {
      DecrementRole::ALL
        .iter()
        .filter_map(|role| d.slot(&self.base, *role).index)
    });
    incs.chain(decs).collect()
  }
}

/// One catalog invocation of a plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
  /// Step to run
  pub step: StepKind,
  /// Its arguments
  pub args: StepArgs,
}

/// The ordered catalog invocations of one function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionPlan {
  /// Function name
  pub name: String,
  /// The function's own inputs
  pub inputs: Vec<Param>,
  /// Lowered body statements
  pub body: Vec<Stmt>,
  /// Invocations in emission order
  pub invocations: Vec<Invocation>,
}

impl FunctionPlan {
  /// Slot-level steps emitted for `slot`, in order.
  pub fn steps_for(&self, slot: &str) -> Vec<StepKind> {
    self
      .invocations
      .iter()
      .filter(|inv| !inv.step.is_block() && inv.args.name == slot)
      .map(|inv| inv.step)
      .collect()
  }
}

/// Name of the mapping key input of the join and split built-ins.
pub const BUILTIN_KEY: &str = "key";
/// Name of the amount input of the split built-in.
pub const SPLIT_AMOUNT: &str = "splitAmount";

struct Planner<'a> {
  config: &'a Config,
  invocations: Vec<Invocation>,
}

impl<'a> Planner<'a> {
  fn new(config: &'a Config) -> Self {
    Planner {
      config,
      invocations: vec![],
    }
  }

  fn args(&self, indicator: &Indicator, slot: &SlotName) -> StepArgs {
    StepArgs {
      name: slot.to_string(),
      state: indicator.name.clone(),
      state_var_id: indicator.state_var_id,
      variant: indicator.variant,
      mapping_key: indicator.mapping_key.clone(),
      nullifies: false,
      dummy: false,
      owner: Owner::Caller,
      new_value: NewValue::Current,
      chain: NullifierChain::default(),
      block: None,
      commitment_tree_height: self.config.commitment_tree_height,
      nullifier_tree_height: self.config.nullifier_tree_height,
    }
  }

  fn push(&mut self, step: StepKind, args: StepArgs) {
    self.invocations.push(Invocation { step, args });
  }

  fn derive_key(&mut self, indicator: &Indicator, slot: &SlotName) {
    if indicator.is_mapping {
      let args = self.args(indicator, slot);
      self.push(StepKind::MappingKeyDerivation, args);
    }
  }

  fn read(&mut self, indicator: &Indicator, slot: &SlotName, nullifies: bool, dummy: bool) {
    let mut args = self.args(indicator, slot);
    args.nullifies = nullifies;
    args.dummy = dummy;
    for step in [
      StepKind::PoKoSK,
      StepKind::Nullification,
      StepKind::OldCommitmentPreimage,
      StepKind::OldCommitmentExistence,
    ] {
      self.push(step, args.clone());
    }
  }

  fn mint(&mut self, indicator: &Indicator, slot: &SlotName, owner: Owner, new_value: NewValue) {
    let mut args = self.args(indicator, slot);
    args.owner = owner;
    args.new_value = new_value;
    self.push(StepKind::NewCommitment, args);
  }

  fn block(&mut self, indicator: &Indicator, change: &SlotName, block: DecrementArgs) {
    let mut args = self.args(indicator, change);
    args.block = Some(block);
    self.push(StepKind::Decrementation, args);
  }

  fn whole(&mut self, indicator: &Indicator) {
    let slot = SlotName::whole(&indicator.name);
    self.derive_key(indicator, &slot);
    if indicator.is_nullified || indicator.is_accessed {
      self.read(
        indicator,
        &slot,
        indicator.is_nullified,
        indicator.allows_dummy(),
      );
    }
    if indicator.new_commitment_required {
      self.mint(indicator, &slot, indicator.owner(), NewValue::Current);
    }
  }

  fn partitioned(&mut self, indicator: &Indicator) {
    let alloc = SlotAllocation::for_indicator(indicator);
    let base = indicator.name.as_str();
    for (slot, amount) in &alloc.increments {
      self.derive_key(indicator, slot);
      self.mint(indicator, slot, indicator.owner(), NewValue::Amount(amount.clone()));
    }
    for dec in &alloc.decrements {
      let inputs = dec.inputs(base);
      let change = dec.slot(base, DecrementRole::Change);
      let names: Vec<String> = inputs.iter().map(|s| s.to_string()).collect();
      self.block(
        indicator,
        &change,
        DecrementArgs {
          inputs: names.clone(),
          amount: dec.amount.clone(),
          reconcile: true,
        },
      );
      for input in &inputs {
        self.derive_key(indicator, input);
        self.read(indicator, input, true, false);
      }
      self.derive_key(indicator, &change);
      self.mint(
        indicator,
        &change,
        Owner::Caller,
        NewValue::Remainder {
          inputs: names,
          amount: Some(dec.amount.clone()),
        },
      );
    }
  }

  /// Numbers the inserting nullifications so each knows which root it extends.
  fn finish(mut self, name: String, inputs: Vec<Param>, body: Vec<Stmt>) -> FunctionPlan {
    let mut inserted = 0;
    for inv in self.invocations.iter_mut() {
      if inv.step == StepKind::Nullification {
        inv.args.chain.position = inserted;
        if inv.args.nullifies {
          inserted += 1;
        }
      }
    }
    for inv in self.invocations.iter_mut() {
      inv.args.chain.total = inserted;
    }
    // Every step of a slot sees the same chain position.
    let positions: Vec<(String, usize)> = self
      .invocations
      .iter()
      .filter(|inv| inv.step == StepKind::Nullification)
      .map(|inv| (inv.args.name.clone(), inv.args.chain.position))
      .collect();
    for inv in self.invocations.iter_mut() {
      if let Some((_, p)) = positions.iter().find(|(n, _)| *n == inv.args.name) {
        inv.args.chain.position = *p;
      }
    }
    FunctionPlan {
      name,
      inputs,
      body,
      invocations: self.invocations,
    }
  }
}

/// Plans every invocation of `function`.
pub fn plan_function(
  function: &FunctionIndicators,
  config: &Config,
) -> Result<FunctionPlan, ShroudError> {
  function.validate()?;
  let mut planner = Planner::new(config);
  for indicator in &function.indicators {
    match indicator.variant {
      Variant::Whole => planner.whole(indicator),
      Variant::Partitioned => planner.partitioned(indicator),
    }
  }
  Ok(planner.finish(
    function.name.clone(),
    function.inputs.clone(),
    function.body.clone(),
  ))
}

/// The variable as seen by its join and split built-ins.
fn builtin_indicator(indicator: &Indicator) -> Indicator {
  let mut ind = Indicator::partitioned(&indicator.name, indicator.state_var_id);
  if indicator.is_mapping {
    ind.is_mapping = true;
    ind.mapping_key = Some(BUILTIN_KEY.to_string());
    ind.mapping_name = indicator.mapping_name.clone();
  }
  ind.is_nullified = true;
  ind
}

fn builtin_inputs(indicator: &Indicator) -> Vec<Param> {
  if indicator.is_mapping {
    vec![Param::private(BUILTIN_KEY)]
  } else {
    vec![]
  }
}

/// Plan of the built-in that merges inputs `_0` and `_1` into `_2`.
pub fn plan_join(indicator: &Indicator, config: &Config) -> FunctionPlan {
  let ind = builtin_indicator(indicator);
  let base = ind.name.as_str();
  let mut planner = Planner::new(config);
  let inputs = [SlotName::indexed(base, 0), SlotName::indexed(base, 1)];
  for input in &inputs {
    planner.derive_key(&ind, input);
    planner.read(&ind, input, true, false);
  }
  let out = SlotName::indexed(base, 2);
  planner.derive_key(&ind, &out);
  planner.mint(
    &ind,
    &out,
    Owner::Caller,
    NewValue::Remainder {
      inputs: inputs.iter().map(|s| s.to_string()).collect(),
      amount: None,
    },
  );
  planner.finish(
    crate::catalog::join_function(base),
    builtin_inputs(&ind),
    vec![],
  )
}

/// Plan of the built-in that splits input `_0` into `_1` (the amount) and `_2`
/// (the remainder).
pub fn plan_split(indicator: &Indicator, config: &Config) -> FunctionPlan {
  let ind = builtin_indicator(indicator);
  let base = ind.name.as_str();
  let mut planner = Planner::new(config);
  let input = SlotName::indexed(base, 0);
  let amount_out = SlotName::indexed(base, 1);
  let remainder = SlotName::indexed(base, 2);
  planner.block(
    &ind,
    &remainder,
    DecrementArgs {
      inputs: vec![input.to_string()],
      amount: SPLIT_AMOUNT.to_string(),
      reconcile: false,
    },
  );
  planner.derive_key(&ind, &input);
  planner.read(&ind, &input, true, false);
  planner.derive_key(&ind, &amount_out);
  planner.mint(
    &ind,
    &amount_out,
    Owner::Caller,
    NewValue::Amount(SPLIT_AMOUNT.to_string()),
  );
  planner.derive_key(&ind, &remainder);
  planner.mint(
    &ind,
    &remainder,
    Owner::Caller,
    NewValue::Remainder {
      inputs: vec![input.to_string()],
      amount: Some(SPLIT_AMOUNT.to_string()),
    },
  );
  let mut inputs = builtin_inputs(&ind);
  inputs.push(Param::private(SPLIT_AMOUNT));
  planner.finish(crate::catalog::split_function(base), inputs, vec![])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::field::Word;

  fn transfer() -> FunctionIndicators {
    FunctionIndicators::new(
      "transfer",
      vec![Param::private("amount"), Param::private("to")],
      vec![
        Indicator::partitioned("balance", Word::from_u64(1))
          .increment("amount")
          .decrement("amount"),
      ],
    )
  }

  #[test]
  fn test_decrement_block_follows_increments() {
    let ind = Indicator::partitioned("x", Word::from_u64(1))
      .increment("a")
      .increment("b")
      .decrement("c")
      .decrement("d");
    let alloc = SlotAllocation::for_indicator(&ind);
    assert_eq!(alloc.indices(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(alloc.decrements[1].start, 5);
    assert_eq!(
      alloc.decrements[1].slot("x", DecrementRole::Change).to_string(),
      "x_7"
    );
  }

  #[test]
  fn test_transfer_plan_layout() {
    let plan = plan_function(&transfer(), &Config::default()).unwrap();
    assert_eq!(plan.steps_for("balance_0"), vec![StepKind::NewCommitment]);
    for input in ["balance_1", "balance_2"] {
      assert_eq!(
        plan.steps_for(input),
        vec![
          StepKind::PoKoSK,
          StepKind::Nullification,
          StepKind::OldCommitmentPreimage,
          StepKind::OldCommitmentExistence,
        ]
      );
    }
    assert_eq!(plan.steps_for("balance_3"), vec![StepKind::NewCommitment]);
    assert_eq!(
      plan
        .invocations
        .iter()
        .filter(|inv| inv.step.is_block())
        .count(),
      1
    );
  }

  #[test]
  fn test_nullifier_chain_positions() {
    let plan = plan_function(&transfer(), &Config::default()).unwrap();
    let chain: Vec<(String, usize, usize)> = plan
      .invocations
      .iter()
      .filter(|inv| inv.step == StepKind::Nullification)
      .map(|inv| {
        (
          inv.args.name.clone(),
          inv.args.chain.position,
          inv.args.chain.total,
        )
      })
      .collect();
    assert_eq!(
      chain,
      vec![
        ("balance_1".to_string(), 0, 2),
        ("balance_2".to_string(), 1, 2)
      ]
    );
  }

  #[test]
  fn test_whole_mapping_prefixes_key_derivation() {
    let mut ind = Indicator::whole("owners", Word::from_u64(3)).in_mapping("owners", "to");
    ind.is_accessed = true;
    let f = FunctionIndicators::new("read", vec![Param::private("to")], vec![ind]);
    let plan = plan_function(&f, &Config::default()).unwrap();
    assert_eq!(
      plan.steps_for("owners"),
      vec![
        StepKind::MappingKeyDerivation,
        StepKind::PoKoSK,
        StepKind::Nullification,
        StepKind::OldCommitmentPreimage,
        StepKind::OldCommitmentExistence,
      ]
    );
  }

  #[test]
  fn test_builtins_use_canonical_slots() {
    let ind = Indicator::partitioned("balance", Word::from_u64(1)).decrement("amount");
    let join = plan_join(&ind, &Config::default());
    assert_eq!(join.name, "join_balance");
    assert_eq!(join.steps_for("balance_2"), vec![StepKind::NewCommitment]);

    let split = plan_split(&ind, &Config::default());
    assert_eq!(split.name, "split_balance");
    assert_eq!(split.inputs, vec![Param::private(SPLIT_AMOUNT)]);
    assert_eq!(split.steps_for("balance_1"), vec![StepKind::NewCommitment]);
    assert_eq!(split.steps_for("balance_2"), vec![StepKind::NewCommitment]);
  }
}
