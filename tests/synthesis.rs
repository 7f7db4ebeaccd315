use shroud::{
  Config, FunctionIndicators, Indicator, Program, Target, Word,
  catalog::{
    ProtocolRequest, Section, StepKind, SlotVars,
    ir::{LedgerOp, Param, Stmt, Visibility},
    synthesize,
  },
  errors::ShroudError,
  indicator::Owner,
  slots::plan_function,
};

fn wallet() -> Vec<FunctionIndicators> {
  vec![
    FunctionIndicators::new(
      "mint",
      vec![Param::private("amount")],
      vec![Indicator::partitioned("balance", Word::from_u64(3)).increment("amount")],
    ),
    FunctionIndicators::new(
      "send",
      vec![Param::private("amount"), Param::private("to")],
      vec![Indicator {
        owner: Some(Owner::Param("to".to_string())),
        ..Indicator::partitioned("balance", Word::from_u64(3))
          .increment("amount")
          .decrement("amount")
      }],
    ),
    FunctionIndicators::new(
      "credit",
      vec![Param::private("who"), Param::private("amount")],
      vec![
        Indicator::partitioned("ledger", Word::from_u64(4))
          .in_mapping("ledger", "who")
          .increment("amount"),
      ],
    ),
  ]
}

#[test]
fn test_decrement_slot_step_order() {
  let plan = plan_function(&wallet()[1], &Config::default()).unwrap();
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
  assert_eq!(plan.steps_for("balance_0"), vec![StepKind::NewCommitment]);
  assert_eq!(plan.steps_for("balance_3"), vec![StepKind::NewCommitment]);
  // the block step comes before any step of its inputs
  assert_eq!(plan.invocations[1].step, StepKind::Decrementation);
}

#[test]
fn test_mapping_slots_derive_their_key_first() {
  let plan = plan_function(&wallet()[2], &Config::default()).unwrap();
  assert_eq!(
    plan.steps_for("ledger_0"),
    vec![StepKind::MappingKeyDerivation, StepKind::NewCommitment]
  );
}

#[test]
fn test_synthesis_is_deterministic() {
  let a = Program::synthesize(&wallet(), &Config::default()).unwrap();
  let b = Program::synthesize(&wallet(), &Config::default()).unwrap();
  assert_eq!(a.digest().unwrap(), b.digest().unwrap());
  for f in a.functions() {
    for target in Target::ALL {
      assert_eq!(
        a.require(f, target).unwrap().digest().unwrap(),
        b.require(f, target).unwrap().digest().unwrap()
      );
    }
  }

  let taller = Config {
    commitment_tree_height: 20,
    ..Config::default()
  };
  let c = Program::synthesize(&wallet(), &taller).unwrap();
  assert_ne!(a.digest().unwrap(), c.digest().unwrap());
}

#[test]
fn test_targets_share_parameter_order() {
  let program = Program::synthesize(&wallet(), &Config::default()).unwrap();
  for f in program.functions() {
    let circuit = program.require(f, Target::Circuit).unwrap();
    let orchestration = program.require(f, Target::Orchestration).unwrap();
    let contract = program.require(f, Target::Contract).unwrap();
    assert_eq!(
      circuit.params().collect::<Vec<_>>(),
      orchestration.params().collect::<Vec<_>>()
    );
    assert_eq!(
      circuit.public_params().collect::<Vec<_>>(),
      contract.params().collect::<Vec<_>>()
    );
  }
}

#[test]
fn test_nullifiers_are_public_and_chained() {
  let program = Program::synthesize(&wallet(), &Config::default()).unwrap();
  let contract = program.require("send", Target::Contract).unwrap();
  let public: Vec<&str> = contract.params().map(|p| p.name.as_str()).collect();
  for slot in ["balance_1", "balance_2"] {
    assert!(public.contains(&SlotVars::new(slot).nullifier().as_str()));
  }
  let unused = contract
    .statements()
    .filter(|s| matches!(s, Stmt::Ledger(LedgerOp::NullifierUnused { .. })))
    .count();
  assert_eq!(unused, 2);
  let advances = contract
    .statements()
    .filter(|s| matches!(s, Stmt::Ledger(LedgerOp::AdvanceNullifierRoot { .. })))
    .count();
  assert_eq!(advances, 1);
}

#[test]
fn test_increment_only_function_touches_no_nullifier() {
  let program = Program::synthesize(&wallet(), &Config::default()).unwrap();
  let circuit = program.require("mint", Target::Circuit).unwrap();
  assert!(
    circuit
      .public_params()
      .all(|p| p.name == SlotVars::new("balance_0").new_commitment())
  );
  assert!(circuit.params().all(|p| p.visibility == Visibility::Private
    || p.name.ends_with("newCommitment_commitment")));
}

#[test]
fn test_statements_section_is_block_only() {
  let plan = plan_function(&wallet()[1], &Config::default()).unwrap();
  for inv in &plan.invocations {
    let request = ProtocolRequest {
      step: inv.step,
      section: Section::Statements,
      args: &inv.args,
    };
    match synthesize(&request) {
      Ok(stmts) => assert_eq!(inv.step, StepKind::Decrementation, "{stmts:?}"),
      Err(e) => assert!(matches!(e, ShroudError::UnknownProtocolStep { .. })),
    }
  }
}

#[test]
fn test_invalid_indicators_are_rejected() {
  let f = FunctionIndicators::new(
    "bad",
    vec![Param::private("amount")],
    vec![Indicator::partitioned("balance", Word::from_u64(3)).decrement("missing")],
  );
  assert!(matches!(
    Program::synthesize(&[f], &Config::default()),
    Err(ShroudError::InvalidIndicator { .. })
  ));

  let bad_config = Config {
    nullifier_tree_height: 0,
    ..Config::default()
  };
  assert!(matches!(
    Program::synthesize(&wallet(), &bad_config),
    Err(ShroudError::InvalidConfig { .. })
  ));
}
