use num_bigint::BigUint;
use rand::SeedableRng;
use rand::rngs::StdRng;
use shroud::{
  Call, Config, FunctionIndicators, Indicator, Program, Runtime, Target, Word,
  catalog::ir::{Expr, Param, Stmt},
  commitment::{Bucket, Commitment, public_key},
  config::RetryPolicy,
  errors::ShroudError,
  eval::{Value, check_circuit},
  indicator::Owner,
  provider::{LocalChain, MemoryStore, MockProver},
  reconcile::Action,
  traits::{Proof, ProofService},
};
use std::{cell::RefCell, rc::Rc, sync::Arc};
use tracing_subscriber::EnvFilter;

const BALANCE: u64 = 1;
const ADMIN: u64 = 2;
const ACCOUNTS: u64 = 3;

type Wallet = Runtime<MemoryStore, LocalChain, MockProver, StdRng>;

fn functions() -> Vec<FunctionIndicators> {
  let admin = Indicator::whole("admin", Word::from_u64(ADMIN));
  vec![
    FunctionIndicators::new(
      "deposit",
      vec![Param::private("amount")],
      vec![Indicator::partitioned("balance", Word::from_u64(BALANCE)).increment("amount")],
    ),
    FunctionIndicators::new(
      "transfer",
      vec![Param::private("amount"), Param::private("recipient")],
      vec![Indicator {
        owner: Some(Owner::Param("recipient".to_string())),
        ..Indicator::partitioned("balance", Word::from_u64(BALANCE))
          .increment("amount")
          .decrement("amount")
      }],
    ),
    FunctionIndicators::new(
      "setAdmin",
      vec![Param::private("newAdmin")],
      vec![Indicator {
        is_nullified: true,
        initialisation_required: true,
        new_commitment_required: true,
        ..admin.clone()
      }],
    )
    .with_body(vec![Stmt::Reassign {
      name: "admin".to_string(),
      expr: Expr::var("newAdmin"),
    }]),
    FunctionIndicators::new(
      "readAdmin",
      vec![],
      vec![Indicator {
        is_accessed: true,
        ..admin
      }],
    ),
    FunctionIndicators::new(
      "credit",
      vec![Param::private("account"), Param::private("amount")],
      vec![
        Indicator::partitioned("accounts", Word::from_u64(ACCOUNTS))
          .in_mapping("accounts", "account")
          .increment("amount"),
      ],
    ),
    FunctionIndicators::new(
      "debit",
      vec![Param::private("account"), Param::private("amount")],
      vec![
        Indicator::partitioned("accounts", Word::from_u64(ACCOUNTS))
          .in_mapping("accounts", "account")
          .decrement("amount"),
      ],
    ),
    FunctionIndicators::new(
      "payTwice",
      vec![Param::private("first"), Param::private("second")],
      vec![
        Indicator::partitioned("balance", Word::from_u64(BALANCE))
          .decrement("first")
          .decrement("second"),
      ],
    ),
  ]
}

fn config() -> Config {
  Config {
    retry: RetryPolicy::immediate(3),
    ..Config::default()
  }
}

fn wallet(seed: u64) -> (Wallet, Word) {
  let _ = tracing_subscriber::fmt()
    .with_target(false)
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();

  let config = config();
  let program = Arc::new(Program::synthesize(&functions(), &config).unwrap());
  let chain = LocalChain::new(Arc::clone(&program), &config).unwrap();
  let mut rng = StdRng::seed_from_u64(seed);
  let secret_key = Word::random(&mut rng);
  (peer(chain, secret_key, seed), secret_key)
}

/// A wallet with its own store on a copy of `chain`.
fn peer(chain: LocalChain, secret_key: Word, seed: u64) -> Wallet {
  let config = config();
  let program = Arc::new(Program::synthesize(&functions(), &config).unwrap());
  let prover = MockProver::new(Arc::clone(&program));
  Runtime::new(
    program,
    config,
    MemoryStore::new(),
    chain,
    prover,
    StdRng::seed_from_u64(seed ^ 0x5eed),
    secret_key,
  )
  .unwrap()
}

fn values(cs: &[Commitment]) -> Vec<u64> {
  let mut v: Vec<u64> = cs.iter().map(|c| c.value.low_bits(64)).collect();
  v.sort();
  v
}

fn balance(w: &Wallet) -> Vec<u64> {
  values(&w.balance(&Bucket::plain(Word::from_u64(BALANCE))).unwrap())
}

#[test]
fn test_deposit_persists_one_commitment() {
  let (mut w, _) = wallet(1);
  let out = w.execute(&Call::new("deposit").arg("amount", 7u64)).unwrap();
  assert_eq!(out.created.len(), 1);
  assert!(out.nullified.is_empty());
  assert_eq!(out.receipt.commitments, vec![out.created[0].hash]);
  assert_eq!(balance(&w), vec![7]);
  assert!(w.ledger().commitments().contains(&out.created[0].hash));
}

#[test]
fn test_transfer_joins_then_pays_recipient() {
  let (mut w, _) = wallet(2);
  for _ in 0..3 {
    w.execute(&Call::new("deposit").arg("amount", 3u64)).unwrap();
  }
  let bob = Word::from_u64(0xb0b);
  let out = w
    .execute_with_retry(
      &Call::new("transfer")
        .arg("amount", 5u64)
        .arg("recipient", public_key(&bob)),
    )
    .unwrap();

  assert_eq!(out.reconciliations.len(), 1);
  let history = &out.reconciliations[0].history;
  assert_eq!(history.len(), 1);
  assert!(matches!(history[0], Action::Join { .. }));
  assert_eq!(values(&out.reconciliations[0].inputs), vec![3, 6]);

  assert_eq!(out.nullified.len(), 2);
  assert_eq!(out.receipt.nullifiers.len(), 2);
  let to_bob: Vec<&Commitment> = out
    .created
    .iter()
    .filter(|c| c.owner_public_key == public_key(&bob))
    .collect();
  assert_eq!(to_bob.len(), 1);
  assert_eq!(to_bob[0].value, Word::from_u64(5));
  assert_eq!(out.receipt.encrypted.len(), 1);
  assert_eq!(out.receipt.encrypted[0].commitment, to_bob[0].hash);
  assert!(w.store().find(&to_bob[0].hash).is_none());
  assert_eq!(balance(&w), vec![4]);
  // three deposits, one join, one transfer
  assert_eq!(w.ledger().height(), 5);
  assert!(w.ledger().pending().is_empty());
}

#[test]
fn test_recipient_recovers_payment_from_the_ledger() {
  let (mut w, _) = wallet(9);
  w.execute(&Call::new("deposit").arg("amount", 8u64)).unwrap();
  w.execute(&Call::new("deposit").arg("amount", 1u64)).unwrap();
  let bob = Word::from_u64(0xb0b);
  let paid = w
    .execute(
      &Call::new("transfer")
        .arg("amount", 5u64)
        .arg("recipient", public_key(&bob)),
    )
    .unwrap();

  let mut b = peer(w.ledger().clone(), bob, 10);
  assert!(balance(&b).is_empty());
  let recovered = b.sync().unwrap();
  assert_eq!(recovered.len(), 1);
  assert!(paid.created.contains(&recovered[0]));
  assert_eq!(balance(&b), vec![5]);
  assert!(b.sync().unwrap().is_empty());

  // alice's change is not addressed to bob
  let mut eve = peer(w.ledger().clone(), Word::from_u64(0xe7e), 11);
  assert!(eve.sync().unwrap().is_empty());

  // the recovered commitment is spendable by bob alone
  let out = b
    .execute(
      &Call::new("transfer")
        .arg("amount", 2u64)
        .arg("recipient", w.public_key()),
    )
    .unwrap();
  assert!(matches!(out.reconciliations[0].history[0], Action::Split { .. }));
  assert_eq!(balance(&b), vec![3]);
}
#[test]
fn test_transfer_without_funds_fails_cleanly() {
  let (mut w, _) = wallet(3);
  w.execute(&Call::new("deposit").arg("amount", 2u64)).unwrap();
  let err = w
    .execute(
      &Call::new("transfer")
        .arg("amount", 5u64)
        .arg("recipient", Word::from_u64(9)),
    )
    .unwrap_err();
  assert!(matches!(err, ShroudError::InsufficientFunds { .. }));
  assert_eq!(balance(&w), vec![2]);
  assert_eq!(w.ledger().height(), 1);
}

#[test]
fn test_transient_rejection_is_retried() {
  let (mut w, _) = wallet(4);
  w.ledger_mut().fail_next(2);
  let out = w
    .execute_with_retry(&Call::new("deposit").arg("amount", 4u64))
    .unwrap();
  assert_eq!(out.receipt.block, 1);
  assert_eq!(balance(&w), vec![4]);
}

#[test]
fn test_exhausted_retries_leave_no_trace() {
  let (mut w, _) = wallet(5);
  w.execute(&Call::new("deposit").arg("amount", 10u64)).unwrap();
  w.ledger_mut().fail_next(5);
  let err = w
    .execute_with_retry(
      &Call::new("transfer")
        .arg("amount", 4u64)
        .arg("recipient", Word::from_u64(9)),
    )
    .unwrap_err();
  assert!(matches!(err, ShroudError::RetriesExhausted { .. }));
  assert_eq!(balance(&w), vec![10]);
  assert_eq!(w.ledger().height(), 1);
  assert!(w.ledger().pending().is_empty());
  assert_eq!(w.store().len(), 1);
}

#[test]
fn test_whole_state_is_initialised_through_the_dummy() {
  let (mut w, sk) = wallet(6);
  let admin = Bucket::plain(Word::from_u64(ADMIN));
  assert!(matches!(
    w.execute(&Call::new("readAdmin")),
    Err(ShroudError::WitnessUnavailable { .. })
  ));

  let first = w
    .execute(&Call::new("setAdmin").arg("newAdmin", Word::from_u64(11)))
    .unwrap();
  assert!(first.nullified.is_empty());
  assert_eq!(first.receipt.nullifiers.len(), 1);
  assert_eq!(values(&first.created), vec![11]);

  let second = w
    .execute(&Call::new("setAdmin").arg("newAdmin", Word::from_u64(12)))
    .unwrap();
  assert_eq!(second.nullified, vec![first.created[0].hash]);
  assert_eq!(values(&w.balance(&admin).unwrap()), vec![12]);
  assert_eq!(w.public_key(), public_key(&sk));

  let read = w.execute(&Call::new("readAdmin")).unwrap();
  assert!(read.created.is_empty());
  assert!(read.nullified.is_empty());
  assert_eq!(values(&w.balance(&admin).unwrap()), vec![12]);
}

#[test]
fn test_mapping_entries_split_under_their_key() {
  let (mut w, _) = wallet(7);
  let key = Word::from_u64(42);
  let other = Word::from_u64(43);
  w.execute(
    &Call::new("credit")
      .arg("account", key)
      .arg("amount", 10u64),
  )
  .unwrap();
  w.execute(
    &Call::new("credit")
      .arg("account", other)
      .arg("amount", 1u64),
  )
  .unwrap();

  let out = w
    .execute(
      &Call::new("debit")
        .arg("account", key)
        .arg("amount", 4u64),
    )
    .unwrap();
  let history = &out.reconciliations[0].history;
  assert_eq!(history.len(), 1);
  assert!(matches!(history[0], Action::Split { .. }));
  assert_eq!(values(&out.reconciliations[0].inputs), vec![4, 6]);

  let entry = Bucket::mapping(Word::from_u64(ACCOUNTS), key);
  assert_eq!(values(&w.balance(&entry).unwrap()), vec![6]);
  let untouched = Bucket::mapping(Word::from_u64(ACCOUNTS), other);
  assert_eq!(values(&w.balance(&untouched).unwrap()), vec![1]);
}

#[test]
fn test_unknown_inputs_are_rejected() {
  let (mut w, _) = wallet(8);
  assert!(matches!(
    w.execute(&Call::new("deposit").arg("amount", 1u64).arg("extra", 2u64)),
    Err(ShroudError::UnboundVariable { .. })
  ));
  assert!(matches!(
    w.execute(&Call::new("withdraw")),
    Err(ShroudError::UnknownFunction { .. })
  ));
}

#[test]
fn test_second_decrement_reports_reserved_inputs() {
  let (mut w, _) = wallet(12);
  w.execute(&Call::new("deposit").arg("amount", 10u64)).unwrap();
  let err = w
    .execute(
      &Call::new("payTwice")
        .arg("first", 3u64)
        .arg("second", 4u64),
    )
    .unwrap_err();
  // the first decrement split 10 into [3, 7] and claimed both
  assert_eq!(
    err,
    ShroudError::InsufficientFunds {
      state: "balance".to_string(),
      amount: BigUint::from(4u64),
      available: BigUint::from(0u64),
      reserved: BigUint::from(10u64),
    }
  );
  assert_eq!(balance(&w), vec![3, 7]);
  assert!(w.ledger().pending().is_empty());
}

/// Proves with [`MockProver`] and keeps the last input vector.
struct Recording {
  inner: MockProver,
  last: Rc<RefCell<Vec<Value>>>,
}

impl ProofService for Recording {
  fn prove(&self, function: &str, inputs: &[Value]) -> Result<Proof, ShroudError> {
    *self.last.borrow_mut() = inputs.to_vec();
    self.inner.prove(function, inputs)
  }
}

#[test]
fn test_perturbed_preimage_fails_existence_check() {
  let config = config();
  let program = Arc::new(Program::synthesize(&functions(), &config).unwrap());
  let chain = LocalChain::new(Arc::clone(&program), &config).unwrap();
  let last = Rc::new(RefCell::new(vec![]));
  let prover = Recording {
    inner: MockProver::new(Arc::clone(&program)),
    last: Rc::clone(&last),
  };
  let mut w = Runtime::new(
    Arc::clone(&program),
    config,
    MemoryStore::new(),
    chain,
    prover,
    StdRng::seed_from_u64(13),
    Word::from_u64(0xa11ce),
  )
  .unwrap();
  w.execute(&Call::new("setAdmin").arg("newAdmin", Word::from_u64(11)))
    .unwrap();
  w.execute(&Call::new("readAdmin")).unwrap();

  let circuit = program.require("readAdmin", Target::Circuit).unwrap();
  let inputs = last.borrow().clone();
  assert!(check_circuit(circuit, &inputs).is_ok());

  let at = |name: &str| circuit.params().position(|p| p.name == name).unwrap();
  let mut forged = inputs.clone();
  forged[at("admin_oldCommitment_value")] = Value::from(12u64);
  assert_eq!(
    check_circuit(circuit, &forged).unwrap_err(),
    ShroudError::AssertionViolation {
      label: "admin commitment exists".to_string(),
    }
  );

  // the salt also feeds the nullifier, which is checked first
  let mut forged = inputs;
  forged[at("admin_oldCommitment_salt")] = Value::from(1u64);
  assert!(matches!(
    check_circuit(circuit, &forged),
    Err(ShroudError::AssertionViolation { .. })
  ));
}
