use rand_core::OsRng;
use shroud::{
  Call, Config, FunctionIndicators, Indicator, Program, Runtime, ShroudError, Target, Word,
  assembler::render::render,
  catalog::ir::{Expr, Param, Stmt},
  commitment::{Bucket, public_key},
  indicator::Owner,
  provider::{LocalChain, MemoryStore, MockProver},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BALANCE_ID: u64 = 1;
const ADMIN_ID: u64 = 2;

fn functions() -> Vec<FunctionIndicators> {
  let deposit = FunctionIndicators::new(
    "deposit",
    vec![Param::private("amount")],
    vec![Indicator::partitioned("balance", Word::from_u64(BALANCE_ID)).increment("amount")],
  );

  let transfer = FunctionIndicators::new(
    "transfer",
    vec![Param::private("amount"), Param::private("recipient")],
    vec![Indicator {
      owner: Some(Owner::Param("recipient".to_string())),
      ..Indicator::partitioned("balance", Word::from_u64(BALANCE_ID))
        .increment("amount")
        .decrement("amount")
    }],
  );

  let set_admin = FunctionIndicators::new(
    "setAdmin",
    vec![Param::private("newAdmin")],
    vec![Indicator {
      is_nullified: true,
      initialisation_required: true,
      new_commitment_required: true,
      ..Indicator::whole("admin", Word::from_u64(ADMIN_ID))
    }],
  )
  .with_body(vec![Stmt::Reassign {
    name: "admin".to_string(),
    expr: Expr::var("newAdmin"),
  }]);

  vec![deposit, transfer, set_admin]
}

fn main() -> Result<(), ShroudError> {
  tracing_subscriber::fmt()
    .with_target(false)
    .with_ansi(true)
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let config = Config {
    commitment_tree_height: 16,
    nullifier_tree_height: 16,
    ..Config::default()
  };
  let program = Arc::new(Program::synthesize(&functions(), &config)?);
  info!(digest = %program.digest()?, "program synthesized");
  for target in Target::ALL {
    println!("{}", render(program.require("transfer", target)?));
  }

  let alice = Word::random(&mut OsRng);
  let bob = Word::random(&mut OsRng);
  let chain = LocalChain::new(Arc::clone(&program), &config)?;
  let prover = MockProver::new(Arc::clone(&program));
  let mut runtime = Runtime::new(
    Arc::clone(&program),
    config.clone(),
    MemoryStore::new(),
    chain,
    prover,
    OsRng,
    alice,
  )?;

  for amount in [3u64, 3, 3] {
    runtime.execute(&Call::new("deposit").arg("amount", amount))?;
  }
  let out = runtime.execute_with_retry(
    &Call::new("transfer")
      .arg("amount", 5u64)
      .arg("recipient", public_key(&bob)),
  )?;
  info!(
    block = out.receipt.block,
    reconciliation_steps = out.reconciliations.iter().map(|r| r.history.len()).sum::<usize>(),
    "transfer settled"
  );

  runtime.execute(&Call::new("setAdmin").arg("newAdmin", public_key(&bob)))?;
  runtime.execute(&Call::new("setAdmin").arg("newAdmin", public_key(&alice)))?;

  let bucket = Bucket::plain(Word::from_u64(BALANCE_ID));
  let values = |cs: Vec<shroud::commitment::Commitment>| {
    cs.iter()
      .map(|c| c.value.to_biguint().to_string())
      .collect::<Vec<_>>()
      .join(", ")
  };
  info!(commitments = %values(runtime.balance(&bucket)?), "alice balance");

  // bob keeps his own store and learns his payment from the ledger
  let mut wallet = Runtime::new(
    Arc::clone(&program),
    config,
    MemoryStore::new(),
    runtime.ledger().clone(),
    MockProver::new(Arc::clone(&program)),
    OsRng,
    bob,
  )?;
  wallet.sync()?;
  info!(commitments = %values(wallet.balance(&bucket)?), "bob balance");
  Ok(())
}
