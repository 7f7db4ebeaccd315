//! Execution of synthesized orchestration programs.
//!
//! A call runs in three phases. Every decrement's inputs are reconciled first,
//! since joins and splits move both tree roots. The orchestration statements
//! are then evaluated in order, fetching witnesses and deriving the values the
//! circuit constrains. Finally the ordered input vector is proven and
//! submitted; only an accepted submission persists new commitments and marks
//! consumed ones as nullified. A failed call discards the pending nullifier
//! overlay.
//!
//! A commitment minted for another owner is not stored locally. Its preimage is
//! sealed for the owner and published with the transaction; the owner's
//! runtime recovers it with [`Runtime::sync`].
//!
//! Inputs claimed by one decrement stay claimed for the rest of the call, and
//! its change only exists once the call settles. A second decrement of the
//! same bucket in the same call therefore works from what the first left over;
//! a shortfall reports the claimed total as `reserved`.
use crate::{
  assembler::{Program, Target},
  catalog::ir::{BucketRef, PersistOp, PreimageField, Source, Stmt, Visibility},
  commitment::{Bucket, Commitment, public_key},
  config::Config,
  errors::ShroudError,
  eval::{Env, Mode, Value, eval_word, exec},
  field::Word,
  provider::MockCipher,
  reconcile::{Reconciliation, Transactor, reconcile, total, with_retry},
  slots::{BUILTIN_KEY, SPLIT_AMOUNT, SlotName},
  start_span,
  traits::{
    CommitmentStore, EncryptedPreimage, Ledger, Preimage, PreimageCipher, ProofService, Receipt,
  },
};
use num_bigint::BigUint;
use rand_core::RngCore;
use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
  time::Instant,
};
use tracing::{debug, info, info_span, warn};

/// A call of a synthesized function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Call {
  /// Function to execute
  pub function: String,
  /// Values of the function's own inputs
  pub args: BTreeMap<String, Value>,
  /// Commitments pre-selected for slots, as the join and split built-ins need
  pub bound: BTreeMap<String, Commitment>,
}

impl Call {
  /// A call of `function` with no arguments yet.
  pub fn new(function: impl Into<String>) -> Self {
    Call {
      function: function.into(),
      ..Call::default()
    }
  }

  /// Sets input `name`.
  pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.args.insert(name.into(), value.into());
    self
  }

  /// Consumes `commitment` in `slot`.
  pub fn bind(mut self, slot: impl Into<String>, commitment: Commitment) -> Self {
    self.bound.insert(slot.into(), commitment);
    self
  }
}

/// What an accepted call produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
  /// Ledger receipt
  pub receipt: Receipt,
  /// Commitments created, including those sealed for other owners
  pub created: Vec<Commitment>,
  /// Hashes of commitments marked nullified
  pub nullified: Vec<Word>,
  /// One reconciliation per decrement
  pub reconciliations: Vec<Reconciliation>,
}

/// Per-call state.
#[derive(Default)]
struct Frame {
  env: Env,
  /// Commitment consumed by each slot; `None` is the dummy
  slots: BTreeMap<String, Option<Commitment>>,
  /// Commitments claimed by a slot of this call
  reserved: BTreeSet<Word>,
  reconciliations: Vec<Reconciliation>,
}

impl Frame {
  fn claim(&mut self, slot: &str, commitment: Option<Commitment>) {
    if let Some(c) = &commitment {
      self.reserved.insert(c.hash);
    }
    self.slots.insert(slot.to_string(), commitment);
  }

  fn is_dummy(&self, slot: &str) -> Result<bool, ShroudError> {
    self
      .slots
      .get(slot)
      .map(Option::is_none)
      .ok_or_else(|| ShroudError::UnboundVariable {
        name: slot.to_string(),
      })
  }
}

fn resolve_bucket(bucket: &BucketRef, env: &Env) -> Result<Bucket, ShroudError> {
  Ok(Bucket {
    state_var_id: eval_word(&bucket.state_var_id, env)?,
    mapping_key: bucket
      .mapping_key
      .as_deref()
      .map(|k| env.word(k))
      .transpose()?,
  })
}

/// Executes calls on behalf of one caller.
pub struct Runtime<S, L, P, R> {
  program: Arc<Program>,
  config: Config,
  store: S,
  ledger: L,
  prover: P,
  rng: R,
  secret_key: Word,
  cipher: Box<dyn PreimageCipher>,
  /// Last block scanned for sealed preimages
  synced: u64,
}

impl<S, L, P, R> Runtime<S, L, P, R>
where
  S: CommitmentStore,
  L: Ledger,
  P: ProofService,
  R: RngCore,
{
  /// A runtime acting for the holder of `secret_key`.
  pub fn new(
    program: Arc<Program>,
    config: Config,
    store: S,
    ledger: L,
    prover: P,
    rng: R,
    secret_key: Word,
  ) -> Result<Self, ShroudError> {
    config.validate()?;
    Ok(Runtime {
      program,
      config,
      store,
      ledger,
      prover,
      rng,
      secret_key,
      cipher: Box::new(MockCipher),
      synced: 0,
    })
  }

  /// Seals and opens preimages with `cipher` instead of [`MockCipher`].
  pub fn with_cipher(mut self, cipher: impl PreimageCipher + 'static) -> Self {
    self.cipher = Box::new(cipher);
    self
  }

  /// Acts for the holder of `secret_key` from now on.
  pub fn set_caller(&mut self, secret_key: Word) {
    self.secret_key = secret_key;
    self.synced = 0;
  }

  /// Public key of the current caller.
  pub fn public_key(&self) -> Word {
    public_key(&self.secret_key)
  }

  /// The commitment store.
  pub fn store(&self) -> &S {
    &self.store
  }

  /// The ledger.
  pub fn ledger(&self) -> &L {
    &self.ledger
  }

  /// Mutable access to the ledger.
  pub fn ledger_mut(&mut self) -> &mut L {
    &mut self.ledger
  }

  /// The caller's live commitments in `bucket`.
  pub fn balance(&self, bucket: &Bucket) -> Result<Vec<Commitment>, ShroudError> {
    self.usable(bucket, &BTreeSet::new())
  }

  /// Stores every published preimage sealed for the caller and returns the
  /// commitments recovered.
  pub fn sync(&mut self) -> Result<Vec<Commitment>, ShroudError> {
    let (_span, t) = start_span!("sync", from = self.synced);
    let owner = self.public_key();
    let mut recovered = vec![];
    for (block, sealed) in self.ledger.encrypted_since(self.synced) {
      self.synced = self.synced.max(block);
      let Some(p) = self.cipher.open(&self.secret_key, &sealed.ciphertext) else {
        continue;
      };
      let c = Commitment::new(p.bucket, p.value, owner, p.salt);
      if c.hash != sealed.commitment {
        warn!(commitment = %sealed.commitment, "sealed preimage does not open its commitment");
        continue;
      }
      if self.store.contains(&c.hash)? {
        continue;
      }
      self.ledger.membership_witness(&c.hash)?;
      self.store.put(c.clone())?;
      recovered.push(c);
    }
    info!(
      elapsed_ms = %t.elapsed().as_millis(),
      recovered = recovered.len(),
      block = self.synced,
      "sync"
    );
    Ok(recovered)
  }

  /// Executes `call` once.
  pub fn execute(&mut self, call: &Call) -> Result<Outcome, ShroudError> {
    let (_span, t) = start_span!("execute", function = %call.function);
    match self.run(call) {
      Ok(outcome) => {
        info!(
          elapsed_ms = %t.elapsed().as_millis(),
          block = outcome.receipt.block,
          "execute"
        );
        Ok(outcome)
      }
      Err(e) => {
        let dropped = self.ledger.rollback();
        warn!(error = %e, dropped, "call failed");
        Err(e)
      }
    }
  }

  /// Executes `call`, retrying retryable failures under the configured policy.
  pub fn execute_with_retry(&mut self, call: &Call) -> Result<Outcome, ShroudError> {
    let policy = self.config.retry.clone();
    with_retry(&policy, || self.execute(call))
  }

  fn usable(&self, bucket: &Bucket, reserved: &BTreeSet<Word>) -> Result<Vec<Commitment>, ShroudError> {
    let owner = self.public_key();
    Ok(
      self
        .store
        .get(bucket)?
        .into_iter()
        .filter(|c| c.owner_public_key == owner && !reserved.contains(&c.hash))
        .collect(),
    )
  }

  fn run(&mut self, call: &Call) -> Result<Outcome, ShroudError> {
    let program = Arc::clone(&self.program);
    let fragments = program.require(&call.function, Target::Orchestration)?;

    let mut frame = Frame::default();
    let declared: BTreeSet<&str> = fragments.params().map(|p| p.name.as_str()).collect();
    for (name, value) in &call.args {
      if !declared.contains(name.as_str()) {
        return Err(ShroudError::UnboundVariable { name: name.clone() });
      }
      frame.env.bind(name.clone(), value.clone());
    }
    for (slot, c) in &call.bound {
      frame.claim(slot, Some(c.clone()));
    }

    for stmt in fragments.statements() {
      self.reconcile_inputs(&mut frame, stmt)?;
    }

    let mut persist = vec![];
    for stmt in fragments.statements() {
      match stmt {
        Stmt::Fetch { name, source } => {
          let value = self.fetch(&mut frame, source)?;
          frame.env.bind(name.clone(), value);
        }
        Stmt::Let { .. } | Stmt::Reassign { .. } | Stmt::Assert { .. } | Stmt::Constrain { .. } => {
          exec(stmt, &mut frame.env, Mode::Derive)?
        }
        Stmt::Persist(op) => persist.push(op),
        Stmt::Import(_) | Stmt::Param(_) | Stmt::Reconcile { .. } | Stmt::Ledger(_) => {}
      }
    }

    let mut inputs = vec![];
    let mut public = vec![];
    for p in fragments.params() {
      let value = frame.env.get(&p.name)?.clone();
      if !value.has_type(&p.ty) {
        return Err(ShroudError::TypeMismatch {
          name: p.name.clone(),
          expected: format!("{:?}", p.ty),
        });
      }
      if p.visibility == Visibility::Public {
        public.push(value.clone());
      }
      inputs.push(value);
    }
    debug!(inputs = inputs.len(), public = public.len(), "input vector built");

    let env = &frame.env;
    let mut minted = vec![];
    let mut spent = vec![];
    for op in persist {
      match op {
        PersistOp::NewCommitment {
          bucket,
          value,
          salt,
          owner_public_key,
          commitment,
          encrypt,
        } => {
          let c = Commitment::new(
            resolve_bucket(bucket, env)?,
            env.word(value)?,
            env.word(owner_public_key)?,
            env.word(salt)?,
          );
          if c.hash != env.word(commitment)? {
            return Err(ShroudError::AssertionViolation {
              label: format!("{commitment} does not match its preimage"),
            });
          }
          minted.push((c, *encrypt));
        }
        PersistOp::Nullify { commitment, dummy } => {
          if let Some(flag) = dummy {
            if env.flag(flag)? {
              continue;
            }
          }
          spent.push(env.word(commitment)?);
        }
      }
    }

    let mut encrypted = vec![];
    for (c, _) in minted.iter().filter(|(_, encrypt)| *encrypt) {
      let ephemeral = Word::random(&mut self.rng);
      encrypted.push(EncryptedPreimage {
        commitment: c.hash,
        ciphertext: self
          .cipher
          .seal(&c.owner_public_key, &ephemeral, &Preimage::of(c))?,
      });
    }

    let proof = self.prover.prove(&call.function, &inputs)?;
    let receipt = self
      .ledger
      .submit(&call.function, &public, &proof, &encrypted)?;

    let owner = self.public_key();
    let mut created = vec![];
    for (c, _) in minted {
      if c.owner_public_key == owner {
        self.store.put(c.clone())?;
      }
      created.push(c);
    }
    for hash in &spent {
      self.store.mark_nullified(hash)?;
    }

    Ok(Outcome {
      receipt,
      created,
      nullified: spent,
      reconciliations: frame.reconciliations,
    })
  }

  fn reconcile_inputs(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<(), ShroudError> {
    let Stmt::Reconcile {
      state,
      inputs,
      bucket,
      amount,
      join,
      split,
    } = stmt
    else {
      return Ok(());
    };
    let bucket = resolve_bucket(bucket, &frame.env)?;
    let amount = eval_word(amount, &frame.env)?.to_biguint();
    let held: Vec<Commitment> = frame
      .slots
      .values()
      .flatten()
      .filter(|c| c.bucket() == bucket)
      .cloned()
      .collect();
    let config = self.config.clone();
    let mut transactor = BucketTransactor {
      runtime: self,
      state,
      bucket,
      join,
      split,
      reserved: &frame.reserved,
    };
    let reconciliation =
      reconcile(state, &amount, &mut transactor, &config).map_err(|e| match e {
        ShroudError::InsufficientFunds {
          state,
          amount,
          available,
          ..
        } => ShroudError::InsufficientFunds {
          state,
          amount,
          available,
          reserved: total(&held),
        },
        e => e,
      })?;
    for (slot, c) in inputs.iter().zip(&reconciliation.inputs) {
      frame.claim(slot, Some(c.clone()));
    }
    frame.reconciliations.push(reconciliation);
    Ok(())
  }

  fn slot_commitment(
    &self,
    frame: &mut Frame,
    slot: &str,
    bucket: &BucketRef,
    dummy_allowed: bool,
  ) -> Result<Option<Commitment>, ShroudError> {
    if let Some(bound) = frame.slots.get(slot) {
      return Ok(bound.clone());
    }
    let bucket = resolve_bucket(bucket, &frame.env)?;
    let found = self.usable(&bucket, &frame.reserved)?.into_iter().next();
    if found.is_none() && !dummy_allowed {
      return Err(ShroudError::WitnessUnavailable {
        reason: format!("no commitment for {slot}"),
      });
    }
    frame.claim(slot, found.clone());
    Ok(found)
  }

  fn fetch(&mut self, frame: &mut Frame, source: &Source) -> Result<Value, ShroudError> {
    Ok(match source {
      Source::SecretKey => Value::Word(self.secret_key),
      Source::CallerPublicKey => Value::Word(self.public_key()),
      Source::FreshSalt => Value::Word(Word::random(&mut self.rng)),
      Source::Preimage {
        slot,
        bucket,
        field,
        dummy_allowed,
      } => {
        let c = self.slot_commitment(frame, slot, bucket, *dummy_allowed)?;
        Value::Word(match (c, field) {
          (None, _) => Word::ZERO,
          (Some(c), PreimageField::Value) => c.value,
          (Some(c), PreimageField::Salt) => c.salt,
        })
      }
      Source::IsDummy { slot } => Value::Bool(frame.is_dummy(slot)?),
      Source::MembershipIndex { slot, commitment } => {
        if frame.is_dummy(slot)? {
          Value::Word(Word::ZERO)
        } else {
          let w = self
            .ledger
            .membership_witness(&frame.env.word(commitment)?)?;
          Value::Word(Word::from_u64(w.index))
        }
      }
      Source::MembershipPath { slot, commitment } => {
        if frame.is_dummy(slot)? {
          Value::Path(vec![Word::ZERO; self.config.commitment_tree_height])
        } else {
          let w = self
            .ledger
            .membership_witness(&frame.env.word(commitment)?)?;
          Value::Path(w.path)
        }
      }
      Source::CommitmentRoot => Value::Word(self.ledger.commitment_root()),
      Source::NullifierRoot => Value::Word(self.ledger.nullifier_root()),
      Source::NonMembershipPath { nullifier, insert } => {
        let n = frame.env.word(nullifier)?;
        let w = self.ledger.non_membership_witness(&n)?;
        if *insert {
          self.ledger.speculative_insert(n)?;
        }
        Value::Path(w.path)
      }
    })
  }
}

/// Runs the join and split built-ins of one bucket through the runtime.
struct BucketTransactor<'a, S, L, P, R> {
  runtime: &'a mut Runtime<S, L, P, R>,
  state: &'a str,
  bucket: Bucket,
  join: &'a str,
  split: &'a str,
  reserved: &'a BTreeSet<Word>,
}

impl<S, L, P, R> BucketTransactor<'_, S, L, P, R> {
  fn builtin(&self, function: &str) -> Call {
    let call = Call::new(function);
    match self.bucket.mapping_key {
      Some(key) => call.arg(BUILTIN_KEY, key),
      None => call,
    }
  }

  fn slot(&self, index: usize) -> String {
    SlotName::indexed(self.state, index).to_string()
  }
}

impl<S, L, P, R> Transactor for BucketTransactor<'_, S, L, P, R>
where
  S: CommitmentStore,
  L: Ledger,
  P: ProofService,
  R: RngCore,
{
  fn commitments(&mut self) -> Result<Vec<Commitment>, ShroudError> {
    self.runtime.usable(&self.bucket, self.reserved)
  }

  fn join(&mut self, inputs: &[Commitment; 2]) -> Result<(), ShroudError> {
    let call = self
      .builtin(self.join)
      .bind(self.slot(0), inputs[0].clone())
      .bind(self.slot(1), inputs[1].clone());
    self.runtime.execute(&call).map(|_| ())
  }

  fn split(&mut self, input: &Commitment, amount: &BigUint) -> Result<(), ShroudError> {
    let call = self
      .builtin(self.split)
      .arg(SPLIT_AMOUNT, Word::from_biguint(amount)?)
      .bind(self.slot(0), input.clone());
    self.runtime.execute(&call).map(|_| ())
  }
}
