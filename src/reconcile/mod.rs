//! Commitment reconciliation.
//!
//! A decrement consumes exactly two input commitments. Before the decrement can
//! be proven, the owner's commitments in the bucket are brought into a shape
//! where two of them cover the amount, by joining the two smallest or by
//! splitting the only one. The engine is an explicit state machine:
//!
//! ```text
//! Selecting -> Sufficient                  (done)
//!           -> NeedJoin  -> join  -> Selecting   (also when rejected)
//!           -> NeedSplit -> split -> Selecting   (also when rejected)
//!           -> InsufficientFunds           (error)
//! ```
//!
//! Each join removes one usable commitment and a split only fires on a single
//! commitment, after which the pair is immediately sufficient, so the machine
//! settles within `O(n)` transitions. `Config::max_reconcile_steps` bounds it
//! regardless. A rejected join or split returns to `Selecting`, and rejections
//! are bounded by the configured [`RetryPolicy`].
use crate::{
  commitment::Commitment,
  config::{Config, RetryPolicy},
  errors::ShroudError,
  field::Word,
  start_span,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

mod select;

pub use select::{Selection, select, total};

/// Performs the join and split transactions for one bucket.
pub trait Transactor {
  /// The bucket's usable commitments: live, owned by the caller and not already
  /// claimed by the current call.
  fn commitments(&mut self) -> Result<Vec<Commitment>, ShroudError>;

  /// Replaces `inputs` with one commitment holding their sum.
  fn join(&mut self, inputs: &[Commitment; 2]) -> Result<(), ShroudError>;

  /// Replaces `input` with commitments of `amount` and of the remainder.
  fn split(&mut self, input: &Commitment, amount: &BigUint) -> Result<(), ShroudError>;
}

/// A transaction performed during reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
  /// Two commitments merged
  Join {
    /// Hashes of the merged commitments
    inputs: [Word; 2],
  },
  /// One commitment split off `amount`
  Split {
    /// Hash of the split commitment
    input: Word,
    /// Amount split off
    amount: BigUint,
  },
}

/// A finished reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
  /// The two selected inputs, in slot order
  pub inputs: [Commitment; 2],
  /// Transactions performed to reach them
  pub history: Vec<Action>,
}

#[derive(Debug)]
enum State {
  Selecting,
  NeedJoin([Commitment; 2]),
  NeedSplit(Commitment),
  Sufficient([Commitment; 2]),
}

/// Runs `op`, retrying retryable failures under `policy`.
pub fn with_retry<T>(
  policy: &RetryPolicy,
  mut op: impl FnMut() -> Result<T, ShroudError>,
) -> Result<T, ShroudError> {
  let mut attempt = 1;
  loop {
    match op() {
      Ok(v) => return Ok(v),
      Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
        let delay = policy.delay(attempt);
        warn!(attempt, delay_ms = %delay.as_millis(), error = %e, "retrying");
        std::thread::sleep(delay);
        attempt += 1;
      }
      Err(e) if e.is_retryable() => {
        return Err(ShroudError::RetriesExhausted {
          attempts: attempt,
          reason: e.to_string(),
        });
      }
      Err(e) => return Err(e),
    }
  }
}

/// Records a finished join or split. A retryable rejection sends the machine
/// back to selection until the retry budget is spent.
fn settle(
  state: &str,
  result: Result<(), ShroudError>,
  action: Action,
  history: &mut Vec<Action>,
  rejected: &mut usize,
  config: &Config,
) -> Result<State, ShroudError> {
  match result {
    Ok(()) => {
      history.push(action);
      Ok(State::Selecting)
    }
    Err(e) if e.is_retryable() => {
      *rejected += 1;
      if *rejected >= config.retry.max_attempts {
        return Err(ShroudError::RetriesExhausted {
          attempts: *rejected,
          reason: e.to_string(),
        });
      }
      let delay = config.retry.delay(*rejected);
      warn!(state, attempt = *rejected, delay_ms = %delay.as_millis(), error = %e, "reselecting");
      std::thread::sleep(delay);
      Ok(State::Selecting)
    }
    Err(e) => Err(e),
  }
}

/// Brings the bucket behind `transactor` to two inputs covering `amount`.
///
/// A join or split rejected with a retryable error is never resubmitted as is:
/// the machine goes back to `Selecting` so the next attempt works from the
/// bucket as it is now. Rejections count against `config.retry`.
pub fn reconcile<T: Transactor + ?Sized>(
  state: &str,
  amount: &BigUint,
  transactor: &mut T,
  config: &Config,
) -> Result<Reconciliation, ShroudError> {
  let (_span, t) = start_span!("reconcile", state = %state, amount = %amount);
  let mut history = vec![];
  let mut rejected = 0;
  let mut current = State::Selecting;

  for _ in 0..config.max_reconcile_steps {
    current = match current {
      State::Selecting => {
        let commitments = with_retry(&config.retry, || transactor.commitments())?;
        match select(state, &commitments, amount)? {
          Selection::Sufficient(pair) => State::Sufficient(pair),
          Selection::NeedJoin(pair) => State::NeedJoin(pair),
          Selection::NeedSplit(c) => State::NeedSplit(c),
        }
      }
      State::NeedJoin(pair) => {
        debug!(state, "join");
        let action = Action::Join {
          inputs: [pair[0].hash, pair[1].hash],
        };
        settle(state, transactor.join(&pair), action, &mut history, &mut rejected, config)?
      }
      State::NeedSplit(c) => {
        debug!(state, "split");
        let action = Action::Split {
          input: c.hash,
          amount: amount.clone(),
        };
        settle(state, transactor.split(&c, amount), action, &mut history, &mut rejected, config)?
      }
      State::Sufficient(inputs) => {
        info!(
          elapsed_ms = %t.elapsed().as_millis(),
          transactions = history.len(),
          rejected,
          "reconcile"
        );
        return Ok(Reconciliation { inputs, history });
      }
    };
  }
  Err(ShroudError::RetriesExhausted {
    attempts: config.max_reconcile_steps,
    reason: format!("reconciliation of {state} did not settle"),
  })
}
