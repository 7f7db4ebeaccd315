//! Configuration shared by synthesis and the runtime.
use crate::errors::ShroudError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest supported tree height; positions are kept in a `u64`.
pub const MAX_TREE_HEIGHT: usize = 48;

/// Retry and backoff policy for latency-bound ledger interactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts, including the first
  pub max_attempts: usize,
  /// Delay before the first retry
  pub initial_backoff_ms: u64,
  /// Growth factor applied to the delay after each retry
  pub backoff_multiplier: u32,
  /// Upper bound for any single delay
  pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    RetryPolicy {
      max_attempts: 3,
      initial_backoff_ms: 50,
      backoff_multiplier: 2,
      max_backoff_ms: 2_000,
    }
  }
}

impl RetryPolicy {
  /// A policy that retries `max_attempts` times without sleeping.
  pub fn immediate(max_attempts: usize) -> Self {
    RetryPolicy {
      max_attempts,
      initial_backoff_ms: 0,
      backoff_multiplier: 1,
      max_backoff_ms: 0,
    }
  }

  /// Delay to wait before retry number `retry` (1-based).
  pub fn delay(&self, retry: usize) -> Duration {
    let mut ms = self.initial_backoff_ms;
    for _ in 1..retry {
      ms = ms.saturating_mul(self.backoff_multiplier as u64);
      if ms >= self.max_backoff_ms {
        break;
      }
    }
    Duration::from_millis(ms.min(self.max_backoff_ms))
  }
}

/// Parameters for synthesis and execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Height of the append-only commitment tree
  pub commitment_tree_height: usize,
  /// Height of the nullifier tree; nullifiers are keyed by this many low bits
  pub nullifier_tree_height: usize,
  /// Hard ceiling on reconciliation transitions for one decrement
  pub max_reconcile_steps: usize,
  /// Retry policy for submissions and witness queries
  pub retry: RetryPolicy,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      commitment_tree_height: 32,
      nullifier_tree_height: 32,
      max_reconcile_steps: 64,
      retry: RetryPolicy::default(),
    }
  }
}

impl Config {
  /// Checks that every value is usable.
  pub fn validate(&self) -> Result<(), ShroudError> {
    for (name, height) in [
      ("commitment_tree_height", self.commitment_tree_height),
      ("nullifier_tree_height", self.nullifier_tree_height),
    ] {
      if height == 0 || height > MAX_TREE_HEIGHT {
        return Err(ShroudError::InvalidConfig {
          reason: format!("{name} must be in 1..={MAX_TREE_HEIGHT}, got {height}"),
        });
      }
    }
    if self.retry.max_attempts == 0 {
      return Err(ShroudError::InvalidConfig {
        reason: "retry.max_attempts must be positive".to_string(),
      });
    }
    if self.max_reconcile_steps == 0 {
      return Err(ShroudError::InvalidConfig {
        reason: "max_reconcile_steps must be positive".to_string(),
      });
    }
    Ok(())
  }
}
