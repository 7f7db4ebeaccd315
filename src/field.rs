//! Field words: the unit every hash input, value, salt and key is expressed in.
use crate::errors::ShroudError;
use core::fmt;
use num_bigint::BigUint;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

/// Number of bytes in a word.
pub const WORD_BYTES: usize = 32;

/// A 256-bit big-endian word.
///
/// Hash outputs and random salts are truncated to 248 bits so they embed in any
/// field of at least that size.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Word(pub [u8; WORD_BYTES]);

impl Word {
  /// The zero word, also used as the empty-leaf and dummy sentinel.
  pub const ZERO: Word = Word([0u8; WORD_BYTES]);

  /// Builds a word from a small integer.
  pub fn from_u64(v: u64) -> Self {
    let mut bytes = [0u8; WORD_BYTES];
    bytes[WORD_BYTES - 8..].copy_from_slice(&v.to_be_bytes());
    Word(bytes)
  }

  /// Builds a word from an arbitrary integer, failing if it does not fit.
  pub fn from_biguint(v: &BigUint) -> Result<Self, ShroudError> {
    let raw = v.to_bytes_be();
    if raw.len() > WORD_BYTES {
      return Err(ShroudError::AssertionViolation {
        label: format!("value {v} exceeds {} bits", WORD_BYTES * 8),
      });
    }
    let mut bytes = [0u8; WORD_BYTES];
    bytes[WORD_BYTES - raw.len()..].copy_from_slice(&raw);
    Ok(Word(bytes))
  }

  /// The integer this word encodes.
  pub fn to_biguint(&self) -> BigUint {
    BigUint::from_bytes_be(&self.0)
  }

  /// Whether every byte is zero.
  pub fn is_zero(&self) -> bool {
    self.0.iter().all(|b| *b == 0)
  }

  /// Clears the top byte.
  pub fn truncate(mut self) -> Self {
    self.0[0] = 0;
    self
  }

  /// The low `bits` bits as an integer (`bits <= 64`).
  pub fn low_bits(&self, bits: usize) -> u64 {
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&self.0[WORD_BYTES - 8..]);
    let v = u64::from_be_bytes(tail);
    if bits >= 64 { v } else { v & ((1u64 << bits) - 1) }
  }

  /// Interprets the word as a tree position, failing if it does not fit in `bits`.
  pub fn to_position(&self, bits: usize) -> Result<u64, ShroudError> {
    let v = self.low_bits(64);
    let high_clear = self.0[..WORD_BYTES - 8].iter().all(|b| *b == 0);
    if !high_clear || (bits < 64 && v >> bits != 0) {
      return Err(ShroudError::TypeMismatch {
        name: self.to_string(),
        expected: format!("a {bits}-bit position"),
      });
    }
    Ok(v)
  }

  /// A uniformly random 248-bit word.
  pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
    let mut bytes = [0u8; WORD_BYTES];
    rng.fill_bytes(&mut bytes);
    Word(bytes).truncate()
  }
}

impl From<u64> for Word {
  fn from(v: u64) -> Self {
    Word::from_u64(v)
  }
}

impl fmt::Display for Word {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "0x{}", hex::encode(self.0))
  }
}

impl fmt::Debug for Word {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let small = self.0[..WORD_BYTES - 8].iter().all(|b| *b == 0);
    if small {
      write!(f, "Word({})", self.low_bits(64))
    } else {
      write!(f, "Word({})", &hex::encode(self.0)[..16])
    }
  }
}
