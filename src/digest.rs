//! Digests and the protocol hash.
//!
//! This module provides the `Digestible` trait for types that can be converted
//! to byte representations, the `SimpleDigestible` marker trait for serializable
//! types, and the `DigestComputer` utility for computing SHA3-256 digests of
//! them. Fragment digests make repeated synthesis comparable byte for byte.
//!
//! [`hash`] is the arity-aware hash `H` used by every protocol step.

use crate::{errors::ShroudError, field::Word};
use bincode::Options;
use serde::Serialize;
use sha3::{Digest, Sha3_256};
use std::io;

/// Trait for components with potentially discrete digests to be included in their container's digest.
pub trait Digestible {
  /// Write the byte representation of Self in a byte buffer
  fn write_bytes<W: Sized + io::Write>(&self, byte_sink: &mut W) -> Result<(), io::Error>;
}

/// Marker trait to be implemented for types that implement `Digestible` and `Serialize`.
/// Their instances will be serialized to bytes then digested.
pub trait SimpleDigestible: Serialize {}

impl<T: SimpleDigestible> Digestible for T {
  fn write_bytes<W: Sized + io::Write>(&self, byte_sink: &mut W) -> Result<(), io::Error> {
    let config = bincode::DefaultOptions::new()
      .with_little_endian()
      .with_fixint_encoding();
    // Note: bincode recursively length-prefixes every field!
    config
      .serialize_into(byte_sink, self)
      .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
  }
}

/// Computes SHA3-256 digests of `Digestible` instances.
pub struct DigestComputer<'a, T> {
  inner: &'a T,
}

impl<'a, T: Digestible> DigestComputer<'a, T> {
  /// Create a new DigestComputer
  pub fn new(inner: &'a T) -> Self {
    DigestComputer { inner }
  }

  /// Compute the digest of a `Digestible` instance.
  pub fn digest(&self) -> Result<Word, ShroudError> {
    let mut hasher = Sha3_256::new();
    self
      .inner
      .write_bytes(&mut hasher)
      .map_err(|e| ShroudError::DigestError {
        reason: e.to_string(),
      })?;
    Ok(Word(hasher.finalize().into()))
  }
}

/// The protocol hash `H(x_1, ..., x_n)`.
///
/// The arity is absorbed before the inputs so that `H(a, b)` and `H(a, b, 0)`
/// never coincide. Output is truncated to 248 bits.
pub fn hash(inputs: &[Word]) -> Word {
  let mut hasher = Sha3_256::new();
  hasher.update((inputs.len() as u64).to_le_bytes());
  for w in inputs {
    hasher.update(w.0);
  }
  Word(hasher.finalize().into()).truncate()
}
