//! A keystream cipher keyed by the owner's public key.
//!
//! The keystream is SHA3-256 over the owner's public key, the ephemeral word
//! and a block counter. Anyone who knows the owner's public key can open the
//! box, so it hides nothing from other parties; it stands in for an
//! ephemeral-key exchange the same way [`super::MockProver`] stands in for a
//! proof system.
use crate::{
  commitment::public_key,
  errors::ShroudError,
  field::{WORD_BYTES, Word},
  traits::{Preimage, PreimageCipher},
};
use sha3::{Digest, Sha3_256};

const DOMAIN: &[u8] = b"shroud/preimage";

fn keystream(owner_public_key: &Word, ephemeral: &Word, len: usize) -> Vec<u8> {
  let mut out = Vec::with_capacity(len);
  let mut block = 0u64;
  while out.len() < len {
    let mut hasher = Sha3_256::new();
    hasher.update(DOMAIN);
    hasher.update(owner_public_key.0);
    hasher.update(ephemeral.0);
    hasher.update(block.to_le_bytes());
    out.extend_from_slice(&hasher.finalize());
    block += 1;
  }
  out.truncate(len);
  out
}

fn xor(bytes: &mut [u8], stream: &[u8]) {
  bytes.iter_mut().zip(stream).for_each(|(b, k)| *b ^= k);
}

/// Seals `(owner, preimage)` under a keystream; the owner copy lets a holder of
/// the wrong key reject a box without guessing.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockCipher;

impl PreimageCipher for MockCipher {
  fn seal(
    &self,
    owner_public_key: &Word,
    ephemeral: &Word,
    preimage: &Preimage,
  ) -> Result<Vec<u8>, ShroudError> {
    let mut body =
      bincode::serialize(&(owner_public_key, preimage)).map_err(|e| ShroudError::CipherError {
        reason: e.to_string(),
      })?;
    let ks = keystream(owner_public_key, ephemeral, body.len());
    xor(&mut body, &ks);
    let mut out = ephemeral.0.to_vec();
    out.extend(body);
    Ok(out)
  }

  fn open(&self, secret_key: &Word, ciphertext: &[u8]) -> Option<Preimage> {
    if ciphertext.len() <= WORD_BYTES {
      return None;
    }
    let (head, body) = ciphertext.split_at(WORD_BYTES);
    let ephemeral = Word(head.try_into().ok()?);
    let owner = public_key(secret_key);
    let mut body = body.to_vec();
    let ks = keystream(&owner, &ephemeral, body.len());
    xor(&mut body, &ks);
    let (sealed_for, preimage): (Word, Preimage) = bincode::deserialize(&body).ok()?;
    (sealed_for == owner).then_some(preimage)
  }
}
