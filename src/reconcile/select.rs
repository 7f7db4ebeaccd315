//! The selection rule run in the `Selecting` state.
use crate::{commitment::Commitment, errors::ShroudError};
use num_bigint::BigUint;
use num_traits::Zero;

/// Outcome of one selection over a bucket's usable commitments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
  /// Two inputs that together cover the amount
  Sufficient([Commitment; 2]),
  /// The only usable commitment must be split into the amount and a remainder
  NeedSplit(Commitment),
  /// The two smallest commitments must be joined
  NeedJoin([Commitment; 2]),
}

/// Sum of the commitments' values.
pub fn total(commitments: &[Commitment]) -> BigUint {
  commitments
    .iter()
    .fold(BigUint::zero(), |acc, c| acc + c.value.to_biguint())
}

/// Chooses what to do with `commitments` to spend `amount` of `state`.
///
/// Every decrement consumes two real commitments, so an empty bucket cannot
/// serve even a zero amount; that case is reported as `WitnessUnavailable`
/// rather than as a shortfall.
///
/// Ties between equal values are broken by commitment hash so the choice does
/// not depend on the order the store returns.
pub fn select(
  state: &str,
  commitments: &[Commitment],
  amount: &BigUint,
) -> Result<Selection, ShroudError> {
  if commitments.is_empty() && amount.is_zero() {
    return Err(ShroudError::WitnessUnavailable {
      reason: format!("{state} has no commitment to consume, even for a zero amount"),
    });
  }
  let available = total(commitments);
  if commitments.is_empty() || available < *amount {
    return Err(ShroudError::InsufficientFunds {
      state: state.to_string(),
      amount: amount.clone(),
      available,
      reserved: BigUint::zero(),
    });
  }

  let mut sorted: Vec<(BigUint, &Commitment)> = commitments
    .iter()
    .map(|c| (c.value.to_biguint(), c))
    .collect();
  sorted.sort_by(|(va, a), (vb, b)| va.cmp(vb).then_with(|| a.hash.cmp(&b.hash)));

  if let [(_, only)] = sorted.as_slice() {
    return Ok(Selection::NeedSplit((*only).clone()));
  }

  // exact match first, else the smallest commitment that covers the amount
  let covering = sorted
    .iter()
    .position(|(v, _)| v == amount)
    .or_else(|| sorted.iter().position(|(v, _)| v >= amount));
  if let Some(i) = covering {
    let first = sorted.remove(i).1.clone();
    let second = sorted[0].1.clone();
    return Ok(Selection::Sufficient([first, second]));
  }

  match sorted.as_slice() {
    [(_, small), (_, large)] => Ok(Selection::Sufficient([(*large).clone(), (*small).clone()])),
    _ => Ok(Selection::NeedJoin([sorted[0].1.clone(), sorted[1].1.clone()])),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{commitment::Bucket, field::Word};

  fn set(values: &[u64]) -> Vec<Commitment> {
    values
      .iter()
      .enumerate()
      .map(|(i, v)| {
        Commitment::new(
          Bucket::plain(Word::from_u64(1)),
          Word::from_u64(*v),
          Word::from_u64(2),
          Word::from_u64(i as u64),
        )
      })
      .collect()
  }

  fn values(cs: &[Commitment]) -> Vec<u64> {
    cs.iter().map(|c| c.value.low_bits(64)).collect()
  }

  #[test]
  fn test_insufficient_reports_total() {
    let err = select("b", &set(&[1, 1]), &BigUint::from(5u64)).unwrap_err();
    assert_eq!(
      err,
      ShroudError::InsufficientFunds {
        state: "b".to_string(),
        amount: BigUint::from(5u64),
        available: BigUint::from(2u64),
        reserved: BigUint::zero(),
      }
    );
    assert!(matches!(
      select("b", &[], &BigUint::from(1u64)),
      Err(ShroudError::InsufficientFunds { .. })
    ));
  }

  #[test]
  fn test_empty_bucket_with_zero_amount() {
    assert!(matches!(
      select("b", &[], &BigUint::zero()),
      Err(ShroudError::WitnessUnavailable { .. })
    ));
  }

  #[test]
  fn test_exact_match_preferred() {
    match select("b", &set(&[9, 4, 6]), &BigUint::from(4u64)).unwrap() {
      Selection::Sufficient(pair) => assert_eq!(values(&pair), vec![4, 6]),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn test_smallest_cover_then_smallest_other() {
    match select("b", &set(&[2, 9, 6, 1]), &BigUint::from(5u64)).unwrap() {
      Selection::Sufficient(pair) => assert_eq!(values(&pair), vec![6, 1]),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn test_pair_without_cover() {
    match select("b", &set(&[3, 4]), &BigUint::from(6u64)).unwrap() {
      Selection::Sufficient(pair) => assert_eq!(values(&pair), vec![4, 3]),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn test_split_and_join_cases() {
    assert!(matches!(
      select("b", &set(&[10]), &BigUint::from(4u64)).unwrap(),
      Selection::NeedSplit(_)
    ));
    assert!(matches!(
      select("b", &set(&[4]), &BigUint::from(4u64)).unwrap(),
      Selection::NeedSplit(_)
    ));
    match select("b", &set(&[3, 1, 3, 2]), &BigUint::from(8u64)).unwrap() {
      Selection::NeedJoin(pair) => assert_eq!(values(&pair), vec![1, 2]),
      other => panic!("unexpected {other:?}"),
    }
  }
}
