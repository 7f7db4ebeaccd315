use num_bigint::BigUint;
use proptest::prelude::*;
use shroud::{
  Config, Word,
  commitment::{Bucket, Commitment},
  config::RetryPolicy,
  errors::ShroudError,
  reconcile::{Action, Selection, Transactor, reconcile, select, total},
};

/// Applies joins and splits to an in-memory set and records what it saw.
struct Pool {
  live: Vec<Commitment>,
  minted: u64,
}

impl Pool {
  fn new(values: &[u64]) -> Self {
    let mut pool = Pool {
      live: vec![],
      minted: 0,
    };
    for v in values {
      pool.mint(BigUint::from(*v));
    }
    pool
  }

  fn mint(&mut self, value: BigUint) {
    self.minted += 1;
    self.live.push(Commitment::new(
      Bucket::plain(Word::from_u64(5)),
      Word::from_biguint(&value).unwrap(),
      Word::from_u64(77),
      Word::from_u64(self.minted),
    ));
  }

  fn take(&mut self, c: &Commitment) {
    let before = self.live.len();
    self.live.retain(|x| x.hash != c.hash);
    assert_eq!(self.live.len() + 1, before, "spent an unknown commitment");
  }
}

impl Transactor for Pool {
  fn commitments(&mut self) -> Result<Vec<Commitment>, ShroudError> {
    Ok(self.live.clone())
  }

  fn join(&mut self, inputs: &[Commitment; 2]) -> Result<(), ShroudError> {
    let sum = total(inputs);
    inputs.iter().for_each(|c| self.take(c));
    self.mint(sum);
    Ok(())
  }

  fn split(&mut self, input: &Commitment, amount: &BigUint) -> Result<(), ShroudError> {
    self.take(input);
    self.mint(amount.clone());
    self.mint(input.value.to_biguint() - amount);
    Ok(())
  }
}

fn config() -> Config {
  Config {
    retry: RetryPolicy::immediate(1),
    ..Config::default()
  }
}

fn values(cs: &[Commitment]) -> Vec<u64> {
  cs.iter().map(|c| c.value.low_bits(64)).collect()
}

#[test]
fn two_commitments_that_cover_are_used_directly() {
  let mut pool = Pool::new(&[4, 3]);
  let r = reconcile("b", &BigUint::from(7u64), &mut pool, &config()).unwrap();
  assert!(r.history.is_empty());
  assert_eq!(values(&r.inputs), vec![4, 3]);
}

#[test]
fn selection_ignores_store_order() {
  let forward = Pool::new(&[5, 5, 9]).live;
  let mut backward = forward.clone();
  backward.reverse();
  let amount = BigUint::from(5u64);
  assert_eq!(
    select("b", &forward, &amount).unwrap(),
    select("b", &backward, &amount).unwrap()
  );
  assert!(matches!(
    select("b", &forward, &amount).unwrap(),
    Selection::Sufficient(_)
  ));
}

proptest! {
  #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
  #[test]
  fn reconciliation_settles_or_reports_shortfall(
    vals in prop::collection::vec(1u64..50, 1..16),
    amount in 1u64..400,
  ) {
    let mut pool = Pool::new(&vals);
    let available: u64 = vals.iter().sum();
    match reconcile("b", &BigUint::from(amount), &mut pool, &config()) {
      Ok(r) => {
        prop_assert!(available >= amount);
        prop_assert!(values(&r.inputs).iter().sum::<u64>() >= amount);
        prop_assert_ne!(r.inputs[0].hash, r.inputs[1].hash);
        // every join removes one commitment; a split only happens once, on a lone commitment
        prop_assert!(r.history.len() <= vals.len());
        let splits = r.history.iter().filter(|a| matches!(a, Action::Split { .. })).count();
        prop_assert!(splits <= 1);
        prop_assert_eq!(total(&pool.live), BigUint::from(available));
        for c in &r.inputs {
          prop_assert!(pool.live.iter().any(|x| x.hash == c.hash));
        }
      }
      Err(ShroudError::InsufficientFunds { available: a, .. }) => {
        prop_assert!(available < amount);
        prop_assert_eq!(a, BigUint::from(available));
      }
      Err(e) => {
        prop_assert!(false, "unexpected error {}", e);
      }
    }
  }
}
