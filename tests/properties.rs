use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shroud::{
  Indicator, Word,
  commitment::{commitment_hash, nullifier_hash},
  slots::{BLOCK_SIZE, SlotAllocation},
  tree::{CommitmentTree, NullifierTree, root_from_path},
};

fn words(rng: &mut StdRng, n: usize) -> Vec<Word> {
  (0..n).map(|_| Word::random(rng)).collect()
}

fn indicator(m: usize, n: usize) -> Indicator {
  let mut ind = Indicator::partitioned("balance", Word::from_u64(1));
  for i in 0..m {
    ind = ind.increment(format!("inc{i}"));
  }
  for j in 0..n {
    ind = ind.decrement(format!("dec{j}"));
  }
  ind
}

#[test]
fn slots_of_two_decrements_fixed() {
  let alloc = SlotAllocation::for_indicator(&indicator(2, 2));
  assert_eq!(alloc.indices(), (0..2 + 2 * BLOCK_SIZE).collect::<Vec<_>>());
  assert_eq!(alloc.decrements[1].start, 5);
}

proptest! {
  #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
  #[test]
  fn slots_are_disjoint_and_dense(m in 0usize..=20, n in 0usize..=20) {
    let alloc = SlotAllocation::for_indicator(&indicator(m, n));
    let indices = alloc.indices();
    prop_assert_eq!(indices.len(), m + n * BLOCK_SIZE);
    prop_assert_eq!(indices, (0..m + n * BLOCK_SIZE).collect::<Vec<_>>());
  }

  #[test]
  fn commitment_hash_binds_every_field(field in 0usize..4, seed in any::<u64>()) {
    let mut rng = StdRng::seed_from_u64(seed);
    let preimage = words(&mut rng, 4);
    let mut perturbed = preimage.clone();
    perturbed[field] = Word::random(&mut rng);
    prop_assume!(perturbed[field] != preimage[field]);

    let h = |w: &[Word]| commitment_hash(&w[0], &w[1], &w[2], &w[3]);
    prop_assert_ne!(h(&preimage), h(&perturbed));
  }

  #[test]
  fn nullifier_hash_binds_every_field(field in 0usize..3, seed in any::<u64>()) {
    let mut rng = StdRng::seed_from_u64(seed);
    let preimage = words(&mut rng, 3);
    let mut perturbed = preimage.clone();
    perturbed[field] = Word::random(&mut rng);
    prop_assume!(perturbed[field] != preimage[field]);

    let h = |w: &[Word]| nullifier_hash(&w[0], &w[1], &w[2]);
    prop_assert_ne!(h(&preimage), h(&perturbed));
  }

  #[test]
  fn membership_witnesses_resolve(k in 1usize..=24, seed in any::<u64>()) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tree = CommitmentTree::new(8).unwrap();
    let leaves = words(&mut rng, k);
    for leaf in &leaves {
      tree.insert(*leaf).unwrap();
    }
    let member = leaves[rng.gen_range(0..k)];
    let w = tree.witness(&member).unwrap();
    prop_assert_eq!(root_from_path(member, w.index, &w.path), tree.root());
    prop_assert_ne!(root_from_path(Word::random(&mut rng), w.index, &w.path), tree.root());
  }

  #[test]
  fn nullifier_insertion_follows_the_witness(k in 1usize..=16, seed in any::<u64>()) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tree = NullifierTree::new(32).unwrap();
    for n in words(&mut rng, k) {
      let w = tree.witness(&n).unwrap();
      let key = tree.key(&n);
      prop_assert_eq!(root_from_path(Word::ZERO, key, &w.path), tree.root());
      let root = tree.insert(n).unwrap();
      prop_assert_eq!(root_from_path(n, key, &w.path), root);
      prop_assert!(tree.insert(n).is_err());
    }
  }
}
