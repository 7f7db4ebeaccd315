//! Reference Merkle trees: an append-only commitment tree and a keyed
//! nullifier tree with a rollback-able overlay of pending insertions.
pub mod commitments;
pub mod nullifiers;
pub mod sparse;

pub use commitments::{CommitmentTree, MembershipWitness};
pub use nullifiers::{NonMembershipWitness, NullifierOverlay, NullifierTree};
pub use sparse::{SparseMerkleTree, root_from_path};
