//! In-memory implementations of the runtime's services, for tests and local
//! experimentation.
pub mod chain;
pub mod cipher;
pub mod prover;
pub mod store;

pub use chain::LocalChain;
pub use cipher::MockCipher;
pub use prover::{MockProver, MockVerifier};
pub use store::MemoryStore;
