//! This library synthesizes private-state protocols and runs them.
//!
//! A function's secret state variables are described by [`indicator::Indicator`]s.
//! Synthesis orders the protocol steps each variable needs (key derivation,
//! proof of secret-key ownership, nullification, preimage and membership
//! checks, new commitments) and emits matching fragments for three targets: a
//! circuit, a verifier contract and an orchestration program. The
//! [`runtime`] executes orchestration programs against a commitment store, a
//! ledger and a prover, reconciling partitioned state into exactly two input
//! commitments per decrement.
#![deny(future_incompatible, nonstandard_style, rust_2018_idioms)]
#![warn(unused, missing_docs)]
#![allow(clippy::type_complexity)]
#![forbid(unsafe_code)]

// public modules
pub mod assembler;
pub mod catalog;
pub mod commitment;
pub mod config;
pub mod digest;
pub mod errors;
pub mod eval;
pub mod field;
pub mod indicator;
pub mod provider;
pub mod reconcile;
pub mod runtime;
pub mod slots;
pub mod traits;
pub mod tree;

/// Start a span + timer, return `(Span, Instant)`.
macro_rules! start_span {
    ($name:expr $(, $($fmt:tt)+)?) => {{
        let span       = info_span!($name $(, $($fmt)+)?);
        let span_clone = span.clone();    // lives as long as the guard
        let _guard      = span_clone.enter();
        (span, Instant::now())
    }};
}
pub(crate) use start_span;

pub use assembler::{FunctionFragments, Program, Target};
pub use config::Config;
pub use errors::ShroudError;
pub use field::Word;
pub use indicator::{FunctionIndicators, Indicator};
pub use runtime::{Call, Outcome, Runtime};
