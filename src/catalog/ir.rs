//! Target-neutral statements emitted by protocol steps.
//!
//! Each target keeps the statement kinds it can express: the circuit keeps
//! parameters, bindings and assertions; the contract keeps public parameters and
//! ledger operations; the orchestration program keeps everything it needs to
//! compute witnesses and persist results.
use crate::field::Word;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Whether a parameter is revealed to the verifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
  /// Part of the public input vector
  Public,
  /// Known only to the prover
  Private,
}

/// Parameter and value types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
  /// A field word
  Field,
  /// A boolean flag
  Bool,
  /// A sibling path of the given height
  Path(usize),
}

/// A declared input of a synthesized function.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
  /// Variable name
  pub name: String,
  /// Value type
  pub ty: Ty,
  /// Public or private
  pub visibility: Visibility,
}

impl Param {
  /// A private field parameter.
  pub fn private(name: impl Into<String>) -> Self {
    Param {
      name: name.into(),
      ty: Ty::Field,
      visibility: Visibility::Private,
    }
  }

  /// A public field parameter.
  pub fn public(name: impl Into<String>) -> Self {
    Param {
      name: name.into(),
      ty: Ty::Field,
      visibility: Visibility::Public,
    }
  }

  /// Overrides the type.
  pub fn with_ty(mut self, ty: Ty) -> Self {
    self.ty = ty;
    self
  }
}

/// Library modules a fragment depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Import {
  /// The protocol hash
  Hash,
  /// Commitment tree membership
  CommitmentTree,
  /// Nullifier tree non-membership
  NullifierTree,
  /// Proof verification on the ledger
  Verifier,
  /// Local commitment persistence
  CommitmentStore,
  /// Proof generation
  Prover,
}

/// Expressions over named values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
  /// A variable in scope
  Var(String),
  /// A constant word
  Const(Word),
  /// A constant flag
  Bool(bool),
  /// `H(args...)`
  Hash(Vec<Expr>),
  /// Integer addition
  Add(Box<Expr>, Box<Expr>),
  /// Integer subtraction; underflow is a violation
  Sub(Box<Expr>, Box<Expr>),
  /// `lhs >= rhs` over integers
  Ge(Box<Expr>, Box<Expr>),
  /// Equality of two values of the same type
  Eq(Box<Expr>, Box<Expr>),
  /// Boolean disjunction
  Or(Box<Expr>, Box<Expr>),
  /// `cond ? then : otherwise`
  Select {
    /// Condition
    cond: Box<Expr>,
    /// Value when true
    then: Box<Expr>,
    /// Value when false
    otherwise: Box<Expr>,
  },
  /// Root of an append-only Merkle tree given a leaf, its index and sibling path
  MerkleRoot {
    /// Leaf word
    leaf: Box<Expr>,
    /// Leaf position
    index: Box<Expr>,
    /// Sibling path, bottom-up
    path: Box<Expr>,
  },
  /// Root of a keyed sparse tree given a key, the leaf stored under it and a path
  SmtRoot {
    /// Key; its low bits select the position
    key: Box<Expr>,
    /// Leaf stored under the key
    leaf: Box<Expr>,
    /// Sibling path, bottom-up
    path: Box<Expr>,
  },
}

impl Expr {
  /// Variable reference.
  pub fn var(name: impl Into<String>) -> Self {
    Expr::Var(name.into())
  }

  /// Constant zero.
  pub fn zero() -> Self {
    Expr::Const(Word::ZERO)
  }

  /// `lhs + rhs`
  pub fn add(lhs: Expr, rhs: Expr) -> Self {
    Expr::Add(Box::new(lhs), Box::new(rhs))
  }

  /// `lhs - rhs`
  pub fn sub(lhs: Expr, rhs: Expr) -> Self {
    Expr::Sub(Box::new(lhs), Box::new(rhs))
  }

  /// `lhs >= rhs`
  pub fn ge(lhs: Expr, rhs: Expr) -> Self {
    Expr::Ge(Box::new(lhs), Box::new(rhs))
  }

  /// `lhs == rhs`
  pub fn eq(lhs: Expr, rhs: Expr) -> Self {
    Expr::Eq(Box::new(lhs), Box::new(rhs))
  }

  /// `lhs || rhs`
  pub fn or(lhs: Expr, rhs: Expr) -> Self {
    Expr::Or(Box::new(lhs), Box::new(rhs))
  }

  /// `cond ? then : otherwise`
  pub fn select(cond: Expr, then: Expr, otherwise: Expr) -> Self {
    Expr::Select {
      cond: Box::new(cond),
      then: Box::new(then),
      otherwise: Box::new(otherwise),
    }
  }

  /// Sum of a non-empty list of terms, left-associated.
  pub fn sum(terms: impl IntoIterator<Item = Expr>) -> Self {
    let mut terms = terms.into_iter();
    let first = terms.next().unwrap_or_else(Expr::zero);
    terms.fold(first, Expr::add)
  }
}

/// Where the orchestration program obtains a value it cannot compute.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
  /// The caller's secret key
  SecretKey,
  /// `H(secretKey)` of the caller
  CallerPublicKey,
  /// A fresh random salt
  FreshSalt,
  /// A field of the commitment bound to `slot`
  Preimage {
    /// Slot whose commitment is read
    slot: String,
    /// Bucket to look the commitment up in when nothing is bound yet
    bucket: BucketRef,
    /// Which preimage field
    field: PreimageField,
    /// Whether a missing commitment yields the zero dummy
    dummy_allowed: bool,
  },
  /// Whether `slot` is bound to the dummy commitment
  IsDummy {
    /// Slot to inspect
    slot: String,
  },
  /// Leaf index of a commitment in the commitment tree
  MembershipIndex {
    /// Slot the commitment belongs to
    slot: String,
    /// Variable holding the commitment hash
    commitment: String,
  },
  /// Sibling path of a commitment in the commitment tree
  MembershipPath {
    /// Slot the commitment belongs to
    slot: String,
    /// Variable holding the commitment hash
    commitment: String,
  },
  /// Current commitment tree root
  CommitmentRoot,
  /// Confirmed nullifier tree root
  NullifierRoot,
  /// Non-membership path of a nullifier, optionally inserting it speculatively
  NonMembershipPath {
    /// Variable holding the nullifier
    nullifier: String,
    /// Whether the nullifier is inserted into the pending overlay
    insert: bool,
  },
}

/// Field of a commitment preimage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreimageField {
  /// Committed value
  Value,
  /// Salt
  Salt,
}

/// Identifies a bucket in terms of in-scope values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketRef {
  /// Expression for the effective state variable id
  pub state_var_id: Expr,
  /// Name of the in-scope mapping key
  pub mapping_key: Option<String>,
}

/// Ledger-side checks and effects performed by the verifier contract.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerOp {
  /// The claimed nullifier root equals the stored one
  NullifierRootMatches {
    /// Variable holding the claimed root
    root: String,
  },
  /// The nullifier has not been seen; record it
  NullifierUnused {
    /// Variable holding the nullifier
    nullifier: String,
  },
  /// Replace the stored nullifier root after all insertions
  AdvanceNullifierRoot {
    /// Variable holding the resulting root
    latest: String,
  },
  /// The claimed commitment root is one the ledger has produced
  KnownCommitmentRoot {
    /// Variable holding the claimed root
    root: String,
  },
  /// Append a commitment to the commitment tree
  InsertCommitment {
    /// Variable holding the new commitment
    commitment: String,
  },
  /// Publish the preimage of a commitment encrypted for its owner; the
  /// transaction must carry exactly one ciphertext for it
  EmitEncrypted {
    /// Variable holding the new commitment
    commitment: String,
  },
  /// Verify the proof against the listed public inputs
  VerifyProof {
    /// Public inputs in proof order
    inputs: Vec<String>,
  },
}

/// Local persistence performed once the ledger accepts the transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistOp {
  /// Store a newly minted commitment
  NewCommitment {
    /// Bucket of the commitment
    bucket: BucketRef,
    /// Variable holding the value
    value: String,
    /// Variable holding the salt
    salt: String,
    /// Variable holding the owner public key
    owner_public_key: String,
    /// Variable holding the hash
    commitment: String,
    /// Whether the preimage is sealed for an owner other than the caller
    encrypt: bool,
  },
  /// Mark a consumed commitment as nullified
  Nullify {
    /// Variable holding the consumed commitment hash
    commitment: String,
    /// Flag that, when set, means nothing real was consumed
    dummy: Option<String>,
  },
}

/// One emitted statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stmt {
  /// Dependency on a library module
  Import(Import),
  /// Parameter declaration
  Param(Param),
  /// Bind a new name
  Let {
    /// Name to bind
    name: String,
    /// Value
    expr: Expr,
  },
  /// Rebind an existing name
  Reassign {
    /// Name to rebind
    name: String,
    /// Value
    expr: Expr,
  },
  /// A boolean expression that must hold
  Assert {
    /// Human-readable label reported on failure
    label: String,
    /// Condition
    expr: Expr,
  },
  /// A supplied parameter must equal `expr`; off-chain code computes it from `expr`
  Constrain {
    /// Parameter name
    name: String,
    /// Defining expression
    expr: Expr,
  },
  /// Obtain a value from the environment
  Fetch {
    /// Name to bind
    name: String,
    /// Where the value comes from
    source: Source,
  },
  /// Select input commitments for a decrement, joining or splitting as needed
  Reconcile {
    /// Variable being decremented
    state: String,
    /// Slots receiving the selected inputs
    inputs: Vec<String>,
    /// Bucket being decremented
    bucket: BucketRef,
    /// Amount being removed
    amount: Expr,
    /// Join function for this bucket
    join: String,
    /// Split function for this bucket
    split: String,
  },
  /// Ledger check or effect
  Ledger(LedgerOp),
  /// Local persistence after confirmation
  Persist(PersistOp),
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Expr::Var(name) => write!(f, "{name}"),
      Expr::Const(w) if w.is_zero() => write!(f, "0"),
      Expr::Const(w) => write!(f, "{w}"),
      Expr::Bool(b) => write!(f, "{b}"),
      Expr::Hash(args) => {
        write!(f, "hash(")?;
        for (i, a) in args.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{a}")?;
        }
        write!(f, ")")
      }
      Expr::Add(a, b) => write!(f, "({a} + {b})"),
      Expr::Sub(a, b) => write!(f, "({a} - {b})"),
      Expr::Ge(a, b) => write!(f, "({a} >= {b})"),
      Expr::Eq(a, b) => write!(f, "({a} == {b})"),
      Expr::Or(a, b) => write!(f, "({a} || {b})"),
      Expr::Select {
        cond,
        then,
        otherwise,
      } => write!(f, "({cond} ? {then} : {otherwise})"),
      Expr::MerkleRoot { leaf, index, path } => write!(f, "merkleRoot({leaf}, {index}, {path})"),
      Expr::SmtRoot { key, leaf, path } => write!(f, "smtRoot({key}, {leaf}, {path})"),
    }
  }
}
