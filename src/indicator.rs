//! Classification of a secret state variable within one function.
use crate::{
  catalog::ir::{Param, Stmt},
  errors::ShroudError,
  field::Word,
};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a secret variable is represented by commitments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
  /// At most one live commitment
  Whole,
  /// A multiset of commitments whose values sum to the variable
  Partitioned,
}

/// Who owns commitments minted for a variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
  /// The caller, via the public key of their secret key
  Caller,
  /// The public key held in the named function input
  Param(String),
}

impl fmt::Display for Owner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Owner::Caller => write!(f, "caller"),
      Owner::Param(p) => write!(f, "{p}"),
    }
  }
}

/// An increment or decrement of a partitioned variable by a named amount.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
  /// Name of the in-scope value holding the amount
  pub amount: String,
}

impl Ref {
  /// A reference to the named amount.
  pub fn new(amount: impl Into<String>) -> Self {
    Ref {
      amount: amount.into(),
    }
  }
}

/// Classification of one state variable in one function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
  /// Variable name; slot names derive from it
  pub name: String,
  /// Declared identifier (the mapping id for mappings)
  pub state_var_id: Word,
  /// Whole or partitioned
  pub variant: Variant,
  /// Whether the variable is a mapping entry
  pub is_mapping: bool,
  /// Name of the in-scope mapping key
  pub mapping_key: Option<String>,
  /// Name of the mapping, for rendering
  pub mapping_name: Option<String>,
  /// The current commitment is consumed
  pub is_nullified: bool,
  /// The current value is read
  pub is_accessed: bool,
  /// Commitments belong to a specific owner
  pub is_owned: bool,
  /// Owner of newly minted commitments; the caller when absent
  pub owner: Option<Owner>,
  /// A whole variable may not have a commitment yet
  pub initialisation_required: bool,
  /// A new commitment is minted for a whole variable
  pub new_commitment_required: bool,
  /// Increments in declaration order
  pub increments: Vec<Ref>,
  /// Decrements in declaration order
  pub decrements: Vec<Ref>,
}

impl Indicator {
  /// A whole variable with every flag cleared.
  pub fn whole(name: impl Into<String>, state_var_id: Word) -> Self {
    Indicator {
      name: name.into(),
      state_var_id,
      variant: Variant::Whole,
      is_mapping: false,
      mapping_key: None,
      mapping_name: None,
      is_nullified: false,
      is_accessed: false,
      is_owned: true,
      owner: None,
      initialisation_required: false,
      new_commitment_required: false,
      increments: vec![],
      decrements: vec![],
    }
  }

  /// A partitioned variable with no increments or decrements yet.
  pub fn partitioned(name: impl Into<String>, state_var_id: Word) -> Self {
    Indicator {
      variant: Variant::Partitioned,
      ..Indicator::whole(name, state_var_id)
    }
  }

  /// Marks the variable as an entry of `mapping` keyed by the in-scope `key`.
  pub fn in_mapping(mut self, mapping: impl Into<String>, key: impl Into<String>) -> Self {
    self.is_mapping = true;
    self.mapping_name = Some(mapping.into());
    self.mapping_key = Some(key.into());
    self
  }

  /// Adds an increment by the named amount.
  pub fn increment(mut self, amount: impl Into<String>) -> Self {
    self.increments.push(Ref::new(amount));
    self
  }

  /// Adds a decrement by the named amount; decrements nullify.
  pub fn decrement(mut self, amount: impl Into<String>) -> Self {
    self.decrements.push(Ref::new(amount));
    self.is_nullified = true;
    self
  }

  /// The effective owner of minted commitments.
  pub fn owner(&self) -> Owner {
    self.owner.clone().unwrap_or(Owner::Caller)
  }

  /// A whole variable whose first spend may consume the zero dummy.
  pub fn allows_dummy(&self) -> bool {
    self.variant == Variant::Whole && self.initialisation_required && self.is_nullified
  }

  fn invalid(&self, reason: impl Into<String>) -> ShroudError {
    ShroudError::InvalidIndicator {
      name: self.name.clone(),
      reason: reason.into(),
    }
  }

  /// Checks the classification invariants.
  pub fn validate(&self) -> Result<(), ShroudError> {
    if self.name.is_empty() {
      return Err(self.invalid("empty name"));
    }
    if self.is_mapping != self.mapping_key.is_some() {
      return Err(self.invalid("isMapping requires exactly one mapping key"));
    }
    match self.variant {
      Variant::Whole => {
        if !self.increments.is_empty() || !self.decrements.is_empty() {
          return Err(self.invalid("increments and decrements need a partitioned variable"));
        }
      }
      Variant::Partitioned => {
        if self.is_accessed {
          return Err(self.invalid("a partitioned variable cannot be read directly"));
        }
        if self.initialisation_required {
          return Err(self.invalid("initialisation applies to whole variables only"));
        }
        if self.is_nullified != !self.decrements.is_empty() {
          return Err(self.invalid("a partitioned variable is nullified exactly when decremented"));
        }
        if self.increments.is_empty() && self.decrements.is_empty() {
          return Err(self.invalid("a partitioned variable needs an increment or decrement"));
        }
      }
    }
    if self.new_commitment_required && self.variant == Variant::Partitioned {
      return Err(self.invalid("partitioned variables mint through increments and decrements"));
    }
    Ok(())
  }
}

/// Everything synthesis needs to know about one function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionIndicators {
  /// Function name
  pub name: String,
  /// The function's own inputs, declared before any protocol parameter
  pub inputs: Vec<Param>,
  /// Already-lowered function body, spliced after the protocol statements
  pub body: Vec<Stmt>,
  /// Secret variables touched, in declaration order
  pub indicators: Vec<Indicator>,
}

impl FunctionIndicators {
  /// A function with no body.
  pub fn new(name: impl Into<String>, inputs: Vec<Param>, indicators: Vec<Indicator>) -> Self {
    FunctionIndicators {
      name: name.into(),
      inputs,
      body: vec![],
      indicators,
    }
  }

  /// Sets the lowered body.
  pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
    self.body = body;
    self
  }

  /// Checks every indicator and that each name it references is a function input.
  pub fn validate(&self) -> Result<(), ShroudError> {
    let inputs: BTreeSet<&str> = self.inputs.iter().map(|p| p.name.as_str()).collect();
    if inputs.len() != self.inputs.len() {
      return Err(ShroudError::InvalidIndicator {
        name: self.name.clone(),
        reason: "duplicate function input".to_string(),
      });
    }
    let mut seen = BTreeSet::new();
    for indicator in &self.indicators {
      indicator.validate()?;
      if !seen.insert(indicator.name.as_str()) {
        return Err(indicator.invalid("variable listed twice"));
      }
      let referenced = indicator
        .increments
        .iter()
        .chain(&indicator.decrements)
        .map(|r| r.amount.as_str())
        .chain(indicator.mapping_key.as_deref())
        .chain(match &indicator.owner {
          Some(Owner::Param(p)) => Some(p.as_str()),
          _ => None,
        });
      for name in referenced {
        if !inputs.contains(name) {
          return Err(indicator.invalid(format!("`{name}` is not an input of {}", self.name)));
        }
      }
    }
    Ok(())
  }
}
