//! Evaluation of emitted statements.
//!
//! The same statements are run in two modes. [`Mode::Check`] treats every
//! `Constrain` as an equality the supplied inputs must satisfy, which is what a
//! prover enforces. [`Mode::Derive`] binds the constrained name to its defining
//! expression, which is how the orchestration program computes those inputs.
use crate::{
  assembler::FunctionFragments,
  catalog::ir::{Expr, Param, Stmt, Ty},
  digest::hash,
  errors::ShroudError,
  field::Word,
  tree::root_from_path,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A runtime value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
  /// A field word
  Word(Word),
  /// A flag
  Bool(bool),
  /// A sibling path
  Path(Vec<Word>),
}

impl Value {
  /// Whether the value has type `ty`.
  pub fn has_type(&self, ty: &Ty) -> bool {
    match (self, ty) {
      (Value::Word(_), Ty::Field) | (Value::Bool(_), Ty::Bool) => true,
      (Value::Path(p), Ty::Path(h)) => p.len() == *h,
      _ => false,
    }
  }
}

impl From<Word> for Value {
  fn from(w: Word) -> Self {
    Value::Word(w)
  }
}

impl From<u64> for Value {
  fn from(v: u64) -> Self {
    Value::Word(Word::from_u64(v))
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

/// Named values in scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Env {
  vars: BTreeMap<String, Value>,
}

impl Env {
  /// An empty scope.
  pub fn new() -> Self {
    Env::default()
  }

  /// Binds or rebinds `name`.
  pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
    self.vars.insert(name.into(), value.into());
  }

  /// Whether `name` is bound.
  pub fn contains(&self, name: &str) -> bool {
    self.vars.contains_key(name)
  }

  /// Value of `name`.
  pub fn get(&self, name: &str) -> Result<&Value, ShroudError> {
    self
      .vars
      .get(name)
      .ok_or_else(|| ShroudError::UnboundVariable {
        name: name.to_string(),
      })
  }

  /// Word bound to `name`.
  pub fn word(&self, name: &str) -> Result<Word, ShroudError> {
    match self.get(name)? {
      Value::Word(w) => Ok(*w),
      _ => Err(mismatch(name, "field")),
    }
  }

  /// Flag bound to `name`.
  pub fn flag(&self, name: &str) -> Result<bool, ShroudError> {
    match self.get(name)? {
      Value::Bool(b) => Ok(*b),
      _ => Err(mismatch(name, "bool")),
    }
  }
}

/// How `Constrain` statements are treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
  /// Constrained names must already hold the defining value
  Check,
  /// Constrained names are bound to the defining value
  Derive,
}

fn mismatch(name: impl ToString, expected: &str) -> ShroudError {
  ShroudError::TypeMismatch {
    name: name.to_string(),
    expected: expected.to_string(),
  }
}

/// Evaluates `expr` to a word.
pub fn eval_word(expr: &Expr, env: &Env) -> Result<Word, ShroudError> {
  match eval(expr, env)? {
    Value::Word(w) => Ok(w),
    _ => Err(mismatch(expr, "field")),
  }
}

fn flag(expr: &Expr, env: &Env) -> Result<bool, ShroudError> {
  match eval(expr, env)? {
    Value::Bool(b) => Ok(b),
    _ => Err(mismatch(expr, "bool")),
  }
}

fn path(expr: &Expr, env: &Env) -> Result<Vec<Word>, ShroudError> {
  match eval(expr, env)? {
    Value::Path(p) => Ok(p),
    _ => Err(mismatch(expr, "path")),
  }
}

fn int(expr: &Expr, env: &Env) -> Result<BigUint, ShroudError> {
  Ok(eval_word(expr, env)?.to_biguint())
}

/// Evaluates `expr` in `env`.
pub fn eval(expr: &Expr, env: &Env) -> Result<Value, ShroudError> {
  Ok(match expr {
    Expr::Var(name) => env.get(name)?.clone(),
    Expr::Const(w) => Value::Word(*w),
    Expr::Bool(b) => Value::Bool(*b),
    Expr::Hash(args) => {
      let words = args
        .iter()
        .map(|a| eval_word(a, env))
        .collect::<Result<Vec<_>, _>>()?;
      Value::Word(hash(&words))
    }
    Expr::Add(a, b) => Value::Word(Word::from_biguint(&(int(a, env)? + int(b, env)?))?),
    Expr::Sub(a, b) => {
      let (a, b) = (int(a, env)?, int(b, env)?);
      if a < b {
        return Err(ShroudError::AssertionViolation {
          label: format!("underflow in {expr}: {a} < {b}"),
        });
      }
      Value::Word(Word::from_biguint(&(a - b))?)
    }
    Expr::Ge(a, b) => Value::Bool(int(a, env)? >= int(b, env)?),
    Expr::Eq(a, b) => {
      let (a, b) = (eval(a, env)?, eval(b, env)?);
      if std::mem::discriminant(&a) != std::mem::discriminant(&b) {
        return Err(mismatch(expr, "operands of one type"));
      }
      Value::Bool(a == b)
    }
    Expr::Or(a, b) => Value::Bool(flag(a, env)? || flag(b, env)?),
    Expr::Select {
      cond,
      then,
      otherwise,
    } => {
      if flag(cond, env)? {
        eval(then, env)?
      } else {
        eval(otherwise, env)?
      }
    }
    Expr::MerkleRoot { leaf, index, path: p } => {
      let siblings = path(p, env)?;
      let position = eval_word(index, env)?.to_position(siblings.len())?;
      Value::Word(root_from_path(eval_word(leaf, env)?, position, &siblings))
    }
    Expr::SmtRoot { key, leaf, path: p } => {
      let siblings = path(p, env)?;
      let position = eval_word(key, env)?.low_bits(siblings.len());
      Value::Word(root_from_path(eval_word(leaf, env)?, position, &siblings))
    }
  })
}

/// Executes one binding or assertion. Other statement kinds are left to the
/// caller and ignored here.
pub fn exec(stmt: &Stmt, env: &mut Env, mode: Mode) -> Result<(), ShroudError> {
  match stmt {
    Stmt::Let { name, expr } => {
      let v = eval(expr, env)?;
      env.bind(name.clone(), v);
    }
    Stmt::Reassign { name, expr } => {
      env.get(name)?;
      let v = eval(expr, env)?;
      env.bind(name.clone(), v);
    }
    Stmt::Assert { label, expr } => {
      if !flag(expr, env)? {
        return Err(ShroudError::AssertionViolation {
          label: label.clone(),
        });
      }
    }
    Stmt::Constrain { name, expr } => {
      let v = eval(expr, env)?;
      match mode {
        Mode::Derive => env.bind(name.clone(), v),
        Mode::Check => {
          if env.get(name)? != &v {
            return Err(ShroudError::AssertionViolation {
              label: format!("{name} does not match its definition"),
            });
          }
        }
      }
    }
    Stmt::Import(_)
    | Stmt::Param(_)
    | Stmt::Fetch { .. }
    | Stmt::Reconcile { .. }
    | Stmt::Ledger(_)
    | Stmt::Persist(_) => {}
  }
  Ok(())
}

/// Binds `inputs` to `params` positionally, checking arity and types.
pub fn bind_params<'a>(
  params: impl IntoIterator<Item = &'a Param>,
  inputs: &[Value],
) -> Result<Env, ShroudError> {
  let params: Vec<&Param> = params.into_iter().collect();
  if params.len() != inputs.len() {
    return Err(ShroudError::InvalidInputLength {
      expected: params.len(),
      actual: inputs.len(),
    });
  }
  let mut env = Env::new();
  for (p, v) in params.into_iter().zip(inputs) {
    if !v.has_type(&p.ty) {
      return Err(mismatch(&p.name, &format!("{:?}", p.ty)));
    }
    env.bind(p.name.clone(), v.clone());
  }
  Ok(env)
}

/// Checks that `inputs` satisfy every constraint of a circuit.
pub fn check_circuit(fragments: &FunctionFragments, inputs: &[Value]) -> Result<Env, ShroudError> {
  let mut env = bind_params(fragments.params(), inputs)?;
  for stmt in fragments.statements() {
    exec(stmt, &mut env, Mode::Check)?;
  }
  Ok(env)
}
