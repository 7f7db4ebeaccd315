use super::{NewValue, StepArgs};
use crate::{
  catalog::ir::{
    Expr, Import, LedgerOp, Param, PersistOp, PreimageField, Source, Stmt, Ty, Visibility,
  },
  errors::ShroudError,
  indicator::{Owner, Variant},
};

/// Public input: the commitment tree root the membership witnesses resolve to.
pub const COMMITMENT_ROOT: &str = "commitmentRoot";
/// Public input: the stored nullifier root the first non-membership check uses.
pub const NULLIFIER_ROOT: &str = "nullifierRoot";
/// Public input: the nullifier root after every insertion of the function.
pub const LATEST_NULLIFIER_ROOT: &str = "latestNullifierRoot";

/// Name of the nullifier root after `k` insertions.
pub fn nullifier_root_at(k: usize) -> String {
  if k == 0 {
    NULLIFIER_ROOT.to_string()
  } else {
    format!("{NULLIFIER_ROOT}_{k}")
  }
}

/// Variable names owned by one slot.
#[derive(Clone, Debug)]
pub struct SlotVars {
  slot: String,
}

impl SlotVars {
  /// Names for `slot`.
  pub fn new(slot: &str) -> Self {
    SlotVars {
      slot: slot.to_string(),
    }
  }

  fn var(&self, suffix: &str) -> String {
    format!("{}_{suffix}", self.slot)
  }

  /// Derived state variable id
  pub fn state_var_id(&self) -> String {
    self.var("stateVarId")
  }
  /// Spender's secret key
  pub fn secret_key(&self) -> String {
    self.var("oldCommitment_owner_secretKey")
  }
  /// Spender's public key
  pub fn public_key(&self) -> String {
    self.var("oldCommitment_owner_publicKey")
  }
  /// Nullifier of the old commitment
  pub fn nullifier(&self) -> String {
    self.var("oldCommitment_nullifier")
  }
  /// Non-membership path of the nullifier
  pub fn nullifier_path(&self) -> String {
    self.var("nullifier_nonmembershipWitness_siblingPath")
  }
  /// Dummy flag
  pub fn is_dummy(&self) -> String {
    self.var("oldCommitment_isDummy")
  }
  /// Old value
  pub fn value(&self) -> String {
    self.var("oldCommitment_value")
  }
  /// Old salt
  pub fn salt(&self) -> String {
    self.var("oldCommitment_salt")
  }
  /// Recomputed old commitment
  pub fn old_commitment(&self) -> String {
    self.var("oldCommitment_commitment")
  }
  /// Leaf index of the old commitment
  pub fn membership_index(&self) -> String {
    self.var("oldCommitment_membershipWitness_index")
  }
  /// Sibling path of the old commitment
  pub fn membership_path(&self) -> String {
    self.var("oldCommitment_membershipWitness_siblingPath")
  }
  /// New value
  pub fn new_value(&self) -> String {
    self.var("newCommitment_value")
  }
  /// New owner public key
  pub fn new_owner(&self) -> String {
    self.var("newCommitment_owner_publicKey")
  }
  /// New salt
  pub fn new_salt(&self) -> String {
    self.var("newCommitment_salt")
  }
  /// New commitment
  pub fn new_commitment(&self) -> String {
    self.var("newCommitment_commitment")
  }
}

fn imports(list: &[Import]) -> Vec<Stmt> {
  list.iter().copied().map(Stmt::Import).collect()
}

fn missing(a: &StepArgs, what: &str) -> ShroudError {
  ShroudError::InvalidIndicator {
    name: a.state.clone(),
    reason: format!("{} requires {what}", a.name),
  }
}

pub(super) fn mapping_imports() -> Vec<Stmt> {
  imports(&[Import::Hash])
}

pub(super) fn mapping_pre(a: &StepArgs) -> Result<Vec<Stmt>, ShroudError> {
  let key = a
    .mapping_key
    .as_ref()
    .ok_or_else(|| missing(a, "a mapping key"))?;
  Ok(vec![Stmt::Let {
    name: SlotVars::new(&a.name).state_var_id(),
    expr: Expr::Hash(vec![Expr::Const(a.state_var_id), Expr::var(key)]),
  }])
}

pub(super) fn pokosk_imports() -> Vec<Stmt> {
  imports(&[Import::Hash])
}

pub(super) fn pokosk_params(a: &StepArgs) -> Vec<Stmt> {
  vec![Stmt::Param(Param::private(SlotVars::new(&a.name).secret_key()))]
}

pub(super) fn pokosk_pre(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  vec![
    Stmt::Fetch {
      name: v.secret_key(),
      source: Source::SecretKey,
    },
    Stmt::Let {
      name: v.public_key(),
      expr: Expr::Hash(vec![Expr::var(v.secret_key())]),
    },
  ]
}

pub(super) fn nullification_imports() -> Vec<Stmt> {
  imports(&[Import::Hash, Import::NullifierTree, Import::CommitmentStore])
}

fn is_last(a: &StepArgs) -> bool {
  a.nullifies && a.chain.position + 1 == a.chain.total
}

pub(super) fn nullification_params(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  let mut params = vec![];
  if a.chain.position == 0 {
    params.push(Param::public(NULLIFIER_ROOT));
  }
  if is_last(a) {
    params.push(Param::public(LATEST_NULLIFIER_ROOT));
  }
  if a.dummy {
    params.push(Param::private(v.is_dummy()).with_ty(Ty::Bool));
  }
  let nullifier = if a.nullifies {
    Param::public(v.nullifier())
  } else {
    Param::private(v.nullifier())
  };
  params.push(nullifier);
  params.push(Param {
    name: v.nullifier_path(),
    ty: Ty::Path(a.nullifier_tree_height),
    visibility: Visibility::Private,
  });
  params.into_iter().map(Stmt::Param).collect()
}

pub(super) fn nullification_pre(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  let mut out = vec![Stmt::Fetch {
    name: v.salt(),
    source: Source::Preimage {
      slot: a.name.clone(),
      bucket: a.bucket(),
      field: PreimageField::Salt,
      dummy_allowed: a.dummy,
    },
  }];
  if a.dummy {
    out.push(Stmt::Fetch {
      name: v.is_dummy(),
      source: Source::IsDummy {
        slot: a.name.clone(),
      },
    });
    for name in [v.secret_key(), v.salt()] {
      out.push(Stmt::Reassign {
        expr: Expr::select(Expr::var(v.is_dummy()), Expr::zero(), Expr::var(&name)),
        name,
      });
    }
  }
  out.push(Stmt::Constrain {
    name: v.nullifier(),
    expr: Expr::Hash(vec![
      a.state_var_id_expr(),
      Expr::var(v.secret_key()),
      Expr::var(v.salt()),
    ]),
  });

  let position = a.chain.position;
  if position == 0 {
    out.push(Stmt::Fetch {
      name: NULLIFIER_ROOT.to_string(),
      source: Source::NullifierRoot,
    });
    out.push(Stmt::Ledger(LedgerOp::NullifierRootMatches {
      root: NULLIFIER_ROOT.to_string(),
    }));
  }
  out.push(Stmt::Fetch {
    name: v.nullifier_path(),
    source: Source::NonMembershipPath {
      nullifier: v.nullifier(),
      insert: a.nullifies,
    },
  });
  out.push(Stmt::Assert {
    label: format!("{} nullifier is unused", a.name),
    expr: Expr::eq(
      Expr::SmtRoot {
        key: Box::new(Expr::var(v.nullifier())),
        leaf: Box::new(Expr::zero()),
        path: Box::new(Expr::var(v.nullifier_path())),
      },
      Expr::var(nullifier_root_at(position)),
    ),
  });

  if a.nullifies {
    out.push(Stmt::Ledger(LedgerOp::NullifierUnused {
      nullifier: v.nullifier(),
    }));
    let next = nullifier_root_at(position + 1);
    out.push(Stmt::Let {
      name: next.clone(),
      expr: Expr::SmtRoot {
        key: Box::new(Expr::var(v.nullifier())),
        leaf: Box::new(Expr::var(v.nullifier())),
        path: Box::new(Expr::var(v.nullifier_path())),
      },
    });
    if is_last(a) {
      out.push(Stmt::Constrain {
        name: LATEST_NULLIFIER_ROOT.to_string(),
        expr: Expr::var(next),
      });
    }
  }
  out
}

pub(super) fn nullification_post(a: &StepArgs) -> Vec<Stmt> {
  if !a.nullifies {
    return vec![];
  }
  let v = SlotVars::new(&a.name);
  let mut out = vec![];
  if is_last(a) {
    out.push(Stmt::Ledger(LedgerOp::AdvanceNullifierRoot {
      latest: LATEST_NULLIFIER_ROOT.to_string(),
    }));
  }
  out.push(Stmt::Persist(PersistOp::Nullify {
    commitment: v.old_commitment(),
    dummy: a.dummy.then(|| v.is_dummy()),
  }));
  out
}

pub(super) fn preimage_imports() -> Vec<Stmt> {
  imports(&[Import::Hash, Import::CommitmentStore])
}

pub(super) fn preimage_params(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  vec![
    Stmt::Param(Param::private(v.value())),
    Stmt::Param(Param::private(v.salt())),
  ]
}

pub(super) fn preimage_pre(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  let mut out = vec![Stmt::Fetch {
    name: v.value(),
    source: Source::Preimage {
      slot: a.name.clone(),
      bucket: a.bucket(),
      field: PreimageField::Value,
      dummy_allowed: a.dummy,
    },
  }];
  if a.dummy {
    out.push(Stmt::Reassign {
      name: v.value(),
      expr: Expr::select(Expr::var(v.is_dummy()), Expr::zero(), Expr::var(v.value())),
    });
  }
  out.push(Stmt::Let {
    name: v.old_commitment(),
    expr: Expr::Hash(vec![
      a.state_var_id_expr(),
      Expr::var(v.value()),
      Expr::var(v.public_key()),
      Expr::var(v.salt()),
    ]),
  });
  if a.variant == Variant::Whole {
    out.push(Stmt::Let {
      name: a.state.clone(),
      expr: Expr::var(v.value()),
    });
  }
  out
}

pub(super) fn existence_imports() -> Vec<Stmt> {
  imports(&[Import::CommitmentTree])
}

pub(super) fn existence_params(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  vec![
    Stmt::Param(Param::public(COMMITMENT_ROOT)),
    Stmt::Param(Param::private(v.membership_index())),
    Stmt::Param(Param {
      name: v.membership_path(),
      ty: Ty::Path(a.commitment_tree_height),
      visibility: Visibility::Private,
    }),
  ]
}

pub(super) fn existence_pre(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  let resolves = Expr::eq(
    Expr::MerkleRoot {
      leaf: Box::new(Expr::var(v.old_commitment())),
      index: Box::new(Expr::var(v.membership_index())),
      path: Box::new(Expr::var(v.membership_path())),
    },
    Expr::var(COMMITMENT_ROOT),
  );
  let check = if a.dummy {
    Expr::or(Expr::var(v.is_dummy()), resolves)
  } else {
    resolves
  };
  vec![
    Stmt::Fetch {
      name: COMMITMENT_ROOT.to_string(),
      source: Source::CommitmentRoot,
    },
    Stmt::Ledger(LedgerOp::KnownCommitmentRoot {
      root: COMMITMENT_ROOT.to_string(),
    }),
    Stmt::Fetch {
      name: v.membership_index(),
      source: Source::MembershipIndex {
        slot: a.name.clone(),
        commitment: v.old_commitment(),
      },
    },
    Stmt::Fetch {
      name: v.membership_path(),
      source: Source::MembershipPath {
        slot: a.name.clone(),
        commitment: v.old_commitment(),
      },
    },
    Stmt::Assert {
      label: format!("{} commitment exists", a.name),
      expr: check,
    },
  ]
}

pub(super) fn new_commitment_imports() -> Vec<Stmt> {
  imports(&[Import::Hash, Import::CommitmentTree, Import::CommitmentStore])
}

pub(super) fn new_commitment_params(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  vec![
    Stmt::Param(Param::private(v.new_owner())),
    Stmt::Param(Param::private(v.new_salt())),
    Stmt::Param(Param::public(v.new_commitment())),
  ]
}

fn new_value_expr(a: &StepArgs) -> Expr {
  match &a.new_value {
    NewValue::Current => Expr::var(&a.state),
    NewValue::Amount(amount) => Expr::var(amount),
    NewValue::Remainder { inputs, amount } => {
      let total = Expr::sum(inputs.iter().map(|s| Expr::var(SlotVars::new(s).value())));
      match amount {
        Some(amount) => Expr::sub(total, Expr::var(amount)),
        None => total,
      }
    }
  }
}

pub(super) fn new_commitment_post(a: &StepArgs) -> Vec<Stmt> {
  let v = SlotVars::new(&a.name);
  let encrypt = matches!(a.owner, Owner::Param(_));
  let owner = match &a.owner {
    Owner::Caller => Stmt::Fetch {
      name: v.new_owner(),
      source: Source::CallerPublicKey,
    },
    Owner::Param(p) => Stmt::Constrain {
      name: v.new_owner(),
      expr: Expr::var(p),
    },
  };
  let mut out = vec![
    Stmt::Let {
      name: v.new_value(),
      expr: new_value_expr(a),
    },
    owner,
    Stmt::Fetch {
      name: v.new_salt(),
      source: Source::FreshSalt,
    },
    Stmt::Constrain {
      name: v.new_commitment(),
      expr: Expr::Hash(vec![
        a.state_var_id_expr(),
        Expr::var(v.new_value()),
        Expr::var(v.new_owner()),
        Expr::var(v.new_salt()),
      ]),
    },
    Stmt::Ledger(LedgerOp::InsertCommitment {
      commitment: v.new_commitment(),
    }),
  ];
  if encrypt {
    out.push(Stmt::Ledger(LedgerOp::EmitEncrypted {
      commitment: v.new_commitment(),
    }));
  }
  out.push(Stmt::Persist(PersistOp::NewCommitment {
    bucket: a.bucket(),
    value: v.new_value(),
    salt: v.new_salt(),
    owner_public_key: v.new_owner(),
    commitment: v.new_commitment(),
    encrypt,
  }));
  out
}

pub(super) fn decrementation_imports() -> Vec<Stmt> {
  imports(&[Import::CommitmentStore])
}

pub(super) fn decrementation_pre(a: &StepArgs) -> Result<Vec<Stmt>, ShroudError> {
  let block = a.block.as_ref().ok_or_else(|| missing(a, "decrement inputs"))?;
  if !block.reconcile {
    return Ok(vec![]);
  }
  Ok(vec![Stmt::Reconcile {
    state: a.state.clone(),
    inputs: block.inputs.clone(),
    bucket: a.bucket(),
    amount: Expr::var(&block.amount),
    join: super::join_function(&a.state),
    split: super::split_function(&a.state),
  }])
}

/// `sum(inputs) >= amount`; equality leaves a zero change commitment.
pub(super) fn decrementation_statements(a: &StepArgs) -> Result<Vec<Stmt>, ShroudError> {
  let block = a.block.as_ref().ok_or_else(|| missing(a, "decrement inputs"))?;
  let total = Expr::sum(
    block
      .inputs
      .iter()
      .map(|s| Expr::var(SlotVars::new(s).value())),
  );
  Ok(vec![Stmt::Assert {
    label: format!("{} inputs cover {}", a.name, block.amount),
    expr: Expr::ge(total, Expr::var(&block.amount)),
  }])
}
