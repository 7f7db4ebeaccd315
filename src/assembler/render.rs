//! Plain-text rendering of fragments, for inspection.
use super::{FunctionFragments, Target};
use crate::catalog::ir::{LedgerOp, PersistOp, Source, Stmt, Ty, Visibility};
use core::fmt::Write;

fn ty(t: &Ty) -> String {
  match t {
    Ty::Field => "field".to_string(),
    Ty::Bool => "bool".to_string(),
    Ty::Path(h) => format!("field[{h}]"),
  }
}

fn source(s: &Source) -> String {
  match s {
    Source::SecretKey => "keys.secretKey()".to_string(),
    Source::CallerPublicKey => "keys.publicKey()".to_string(),
    Source::FreshSalt => "randomSalt()".to_string(),
    Source::Preimage { slot, field, .. } => {
      format!("preimage({slot}).{}", format!("{field:?}").to_lowercase())
    }
    Source::IsDummy { slot } => format!("isDummy({slot})"),
    Source::MembershipIndex { commitment, .. } => format!("membershipWitness({commitment}).index"),
    Source::MembershipPath { commitment, .. } => format!("membershipWitness({commitment}).path"),
    Source::CommitmentRoot => "commitmentTree.root()".to_string(),
    Source::NullifierRoot => "nullifierTree.root()".to_string(),
    Source::NonMembershipPath { nullifier, insert } => {
      let call = if *insert {
        "nonMembershipWitnessAndInsert"
      } else {
        "nonMembershipWitness"
      };
      format!("{call}({nullifier})")
    }
  }
}

fn ledger(op: &LedgerOp) -> String {
  match op {
    LedgerOp::NullifierRootMatches { root } => format!("require({root} == nullifierRoot);"),
    LedgerOp::NullifierUnused { nullifier } => format!("require(!nullifiers[{nullifier}]); nullifiers[{nullifier}] = true;"),
    LedgerOp::AdvanceNullifierRoot { latest } => format!("nullifierRoot = {latest};"),
    LedgerOp::KnownCommitmentRoot { root } => format!("require(commitmentRoots[{root}]);"),
    LedgerOp::InsertCommitment { commitment } => format!("insertLeaf({commitment});"),
    LedgerOp::EmitEncrypted { commitment } => {
      format!("emit EncryptedData({commitment}, cipherText[{commitment}]);")
    }
    LedgerOp::VerifyProof { inputs } => format!("require(verify(proof, [{}]));", inputs.join(", ")),
  }
}

fn statement(target: Target, s: &Stmt) -> String {
  match s {
    Stmt::Import(i) => format!("import {i:?};"),
    Stmt::Param(p) => {
      let vis = match (target, p.visibility) {
        (Target::Circuit, Visibility::Public) => "public ",
        (Target::Circuit, Visibility::Private) => "private ",
        _ => "",
      };
      format!("{vis}{} {}", ty(&p.ty), p.name)
    }
    Stmt::Let { name, expr } => format!("let {name} = {expr};"),
    Stmt::Reassign { name, expr } => format!("{name} = {expr};"),
    Stmt::Assert { label, expr } => format!("assert({expr}); // {label}"),
    Stmt::Constrain { name, expr } => match target {
      Target::Circuit => format!("assert({name} == {expr});"),
      _ => format!("let {name} = {expr};"),
    },
    Stmt::Fetch { name, source: src } => format!("let {name} = await {};", source(src)),
    Stmt::Reconcile {
      inputs,
      amount,
      join,
      split,
      ..
    } => format!(
      "[{}] = await reconcile({amount}, {join}, {split});",
      inputs.join(", ")
    ),
    Stmt::Ledger(op) => ledger(op),
    Stmt::Persist(PersistOp::NewCommitment {
      commitment,
      encrypt: true,
      ..
    }) => format!("cipherText[{commitment}] = await seal({commitment});"),
    Stmt::Persist(PersistOp::NewCommitment { commitment, .. }) => {
      format!("await store.put({commitment});")
    }
    Stmt::Persist(PersistOp::Nullify { commitment, dummy }) => match dummy {
      Some(flag) => format!("if (!{flag}) await store.markNullified({commitment});"),
      None => format!("await store.markNullified({commitment});"),
    },
  }
}

/// Renders fragments as indented pseudo-code.
pub fn render(fragments: &FunctionFragments) -> String {
  let mut out = String::new();
  let target = fragments.target;
  for s in &fragments.imports {
    let _ = writeln!(out, "{}", statement(target, s));
  }
  let params: Vec<String> = fragments
    .parameters
    .iter()
    .map(|s| statement(target, s))
    .collect();
  let _ = writeln!(
    out,
    "\n{target} {}(\n  {}\n) {{",
    fragments.function,
    params.join(",\n  ")
  );
  for s in fragments.statements() {
    let _ = writeln!(out, "  {}", statement(target, s));
  }
  out.push_str("}\n");
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    assembler::Program,
    catalog::ir::Param,
    config::Config,
    field::Word,
    indicator::{FunctionIndicators, Indicator},
  };

  #[test]
  fn test_render_mentions_every_parameter() {
    let f = FunctionIndicators::new(
      "mint",
      vec![Param::private("amount")],
      vec![Indicator::partitioned("supply", Word::from_u64(5)).increment("amount")],
    );
    let program = Program::synthesize(&[f], &Config::default()).unwrap();
    for target in Target::ALL {
      let fragments = program.require("mint", target).unwrap();
      let text = render(fragments);
      for p in fragments.params() {
        assert!(text.contains(&p.name), "{target} misses {}", p.name);
      }
    }
    let circuit = render(program.require("mint", Target::Circuit).unwrap());
    assert!(circuit.contains("assert(supply_0_newCommitment_commitment =="));
  }
}
