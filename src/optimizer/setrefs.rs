// Copyright 2025 Relcore Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Variable reference finalization
//!
//! After plan creation every column reference still names a base relation.
//! This pass rewrites them, top down, so that join and upper nodes read
//! their children's output by position: a join node's Var becomes
//! `(Outer | Inner, n)` where `n` is the 1-based position in that child's
//! target list, and a single-child node's Var becomes `(Outer, n)`. A
//! column missing from the child's target list is appended to it. Scan
//! nodes keep relation references since they read base tuples directly.
//!
//! Operator nodes also get their implementing function filled in here.

use crate::catalog::Catalog;
use crate::core::{AttrNumber, DataType, Error, RelId, Result};
use crate::expr::{Expr, Var, VarNo};

use super::plan::{Plan, PlanKind};
use super::query::TargetEntry;

/// Finalize the column references of `plan` and check the result
pub fn set_plan_references(plan: &mut Plan, catalog: &dyn Catalog) -> Result<()> {
    fix_node(plan, catalog)?;
    verify_plan_refs(plan)
}

fn rewrite(slot: &mut Expr, f: &mut dyn FnMut(Expr) -> Result<Expr>) -> Result<()> {
    let expr = std::mem::replace(slot, Expr::null_const(DataType::Null));
    *slot = f(expr)?;
    Ok(())
}

fn rewrite_all<'a>(
    exprs: impl IntoIterator<Item = &'a mut Expr>,
    f: &mut dyn FnMut(Expr) -> Result<Expr>,
) -> Result<()> {
    for slot in exprs {
        rewrite(slot, f)?;
    }
    Ok(())
}

fn fix_node(plan: &mut Plan, catalog: &dyn Catalog) -> Result<()> {
    let Plan {
        kind,
        targetlist,
        qual,
        ..
    } = plan;
    let tlist_exprs = targetlist.iter_mut().map(|t| &mut t.expr);

    match kind {
        PlanKind::SeqScan { .. } | PlanKind::IndexScan { .. } | PlanKind::TidScan { .. } => {}
        PlanKind::NestLoop { outer, inner } => {
            let mut f = |e: Expr| join_refs(e, outer, inner);
            rewrite_all(tlist_exprs.chain(qual.iter_mut()), &mut f)?;
            if let PlanKind::IndexScan {
                relid, index_quals, ..
            } = &mut inner.kind
            {
                let scan_relid = *relid;
                let mut f = |e: Expr| outer_param_refs(e, scan_relid, outer);
                rewrite_all(index_quals.iter_mut().flatten(), &mut f)?;
            }
        }
        PlanKind::MergeJoin {
            outer,
            inner,
            merge_clauses,
            ..
        } => {
            let mut f = |e: Expr| join_refs(e, outer, inner);
            rewrite_all(
                tlist_exprs.chain(qual.iter_mut()).chain(merge_clauses.iter_mut()),
                &mut f,
            )?;
        }
        PlanKind::HashJoin {
            outer,
            inner,
            hash_clauses,
            ..
        } => {
            let mut f = |e: Expr| join_refs(e, outer, inner);
            rewrite_all(
                tlist_exprs.chain(qual.iter_mut()).chain(hash_clauses.iter_mut()),
                &mut f,
            )?;
        }
        PlanKind::Hash { child, keys } | PlanKind::Group { child, keys, .. } => {
            let mut f = |e: Expr| upper_refs(e, child);
            rewrite_all(tlist_exprs.chain(qual.iter_mut()).chain(keys.iter_mut()), &mut f)?;
        }
        PlanKind::Agg { child, group_keys } => {
            let mut f = |e: Expr| upper_refs(e, child);
            rewrite_all(
                tlist_exprs.chain(qual.iter_mut()).chain(group_keys.iter_mut()),
                &mut f,
            )?;
        }
        PlanKind::Sort { child, keys } => {
            let mut f = |e: Expr| upper_refs(e, child);
            rewrite_all(
                tlist_exprs
                    .chain(qual.iter_mut())
                    .chain(keys.iter_mut().map(|k| &mut k.expr)),
                &mut f,
            )?;
        }
        PlanKind::WindowAgg { child, spec } => {
            let input_len = child.targetlist.len();
            let mut f = |e: Expr| upper_refs(e, child);
            rewrite_all(tlist_exprs.chain(qual.iter_mut()), &mut f)?;
            rewrite_all(spec.start_offset.iter_mut(), &mut f)?;
            rewrite_all(spec.end_offset.iter_mut(), &mut f)?;
            for func in spec.functions.iter_mut() {
                rewrite_all(func.args.iter_mut(), &mut f)?;
                rewrite_all(func.filter.iter_mut(), &mut f)?;
            }
            rewrite_all(spec.run_condition.iter_mut(), &mut f)?;
            rewrite_all(spec.qual.iter_mut(), &mut f)?;
            // Results are addressed after the input columns
            if child.targetlist.len() != input_len {
                return Err(Error::invariant(
                    "window input lacks a column its functions read",
                ));
            }
        }
        PlanKind::Result { child, .. } => {
            if let Some(child) = child {
                let mut f = |e: Expr| upper_refs(e, child);
                rewrite_all(tlist_exprs.chain(qual.iter_mut()), &mut f)?;
            }
        }
    }

    let mut fix = |e: Expr| fix_opfuncids(e, catalog);
    rewrite_all(plan.exprs_mut(), &mut fix)?;
    for child in plan.children_mut() {
        fix_node(child, catalog)?;
    }
    Ok(())
}

/// A relation column of the current query level, not yet finalized
fn unresolved(var: &Var) -> Option<RelId> {
    if var.levelsup == 0 {
        var.relid()
    } else {
        None
    }
}

fn position_of(tlist: &[TargetEntry], var: &Var) -> Option<usize> {
    tlist.iter().position(|t| match &t.expr {
        Expr::Var(v) => unresolved(v).is_some() && v.same_column(var),
        _ => false,
    })
}

fn slot_ref(varno: VarNo, index: usize, var: &Var, tlist: &[TargetEntry]) -> Result<Expr> {
    let found = tlist
        .get(index)
        .map(|t| t.expr.type_of())
        .ok_or_else(|| Error::invariant(format!("slot {} past end of target list", index + 1)))?;
    if found != var.typ {
        return Err(Error::invariant(format!(
            "column {}.{} is {:?} but child slot {} is {:?}",
            var.orig_relid,
            var.orig_attno,
            var.typ,
            index + 1,
            found
        )));
    }
    Ok(Expr::Var(Var {
        varno,
        attno: (index + 1) as AttrNumber,
        levelsup: 0,
        orig_relid: var.orig_relid,
        orig_attno: var.orig_attno,
        typ: var.typ,
    }))
}

/// Append `var` to the output of `plan`, returning its 0-based position
fn extend_tlist(plan: &mut Plan, var: &Var) -> Result<usize> {
    let node = plan.name();
    match &mut plan.kind {
        PlanKind::SeqScan { relid }
        | PlanKind::IndexScan { relid, .. }
        | PlanKind::TidScan { relid, .. } => {
            if var.relid() != Some(*relid) {
                return Err(Error::invariant(format!(
                    "scan of relation {} cannot produce column {}.{}",
                    relid, var.orig_relid, var.orig_attno
                )));
            }
        }
        PlanKind::NestLoop { .. } | PlanKind::MergeJoin { .. } | PlanKind::HashJoin { .. } => {}
        PlanKind::Hash { child, .. }
        | PlanKind::Sort { child, .. }
        | PlanKind::Result {
            child: Some(child), ..
        } => {
            extend_tlist(child, var)?;
        }
        PlanKind::Group { .. }
        | PlanKind::Agg { .. }
        | PlanKind::WindowAgg { .. }
        | PlanKind::Result { child: None, .. } => {
            return Err(Error::invariant(format!(
                "{} cannot supply column {}.{}",
                node,
                var.orig_relid,
                var.orig_attno
            )));
        }
    }
    let expr = Expr::Var(var.clone());
    let name = expr.to_string();
    plan.targetlist.push(TargetEntry::junk(expr, name));
    Ok(plan.targetlist.len() - 1)
}

fn join_refs(expr: Expr, outer: &mut Plan, inner: &mut Plan) -> Result<Expr> {
    expr.replace_vars(&mut |var| {
        let Some(relid) = unresolved(var) else {
            return Ok(None);
        };
        if let Some(i) = position_of(&outer.targetlist, var) {
            return slot_ref(VarNo::Outer, i, var, &outer.targetlist).map(Some);
        }
        if let Some(i) = position_of(&inner.targetlist, var) {
            return slot_ref(VarNo::Inner, i, var, &inner.targetlist).map(Some);
        }
        if outer.scanned_relids().contains(relid) {
            let i = extend_tlist(outer, var)?;
            slot_ref(VarNo::Outer, i, var, &outer.targetlist).map(Some)
        } else if inner.scanned_relids().contains(relid) {
            let i = extend_tlist(inner, var)?;
            slot_ref(VarNo::Inner, i, var, &inner.targetlist).map(Some)
        } else {
            Err(Error::invariant(format!(
                "column {}.{} is not produced below the join",
                var.orig_relid, var.orig_attno
            )))
        }
    })
}

/// Outer-relation columns in the index condition of a nestloop's inner scan
fn outer_param_refs(expr: Expr, scan_relid: RelId, outer: &mut Plan) -> Result<Expr> {
    expr.replace_vars(&mut |var| match unresolved(var) {
        Some(relid) if relid != scan_relid => {
            let i = match position_of(&outer.targetlist, var) {
                Some(i) => i,
                None => extend_tlist(outer, var)?,
            };
            slot_ref(VarNo::Outer, i, var, &outer.targetlist).map(Some)
        }
        _ => Ok(None),
    })
}

/// Rewrite against the single child's output
///
/// Whole expressions the child already computes are read from its slot.
fn upper_refs(expr: Expr, child: &mut Plan) -> Result<Expr> {
    if !matches!(expr, Expr::Const(_) | Expr::Param(_)) {
        if let Some(i) = child.targetlist.iter().position(|t| t.expr == expr) {
            let typ = expr.type_of();
            let (orig_relid, orig_attno) = match &expr {
                Expr::Var(v) => (v.orig_relid, v.orig_attno),
                _ => (0, 0),
            };
            return Ok(Expr::Var(Var {
                varno: VarNo::Outer,
                attno: (i + 1) as AttrNumber,
                levelsup: 0,
                orig_relid,
                orig_attno,
                typ,
            }));
        }
    }
    match expr {
        Expr::Var(var) if unresolved(&var).is_some() => {
            let i = match position_of(&child.targetlist, &var) {
                Some(i) => i,
                None => extend_tlist(child, &var)?,
            };
            slot_ref(VarNo::Outer, i, &var, &child.targetlist)
        }
        other => other.map_children(&mut |c| upper_refs(c, child)),
    }
}

fn fix_opfuncids(expr: Expr, catalog: &dyn Catalog) -> Result<Expr> {
    expr.transform_up(&mut |e| match e {
        Expr::Op(mut op) if op.opfuncid.is_none() => {
            op.opfuncid = Some(catalog.get_opcode(op.opno)?);
            Ok(Expr::Op(op))
        }
        other => Ok(other),
    })
}

/// Check that every finalized reference lands on a child column of its type
///
/// Join and upper nodes must not reference base relations of the current
/// level directly.
pub fn verify_plan_refs(plan: &Plan) -> Result<()> {
    let children = plan.children();
    if !plan.is_scan() {
        let outer_types: Vec<DataType> = match &plan.kind {
            PlanKind::WindowAgg { child, spec } => child
                .targetlist
                .iter()
                .map(|t| t.expr.type_of())
                .chain(spec.output_types())
                .collect(),
            _ => children
                .first()
                .map(|c| c.targetlist.iter().map(|t| t.expr.type_of()).collect())
                .unwrap_or_default(),
        };
        let inner_types: Vec<DataType> = match &plan.kind {
            PlanKind::NestLoop { inner, .. }
            | PlanKind::MergeJoin { inner, .. }
            | PlanKind::HashJoin { inner, .. } => {
                inner.targetlist.iter().map(|t| t.expr.type_of()).collect()
            }
            _ => Vec::new(),
        };
        for expr in plan.exprs() {
            for var in expr.pull_vars() {
                if var.levelsup != 0 {
                    continue;
                }
                let types = match var.varno {
                    VarNo::Outer => &outer_types,
                    VarNo::Inner => &inner_types,
                    VarNo::Rel(r) => {
                        return Err(Error::invariant(format!(
                            "{} still references relation {} column {}",
                            plan.name(),
                            r,
                            var.attno
                        )))
                    }
                };
                let slot = usize::try_from(var.attno)
                    .ok()
                    .and_then(|a| a.checked_sub(1))
                    .and_then(|i| types.get(i));
                match slot {
                    Some(t) if *t == var.typ => {}
                    Some(t) => {
                        return Err(Error::invariant(format!(
                            "{} reads slot {:?}.{} as {:?} but it holds {:?}",
                            plan.name(),
                            var.varno,
                            var.attno,
                            var.typ,
                            t
                        )))
                    }
                    None => {
                        return Err(Error::invariant(format!(
                            "{} reads missing slot {:?}.{}",
                            plan.name(),
                            var.varno,
                            var.attno
                        )))
                    }
                }
            }
        }
    }
    for child in children {
        verify_plan_refs(child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::catalog::CatalogSnapshot;
    use crate::core::Value;
    use crate::optimizer::cost::PathCost;
    use crate::optimizer::plan::SortKey;

    fn scan(relid: RelId, cols: &[(AttrNumber, DataType)]) -> Plan {
        let tlist = cols
            .iter()
            .map(|(a, t)| TargetEntry::new(Expr::var(relid, *a, *t), format!("c{}", a)))
            .collect();
        Plan::new(PlanKind::SeqScan { relid }, PathCost::new(0.0, 1.0), 10.0, 8)
            .with_targetlist(tlist)
    }

    fn eq(l: Expr, r: Expr) -> Expr {
        Expr::op(INT8_EQ_OP, vec![l, r], DataType::Boolean)
    }

    #[test]
    fn test_join_vars_point_at_child_slots() {
        let cat = CatalogSnapshot::new();
        let outer = scan(1, &[(1, DataType::Integer), (2, DataType::Text)]);
        let inner = scan(2, &[(1, DataType::Integer)]);
        let mut join = Plan::new(
            PlanKind::NestLoop {
                outer: Box::new(outer),
                inner: Box::new(inner),
            },
            PathCost::new(0.0, 5.0),
            10.0,
            16,
        )
        .with_targetlist(vec![
            TargetEntry::new(Expr::var(1, 2, DataType::Text), "b"),
            TargetEntry::new(Expr::var(2, 1, DataType::Integer), "c"),
        ])
        .with_qual(vec![eq(
            Expr::var(1, 1, DataType::Integer),
            Expr::var(2, 1, DataType::Integer),
        )]);
        set_plan_references(&mut join, &cat).unwrap();

        let first = join.targetlist[0].expr.as_var().unwrap();
        assert_eq!((first.varno, first.attno), (VarNo::Outer, 2));
        let second = join.targetlist[1].expr.as_var().unwrap();
        assert_eq!((second.varno, second.attno), (VarNo::Inner, 1));
        assert_eq!(second.orig_relid, 2);
        match &join.qual[0] {
            Expr::Op(op) => {
                assert_eq!(op.opfuncid, Some(F_INT8EQ));
                assert_eq!(op.args[0].as_var().unwrap().varno, VarNo::Outer);
                assert_eq!(op.args[1].as_var().unwrap().varno, VarNo::Inner);
            }
            other => panic!("unexpected qual {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_extends_child() {
        let cat = CatalogSnapshot::new();
        let outer = scan(1, &[(1, DataType::Integer)]);
        let inner = scan(2, &[(1, DataType::Integer)]);
        let mut join = Plan::new(
            PlanKind::NestLoop {
                outer: Box::new(outer),
                inner: Box::new(inner),
            },
            PathCost::new(0.0, 5.0),
            10.0,
            16,
        )
        .with_targetlist(vec![TargetEntry::new(Expr::var(2, 3, DataType::Float), "f")]);
        set_plan_references(&mut join, &cat).unwrap();
        let var = join.targetlist[0].expr.as_var().unwrap();
        assert_eq!((var.varno, var.attno), (VarNo::Inner, 2));
        let inner = join.children()[1];
        assert_eq!(inner.targetlist.len(), 2);
        assert!(inner.targetlist[1].resjunk);
    }

    #[test]
    fn test_type_mismatch_is_invariant_violation() {
        let cat = CatalogSnapshot::new();
        let outer = scan(1, &[(1, DataType::Integer)]);
        let inner = scan(2, &[(1, DataType::Integer)]);
        let mut join = Plan::new(
            PlanKind::NestLoop {
                outer: Box::new(outer),
                inner: Box::new(inner),
            },
            PathCost::new(0.0, 5.0),
            10.0,
            16,
        )
        .with_targetlist(vec![TargetEntry::new(Expr::var(1, 1, DataType::Text), "a")]);
        let err = set_plan_references(&mut join, &cat).unwrap_err();
        assert_eq!(err.category(), crate::core::ErrorCategory::InvariantViolation);
    }

    #[test]
    fn test_sort_reads_child_positions() {
        let cat = CatalogSnapshot::new();
        let child = scan(1, &[(1, DataType::Integer), (2, DataType::Integer)]);
        let tlist = child.targetlist.clone();
        let mut sort = Plan::new(
            PlanKind::Sort {
                child: Box::new(child),
                keys: vec![SortKey {
                    expr: Expr::var(1, 2, DataType::Integer),
                    sortop: INT8_LT_OP,
                    nulls_first: false,
                }],
            },
            PathCost::new(1.0, 2.0),
            10.0,
            8,
        )
        .with_targetlist(tlist)
        .with_qual(vec![eq(
            Expr::var(1, 1, DataType::Integer),
            Expr::constant(Value::integer(1)),
        )]);
        set_plan_references(&mut sort, &cat).unwrap();
        match &sort.kind {
            PlanKind::Sort { keys, child } => {
                let key = keys[0].expr.as_var().unwrap();
                assert_eq!((key.varno, key.attno), (VarNo::Outer, 2));
                assert_eq!((key.orig_relid, key.orig_attno), (1, 2));
                // Scans keep relation references
                assert_eq!(child.targetlist[0].expr, Expr::var(1, 1, DataType::Integer));
            }
            _ => unreachable!(),
        }
        assert_eq!(sort.targetlist[0].expr.as_var().unwrap().attno, 1);
    }
}
