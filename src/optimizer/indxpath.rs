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

//! Index, OR-index and TID scan paths of a base relation

use std::sync::Arc;

use crate::catalog::oids::TID_EQ_OP;
use crate::catalog::{IndexAm, IndexInfo, Strategy};
use crate::core::{DataType, Oid, RelId, Result, CTID_ATTNO};
use crate::expr::{Expr, Var};

use super::clauses::RestrictInfo;
use super::cost::{clamp_row_est, IndexKind, PathCost};
use super::path::{OrIndexArm, Path, PathKind};
use super::pathkeys::{PathKey, PathOrder};
use super::predtest::predicate_implied_by;
use super::relids::Relids;
use super::relnode::{PlannerContext, RelOptInfo};

/// A clause matched to one index key
#[derive(Debug, Clone)]
struct KeyMatch {
    key: usize,
    clause: RestrictInfo,
}

/// Whether `expr` is the value of index key `key`
fn matches_key(expr: &Expr, index: &IndexInfo, key: usize) -> bool {
    match index.keys.get(key) {
        Some(0) => index.expression.as_ref() == Some(expr),
        Some(attno) => expr
            .as_var()
            .is_some_and(|v| v.relid() == Some(index.relid) && v.attno == *attno && v.levelsup == 0),
        None => false,
    }
}

/// Whether `side` can supply a comparison value for a scan of `relid`
///
/// Restriction values are constants or params; join values come from other
/// relations that an enclosing nestloop provides.
fn is_comparison_value(side: &Expr, relid: RelId, allow_outer: bool) -> bool {
    match side {
        Expr::Const(_) | Expr::Param(_) => true,
        _ => {
            let relids = side.relids();
            allow_outer && !relids.is_empty() && !relids.contains(relid)
        }
    }
}

/// Key position the clause can drive, with the operator in `key op value` form
fn match_clause_to_index(
    clause: &Expr,
    index: &IndexInfo,
    ctx: &PlannerContext<'_>,
    allow_outer: bool,
) -> Result<Option<(usize, Oid)>> {
    let Some((opno, left, right)) = clause.as_binary_op() else {
        return Ok(None);
    };
    for key in 0..index.keys.len() {
        let op = if matches_key(left, index, key) && is_comparison_value(right, index.relid, allow_outer) {
            Some(opno)
        } else if matches_key(right, index, key)
            && is_comparison_value(left, index.relid, allow_outer)
        {
            ctx.catalog.get_commutator(opno)?
        } else {
            None
        };
        let Some(op) = op else { continue };
        let Some(&opclass) = index.opclasses.get(key) else {
            continue;
        };
        let class = ctx.catalog.opclass(opclass)?;
        match class.strategy_of(op) {
            Some(Strategy::Equal) => return Ok(Some((key, op))),
            Some(_) if index.am.is_ordered() => return Ok(Some((key, op))),
            _ => {}
        }
    }
    Ok(None)
}

/// Clauses usable as index quals: a key prefix for ordered indexes, every
/// key for the rest
fn usable_matches(index: &IndexInfo, mut matches: Vec<KeyMatch>) -> Option<Vec<KeyMatch>> {
    if matches.is_empty() {
        return None;
    }
    if index.am.supports_partial_keys() {
        let mut prefix = 0;
        while matches.iter().any(|m| m.key == prefix) {
            prefix += 1;
        }
        if prefix == 0 {
            return None;
        }
        matches.retain(|m| m.key < prefix);
    } else if !(0..index.keys.len()).all(|k| matches.iter().any(|m| m.key == k)) {
        return None;
    }
    matches.sort_by_key(|m| m.key);
    Some(matches)
}

fn index_kind(am: IndexAm) -> IndexKind {
    if am.is_ordered() {
        IndexKind::Ordered
    } else {
        IndexKind::Hashed
    }
}

/// Order an ordered index delivers, one less-than operator per plain key
fn index_order(index: &IndexInfo, ctx: &PlannerContext<'_>) -> Result<(PathOrder, Vec<PathKey>)> {
    if !index.am.is_ordered() {
        return Ok((PathOrder::Unordered, Vec::new()));
    }
    let mut ops = Vec::new();
    let mut keys = Vec::new();
    for (attno, opclass) in index.keys.iter().zip(&index.opclasses) {
        if *attno == 0 {
            break;
        }
        let Some(lt) = ctx.catalog.opclass(*opclass)?.operator(Strategy::Less) else {
            break;
        };
        let typ = ctx
            .catalog
            .relation_info(index.relid)?
            .column_info(*attno)
            .map(|c| c.typ)
            .unwrap_or(DataType::Null);
        ops.push(lt);
        keys.push(vec![Var::new(index.relid, *attno, typ)]);
    }
    if ops.is_empty() {
        return Ok((PathOrder::Unordered, Vec::new()));
    }
    Ok((PathOrder::SortOps(ops), keys))
}

/// Whether the query's restrictions make a partial index usable
fn index_is_usable(index: &IndexInfo, rel: &RelOptInfo, ctx: &PlannerContext<'_>) -> Result<bool> {
    match &index.predicate {
        None => Ok(true),
        Some(pred) => {
            let clauses: Vec<Expr> = rel.restrictinfo.iter().map(|r| r.clause.clone()).collect();
            predicate_implied_by(pred, &clauses, ctx.catalog)
        }
    }
}

fn others(rel: &RelOptInfo, used: &[KeyMatch]) -> Vec<RestrictInfo> {
    rel.restrictinfo
        .iter()
        .filter(|r| !used.iter().any(|m| m.clause.clause == r.clause))
        .cloned()
        .collect()
}

/// Index scan paths over restriction clauses
///
/// Records on each restriction which indexes it matched. A btree index with
/// no matching clause still yields a full scan when its order is what the
/// query sorts by.
pub fn create_index_paths(rel: &mut RelOptInfo, ctx: &PlannerContext<'_>) -> Result<Vec<Path>> {
    let mut paths = Vec::new();
    let Some(relid) = rel.relids.singleton_member() else {
        return Ok(paths);
    };
    let indexes = rel.indexes.clone();
    for index in &indexes {
        if !index_is_usable(index, rel, ctx)? {
            continue;
        }
        let mut matches = Vec::new();
        for rinfo in rel.restrictinfo.iter_mut() {
            if rinfo.clause.as_or().is_some() {
                continue;
            }
            if let Some((key, _)) = match_clause_to_index(&rinfo.clause, index, ctx, false)? {
                if !rinfo.indexable.contains(&index.oid) {
                    rinfo.indexable.push(index.oid);
                }
                matches.push(KeyMatch {
                    key,
                    clause: rinfo.clone(),
                });
            }
        }

        let (ordering, pathkeys) = index_order(index, ctx)?;
        let usable = usable_matches(index, matches);
        let full_scan_wanted = usable.is_none()
            && !ctx.query_order.is_empty()
            && pathkeys
                .first()
                .is_some_and(|k| k.iter().any(|v| v.same_column(&ctx.query_order[0])));
        let index_qual = match usable {
            Some(m) => m,
            None if full_scan_wanted => Vec::new(),
            None => continue,
        };

        let selectivity: f64 = index_qual.iter().map(|m| m.clause.selectivity).product();
        let rest = others(rel, &index_qual);
        let cost = ctx
            .cost
            .estimate_index_scan(
                index_kind(index.am),
                rel.pages,
                rel.tuples,
                index.pages,
                index.tuples,
                selectivity,
                rest.len(),
            )
            .penalize_unless(ctx.config.enable_indexscan);
        paths.push(
            Path::new(
                Relids::singleton(relid),
                PathKind::IndexScan {
                    index: index.oid,
                    am: index.am,
                    keys: index.keys.clone(),
                    index_qual: index_qual.into_iter().map(|m| m.clause).collect(),
                    outer_relids: Relids::empty(),
                },
                cost,
                rel.rows,
            )
            .with_order(ordering, pathkeys)
            .with_restrict(rest),
        );
    }
    Ok(paths)
}

/// OR-index paths: every disjunct of an OR restriction scanned through a
/// single-key index
pub fn create_or_index_paths(rel: &RelOptInfo, ctx: &PlannerContext<'_>) -> Result<Vec<Path>> {
    let mut paths = Vec::new();
    let Some(relid) = rel.relids.singleton_member() else {
        return Ok(paths);
    };
    for rinfo in &rel.restrictinfo {
        let Some(disjuncts) = rinfo.clause.as_or() else {
            continue;
        };
        let mut arms = Vec::new();
        let mut total = PathCost::zero();
        let mut selectivity = 0.0;
        for disjunct in disjuncts {
            let arm_sel = super::selectivity::clause_selectivity(disjunct, ctx.catalog)?;
            let mut best: Option<(Oid, PathCost)> = None;
            for index in rel.indexes.iter().filter(|i| i.keys.len() == 1) {
                if !index_is_usable(index, rel, ctx)? {
                    continue;
                }
                if match_clause_to_index(disjunct, index, ctx, false)?.is_none() {
                    continue;
                }
                let cost = ctx.cost.estimate_index_scan(
                    index_kind(index.am),
                    rel.pages,
                    rel.tuples,
                    index.pages,
                    index.tuples,
                    arm_sel,
                    0,
                );
                if best.map_or(true, |(_, c)| cost.total < c.total) {
                    best = Some((index.oid, cost));
                }
            }
            let Some((index, cost)) = best else {
                arms.clear();
                break;
            };
            total = PathCost::new(total.startup + cost.startup, total.total + cost.total);
            selectivity += arm_sel;
            arms.push(OrIndexArm {
                index,
                clause: disjunct.clone(),
            });
        }
        if arms.is_empty() {
            continue;
        }
        let rest: Vec<RestrictInfo> = rel
            .restrictinfo
            .iter()
            .filter(|r| r.clause != rinfo.clause)
            .cloned()
            .collect();
        let selectivity = selectivity.min(1.0);
        let rows = clamp_row_est(rel.rows.min(rel.tuples * selectivity));
        let cost = PathCost::new(
            total.startup,
            total.total + rows * ctx.cost.qual_cost(rest.len()),
        )
        .penalize_unless(ctx.config.enable_indexscan);
        paths.push(
            Path::new(
                Relids::singleton(relid),
                PathKind::OrIndexScan {
                    arms,
                    or_clause: rinfo.clone(),
                },
                cost,
                rel.rows,
            )
            .with_restrict(rest),
        );
    }
    Ok(paths)
}

fn is_ctid_var(expr: &Expr) -> bool {
    expr.as_var().is_some_and(|v| v.attno == CTID_ATTNO && v.levelsup == 0)
}

/// TID scan path for `ctid = value` restrictions
pub fn create_tid_paths(rel: &RelOptInfo, ctx: &PlannerContext<'_>) -> Result<Vec<Path>> {
    let Some(relid) = rel.relids.singleton_member() else {
        return Ok(Vec::new());
    };
    let mut tid_quals = Vec::new();
    let mut rest = Vec::new();
    for rinfo in &rel.restrictinfo {
        let is_tid = match rinfo.clause.as_binary_op() {
            Some((op, l, r)) if op == TID_EQ_OP => {
                (is_ctid_var(l) && is_comparison_value(r, relid, false))
                    || (is_ctid_var(r) && is_comparison_value(l, relid, false))
            }
            _ => false,
        };
        if is_tid && tid_quals.is_empty() {
            tid_quals.push(rinfo.clause.clone());
        } else {
            rest.push(rinfo.clone());
        }
    }
    if tid_quals.is_empty() {
        return Ok(Vec::new());
    }
    let cost = ctx
        .cost
        .estimate_tid_scan(tid_quals.len(), rest.len())
        .penalize_unless(ctx.config.enable_tidscan);
    Ok(vec![Path::new(
        Relids::singleton(relid),
        PathKind::TidScan { tid_quals },
        cost,
        rel.rows,
    )
    .with_restrict(rest)])
}

/// Index paths whose comparison values come from an outer relation
///
/// Used as the inner side of a nestloop; each scan returns the rows
/// matching one outer row.
pub fn create_inner_index_paths(rel: &RelOptInfo, ctx: &PlannerContext<'_>) -> Result<Vec<Arc<Path>>> {
    let mut paths = Vec::new();
    let Some(relid) = rel.relids.singleton_member() else {
        return Ok(paths);
    };
    for index in &rel.indexes {
        if !index_is_usable(index, rel, ctx)? {
            continue;
        }
        for entry in &rel.joininfo {
            let mut matches = Vec::new();
            for clause in &entry.clauses {
                if let Some((key, _)) = match_clause_to_index(&clause.clause, index, ctx, true)? {
                    matches.push(KeyMatch {
                        key,
                        clause: clause.clone(),
                    });
                }
            }
            let join_matched = matches.len();
            if join_matched == 0 {
                continue;
            }
            for rinfo in &rel.restrictinfo {
                if rinfo.clause.as_or().is_none() {
                    if let Some((key, _)) = match_clause_to_index(&rinfo.clause, index, ctx, false)? {
                        matches.push(KeyMatch {
                            key,
                            clause: rinfo.clone(),
                        });
                    }
                }
            }
            let Some(index_qual) = usable_matches(index, matches) else {
                continue;
            };
            let join_sel: f64 = index_qual
                .iter()
                .filter(|m| m.clause.is_join_clause())
                .map(|m| m.clause.selectivity)
                .product();
            if index_qual.iter().all(|m| !m.clause.is_join_clause()) {
                continue;
            }
            let scan_sel: f64 = index_qual.iter().map(|m| m.clause.selectivity).product();
            let rest = others(rel, &index_qual);
            let cost = ctx
                .cost
                .estimate_index_scan(
                    index_kind(index.am),
                    rel.pages,
                    rel.tuples,
                    index.pages,
                    index.tuples,
                    scan_sel,
                    rest.len(),
                )
                .penalize_unless(ctx.config.enable_indexscan);
            let (ordering, pathkeys) = index_order(index, ctx)?;
            let outer_relids = index_qual
                .iter()
                .filter(|m| m.clause.is_join_clause())
                .fold(Relids::empty(), |acc, m| {
                    acc.union(&m.clause.relids.difference(&Relids::singleton(relid)))
                });
            paths.push(Arc::new(
                Path::new(
                    Relids::singleton(relid),
                    PathKind::IndexScan {
                        index: index.oid,
                        am: index.am,
                        keys: index.keys.clone(),
                        index_qual: index_qual.into_iter().map(|m| m.clause).collect(),
                        outer_relids,
                    },
                    cost,
                    clamp_row_est(rel.rows * join_sel),
                )
                .with_order(ordering, pathkeys)
                .with_restrict(rest),
            ));
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::catalog::{CatalogSnapshot, ColumnInfo, RelationInfo};
    use crate::core::Value;
    use crate::optimizer::clauses::classify_quals;
    use crate::optimizer::config::PlannerConfig;
    use crate::optimizer::relnode::needed_vars;

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new()
            .with_relation(
                RelationInfo::new(1, "t", 1000.0, 100_000.0)
                    .column(ColumnInfo::new("a", DataType::Integer).with_ndistinct(100_000.0))
                    .column(ColumnInfo::new("b", DataType::Integer).with_ndistinct(100.0)),
            )
            .with_relation(
                RelationInfo::new(2, "u", 10.0, 1000.0)
                    .column(ColumnInfo::new("a", DataType::Integer).with_ndistinct(1000.0)),
            )
            .with_index(
                IndexInfo::new(100, 1, "t_a", IndexAm::BTree)
                    .key(1, INT8_BTREE_OPS)
                    .with_size(300.0, 100_000.0),
            )
            .with_index(
                IndexInfo::new(101, 1, "t_b_hash", IndexAm::Hash)
                    .key(2, INT8_HASH_OPS)
                    .with_size(300.0, 100_000.0),
            )
    }

    fn cmp(op: Oid, att: i16, value: i64) -> Expr {
        Expr::op(
            op,
            vec![Expr::var(1, att, DataType::Integer), Expr::constant(Value::integer(value))],
            DataType::Boolean,
        )
    }

    fn rel(cat: &CatalogSnapshot, qual: &Expr) -> RelOptInfo {
        let mut c = classify_quals(Some(qual), cat).unwrap();
        RelOptInfo::base(
            1,
            cat,
            c.restrictions.remove(&1).unwrap_or_default(),
            c.joins.remove(&1).unwrap_or_default(),
            needed_vars(1, [qual]),
        )
        .unwrap()
    }

    #[test]
    fn test_btree_and_hash_matching() {
        let cat = catalog();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let qual = Expr::and(vec![cmp(INT8_EQ_OP, 1, 5), cmp(INT8_EQ_OP, 2, 7)]);
        let mut r = rel(&cat, &qual);
        let paths = create_index_paths(&mut r, &ctx).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(r.restrictinfo.iter().all(|ri| ri.indexable.len() == 1));
        let btree = paths
            .iter()
            .find(|p| matches!(p.kind, PathKind::IndexScan { index: 100, .. }))
            .unwrap();
        assert_eq!(btree.ordering, PathOrder::SortOps(vec![INT8_LT_OP]));
        assert_eq!(btree.loc_restrict.len(), 1);
    }

    #[test]
    fn test_hash_index_ignores_range_clause() {
        let cat = catalog();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let mut r = rel(&cat, &cmp(INT8_LT_OP, 2, 7));
        assert!(create_index_paths(&mut r, &ctx).unwrap().is_empty());
    }

    #[test]
    fn test_or_index_path() {
        let cat = catalog();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let qual = Expr::or(vec![cmp(INT8_EQ_OP, 1, 5), cmp(INT8_EQ_OP, 2, 7)]);
        let r = rel(&cat, &qual);
        let paths = create_or_index_paths(&r, &ctx).unwrap();
        assert_eq!(paths.len(), 1);
        match &paths[0].kind {
            PathKind::OrIndexScan { arms, .. } => {
                assert_eq!(arms.iter().map(|a| a.index).collect::<Vec<_>>(), vec![100, 101]);
            }
            other => panic!("unexpected path {:?}", other),
        }
    }

    #[test]
    fn test_tid_path() {
        let cat = catalog();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let qual = Expr::op(
            TID_EQ_OP,
            vec![
                Expr::var(1, CTID_ATTNO, DataType::Tid),
                Expr::param(crate::expr::ParamKind::Extern, 1, DataType::Tid),
            ],
            DataType::Boolean,
        );
        let r = rel(&cat, &qual);
        let paths = create_tid_paths(&r, &ctx).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(matches!(paths[0].kind, PathKind::TidScan { .. }));
    }

    #[test]
    fn test_inner_index_path() {
        let cat = catalog();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let qual = Expr::op(
            INT8_EQ_OP,
            vec![
                Expr::var(2, 1, DataType::Integer),
                Expr::var(1, 1, DataType::Integer),
            ],
            DataType::Boolean,
        );
        let r = rel(&cat, &qual);
        let paths = create_inner_index_paths(&r, &ctx).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].required_outer(), Relids::singleton(2));
        assert!(paths[0].rows < 10.0);
    }

    #[test]
    fn test_partial_index_needs_implied_predicate() {
        let cat = catalog().with_index(
            IndexInfo::new(102, 1, "t_b_pos", IndexAm::BTree)
                .key(2, INT8_BTREE_OPS)
                .with_predicate(cmp(INT8_GT_OP, 2, 0))
                .with_size(100.0, 50_000.0),
        );
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let mut r = rel(&cat, &cmp(INT8_EQ_OP, 2, 5));
        let paths = create_index_paths(&mut r, &ctx).unwrap();
        assert!(paths
            .iter()
            .any(|p| matches!(p.kind, PathKind::IndexScan { index: 102, .. })));

        let mut r = rel(&cat, &cmp(INT8_EQ_OP, 2, -5));
        let paths = create_index_paths(&mut r, &ctx).unwrap();
        assert!(!paths
            .iter()
            .any(|p| matches!(p.kind, PathKind::IndexScan { index: 102, .. })));
    }
}
