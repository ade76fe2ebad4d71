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

//! Path to plan conversion
//!
//! [`PlanBuilder`] turns the cheapest path of the final join relation into
//! a plan tree whose nodes still reference base relation columns, then
//! stacks the nodes the join search does not consider: grouping, window
//! aggregation, the final sort and the constant qualification.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::core::{AttrNumber, Error, Oid, RelId, Result};
use crate::executor::window::{GroupColumn, WindowAggSpec};
use crate::expr::{Expr, Var};

use super::cost::{clamp_row_est, PathCost};
use super::path::{Path, PathKind};
use super::pathkeys::PathOrder;
use super::plan::{Plan, PlanKind, SortKey};
use super::query::{Query, SortClause, TargetEntry};
use super::relids::Relids;
use super::relnode::{PlannerContext, RelOptInfo};

/// Share of input rows assumed to survive grouping
const GROUP_FRACTION: f64 = 0.1;

/// Width charged for each window function result column
const WINDOW_RESULT_WIDTH: usize = 8;

/// (target list index, sort operator) pairs describing an output order
pub(crate) type SortOrder = Vec<(usize, Oid)>;

/// Builds plan nodes for one query level
pub struct PlanBuilder<'a, 'c> {
    ctx: &'a PlannerContext<'c>,
    rel_tlists: FxHashMap<RelId, Vec<Var>>,
    rel_widths: FxHashMap<RelId, usize>,
}

impl<'a, 'c> PlanBuilder<'a, 'c> {
    /// Remembers the target lists of `base_rels`; call before the join search
    pub fn new(ctx: &'a PlannerContext<'c>, base_rels: &[RelOptInfo]) -> Self {
        let mut rel_tlists = FxHashMap::default();
        let mut rel_widths = FxHashMap::default();
        for rel in base_rels {
            if let Some(relid) = rel.relids.singleton_member() {
                rel_tlists.insert(relid, rel.targetlist.clone());
                rel_widths.insert(relid, rel.width);
            }
        }
        Self {
            ctx,
            rel_tlists,
            rel_widths,
        }
    }

    fn tlist_for(&self, relids: &Relids) -> Vec<TargetEntry> {
        relids
            .iter()
            .filter_map(|r| self.rel_tlists.get(&r))
            .flatten()
            .map(|v| {
                let expr = Expr::Var(v.clone());
                let name = expr.to_string();
                TargetEntry::new(expr, name)
            })
            .collect()
    }

    fn width_for(&self, relids: &Relids) -> usize {
        relids.iter().filter_map(|r| self.rel_widths.get(&r)).sum()
    }

    /// Plan for `path` and everything below it
    pub fn create_plan(&self, path: &Path) -> Result<Plan> {
        let scan_relid = || {
            path.parent.singleton_member().ok_or_else(|| {
                Error::invariant(format!("scan path over relations {}", path.parent))
            })
        };
        let kind = match &path.kind {
            PathKind::SeqScan => PlanKind::SeqScan {
                relid: scan_relid()?,
            },
            PathKind::IndexScan {
                index, index_qual, ..
            } => PlanKind::IndexScan {
                relid: scan_relid()?,
                indexes: vec![*index],
                index_quals: vec![index_qual.iter().map(|r| r.clause.clone()).collect()],
            },
            PathKind::OrIndexScan { arms, .. } => PlanKind::IndexScan {
                relid: scan_relid()?,
                indexes: arms.iter().map(|a| a.index).collect(),
                index_quals: arms.iter().map(|a| vec![a.clause.clone()]).collect(),
            },
            PathKind::TidScan { tid_quals } => PlanKind::TidScan {
                relid: scan_relid()?,
                tid_quals: tid_quals.clone(),
            },
            PathKind::NestLoop { outer, inner } => PlanKind::NestLoop {
                outer: Box::new(self.create_plan(outer)?),
                inner: Box::new(self.create_plan(inner)?),
            },
            PathKind::MergeJoin {
                outer,
                inner,
                merge_clauses,
                outer_keys,
                inner_keys,
                order,
                sort_outer,
                sort_inner,
            } => {
                let mut outer_plan = self.create_plan(outer)?;
                if *sort_outer {
                    outer_plan = self.make_sort(outer_plan, sort_keys(outer_keys, order.left_sortop));
                }
                let mut inner_plan = self.create_plan(inner)?;
                if *sort_inner {
                    inner_plan = self.make_sort(inner_plan, sort_keys(inner_keys, order.right_sortop));
                }
                PlanKind::MergeJoin {
                    outer: Box::new(outer_plan),
                    inner: Box::new(inner_plan),
                    merge_clauses: merge_clauses.iter().map(|r| r.clause.clone()).collect(),
                    order: order.clone(),
                }
            }
            PathKind::HashJoin {
                outer,
                inner,
                hash_clauses,
                inner_keys,
                ..
            } => {
                let hash_op = hash_clauses
                    .first()
                    .and_then(|r| r.hash_op)
                    .ok_or_else(|| Error::invariant("hash join path without a hashable clause"))?;
                let inner_plan = self.create_plan(inner)?;
                PlanKind::HashJoin {
                    outer: Box::new(self.create_plan(outer)?),
                    inner: Box::new(make_hash(inner_plan, inner_keys.clone())),
                    hash_clauses: hash_clauses.iter().map(|r| r.clause.clone()).collect(),
                    hash_op,
                }
            }
        };
        let qual = path.loc_restrict.iter().map(|r| r.clause.clone()).collect();
        Ok(Plan::new(kind, path.cost, path.rows, self.width_for(&path.parent))
            .with_targetlist(self.tlist_for(&path.parent))
            .with_qual(qual))
    }

    fn make_sort(&self, child: Plan, keys: Vec<SortKey>) -> Plan {
        let cost = self.ctx.cost.estimate_sort(child.cost, child.rows, child.width);
        let (rows, width) = (child.rows, child.width);
        let tlist = child.targetlist.clone();
        Plan::new(
            PlanKind::Sort {
                child: Box::new(child),
                keys,
            },
            cost,
            rows,
            width,
        )
        .with_targetlist(tlist)
    }

    /// Add grouping, window, sort and constant-qualification nodes above `plan`
    ///
    /// `presorted` is the order the join tree already delivers, as computed
    /// by [`path_sort_order`]. Window clauses are stacked in query order;
    /// each one reads its input's columns followed by the results of the
    /// window clauses below it.
    pub fn build_upper_plan(
        &self,
        mut plan: Plan,
        presorted: SortOrder,
        query: &Query,
        constant_quals: Vec<Expr>,
    ) -> Result<Plan> {
        let grouping = !query.group_by.is_empty() || query.has_aggregates();
        plan.targetlist = upper_input_tlist(query, grouping);
        let mut current = presorted;

        if grouping {
            let wanted = sort_order(&query.group_by);
            if !query.group_by.is_empty() && !order_satisfies(&current, &wanted) {
                plan = self.make_sort(plan, clause_sort_keys(query, &query.group_by)?);
                current = wanted;
            } else if query.group_by.is_empty() {
                current.clear();
            }
            plan = self.make_grouping(plan, query)?;
        }

        let nwindows = query.windows.len();
        for (i, window) in query.windows.iter().enumerate() {
            let clauses = window.sort_clauses();
            let wanted = sort_order(&clauses);
            if !wanted.is_empty() && !order_satisfies(&current, &wanted) {
                plan = self.make_sort(plan, clause_sort_keys(query, &clauses)?);
                current = wanted;
            }

            let mut spec = WindowAggSpec::new()
                .frame(window.frame)
                .top_window(i + 1 == nwindows);
            for clause in &window.partition_by {
                spec = spec.partition_by(self.group_column(clause)?);
            }
            for clause in &window.order_by {
                spec = spec.order_by(self.group_column(clause)?);
            }
            spec.start_offset = window.start_offset.clone();
            spec.end_offset = window.end_offset.clone();
            spec.in_range = window.in_range.clone();
            spec.functions = window.functions.clone();
            spec.validate()?;
            plan = self.make_window(plan, spec);
        }

        if !query.order_by.is_empty() {
            let wanted = sort_order(&query.order_by);
            if !order_satisfies(&current, &wanted) {
                plan = self.make_sort(plan, clause_sort_keys(query, &query.order_by)?);
            }
        }

        if !constant_quals.is_empty() {
            let tlist = plan.targetlist.clone();
            let (cost, rows, width) = (plan.cost, plan.rows, plan.width);
            plan = Plan::new(
                PlanKind::Result {
                    child: Some(Box::new(plan)),
                    const_qual: constant_quals,
                },
                cost,
                rows,
                width,
            )
            .with_targetlist(tlist);
        }
        debug!(top = plan.name(), cost = plan.cost.total, "upper plan built");
        Ok(plan)
    }

    fn group_column(&self, clause: &SortClause) -> Result<GroupColumn> {
        let eq_func = self.ctx.catalog.get_opcode(clause.eqop)?;
        Ok(GroupColumn::new(clause.tle_index, clause.eqop, eq_func))
    }

    fn make_grouping(&self, child: Plan, query: &Query) -> Result<Plan> {
        let keys: Vec<Expr> = query
            .group_by
            .iter()
            .map(|c| tle_expr(query, c.tle_index).cloned())
            .collect::<Result<_>>()?;
        let naggs = query
            .target_list
            .iter()
            .filter(|t| t.expr.contains_aggregates())
            .count();
        let rows = if keys.is_empty() {
            1.0
        } else {
            clamp_row_est(child.rows * GROUP_FRACTION)
        };
        let run = child.rows * self.ctx.cost.qual_cost(keys.len() + naggs);
        let width = child.width;
        let (kind, cost) = if query.has_aggregates() {
            let total = child.cost.total + run;
            (
                PlanKind::Agg {
                    child: Box::new(child),
                    group_keys: keys,
                },
                PathCost::new(total, total),
            )
        } else {
            let cost = PathCost::new(child.cost.startup, child.cost.total + run);
            (
                PlanKind::Group {
                    child: Box::new(child),
                    keys,
                    eq_ops: query.group_by.iter().map(|c| c.eqop).collect(),
                },
                cost,
            )
        };
        Ok(Plan::new(kind, cost, rows, width).with_targetlist(query.target_list.clone()))
    }

    fn make_window(&self, child: Plan, spec: WindowAggSpec) -> Plan {
        let mut tlist = child.targetlist.clone();
        let base = tlist.len();
        for (k, func) in spec.functions.iter().enumerate() {
            tlist.push(TargetEntry::new(
                Expr::outer_var((base + k + 1) as AttrNumber, func.result_type),
                format!("window_{}", k + 1),
            ));
        }
        let nfuncs = spec.functions.len();
        let cost = PathCost::new(
            child.cost.startup,
            child.cost.total + child.rows * self.ctx.cost.qual_cost(nfuncs.max(1)),
        );
        let (rows, width) = (child.rows, child.width + nfuncs * WINDOW_RESULT_WIDTH);
        Plan::new(
            PlanKind::WindowAgg {
                child: Box::new(child),
                spec,
            },
            cost,
            rows,
            width,
        )
        .with_targetlist(tlist)
    }
}

fn sort_keys(exprs: &[Expr], sortop: Oid) -> Vec<SortKey> {
    exprs
        .iter()
        .map(|e| SortKey {
            expr: e.clone(),
            sortop,
            nulls_first: false,
        })
        .collect()
}

fn make_hash(child: Plan, keys: Vec<Expr>) -> Plan {
    let cost = PathCost::new(child.cost.total, child.cost.total);
    let (rows, width) = (child.rows, child.width);
    let tlist = child.targetlist.clone();
    Plan::new(
        PlanKind::Hash {
            child: Box::new(child),
            keys,
        },
        cost,
        rows,
        width,
    )
    .with_targetlist(tlist)
}

fn tle_expr(query: &Query, index: usize) -> Result<&Expr> {
    query
        .target_list
        .get(index)
        .map(|t| &t.expr)
        .ok_or_else(|| {
            Error::invalid_argument(format!(
                "sort clause references target entry {} of {}",
                index,
                query.target_list.len()
            ))
        })
}

fn clause_sort_keys(query: &Query, clauses: &[SortClause]) -> Result<Vec<SortKey>> {
    clauses
        .iter()
        .map(|c| {
            Ok(SortKey {
                expr: tle_expr(query, c.tle_index)?.clone(),
                sortop: c.sortop,
                nulls_first: c.nulls_first,
            })
        })
        .collect()
}

pub(crate) fn sort_order(clauses: &[SortClause]) -> SortOrder {
    clauses.iter().map(|c| (c.tle_index, c.sortop)).collect()
}

/// True if rows in order `have` are also in order `wanted`
pub(crate) fn order_satisfies(have: &[(usize, Oid)], wanted: &[(usize, Oid)]) -> bool {
    wanted.len() <= have.len() && have.iter().zip(wanted).all(|(h, w)| h == w)
}

/// Output order of `path` in terms of the query's target entries
///
/// Stops at the first sort position no plain-column target entry matches.
pub fn path_sort_order(path: &Path, query: &Query) -> SortOrder {
    let ops: Vec<Oid> = match &path.ordering {
        PathOrder::Unordered => return Vec::new(),
        PathOrder::SortOps(ops) => ops.clone(),
        PathOrder::Merge(order) => vec![order.left_sortop],
    };
    let mut out = Vec::new();
    for (key, op) in path.pathkeys.iter().zip(ops) {
        let found = query.target_list.iter().position(|t| {
            t.expr
                .as_var()
                .is_some_and(|v| key.iter().any(|k| k.same_column(v)))
        });
        match found {
            Some(index) => out.push((index, op)),
            None => break,
        }
    }
    out
}

/// Target list of the top join or scan node
///
/// Without grouping it is the query's own target list; with grouping it is
/// the grouping expressions plus every column the aggregate step reads.
/// Columns window functions need that the list lacks are added as junk.
fn upper_input_tlist(query: &Query, grouping: bool) -> Vec<TargetEntry> {
    let mut tlist: Vec<TargetEntry> = if grouping {
        query
            .group_by
            .iter()
            .filter_map(|c| query.target_list.get(c.tle_index))
            .cloned()
            .collect()
    } else {
        query.target_list.clone()
    };

    let mut needed: Vec<Var> = Vec::new();
    if grouping {
        for entry in &query.target_list {
            needed.extend(entry.expr.pull_vars());
        }
    }
    for window in &query.windows {
        for func in &window.functions {
            for arg in &func.args {
                needed.extend(arg.pull_vars());
            }
            if let Some(filter) = &func.filter {
                needed.extend(filter.pull_vars());
            }
        }
    }
    for var in needed {
        if var.levelsup != 0 || var.relid().is_none() {
            continue;
        }
        let present = tlist
            .iter()
            .any(|t| t.expr.as_var().is_some_and(|v| v.same_column(&var)));
        if !present {
            let expr = Expr::Var(var);
            let name = expr.to_string();
            tlist.push(TargetEntry::junk(expr, name));
        }
    }
    tlist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::catalog::{CatalogSnapshot, ColumnInfo, RelationInfo};
    use crate::core::DataType;
    use crate::optimizer::allpaths::build_base_rel;
    use crate::optimizer::clauses::classify_quals;
    use crate::optimizer::config::PlannerConfig;
    use crate::optimizer::pathkeys::PathOrder;

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new().with_relation(
            RelationInfo::new(1, "t", 10.0, 1000.0)
                .column(ColumnInfo::new("a", DataType::Integer).with_ndistinct(100.0))
                .column(ColumnInfo::new("b", DataType::Integer).with_ndistinct(10.0)),
        )
    }

    fn query() -> Query {
        Query::new()
            .relation(1)
            .target(TargetEntry::new(Expr::var(1, 1, DataType::Integer), "a"))
            .target(TargetEntry::new(Expr::var(1, 2, DataType::Integer), "b"))
    }

    #[test]
    fn test_order_satisfies_prefix() {
        let have = vec![(0, INT8_LT_OP), (1, INT8_LT_OP)];
        assert!(order_satisfies(&have, &[(0, INT8_LT_OP)]));
        assert!(order_satisfies(&have, &[]));
        assert!(!order_satisfies(&have, &[(1, INT8_LT_OP)]));
        assert!(!order_satisfies(&have[..1], &have));
    }

    #[test]
    fn test_order_by_adds_sort_on_unordered_scan() {
        let cat = catalog();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let q = query().order_by(SortClause::new(1, INT8_LT_OP, INT8_EQ_OP));
        let mut classified = classify_quals(None, &cat).unwrap();
        let needed: Vec<&Expr> = q.target_list.iter().map(|t| &t.expr).collect();
        let rel = build_base_rel(1, &mut classified, &needed, &ctx).unwrap();
        let builder = PlanBuilder::new(&ctx, std::slice::from_ref(&rel));
        let path = rel.cheapest_path().unwrap();
        let scan = builder.create_plan(path).unwrap();
        assert!(matches!(scan.kind, PlanKind::SeqScan { relid: 1 }));
        assert_eq!(scan.targetlist.len(), 2);

        let top = builder
            .build_upper_plan(scan, path_sort_order(path, &q), &q, Vec::new())
            .unwrap();
        match &top.kind {
            PlanKind::Sort { keys, .. } => {
                assert_eq!(keys.len(), 1);
                assert_eq!(keys[0].expr, Expr::var(1, 2, DataType::Integer));
            }
            other => panic!("expected sort, got {:?}", other),
        }
    }

    #[test]
    fn test_presorted_path_skips_sort() {
        let cat = catalog();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let q = query().order_by(SortClause::new(0, INT8_LT_OP, INT8_EQ_OP));
        let var = Var::new(1, 1, DataType::Integer);
        let path = Path::new(
            Relids::singleton(1),
            PathKind::SeqScan,
            PathCost::new(0.0, 10.0),
            1000.0,
        )
        .with_order(PathOrder::SortOps(vec![INT8_LT_OP]), vec![vec![var]]);
        assert_eq!(path_sort_order(&path, &q), vec![(0, INT8_LT_OP)]);

        let builder = PlanBuilder::new(&ctx, &[]);
        let scan = builder.create_plan(&path).unwrap();
        let top = builder
            .build_upper_plan(scan, path_sort_order(&path, &q), &q, Vec::new())
            .unwrap();
        assert!(top.is_scan());
    }

    #[test]
    fn test_group_by_adds_sort_and_group() {
        let cat = catalog();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let q = Query::new()
            .relation(1)
            .target(TargetEntry::new(Expr::var(1, 2, DataType::Integer), "b"))
            .group_by(SortClause::new(0, INT8_LT_OP, INT8_EQ_OP));
        let path = Path::new(
            Relids::singleton(1),
            PathKind::SeqScan,
            PathCost::new(0.0, 10.0),
            1000.0,
        );
        let builder = PlanBuilder::new(&ctx, &[]);
        let scan = builder.create_plan(&path).unwrap();
        let top = builder.build_upper_plan(scan, Vec::new(), &q, Vec::new()).unwrap();
        assert_eq!(top.name(), "Group");
        assert_eq!(top.rows, 100.0);
        assert_eq!(top.children()[0].name(), "Sort");
    }
}
