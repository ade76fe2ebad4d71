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

//! Join paths for one outer/inner pair

use std::sync::Arc;

use crate::core::{Oid, Result};
use crate::expr::{Expr, Var};

use super::clauses::{MergeOrder, RestrictInfo};
use super::path::{add_path, Path, PathKind};
use super::pathkeys::{pathkeys_satisfy, PathKey, PathOrder};
use super::relnode::{PlannerContext, RelOptInfo};

/// Offer every nestloop, merge join and hash join path of `outer` joined
/// to `inner` to `joinrel`
pub fn add_paths_to_joinrel(
    joinrel: &mut RelOptInfo,
    outer: &RelOptInfo,
    inner: &RelOptInfo,
    restrict: &[RestrictInfo],
    ctx: &PlannerContext<'_>,
) -> Result<()> {
    for path in nestloop_paths(joinrel, outer, inner, restrict, ctx)? {
        add_path(&mut joinrel.pathlist, Arc::new(path));
    }
    for path in mergejoin_paths(joinrel, outer, inner, restrict, ctx)? {
        add_path(&mut joinrel.pathlist, Arc::new(path));
    }
    for path in hashjoin_paths(joinrel, outer, inner, restrict, ctx)? {
        add_path(&mut joinrel.pathlist, Arc::new(path));
    }
    Ok(())
}

fn nestloop_paths(
    joinrel: &RelOptInfo,
    outer: &RelOptInfo,
    inner: &RelOptInfo,
    restrict: &[RestrictInfo],
    ctx: &PlannerContext<'_>,
) -> Result<Vec<Path>> {
    let mut inners: Vec<Arc<Path>> = vec![inner.cheapest_path()?.clone()];
    inners.extend(
        inner
            .inner_index_paths
            .iter()
            .filter(|p| p.required_outer().is_subset(&outer.relids))
            .cloned(),
    );

    let mut paths = Vec::new();
    for outer_path in &outer.pathlist {
        for inner_path in &inners {
            let enforced: &[RestrictInfo] = match &inner_path.kind {
                PathKind::IndexScan { index_qual, .. } => index_qual,
                _ => &[],
            };
            let loc: Vec<RestrictInfo> = restrict
                .iter()
                .filter(|r| !enforced.iter().any(|e| e.clause == r.clause))
                .cloned()
                .collect();
            let cost = ctx
                .cost
                .estimate_nestloop(
                    outer_path.cost,
                    outer_path.rows,
                    inner_path.cost,
                    inner_path.rows,
                    joinrel.rows,
                    loc.len(),
                )
                .penalize_unless(ctx.config.enable_nestloop);
            paths.push(
                Path::new(
                    joinrel.relids.clone(),
                    PathKind::NestLoop {
                        outer: outer_path.clone(),
                        inner: inner_path.clone(),
                    },
                    cost,
                    joinrel.rows,
                )
                .with_order(outer_path.ordering.clone(), outer_path.pathkeys.clone())
                .with_restrict(loc),
            );
        }
    }
    Ok(paths)
}

/// A mergejoinable clause oriented to the outer/inner split
struct MergeCandidate<'a> {
    clause: &'a RestrictInfo,
    outer_key: &'a Expr,
    inner_key: &'a Expr,
    order: MergeOrder,
}

fn merge_candidates<'a>(
    outer: &RelOptInfo,
    inner: &RelOptInfo,
    restrict: &'a [RestrictInfo],
) -> Vec<MergeCandidate<'a>> {
    let mut out = Vec::new();
    for clause in restrict {
        let Some(merge) = &clause.merge_order else {
            continue;
        };
        let Some((outer_key, inner_key)) = clause.join_sides(&outer.relids, &inner.relids) else {
            continue;
        };
        let left_is_outer = clause.left_relids.is_subset(&outer.relids);
        let order = if left_is_outer {
            merge.clone()
        } else {
            MergeOrder {
                join_op: merge.join_op,
                left_sortop: merge.right_sortop,
                right_sortop: merge.left_sortop,
                left_type: merge.right_type,
                right_type: merge.left_type,
            }
        };
        out.push(MergeCandidate {
            clause,
            outer_key,
            inner_key,
            order,
        });
    }
    out
}

fn sorted_by(path: &Path, key: &Var, sortop: Oid) -> bool {
    pathkeys_satisfy(&path.pathkeys, std::slice::from_ref(key))
        && path.ordering.leading_sortop() == Some(sortop)
}

fn mergejoin_paths(
    joinrel: &RelOptInfo,
    outer: &RelOptInfo,
    inner: &RelOptInfo,
    restrict: &[RestrictInfo],
    ctx: &PlannerContext<'_>,
) -> Result<Vec<Path>> {
    let mut paths = Vec::new();
    for cand in merge_candidates(outer, inner, restrict) {
        let (Some(outer_var), Some(inner_var)) = (cand.outer_key.as_var(), cand.inner_key.as_var())
        else {
            continue;
        };
        let loc: Vec<RestrictInfo> = restrict
            .iter()
            .filter(|r| r.clause != cand.clause.clause)
            .cloned()
            .collect();

        // Presorted outer paths keep their full order; otherwise sort the cheapest
        let mut outers: Vec<(Arc<Path>, bool)> = outer
            .pathlist
            .iter()
            .filter(|p| sorted_by(p, outer_var, cand.order.left_sortop))
            .map(|p| (p.clone(), false))
            .collect();
        outers.push((outer.cheapest_path()?.clone(), true));

        let inner_sorted = inner
            .pathlist
            .iter()
            .filter(|p| sorted_by(p, inner_var, cand.order.right_sortop))
            .min_by(|a, b| a.total_cost().total_cmp(&b.total_cost()))
            .cloned();
        let inner_cheapest = inner.cheapest_path()?.clone();
        let inner_sort_cost = ctx
            .cost
            .estimate_sort(inner_cheapest.cost, inner_cheapest.rows, inner.width);
        let (inner_path, sort_inner, inner_cost) = match inner_sorted {
            Some(p) if p.cost.total <= inner_sort_cost.total => {
                let cost = p.cost;
                (p, false, cost)
            }
            _ => (inner_cheapest, true, inner_sort_cost),
        };

        for (outer_path, sort_outer) in outers {
            let outer_cost = if sort_outer {
                ctx.cost
                    .estimate_sort(outer_path.cost, outer_path.rows, outer.width)
            } else {
                outer_path.cost
            };
            let cost = ctx
                .cost
                .estimate_merge_join(
                    outer_cost,
                    outer_path.rows,
                    inner_cost,
                    inner_path.rows,
                    joinrel.rows,
                    loc.len(),
                )
                .penalize_unless(ctx.config.enable_mergejoin);

            let merged_key: PathKey = vec![outer_var.clone(), inner_var.clone()];
            let (ordering, pathkeys) = if sort_outer {
                (PathOrder::Merge(cand.order.clone()), vec![merged_key])
            } else {
                let mut keys = outer_path.pathkeys.clone();
                if let Some(first) = keys.first_mut() {
                    if !first.iter().any(|v| v.same_column(inner_var)) {
                        first.push(inner_var.clone());
                    }
                }
                (outer_path.ordering.clone(), keys)
            };

            paths.push(
                Path::new(
                    joinrel.relids.clone(),
                    PathKind::MergeJoin {
                        outer: outer_path.clone(),
                        inner: inner_path.clone(),
                        merge_clauses: vec![cand.clause.clone()],
                        outer_keys: vec![cand.outer_key.clone()],
                        inner_keys: vec![cand.inner_key.clone()],
                        order: cand.order.clone(),
                        sort_outer,
                        sort_inner,
                    },
                    cost,
                    joinrel.rows,
                )
                .with_order(ordering, pathkeys)
                .with_restrict(loc.clone()),
            );
        }
    }
    Ok(paths)
}

fn hashjoin_paths(
    joinrel: &RelOptInfo,
    outer: &RelOptInfo,
    inner: &RelOptInfo,
    restrict: &[RestrictInfo],
    ctx: &PlannerContext<'_>,
) -> Result<Vec<Path>> {
    let mut paths = Vec::new();
    let outer_path = outer.cheapest_path()?;
    let inner_path = inner.cheapest_path()?;
    for clause in restrict.iter().filter(|r| r.hash_op.is_some()) {
        let Some((outer_key, inner_key)) = clause.join_sides(&outer.relids, &inner.relids) else {
            continue;
        };
        let loc: Vec<RestrictInfo> = restrict
            .iter()
            .filter(|r| r.clause != clause.clause)
            .cloned()
            .collect();
        let Some(cost) = ctx.cost.estimate_hash_join(
            outer_path.cost,
            outer_path.rows,
            outer.width,
            inner_path.cost,
            inner_path.rows,
            inner.width,
            joinrel.rows,
            ctx.config.hash_mem_bytes,
            ctx.config.max_hash_batches,
        ) else {
            // Inner side does not fit the hash budget
            continue;
        };
        paths.push(
            Path::new(
                joinrel.relids.clone(),
                PathKind::HashJoin {
                    outer: outer_path.clone(),
                    inner: inner_path.clone(),
                    hash_clauses: vec![clause.clone()],
                    outer_keys: vec![outer_key.clone()],
                    inner_keys: vec![inner_key.clone()],
                },
                cost.penalize_unless(ctx.config.enable_hashjoin),
                joinrel.rows,
            )
            .with_restrict(loc),
        );
    }
    Ok(paths)
}
