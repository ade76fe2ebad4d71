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

//! Planner entry point
//!
//! [`plan`] runs the whole pipeline for a query and its nested subqueries:
//! sublink planning, clause classification, base relation paths, the join
//! search, plan creation, the upper nodes and reference finalization.

use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::{Catalog, IndexAm};
use crate::core::{DataType, Error, Result};
use crate::expr::Expr;

use super::allpaths::{build_base_rel, make_one_rel};
use super::clauses::classify_quals;
use super::config::PlannerConfig;
use super::createplan::{order_satisfies, path_sort_order, sort_order, PlanBuilder};
use super::path::Path;
use super::plan::Plan;
use super::query::{Query, SortClause};
use super::relnode::{PlannerContext, RelOptInfo};
use super::setrefs::set_plan_references;
use super::subselect::SubqueryContext;

/// A finalized plan with the subquery plans it references
#[derive(Debug, Clone)]
pub struct PlannedStmt {
    pub plan: Plan,
    /// Indexed by `SubPlan::plan_id` and `InitPlan::plan_id`
    pub subplans: Vec<Plan>,
    /// Type of each executor parameter, indexed by id
    pub param_types: Vec<DataType>,
}

impl PlannedStmt {
    /// Rendering of the main plan followed by each subplan
    pub fn explain(&self) -> String {
        let mut out = self.plan.explain();
        for (id, sub) in self.subplans.iter().enumerate() {
            out.push_str(&format!("\nSubPlan {}\n{}", id, sub.explain()));
        }
        out
    }
}

/// Plan `query` against `catalog`
pub fn plan(query: &Query, catalog: &dyn Catalog, config: &PlannerConfig) -> Result<PlannedStmt> {
    let mut sctx = SubqueryContext::new();
    let plan = subquery_planner(query, &mut sctx, catalog, config)?;
    if !plan.ext_param.is_empty() {
        return Err(Error::invariant(format!(
            "top-level plan reads unset params {:?}",
            plan.ext_param
        )));
    }
    let param_types = sctx.param_types();
    let subplans = sctx.into_subplans();
    info!(
        top = plan.name(),
        cost = plan.cost.total,
        rows = plan.rows,
        subplans = subplans.len(),
        "query planned"
    );
    Ok(PlannedStmt {
        plan,
        subplans,
        param_types,
    })
}

/// Plan one query level, entering a new level for its duration
fn subquery_planner(
    query: &Query,
    sctx: &mut SubqueryContext,
    catalog: &dyn Catalog,
    config: &PlannerConfig,
) -> Result<Plan> {
    sctx.push_level();
    let planned = grouping_planner(query, sctx, catalog, config);
    let init_plans = sctx.pop_level();
    let mut plan = planned?;
    plan.set_param = init_plans
        .iter()
        .flat_map(|i| i.set_param.iter().copied())
        .collect();
    plan.init_plans = init_plans;
    sctx.finalize_plan(&mut plan);
    Ok(plan)
}

fn preprocess_expr(
    expr: Expr,
    sctx: &mut SubqueryContext,
    catalog: &dyn Catalog,
    config: &PlannerConfig,
) -> Result<Expr> {
    // Fails for references past the outermost level
    let expr = sctx.replace_correlation_vars(expr)?;
    sctx.process_sublinks(expr, &mut |sctx, subquery| {
        subquery_planner(subquery, sctx, catalog, config)
    })
}

fn grouping_planner(
    query: &Query,
    sctx: &mut SubqueryContext,
    catalog: &dyn Catalog,
    config: &PlannerConfig,
) -> Result<Plan> {
    let mut query = query.clone();
    for entry in query.target_list.iter_mut() {
        let expr = std::mem::replace(&mut entry.expr, Expr::null_const(DataType::Null));
        entry.expr = preprocess_expr(expr, sctx, catalog, config)?;
    }
    query.qual = query
        .qual
        .take()
        .map(|q| preprocess_expr(q, sctx, catalog, config))
        .transpose()?;
    for window in query.windows.iter_mut() {
        for func in window.functions.iter_mut() {
            let args = std::mem::take(&mut func.args);
            func.args = args
                .into_iter()
                .map(|a| sctx.replace_correlation_vars(a))
                .collect::<Result<_>>()?;
        }
    }

    check_sort_operators(&query, catalog)?;

    let mut ctx = PlannerContext::new(catalog, config);
    if let Some(bushy) = query.enable_bushy {
        ctx.enable_bushy = bushy;
    }
    if let Some(geqo) = query.enable_geqo {
        ctx.enable_geqo = geqo;
    }
    let target_order = wanted_order(&query);
    ctx.query_order = target_order
        .iter()
        .map_while(|c| query.target_list.get(c.tle_index)?.expr.as_var().cloned())
        .collect();

    let mut classified = classify_quals(query.qual.as_ref(), catalog)?;
    let needed = needed_exprs(&query);
    let mut base_rels = Vec::with_capacity(query.relations.len());
    for relid in &query.relations {
        base_rels.push(build_base_rel(*relid, &mut classified, &needed, &ctx)?);
    }
    if let Some(relid) = classified.restrictions.keys().chain(classified.joins.keys()).next() {
        return Err(Error::invalid_argument(format!(
            "qualification references relation {} that is not in the query",
            relid
        )));
    }

    let builder = PlanBuilder::new(&ctx, &base_rels);
    let final_rel = make_one_rel(base_rels, &ctx)?;
    let best = choose_path(&final_rel, &query, &target_order, &ctx)?;
    debug!(
        path = best.kind.name(),
        cost = best.total_cost(),
        rows = best.rows,
        "final path chosen"
    );

    let join_plan = builder.create_plan(&best)?;
    let presorted = path_sort_order(&best, &query);
    let mut plan = builder.build_upper_plan(join_plan, presorted, &query, classified.constant)?;
    set_plan_references(&mut plan, catalog)?;
    Ok(plan)
}

/// Order the first step above the join tree wants its input in
fn wanted_order(query: &Query) -> Vec<SortClause> {
    if !query.group_by.is_empty() {
        query.group_by.clone()
    } else if query.has_aggregates() {
        Vec::new()
    } else if let Some(window) = query.windows.first() {
        window.sort_clauses()
    } else {
        query.order_by.clone()
    }
}

/// Every sort clause must name an ordering operator of some btree class
fn check_sort_operators(query: &Query, catalog: &dyn Catalog) -> Result<()> {
    let windows = query.windows.iter().flat_map(|w| w.sort_clauses());
    for clause in query
        .group_by
        .iter()
        .chain(query.order_by.iter())
        .cloned()
        .chain(windows)
    {
        catalog.operator(clause.sortop)?;
        if catalog
            .operator_opclasses(clause.sortop, IndexAm::BTree)?
            .is_empty()
        {
            return Err(Error::unplannable(format!(
                "no btree operator class provides sort operator {}",
                clause.sortop
            )));
        }
    }
    Ok(())
}

/// Expressions evaluated above the scans
fn needed_exprs(query: &Query) -> Vec<&Expr> {
    let mut needed: Vec<&Expr> = query.target_list.iter().map(|t| &t.expr).collect();
    for window in &query.windows {
        for func in &window.functions {
            needed.extend(func.args.iter());
            needed.extend(func.filter.iter());
        }
    }
    needed
}

/// Cheapest path once the cost of sorting it into the wanted order is added
fn choose_path(
    rel: &RelOptInfo,
    query: &Query,
    target_order: &[SortClause],
    ctx: &PlannerContext<'_>,
) -> Result<Arc<Path>> {
    let cheapest = rel.cheapest_path()?.clone();
    if target_order.is_empty() {
        return Ok(cheapest);
    }
    let wanted = sort_order(target_order);
    let effective = |path: &Path| {
        if order_satisfies(&path_sort_order(path, query), &wanted) {
            path.total_cost()
        } else {
            ctx.cost.estimate_sort(path.cost, path.rows, rel.width).total
        }
    };
    let mut best = cheapest;
    let mut best_cost = effective(&best);
    for path in &rel.pathlist {
        let cost = effective(path);
        if cost < best_cost {
            best = Arc::clone(path);
            best_cost = cost;
        }
    }
    Ok(best)
}
