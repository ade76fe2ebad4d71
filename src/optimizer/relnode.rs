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

//! Relation optimization records
//!
//! One [`RelOptInfo`] exists per base relation and per join combination the
//! search considers. Join records are keyed by their relation set, so the
//! same combination reached through different join orders shares one path
//! list.

use std::sync::Arc;

use crate::catalog::{Catalog, IndexInfo};
use crate::core::{Error, RelId, Result};
use crate::expr::{Expr, Var};

use super::clauses::{JoinInfo, RestrictInfo};
use super::config::PlannerConfig;
use super::cost::{cap_join_size, clamp_row_est, CostEstimator};
use super::path::{cheapest_path, Path};
use super::relids::Relids;

/// Per-query planning state shared by path generation and the join search
pub struct PlannerContext<'a> {
    pub catalog: &'a dyn Catalog,
    pub config: &'a PlannerConfig,
    pub cost: CostEstimator,
    pub enable_bushy: bool,
    pub enable_geqo: bool,
    /// Leading columns the query wants its output sorted by
    pub query_order: Vec<Var>,
}

impl<'a> PlannerContext<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: &'a PlannerConfig) -> Self {
        Self {
            catalog,
            config,
            cost: CostEstimator::with_constants(config.cost.clone()),
            enable_bushy: config.enable_bushy,
            enable_geqo: config.enable_geqo,
            query_order: Vec::new(),
        }
    }
}

/// Optimizer record for a base relation or a join result
#[derive(Debug, Clone)]
pub struct RelOptInfo {
    pub relids: Relids,
    /// Estimated rows after restrictions
    pub rows: f64,
    pub width: usize,
    pub pages: f64,
    pub tuples: f64,
    /// Columns the plan must carry upward
    pub targetlist: Vec<Var>,
    pub pathlist: Vec<Arc<Path>>,
    pub cheapest: Option<Arc<Path>>,
    /// Restriction clauses of a base relation
    pub restrictinfo: Vec<RestrictInfo>,
    /// Join clauses that still reference relations outside this one
    pub joininfo: Vec<JoinInfo>,
    pub indexes: Vec<IndexInfo>,
    /// Index paths usable as the inner side of a nestloop
    pub inner_index_paths: Vec<Arc<Path>>,
}

impl RelOptInfo {
    /// Record for base relation `relid`
    pub fn base(
        relid: RelId,
        catalog: &dyn Catalog,
        restrictinfo: Vec<RestrictInfo>,
        joininfo: Vec<JoinInfo>,
        targetlist: Vec<Var>,
    ) -> Result<Self> {
        let info = catalog.relation_info(relid)?;
        let mut indexes = Vec::with_capacity(info.indexes.len());
        for oid in &info.indexes {
            indexes.push(catalog.index_info(*oid)?);
        }
        let selectivity: f64 = restrictinfo.iter().map(|r| r.selectivity).product();
        Ok(Self {
            relids: Relids::singleton(relid),
            rows: clamp_row_est(info.tuples * selectivity),
            width: info.width,
            pages: info.pages,
            tuples: info.tuples,
            targetlist,
            pathlist: Vec::new(),
            cheapest: None,
            restrictinfo,
            joininfo,
            indexes,
            inner_index_paths: Vec::new(),
        })
    }

    /// Record for the join of `outer` and `inner`
    ///
    /// Row estimate is the product of the input sizes and the selectivity
    /// of every clause the join applies, capped by [`cap_join_size`].
    pub fn join(outer: &RelOptInfo, inner: &RelOptInfo) -> Self {
        Self::join_with_size(outer, inner, cap_join_size)
    }

    /// Join record whose row estimate is bounded by `size`
    pub fn join_with_size(outer: &RelOptInfo, inner: &RelOptInfo, size: fn(f64) -> f64) -> Self {
        let relids = outer.relids.union(&inner.relids);
        let restrict = join_restrictlist(&relids, outer, inner);
        let selectivity: f64 = restrict.iter().map(|r| r.selectivity).product();

        let mut joininfo: Vec<JoinInfo> = Vec::new();
        for entry in outer.joininfo.iter().chain(inner.joininfo.iter()) {
            for clause in &entry.clauses {
                if clause.relids.is_subset(&relids) {
                    continue;
                }
                let others = clause.relids.difference(&relids);
                match joininfo.iter_mut().find(|j| j.other_rels == others) {
                    Some(j) => {
                        if !j.clauses.contains(clause) {
                            j.push(clause.clone());
                        }
                    }
                    None => {
                        let mut j = JoinInfo::new(others);
                        j.push(clause.clone());
                        joininfo.push(j);
                    }
                }
            }
        }

        let mut targetlist = outer.targetlist.clone();
        for var in &inner.targetlist {
            if !targetlist.iter().any(|v| v.same_column(var)) {
                targetlist.push(var.clone());
            }
        }

        Self {
            relids,
            rows: size(outer.rows * inner.rows * selectivity),
            width: outer.width + inner.width,
            pages: 0.0,
            tuples: 0.0,
            targetlist,
            pathlist: Vec::new(),
            cheapest: None,
            restrictinfo: Vec::new(),
            joininfo,
            indexes: Vec::new(),
            inner_index_paths: Vec::new(),
        }
    }

    pub fn is_base(&self) -> bool {
        self.relids.len() == 1
    }

    /// Whether a pending join clause links this relation to `other`
    pub fn has_join_clause_with(&self, other: &Relids) -> bool {
        self.joininfo.iter().any(|j| j.other_rels.overlaps(other))
    }

    /// Whether some join clause still reaches a relation outside this one
    ///
    /// Join relations only carry clauses they do not yet apply, so this is
    /// false once every clause is inside the relation.
    pub fn has_active_joininfo(&self) -> bool {
        self.joininfo.iter().any(|j| !j.clauses.is_empty())
    }

    /// Pick the cheapest surviving path
    pub fn set_cheapest(&mut self) -> Result<()> {
        let cheapest = cheapest_path(&self.pathlist).cloned().ok_or_else(|| {
            Error::unplannable(format!("no path could be built for relations {}", self.relids))
        })?;
        self.cheapest = Some(cheapest);
        Ok(())
    }

    pub fn cheapest_path(&self) -> Result<&Arc<Path>> {
        self.cheapest
            .as_ref()
            .ok_or_else(|| Error::invariant(format!("relations {} have no cheapest path", self.relids)))
    }
}

/// Join clauses applied when `outer` and `inner` are joined
pub fn join_restrictlist(
    relids: &Relids,
    outer: &RelOptInfo,
    inner: &RelOptInfo,
) -> Vec<RestrictInfo> {
    let mut out: Vec<RestrictInfo> = Vec::new();
    for entry in outer.joininfo.iter().chain(inner.joininfo.iter()) {
        for clause in &entry.clauses {
            if clause.relids.is_subset(relids) && !out.contains(clause) {
                out.push(clause.clone());
            }
        }
    }
    out
}

/// Columns of `relid` referenced anywhere in `exprs`
pub fn needed_vars<'a>(relid: RelId, exprs: impl IntoIterator<Item = &'a Expr>) -> Vec<Var> {
    let mut vars: Vec<Var> = Vec::new();
    for expr in exprs {
        for var in expr.pull_vars() {
            if var.relid() == Some(relid)
                && var.levelsup == 0
                && !vars.iter().any(|v| v.same_column(&var))
            {
                vars.push(var);
            }
        }
    }
    vars
}
