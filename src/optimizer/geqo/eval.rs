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

//! Tour evaluation
//!
//! A tour is turned into a left-deep join tree: the first relation is the
//! outer side and every further relation is joined in as the inner side of
//! the running result. The fitness of the tour is the total cost of the
//! cheapest path of the final relation.

use crate::core::{Error, Result};

use super::super::cost::clamp_join_size;
use super::super::joinpath::add_paths_to_joinrel;
use super::super::relnode::{join_restrictlist, PlannerContext, RelOptInfo};

/// Left-deep join relation for `tour`
pub fn gimme_tree(
    tour: &[usize],
    base_rels: &[RelOptInfo],
    ctx: &PlannerContext<'_>,
) -> Result<RelOptInfo> {
    let base = |gene: usize| {
        base_rels
            .get(gene)
            .ok_or_else(|| Error::invariant(format!("tour gene {} has no relation", gene)))
    };
    let Some((&first, rest)) = tour.split_first() else {
        return Err(Error::unplannable("empty join order"));
    };
    let mut outer = base(first)?.clone();
    for &gene in rest {
        let inner = base(gene)?;
        let mut joinrel = RelOptInfo::join_with_size(&outer, inner, clamp_join_size);
        // Clause joins and cartesian products are built the same way; the
        // missing selectivity makes a product cost what it should
        let restrict = join_restrictlist(&joinrel.relids, &outer, inner);
        add_paths_to_joinrel(&mut joinrel, &outer, inner, &restrict, ctx)?;
        joinrel.set_cheapest()?;
        outer = joinrel;
    }
    Ok(outer)
}

/// Fitness of `tour`; lower is better
pub fn geqo_eval(tour: &[usize], base_rels: &[RelOptInfo], ctx: &PlannerContext<'_>) -> Result<f64> {
    let rel = gimme_tree(tour, base_rels, ctx)?;
    Ok(rel.cheapest_path()?.total_cost())
}
