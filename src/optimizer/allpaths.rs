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

//! Base relation paths and the choice of join search

use std::sync::Arc;

use tracing::debug;

use crate::core::{Error, RelId, Result};
use crate::expr::Expr;

use super::clauses::ClassifiedQuals;
use super::geqo::geqo;
use super::indxpath::{
    create_index_paths, create_inner_index_paths, create_or_index_paths, create_tid_paths,
};
use super::joinrels::make_rels_by_levels;
use super::path::{add_path, add_pathlist, Path, PathKind};
use super::relnode::{needed_vars, PlannerContext, RelOptInfo};

/// Build the record of base relation `relid` with all of its scan paths
///
/// Takes the relation's clauses out of `classified`. `needed` are the
/// expressions evaluated above the scan; the columns they reference form
/// the relation's target list.
pub fn build_base_rel(
    relid: RelId,
    classified: &mut ClassifiedQuals,
    needed: &[&Expr],
    ctx: &PlannerContext<'_>,
) -> Result<RelOptInfo> {
    let restrictions = classified.restrictions.remove(&relid).unwrap_or_default();
    let joininfo = classified.joins.remove(&relid).unwrap_or_default();
    let mut exprs: Vec<&Expr> = needed.to_vec();
    for entry in &joininfo {
        exprs.extend(entry.clauses.iter().map(|c| &c.clause));
    }
    let targetlist = needed_vars(relid, exprs);
    let mut rel = RelOptInfo::base(relid, ctx.catalog, restrictions, joininfo, targetlist)?;
    set_base_rel_pathlist(&mut rel, ctx)?;
    Ok(rel)
}

/// Sequential scan, index, OR-index and TID paths of a base relation
pub fn set_base_rel_pathlist(rel: &mut RelOptInfo, ctx: &PlannerContext<'_>) -> Result<()> {
    let seq_cost = ctx
        .cost
        .estimate_seq_scan(rel.pages, rel.tuples, rel.restrictinfo.len())
        .penalize_unless(ctx.config.enable_seqscan);
    let seq = Path::new(rel.relids.clone(), PathKind::SeqScan, seq_cost, rel.rows)
        .with_restrict(rel.restrictinfo.clone());
    add_path(&mut rel.pathlist, Arc::new(seq));

    let index_paths = create_index_paths(rel, ctx)?;
    add_pathlist(&mut rel.pathlist, index_paths);
    let or_index_paths = create_or_index_paths(rel, ctx)?;
    add_pathlist(&mut rel.pathlist, or_index_paths);
    let tid_paths = create_tid_paths(rel, ctx)?;
    add_pathlist(&mut rel.pathlist, tid_paths);
    rel.inner_index_paths = create_inner_index_paths(rel, ctx)?;
    rel.set_cheapest()?;
    debug!(
        relids = %rel.relids,
        rows = rel.rows,
        paths = rel.pathlist.len(),
        "base relation planned"
    );
    Ok(())
}

/// Join the base relations into a single relation
///
/// Uses the genetic search once the relation count reaches the configured
/// threshold, the exhaustive level-by-level search otherwise.
pub fn make_one_rel(base_rels: Vec<RelOptInfo>, ctx: &PlannerContext<'_>) -> Result<RelOptInfo> {
    match base_rels.len() {
        0 => Err(Error::unplannable("query has no relations")),
        1 => base_rels
            .into_iter()
            .next()
            .ok_or_else(|| Error::internal("relation list emptied")),
        n if ctx.enable_geqo && n >= ctx.config.geqo_threshold => geqo(&base_rels, ctx),
        _ => make_rels_by_levels(base_rels, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::catalog::{CatalogSnapshot, ColumnInfo, RelationInfo};
    use crate::core::{DataType, Value};
    use crate::optimizer::clauses::classify_quals;
    use crate::optimizer::config::PlannerConfig;

    #[test]
    fn test_seqscan_always_present() {
        let cat = CatalogSnapshot::new().with_relation(
            RelationInfo::new(1, "t", 10.0, 1000.0)
                .column(ColumnInfo::new("a", DataType::Integer).with_ndistinct(10.0)),
        );
        let config = PlannerConfig::default().with_seqscan(false);
        let ctx = PlannerContext::new(&cat, &config);
        let qual = Expr::op(
            INT8_EQ_OP,
            vec![Expr::var(1, 1, DataType::Integer), Expr::constant(Value::integer(1))],
            DataType::Boolean,
        );
        let mut classified = classify_quals(Some(&qual), &cat).unwrap();
        let rel = build_base_rel(1, &mut classified, &[], &ctx).unwrap();
        assert_eq!(rel.pathlist.len(), 1);
        assert_eq!(rel.rows, 100.0);
        let cheapest = rel.cheapest_path().unwrap();
        assert_eq!(cheapest.kind, PathKind::SeqScan);
        assert_eq!(cheapest.loc_restrict.len(), 1);
    }

    #[test]
    fn test_no_relations_is_unplannable() {
        let cat = CatalogSnapshot::new();
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        assert!(make_one_rel(Vec::new(), &ctx).is_err());
    }
}
