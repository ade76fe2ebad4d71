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

//! Exhaustive level-by-level join search
//!
//! Level k holds every relation set of size k reached so far. Each level
//! joins the relations of level k-1 to base relations they share a clause
//! with, falling back to cartesian products for relations without join
//! clauses. Bushy joins of two non-base relations are optional.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::core::{Error, Result};

use super::joinpath::add_paths_to_joinrel;
use super::relids::Relids;
use super::relnode::{join_restrictlist, PlannerContext, RelOptInfo};

type RelMap = FxHashMap<Relids, RelOptInfo>;

fn lookup<'m>(rels: &'m RelMap, relids: &Relids) -> Result<&'m RelOptInfo> {
    rels.get(relids)
        .ok_or_else(|| Error::invariant(format!("join search lost relations {}", relids)))
}

/// Add the paths joining `a` and `b` in both directions to their join relation
///
/// Creates the join relation on first use and records it in `created`.
pub(crate) fn make_join_rel(
    rels: &mut RelMap,
    a: &Relids,
    b: &Relids,
    ctx: &PlannerContext<'_>,
    created: &mut Vec<Relids>,
) -> Result<()> {
    let joined = a.union(b);
    let mut joinrel = match rels.remove(&joined) {
        Some(existing) => existing,
        None => {
            created.push(joined.clone());
            RelOptInfo::join(lookup(rels, a)?, lookup(rels, b)?)
        }
    };
    let (ra, rb) = (lookup(rels, a)?, lookup(rels, b)?);
    let restrict = join_restrictlist(&joined, ra, rb);
    add_paths_to_joinrel(&mut joinrel, ra, rb, &restrict, ctx)?;
    add_paths_to_joinrel(&mut joinrel, rb, ra, &restrict, ctx)?;
    rels.insert(joined, joinrel);
    Ok(())
}

/// Search every join order level by level and return the relation over all
/// base relations
pub fn make_rels_by_levels(base_rels: Vec<RelOptInfo>, ctx: &PlannerContext<'_>) -> Result<RelOptInfo> {
    let nrels = base_rels.len();
    let mut rels: RelMap = FxHashMap::default();
    let mut all = Relids::empty();
    let mut levels: Vec<Vec<Relids>> = vec![Vec::new(); nrels + 1];
    for rel in base_rels {
        all = all.union(&rel.relids);
        levels[1].push(rel.relids.clone());
        rels.insert(rel.relids.clone(), rel);
    }
    let bases = levels[1].clone();

    for level in 2..=nrels {
        let mut created: Vec<Relids> = Vec::new();
        let previous = levels[level - 1].clone();

        for old in &previous {
            let old_rel = lookup(&rels, old)?;
            let clause_partners: Vec<Relids> = bases
                .iter()
                .filter(|b| !b.overlaps(old) && old_rel.has_join_clause_with(b))
                .cloned()
                .collect();
            let partners = if old_rel.has_active_joininfo() {
                clause_partners
            } else {
                bases.iter().filter(|b| !b.overlaps(old)).cloned().collect()
            };
            for base in &partners {
                make_join_rel(&mut rels, old, base, ctx, &mut created)?;
            }
        }

        if ctx.enable_bushy {
            for k in 2..=level / 2 {
                let (left, right) = (levels[k].clone(), levels[level - k].clone());
                for a in &left {
                    for b in &right {
                        if a.overlaps(b) || (k == level - k && a.iter().min() > b.iter().min()) {
                            continue;
                        }
                        if lookup(&rels, a)?.has_join_clause_with(b) {
                            make_join_rel(&mut rels, a, b, ctx, &mut created)?;
                        }
                    }
                }
            }
        }

        if created.is_empty() {
            // Disconnected join graph: cartesian products
            for old in &previous {
                for base in bases.iter().filter(|b| !b.overlaps(old)) {
                    make_join_rel(&mut rels, old, base, ctx, &mut created)?;
                }
            }
        }

        for relids in &created {
            if let Some(rel) = rels.get_mut(relids) {
                rel.set_cheapest()?;
            }
        }
        debug!(level, rels = created.len(), "join level complete");
        levels[level] = created;
    }

    rels.remove(&all)
        .ok_or_else(|| Error::unplannable(format!("no join order covers relations {}", all)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::catalog::{CatalogSnapshot, ColumnInfo, RelationInfo};
    use crate::core::{DataType, RelId};
    use crate::expr::Expr;
    use crate::optimizer::allpaths::build_base_rel;
    use crate::optimizer::clauses::classify_quals;
    use crate::optimizer::config::PlannerConfig;

    fn catalog(n: RelId) -> CatalogSnapshot {
        let mut cat = CatalogSnapshot::new();
        for id in 1..=n {
            cat = cat.with_relation(
                RelationInfo::new(id, format!("r{}", id), 10.0 * id as f64, 1000.0 * id as f64)
                    .column(ColumnInfo::new("k", DataType::Integer).with_ndistinct(100.0)),
            );
        }
        cat
    }

    fn eq(a: RelId, b: RelId) -> Expr {
        Expr::op(
            INT8_EQ_OP,
            vec![
                Expr::var(a, 1, DataType::Integer),
                Expr::var(b, 1, DataType::Integer),
            ],
            DataType::Boolean,
        )
    }

    fn plan_rels(cat: &CatalogSnapshot, n: RelId, qual: Option<Expr>, bushy: bool) -> RelOptInfo {
        let config = PlannerConfig::default().with_bushy(bushy);
        let ctx = PlannerContext::new(cat, &config);
        let mut classified = classify_quals(qual.as_ref(), cat).unwrap();
        let rels = (1..=n)
            .map(|id| build_base_rel(id, &mut classified, &[], &ctx).unwrap())
            .collect();
        make_rels_by_levels(rels, &ctx).unwrap()
    }

    #[test]
    fn test_chain_join() {
        let cat = catalog(4);
        let qual = Expr::and(vec![eq(1, 2), eq(2, 3), eq(3, 4)]);
        let rel = plan_rels(&cat, 4, Some(qual), false);
        assert_eq!(rel.relids.len(), 4);
        assert!(rel.cheapest.is_some());
        assert!(rel.joininfo.is_empty());
    }

    /// Test a join relation keeps only clauses reaching outside it
    #[test]
    fn test_join_rel_carries_only_pending_clauses() {
        let cat = catalog(3);
        let config = PlannerConfig::default();
        let ctx = PlannerContext::new(&cat, &config);
        let qual = Expr::and(vec![eq(1, 2), eq(2, 3)]);
        let mut classified = classify_quals(Some(&qual), &cat).expect("classify failed");
        let rels: Vec<RelOptInfo> = (1..=3)
            .map(|id| build_base_rel(id, &mut classified, &[], &ctx).expect("base rel failed"))
            .collect();

        let j12 = RelOptInfo::join(&rels[0], &rels[1]);
        assert!(j12.has_active_joininfo());
        assert!(j12.has_join_clause_with(&Relids::singleton(3)));
        assert!(!j12.has_join_clause_with(&Relids::singleton(1)));

        let all = RelOptInfo::join(&j12, &rels[2]);
        assert!(!all.has_active_joininfo());
        assert!(all.joininfo.is_empty());
    }

    #[test]
    fn test_disconnected_relations_get_cartesian_product() {
        let cat = catalog(3);
        let rel = plan_rels(&cat, 3, Some(eq(1, 2)), false);
        assert_eq!(rel.relids.len(), 3);
        assert!(rel.cheapest_path().unwrap().is_join());
    }

    #[test]
    fn test_bushy_search_finds_plan() {
        let cat = catalog(4);
        let qual = Expr::and(vec![eq(1, 2), eq(3, 4), eq(2, 3)]);
        let rel = plan_rels(&cat, 4, Some(qual), true);
        assert_eq!(rel.relids.len(), 4);
    }

    #[test]
    fn test_surviving_paths_are_incomparable() {
        use crate::optimizer::pathkeys::{compare_ordering, compare_pathkeys, KeyComparison};
        let cat = catalog(3);
        let qual = Expr::and(vec![eq(1, 2), eq(2, 3)]);
        let rel = plan_rels(&cat, 3, Some(qual), false);
        for (i, p) in rel.pathlist.iter().enumerate() {
            for q in rel.pathlist.iter().skip(i + 1) {
                let keys = compare_pathkeys(&p.pathkeys, &q.pathkeys)
                    .and(compare_ordering(&p.ordering, &q.ordering));
                let dominated = match keys {
                    KeyComparison::Equal => true,
                    KeyComparison::NewStronger => p.total_cost() <= q.total_cost(),
                    KeyComparison::OldStronger => q.total_cost() <= p.total_cost(),
                    KeyComparison::Incomparable => false,
                };
                assert!(!dominated);
            }
        }
    }
}
