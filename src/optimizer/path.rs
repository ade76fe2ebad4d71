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

//! Access and join paths
//!
//! Each relation keeps a list of surviving paths. A path survives unless
//! another path is at least as well ordered and no more expensive.

use std::sync::Arc;

use tracing::trace;

use crate::catalog::IndexAm;
use crate::core::{AttrNumber, Oid};
use crate::expr::Expr;

use super::clauses::{MergeOrder, RestrictInfo};
use super::cost::PathCost;
use super::pathkeys::{compare_ordering, compare_pathkeys, KeyComparison, PathKey, PathOrder};
use super::relids::Relids;

/// One index arm of an OR-index scan
#[derive(Debug, Clone, PartialEq)]
pub struct OrIndexArm {
    pub index: Oid,
    pub clause: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathKind {
    SeqScan,
    IndexScan {
        index: Oid,
        am: IndexAm,
        /// Index key columns (0 marks an expression key)
        keys: Vec<AttrNumber>,
        index_qual: Vec<RestrictInfo>,
        /// Relations supplying comparison values; empty for a plain scan
        outer_relids: Relids,
    },
    /// One index scan per OR arm, results combined
    OrIndexScan {
        arms: Vec<OrIndexArm>,
        or_clause: RestrictInfo,
    },
    TidScan {
        tid_quals: Vec<Expr>,
    },
    NestLoop {
        outer: Arc<Path>,
        inner: Arc<Path>,
    },
    MergeJoin {
        outer: Arc<Path>,
        inner: Arc<Path>,
        merge_clauses: Vec<RestrictInfo>,
        outer_keys: Vec<Expr>,
        inner_keys: Vec<Expr>,
        order: MergeOrder,
        sort_outer: bool,
        sort_inner: bool,
    },
    HashJoin {
        outer: Arc<Path>,
        inner: Arc<Path>,
        hash_clauses: Vec<RestrictInfo>,
        outer_keys: Vec<Expr>,
        inner_keys: Vec<Expr>,
    },
}

impl PathKind {
    pub fn name(&self) -> &'static str {
        match self {
            PathKind::SeqScan => "SeqScan",
            PathKind::IndexScan { .. } => "IndexScan",
            PathKind::OrIndexScan { .. } => "OrIndexScan",
            PathKind::TidScan { .. } => "TidScan",
            PathKind::NestLoop { .. } => "NestLoop",
            PathKind::MergeJoin { .. } => "MergeJoin",
            PathKind::HashJoin { .. } => "HashJoin",
        }
    }
}

/// A way of producing the rows of a relation
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub parent: Relids,
    pub kind: PathKind,
    pub cost: PathCost,
    pub rows: f64,
    pub ordering: PathOrder,
    pub pathkeys: Vec<PathKey>,
    /// Clauses checked at this node that no child enforces
    pub loc_restrict: Vec<RestrictInfo>,
}

impl Path {
    pub fn new(parent: Relids, kind: PathKind, cost: PathCost, rows: f64) -> Self {
        Self {
            parent,
            kind,
            cost,
            rows,
            ordering: PathOrder::Unordered,
            pathkeys: Vec::new(),
            loc_restrict: Vec::new(),
        }
    }

    pub fn with_order(mut self, ordering: PathOrder, pathkeys: Vec<PathKey>) -> Self {
        self.ordering = ordering;
        self.pathkeys = pathkeys;
        self
    }

    pub fn with_restrict(mut self, clauses: Vec<RestrictInfo>) -> Self {
        self.loc_restrict = clauses;
        self
    }

    pub fn total_cost(&self) -> f64 {
        self.cost.total
    }

    /// Relations whose current row the path needs from an enclosing nestloop
    pub fn required_outer(&self) -> Relids {
        match &self.kind {
            PathKind::IndexScan { outer_relids, .. } => outer_relids.clone(),
            _ => Relids::empty(),
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(
            self.kind,
            PathKind::NestLoop { .. } | PathKind::MergeJoin { .. } | PathKind::HashJoin { .. }
        )
    }
}

/// Offer a path to a relation's path list
///
/// Removes old paths the new one dominates and returns whether the new
/// path was kept. Among equally ordered paths of equal cost the existing
/// one wins.
pub fn add_path(pathlist: &mut Vec<Arc<Path>>, new: Arc<Path>) -> bool {
    let mut i = 0;
    while i < pathlist.len() {
        let old = &pathlist[i];
        let keys = compare_pathkeys(&new.pathkeys, &old.pathkeys)
            .and(compare_ordering(&new.ordering, &old.ordering));
        let (new_cost, old_cost) = (new.total_cost(), old.total_cost());
        let (remove_old, reject_new) = match keys {
            KeyComparison::Equal => (new_cost < old_cost, new_cost >= old_cost),
            KeyComparison::NewStronger => (new_cost <= old_cost, false),
            KeyComparison::OldStronger => (false, old_cost <= new_cost),
            KeyComparison::Incomparable => (false, false),
        };
        if reject_new {
            trace!(
                kind = new.kind.name(),
                cost = new_cost,
                kept = old.kind.name(),
                "path rejected"
            );
            return false;
        }
        if remove_old {
            trace!(
                kind = old.kind.name(),
                cost = old_cost,
                by = new.kind.name(),
                "path removed"
            );
            pathlist.remove(i);
            continue;
        }
        i += 1;
    }
    pathlist.push(new);
    true
}

/// Offer every path in `paths`
pub fn add_pathlist(pathlist: &mut Vec<Arc<Path>>, paths: impl IntoIterator<Item = Path>) {
    for path in paths {
        add_path(pathlist, Arc::new(path));
    }
}

/// Cheapest path by total cost
pub fn cheapest_path(pathlist: &[Arc<Path>]) -> Option<&Arc<Path>> {
    pathlist
        .iter()
        .min_by(|a, b| a.total_cost().total_cmp(&b.total_cost()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::expr::Var;

    fn seq(cost: f64) -> Arc<Path> {
        Arc::new(Path::new(
            Relids::singleton(1),
            PathKind::SeqScan,
            PathCost::new(0.0, cost),
            10.0,
        ))
    }

    fn ordered(cost: f64, keys: usize) -> Arc<Path> {
        let pathkeys: Vec<PathKey> = (1..=keys as i16)
            .map(|a| vec![Var::new(1, a, DataType::Integer)])
            .collect();
        let ops = vec![412; keys];
        Arc::new(
            Path::new(
                Relids::singleton(1),
                PathKind::SeqScan,
                PathCost::new(0.0, cost),
                10.0,
            )
            .with_order(PathOrder::SortOps(ops), pathkeys),
        )
    }

    #[test]
    fn test_cheaper_equal_path_replaces() {
        let mut list = vec![seq(100.0)];
        assert!(add_path(&mut list, seq(80.0)));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].total_cost(), 80.0);
    }

    #[test]
    fn test_equal_cost_keeps_existing() {
        let first = seq(50.0);
        let mut list = vec![first.clone()];
        assert!(!add_path(&mut list, seq(50.0)));
        assert!(Arc::ptr_eq(&list[0], &first));
    }

    #[test]
    fn test_ordered_and_unordered_coexist() {
        let mut list = vec![seq(50.0)];
        assert!(add_path(&mut list, ordered(70.0, 1)));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_stronger_cheaper_path_dominates() {
        let mut list = vec![ordered(70.0, 1)];
        assert!(add_path(&mut list, ordered(60.0, 2)));
        assert_eq!(list.len(), 1);
        assert!(!add_path(&mut list, ordered(65.0, 1)));
    }

    #[test]
    fn test_cheapest() {
        let list = vec![ordered(70.0, 1), seq(50.0)];
        assert_eq!(cheapest_path(&list).unwrap().total_cost(), 50.0);
    }
}
