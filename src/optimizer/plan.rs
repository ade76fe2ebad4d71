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

//! Plan trees
//!
//! The planner turns the chosen path into a [`Plan`], adds the nodes above
//! the join tree (sorting, grouping, window aggregation, the constant
//! qualification) and then finalizes variable references so that every
//! node reads its inputs by position.

use std::fmt::Write as _;

use crate::core::{Oid, RelId};
use crate::executor::window::WindowAggSpec;
use crate::expr::Expr;

use super::clauses::MergeOrder;
use super::cost::PathCost;
use super::query::TargetEntry;
use super::relids::Relids;

/// One sort column
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub sortop: Oid,
    pub nulls_first: bool,
}

/// Subquery evaluated once before its parent runs
#[derive(Debug, Clone, PartialEq)]
pub struct InitPlan {
    pub plan_id: usize,
    /// Params the subquery's result is stored in
    pub set_param: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanKind {
    SeqScan {
        relid: RelId,
    },
    /// One scan per index; several indexes scan OR arms
    IndexScan {
        relid: RelId,
        indexes: Vec<Oid>,
        index_quals: Vec<Vec<Expr>>,
    },
    TidScan {
        relid: RelId,
        tid_quals: Vec<Expr>,
    },
    NestLoop {
        outer: Box<Plan>,
        inner: Box<Plan>,
    },
    MergeJoin {
        outer: Box<Plan>,
        inner: Box<Plan>,
        merge_clauses: Vec<Expr>,
        order: MergeOrder,
    },
    HashJoin {
        outer: Box<Plan>,
        inner: Box<Plan>,
        hash_clauses: Vec<Expr>,
        hash_op: Oid,
    },
    /// Hash table build over the inner side of a hash join
    Hash {
        child: Box<Plan>,
        keys: Vec<Expr>,
    },
    Sort {
        child: Box<Plan>,
        keys: Vec<SortKey>,
    },
    /// Collapses runs of equal grouping keys from sorted input
    Group {
        child: Box<Plan>,
        keys: Vec<Expr>,
        eq_ops: Vec<Oid>,
    },
    Agg {
        child: Box<Plan>,
        group_keys: Vec<Expr>,
    },
    WindowAgg {
        child: Box<Plan>,
        spec: WindowAggSpec,
    },
    /// Evaluates the target list, gated by a constant qualification
    Result {
        child: Option<Box<Plan>>,
        const_qual: Vec<Expr>,
    },
}

/// Plan node
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub kind: PlanKind,
    pub cost: PathCost,
    pub rows: f64,
    pub width: usize,
    pub targetlist: Vec<TargetEntry>,
    /// Filter evaluated on each output row
    pub qual: Vec<Expr>,
    /// Params read from outside this subtree
    pub ext_param: Vec<u32>,
    /// Params set by this node's init plans
    pub set_param: Vec<u32>,
    pub init_plans: Vec<InitPlan>,
}

impl Plan {
    pub fn new(kind: PlanKind, cost: PathCost, rows: f64, width: usize) -> Self {
        Self {
            kind,
            cost,
            rows,
            width,
            targetlist: Vec::new(),
            qual: Vec::new(),
            ext_param: Vec::new(),
            set_param: Vec::new(),
            init_plans: Vec::new(),
        }
    }

    pub fn with_targetlist(mut self, targetlist: Vec<TargetEntry>) -> Self {
        self.targetlist = targetlist;
        self
    }

    pub fn with_qual(mut self, qual: Vec<Expr>) -> Self {
        self.qual = qual;
        self
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            PlanKind::SeqScan { .. } => "Seq Scan",
            PlanKind::IndexScan { .. } => "Index Scan",
            PlanKind::TidScan { .. } => "Tid Scan",
            PlanKind::NestLoop { .. } => "Nested Loop",
            PlanKind::MergeJoin { .. } => "Merge Join",
            PlanKind::HashJoin { .. } => "Hash Join",
            PlanKind::Hash { .. } => "Hash",
            PlanKind::Sort { .. } => "Sort",
            PlanKind::Group { .. } => "Group",
            PlanKind::Agg { .. } => "Aggregate",
            PlanKind::WindowAgg { .. } => "WindowAgg",
            PlanKind::Result { .. } => "Result",
        }
    }

    /// Outer child first
    pub fn children(&self) -> Vec<&Plan> {
        match &self.kind {
            PlanKind::SeqScan { .. } | PlanKind::IndexScan { .. } | PlanKind::TidScan { .. } => {
                Vec::new()
            }
            PlanKind::NestLoop { outer, inner }
            | PlanKind::MergeJoin { outer, inner, .. }
            | PlanKind::HashJoin { outer, inner, .. } => vec![outer.as_ref(), inner.as_ref()],
            PlanKind::Hash { child, .. }
            | PlanKind::Sort { child, .. }
            | PlanKind::Group { child, .. }
            | PlanKind::Agg { child, .. }
            | PlanKind::WindowAgg { child, .. } => vec![child.as_ref()],
            PlanKind::Result { child, .. } => child.iter().map(|c| c.as_ref()).collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Plan> {
        match &mut self.kind {
            PlanKind::SeqScan { .. } | PlanKind::IndexScan { .. } | PlanKind::TidScan { .. } => {
                Vec::new()
            }
            PlanKind::NestLoop { outer, inner }
            | PlanKind::MergeJoin { outer, inner, .. }
            | PlanKind::HashJoin { outer, inner, .. } => vec![outer.as_mut(), inner.as_mut()],
            PlanKind::Hash { child, .. }
            | PlanKind::Sort { child, .. }
            | PlanKind::Group { child, .. }
            | PlanKind::Agg { child, .. }
            | PlanKind::WindowAgg { child, .. } => vec![child.as_mut()],
            PlanKind::Result { child, .. } => child.iter_mut().map(|c| c.as_mut()).collect(),
        }
    }

    /// Every expression this node evaluates, excluding its children's
    pub fn exprs(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = self.targetlist.iter().map(|t| &t.expr).collect();
        out.extend(self.qual.iter());
        match &self.kind {
            PlanKind::IndexScan { index_quals, .. } => out.extend(index_quals.iter().flatten()),
            PlanKind::TidScan { tid_quals, .. } => out.extend(tid_quals.iter()),
            PlanKind::MergeJoin { merge_clauses, .. } => out.extend(merge_clauses.iter()),
            PlanKind::HashJoin { hash_clauses, .. } => out.extend(hash_clauses.iter()),
            PlanKind::Hash { keys, .. } | PlanKind::Group { keys, .. } => out.extend(keys.iter()),
            PlanKind::Agg { group_keys, .. } => out.extend(group_keys.iter()),
            PlanKind::Sort { keys, .. } => out.extend(keys.iter().map(|k| &k.expr)),
            PlanKind::WindowAgg { spec, .. } => {
                out.extend(spec.start_offset.iter());
                out.extend(spec.end_offset.iter());
                for func in &spec.functions {
                    out.extend(func.args.iter());
                    out.extend(func.filter.iter());
                }
                out.extend(spec.run_condition.iter());
                out.extend(spec.qual.iter());
            }
            PlanKind::Result { const_qual, .. } => out.extend(const_qual.iter()),
            PlanKind::SeqScan { .. } | PlanKind::NestLoop { .. } => {}
        }
        out
    }

    /// Mutable counterpart of [`Plan::exprs`]
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        let Plan {
            kind,
            targetlist,
            qual,
            ..
        } = self;
        let mut out: Vec<&mut Expr> = targetlist.iter_mut().map(|t| &mut t.expr).collect();
        out.extend(qual.iter_mut());
        match kind {
            PlanKind::IndexScan { index_quals, .. } => out.extend(index_quals.iter_mut().flatten()),
            PlanKind::TidScan { tid_quals, .. } => out.extend(tid_quals.iter_mut()),
            PlanKind::MergeJoin { merge_clauses, .. } => out.extend(merge_clauses.iter_mut()),
            PlanKind::HashJoin { hash_clauses, .. } => out.extend(hash_clauses.iter_mut()),
            PlanKind::Hash { keys, .. } | PlanKind::Group { keys, .. } => out.extend(keys.iter_mut()),
            PlanKind::Agg { group_keys, .. } => out.extend(group_keys.iter_mut()),
            PlanKind::Sort { keys, .. } => out.extend(keys.iter_mut().map(|k| &mut k.expr)),
            PlanKind::WindowAgg { spec, .. } => {
                out.extend(spec.start_offset.iter_mut());
                out.extend(spec.end_offset.iter_mut());
                for func in spec.functions.iter_mut() {
                    out.extend(func.args.iter_mut());
                    out.extend(func.filter.iter_mut());
                }
                out.extend(spec.run_condition.iter_mut());
                out.extend(spec.qual.iter_mut());
            }
            PlanKind::Result { const_qual, .. } => out.extend(const_qual.iter_mut()),
            PlanKind::SeqScan { .. } | PlanKind::NestLoop { .. } => {}
        }
        out
    }

    /// Relations scanned anywhere in this subtree
    pub fn scanned_relids(&self) -> Relids {
        let mut relids = Relids::empty();
        self.walk(&mut |p| match &p.kind {
            PlanKind::SeqScan { relid }
            | PlanKind::IndexScan { relid, .. }
            | PlanKind::TidScan { relid, .. } => relids.insert(*relid),
            _ => {}
        });
        relids
    }

    pub fn is_scan(&self) -> bool {
        matches!(
            self.kind,
            PlanKind::SeqScan { .. } | PlanKind::IndexScan { .. } | PlanKind::TidScan { .. }
        )
    }

    /// Visit this node and all descendants, parents first
    pub fn walk(&self, f: &mut dyn FnMut(&Plan)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Indented textual rendering of the plan tree
    pub fn explain(&self) -> String {
        let mut lines = Vec::new();
        self.explain_into(&mut lines, 0);
        lines.join("\n")
    }

    fn explain_into(&self, lines: &mut Vec<String>, depth: usize) {
        let prefix = if depth == 0 {
            String::new()
        } else {
            format!("{}-> ", "   ".repeat(depth - 1) + "  ")
        };
        let detail_prefix = "   ".repeat(depth) + "  ";

        let mut head = self.name().to_string();
        match &self.kind {
            PlanKind::SeqScan { relid } | PlanKind::TidScan { relid, .. } => {
                let _ = write!(head, " on rel {}", relid);
            }
            PlanKind::IndexScan { relid, indexes, .. } => {
                let ids: Vec<String> = indexes.iter().map(|i| i.to_string()).collect();
                let _ = write!(head, " using {} on rel {}", ids.join(", "), relid);
            }
            _ => {}
        }
        lines.push(format!(
            "{}{}  (cost={:.2}..{:.2} rows={:.0} width={})",
            prefix, head, self.cost.startup, self.cost.total, self.rows, self.width
        ));

        let join_exprs = |exprs: &[Expr]| {
            exprs
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(" AND ")
        };
        match &self.kind {
            PlanKind::IndexScan { index_quals, .. } => {
                for quals in index_quals.iter().filter(|q| !q.is_empty()) {
                    lines.push(format!("{}Index Cond: {}", detail_prefix, join_exprs(quals)));
                }
            }
            PlanKind::TidScan { tid_quals, .. } => {
                lines.push(format!("{}TID Cond: {}", detail_prefix, join_exprs(tid_quals)));
            }
            PlanKind::MergeJoin { merge_clauses, .. } => {
                lines.push(format!("{}Merge Cond: {}", detail_prefix, join_exprs(merge_clauses)));
            }
            PlanKind::HashJoin { hash_clauses, .. } => {
                lines.push(format!("{}Hash Cond: {}", detail_prefix, join_exprs(hash_clauses)));
            }
            PlanKind::Sort { keys, .. } => {
                let keys: Vec<String> = keys.iter().map(|k| k.expr.to_string()).collect();
                lines.push(format!("{}Sort Key: {}", detail_prefix, keys.join(", ")));
            }
            PlanKind::Group { keys, .. } | PlanKind::Agg { group_keys: keys, .. } if !keys.is_empty() => {
                lines.push(format!("{}Group Key: {}", detail_prefix, join_exprs(keys)));
            }
            PlanKind::WindowAgg { spec, .. } => {
                lines.push(format!(
                    "{}Window: {} function(s), {} partition column(s), {} order column(s)",
                    detail_prefix,
                    spec.functions.len(),
                    spec.partition_by.len(),
                    spec.order_by.len()
                ));
            }
            PlanKind::Result { const_qual, .. } if !const_qual.is_empty() => {
                lines.push(format!("{}One-Time Filter: {}", detail_prefix, join_exprs(const_qual)));
            }
            _ => {}
        }
        if !self.qual.is_empty() {
            lines.push(format!("{}Filter: {}", detail_prefix, join_exprs(&self.qual)));
        }
        for init in &self.init_plans {
            lines.push(format!(
                "{}InitPlan {} (returns {:?})",
                detail_prefix, init.plan_id, init.set_param
            ));
        }
        for child in self.children() {
            child.explain_into(lines, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::core::{DataType, Value};

    #[test]
    fn test_explain_indents_children() {
        let scan = Plan::new(PlanKind::SeqScan { relid: 7 }, PathCost::new(0.0, 12.5), 100.0, 8)
            .with_qual(vec![Expr::op(
                INT8_GT_OP,
                vec![Expr::var(7, 1, DataType::Integer), Expr::constant(Value::integer(3))],
                DataType::Boolean,
            )]);
        let sort = Plan::new(
            PlanKind::Sort {
                child: Box::new(scan),
                keys: vec![SortKey {
                    expr: Expr::outer_var(1, DataType::Integer),
                    sortop: INT8_LT_OP,
                    nulls_first: false,
                }],
            },
            PathCost::new(20.0, 21.0),
            100.0,
            8,
        );
        let text = sort.explain();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Sort  (cost=20.00..21.00 rows=100 width=8)"));
        assert!(lines[1].trim_start().starts_with("Sort Key:"));
        assert!(lines[2].trim_start().starts_with("-> Seq Scan on rel 7"));
        assert!(lines[3].trim_start().starts_with("Filter:"));
    }
}
