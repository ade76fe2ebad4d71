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

//! Qualification classification
//!
//! The WHERE clause is split into conjuncts and each conjunct is wrapped in
//! a [`RestrictInfo`] that caches what the path generators need: the
//! relations it mentions, its selectivity and its merge/hash join
//! properties. Conjuncts over one relation become restrictions of that
//! relation; conjuncts over several are filed as join information on every
//! relation they mention, keyed by the other relations.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::core::{DataType, Oid, RelId, Result};
use crate::expr::Expr;

use super::relids::Relids;
use super::selectivity::clause_selectivity;

/// Sort operators that let a clause drive a merge join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOrder {
    pub join_op: Oid,
    pub left_sortop: Oid,
    pub right_sortop: Oid,
    pub left_type: DataType,
    pub right_type: DataType,
}

/// A WHERE-clause conjunct with its cached planning properties
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictInfo {
    pub clause: Expr,
    pub selectivity: f64,
    /// Every relation the clause mentions
    pub relids: Relids,
    /// Relations of the left operand of a binary operator clause
    pub left_relids: Relids,
    pub right_relids: Relids,
    /// Indexes that can evaluate this clause, filled per base relation
    pub indexable: Vec<Oid>,
    pub merge_order: Option<MergeOrder>,
    /// Operator usable for a hash join on this clause
    pub hash_op: Option<Oid>,
    /// Clause is a NOT expression
    pub not_clause: bool,
}

impl RestrictInfo {
    pub fn new(clause: Expr, catalog: &dyn Catalog) -> Result<Self> {
        let selectivity = clause_selectivity(&clause, catalog)?;
        let relids = clause.relids();
        let not_clause = clause.as_not().is_some();
        let mut info = Self {
            clause,
            selectivity,
            relids,
            left_relids: Relids::empty(),
            right_relids: Relids::empty(),
            indexable: Vec::new(),
            merge_order: None,
            hash_op: None,
            not_clause,
        };

        if let Some((opno, left, right)) = info.clause.as_binary_op() {
            let (lrel, rrel) = (left.relids(), right.relids());
            if !lrel.is_empty() && !rrel.is_empty() && !lrel.overlaps(&rrel) {
                // Join properties need a plain column on each side
                if left.as_var().is_some() && right.as_var().is_some() {
                    let (ltype, rtype) = (left.type_of(), right.type_of());
                    if let Some((lsort, rsort)) = catalog.op_mergejoinable(opno, ltype, rtype)? {
                        info.merge_order = Some(MergeOrder {
                            join_op: opno,
                            left_sortop: lsort,
                            right_sortop: rsort,
                            left_type: ltype,
                            right_type: rtype,
                        });
                    }
                    if catalog.op_hashjoinable(opno, ltype, rtype)? {
                        info.hash_op = Some(opno);
                    }
                }
            }
            info.left_relids = lrel;
            info.right_relids = rrel;
        }
        Ok(info)
    }

    pub fn is_join_clause(&self) -> bool {
        self.relids.len() > 1
    }

    /// Operands of a binary clause oriented as (outer side, inner side)
    ///
    /// `None` when the clause does not separate the two relation sets.
    pub fn join_sides(&self, outer: &Relids, inner: &Relids) -> Option<(&Expr, &Expr)> {
        let (_, left, right) = self.clause.as_binary_op()?;
        if self.left_relids.is_empty() || self.right_relids.is_empty() {
            return None;
        }
        if self.left_relids.is_subset(outer) && self.right_relids.is_subset(inner) {
            Some((left, right))
        } else if self.left_relids.is_subset(inner) && self.right_relids.is_subset(outer) {
            Some((right, left))
        } else {
            None
        }
    }
}

/// Join clauses of one relation that reference a given set of other relations
#[derive(Debug, Clone, PartialEq)]
pub struct JoinInfo {
    pub other_rels: Relids,
    pub clauses: Vec<RestrictInfo>,
    pub mergejoinable: bool,
    pub hashjoinable: bool,
}

impl JoinInfo {
    pub fn new(other_rels: Relids) -> Self {
        Self {
            other_rels,
            clauses: Vec::new(),
            mergejoinable: false,
            hashjoinable: false,
        }
    }

    pub fn push(&mut self, info: RestrictInfo) {
        self.mergejoinable |= info.merge_order.is_some();
        self.hashjoinable |= info.hash_op.is_some();
        self.clauses.push(info);
    }
}

/// Qualification split by the relations each conjunct references
#[derive(Debug, Default)]
pub struct ClassifiedQuals {
    /// Conjuncts with no relation reference, checked once by a Result node
    pub constant: Vec<Expr>,
    pub restrictions: FxHashMap<RelId, Vec<RestrictInfo>>,
    pub joins: FxHashMap<RelId, Vec<JoinInfo>>,
}

/// Classify the conjuncts of a qualification
pub fn classify_quals(qual: Option<&Expr>, catalog: &dyn Catalog) -> Result<ClassifiedQuals> {
    let mut out = ClassifiedQuals::default();
    let Some(qual) = qual else {
        return Ok(out);
    };
    for conjunct in qual.clone().into_conjuncts() {
        let relids = conjunct.relids();
        if relids.is_empty() && !conjunct.contains_subplan() {
            out.constant.push(conjunct);
            continue;
        }
        let info = RestrictInfo::new(conjunct, catalog)?;
        if let Some(relid) = info.relids.singleton_member() {
            out.restrictions.entry(relid).or_default().push(info);
            continue;
        }
        if info.relids.is_empty() {
            // Uncorrelated subquery test with no column reference
            out.constant.push(info.clause);
            continue;
        }
        for relid in info.relids.iter() {
            let mut others = info.relids.clone();
            others.remove(relid);
            let list = out.joins.entry(relid).or_default();
            let pos = match list.iter().position(|j| j.other_rels == others) {
                Some(pos) => pos,
                None => {
                    list.push(JoinInfo::new(others));
                    list.len() - 1
                }
            };
            list[pos].push(info.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::catalog::{CatalogSnapshot, RelationInfo};
    use crate::core::Value;

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new()
            .with_relation(RelationInfo::new(1, "a", 10.0, 100.0))
            .with_relation(RelationInfo::new(2, "b", 10.0, 100.0))
            .with_relation(RelationInfo::new(3, "c", 10.0, 100.0))
    }

    fn col(rel: RelId, att: i16) -> Expr {
        Expr::var(rel, att, DataType::Integer)
    }

    fn eq(l: Expr, r: Expr) -> Expr {
        Expr::op(INT8_EQ_OP, vec![l, r], DataType::Boolean)
    }

    #[test]
    fn test_classification() {
        let cat = catalog();
        let qual = Expr::and(vec![
            eq(col(1, 1), Expr::constant(Value::integer(5))),
            eq(col(1, 2), col(2, 1)),
            Expr::constant(Value::boolean(true)),
        ]);
        let classified = classify_quals(Some(&qual), &cat).unwrap();
        assert_eq!(classified.constant.len(), 1);
        assert_eq!(classified.restrictions[&1].len(), 1);
        let a_joins = &classified.joins[&1];
        assert_eq!(a_joins.len(), 1);
        assert_eq!(a_joins[0].other_rels, Relids::singleton(2));
        assert!(a_joins[0].mergejoinable);
        assert!(a_joins[0].hashjoinable);
        assert_eq!(classified.joins[&2][0].other_rels, Relids::singleton(1));
    }

    #[test]
    fn test_three_way_clause_keyed_by_other_rels() {
        let cat = catalog();
        let three = Expr::op(
            INT8_EQ_OP,
            vec![
                Expr::op(INT8_PLUS_OP, vec![col(1, 1), col(2, 1)], DataType::Integer),
                col(3, 1),
            ],
            DataType::Boolean,
        );
        let classified = classify_quals(Some(&three), &cat).unwrap();
        let c_joins = &classified.joins[&3];
        assert_eq!(c_joins[0].other_rels, [1, 2].into_iter().collect());
        // Not a plain column on both sides
        assert!(!c_joins[0].mergejoinable);
    }

    #[test]
    fn test_join_sides_orientation() {
        let cat = catalog();
        let info = RestrictInfo::new(eq(col(1, 1), col(2, 1)), &cat).unwrap();
        let (outer, inner) = info
            .join_sides(&Relids::singleton(2), &Relids::singleton(1))
            .unwrap();
        assert_eq!(outer.as_var().unwrap().relid(), Some(2));
        assert_eq!(inner.as_var().unwrap().relid(), Some(1));
        assert!(info
            .join_sides(&Relids::singleton(1), &Relids::singleton(3))
            .is_none());
    }
}
