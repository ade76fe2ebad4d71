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

//! Predicate implication for partial indexes
//!
//! A partial index may only be used when the query's restrictions prove
//! its predicate. Besides structural equality, simple `column op constant`
//! atoms are proven with the btree operator family: `x < 5` implies
//! `x <= 10` because `5 <= 10` holds.

use crate::catalog::{Catalog, IndexAm, Strategy};
use crate::core::{Oid, Result, Value};
use crate::expr::{BoolOp, Expr, Var};
use crate::functions::FunctionRegistry;

/// Comparison kinds including not-equal, which btree classes lack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl Cmp {
    fn from_strategy(s: Strategy) -> Cmp {
        match s {
            Strategy::Less => Cmp::Lt,
            Strategy::LessEqual => Cmp::Le,
            Strategy::Equal => Cmp::Eq,
            Strategy::GreaterEqual => Cmp::Ge,
            Strategy::Greater => Cmp::Gt,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Test operator, applied as `clause_const test pred_const`, that proves
/// the predicate (column) from the clause (row)
const IMPLIES: [[Option<Cmp>; 6]; 6] = {
    use Cmp::*;
    [
        // clause <
        [Some(Le), Some(Le), None, None, None, Some(Le)],
        // clause <=
        [Some(Lt), Some(Le), None, None, None, Some(Lt)],
        // clause =
        [Some(Lt), Some(Le), Some(Eq), Some(Ge), Some(Gt), Some(Ne)],
        // clause >=
        [None, None, None, Some(Ge), Some(Gt), Some(Gt)],
        // clause >
        [None, None, None, Some(Ge), Some(Ge), Some(Ge)],
        // clause <>
        [None, None, None, None, None, Some(Eq)],
    ]
};

/// Whether the restriction list proves `predicate`
///
/// Every conjunct of an AND predicate must be proven; one disjunct of an
/// OR predicate suffices.
pub fn predicate_implied_by(
    predicate: &Expr,
    restrictions: &[Expr],
    catalog: &dyn Catalog,
) -> Result<bool> {
    if let Expr::Bool(b) = predicate {
        match b.op {
            BoolOp::And => {
                for arg in &b.args {
                    if !predicate_implied_by(arg, restrictions, catalog)? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            BoolOp::Or => {
                for arg in &b.args {
                    if predicate_implied_by(arg, restrictions, catalog)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            BoolOp::Not => {}
        }
    }
    for clause in restrictions {
        if clause_implies(clause, predicate, catalog)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether one clause proves a predicate atom
///
/// An AND clause proves the atom when any conjunct does; an OR clause only
/// when every disjunct does.
fn clause_implies(clause: &Expr, pred: &Expr, catalog: &dyn Catalog) -> Result<bool> {
    if let Expr::Bool(b) = clause {
        match b.op {
            BoolOp::And => {
                for arg in &b.args {
                    if clause_implies(arg, pred, catalog)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            BoolOp::Or => {
                for arg in &b.args {
                    if !clause_implies(arg, pred, catalog)? {
                        return Ok(false);
                    }
                }
                return Ok(!b.args.is_empty());
            }
            BoolOp::Not => {}
        }
    }
    if clause == pred {
        return Ok(true);
    }
    btree_implies(clause, pred, catalog)
}

/// `column op constant` with the column on the left
struct Atom<'a> {
    var: &'a Var,
    op: Oid,
    value: &'a Value,
}

fn atom<'a>(expr: &'a Expr, catalog: &dyn Catalog) -> Result<Option<Atom<'a>>> {
    let Some((op, left, right)) = expr.as_binary_op() else {
        return Ok(None);
    };
    match (left, right) {
        (Expr::Var(var), Expr::Const(c)) => Ok(Some(Atom {
            var,
            op,
            value: &c.value,
        })),
        (Expr::Const(c), Expr::Var(var)) => Ok(catalog.get_commutator(op)?.map(|op| Atom {
            var,
            op,
            value: &c.value,
        })),
        _ => Ok(None),
    }
}

/// Comparison kind of `op` in `opclass`, with the class's equality operator
fn classify(op: Oid, opclass: Oid, catalog: &dyn Catalog) -> Result<Option<Cmp>> {
    let class = catalog.opclass(opclass)?;
    if let Some(s) = class.strategy_of(op) {
        return Ok(Some(Cmp::from_strategy(s)));
    }
    let Some(eq) = class.operator(Strategy::Equal) else {
        return Ok(None);
    };
    let negator = catalog.operator(eq)?.negator;
    Ok((negator == Some(op)).then_some(Cmp::Ne))
}

/// Operator classes an atom's operator belongs to, looking through `<>`
fn candidate_opclasses(op: Oid, catalog: &dyn Catalog) -> Result<Vec<Oid>> {
    let direct = catalog.operator_opclasses(op, IndexAm::BTree)?;
    if !direct.is_empty() {
        return Ok(direct);
    }
    match catalog.operator(op)?.negator {
        Some(neg) => catalog.operator_opclasses(neg, IndexAm::BTree),
        None => Ok(Vec::new()),
    }
}

fn btree_implies(clause: &Expr, pred: &Expr, catalog: &dyn Catalog) -> Result<bool> {
    let (Some(c), Some(p)) = (atom(clause, catalog)?, atom(pred, catalog)?) else {
        return Ok(false);
    };
    if !c.var.same_column(p.var) || c.value.is_null() || p.value.is_null() {
        return Ok(false);
    }

    let pred_classes = candidate_opclasses(p.op, catalog)?;
    for opclass in candidate_opclasses(c.op, catalog)? {
        if !pred_classes.contains(&opclass) {
            continue;
        }
        let (Some(ccmp), Some(pcmp)) = (
            classify(c.op, opclass, catalog)?,
            classify(p.op, opclass, catalog)?,
        ) else {
            continue;
        };
        let Some(test) = IMPLIES[ccmp.index()][pcmp.index()] else {
            return Ok(false);
        };
        let Some(test_op) = test_operator(test, opclass, catalog)? else {
            continue;
        };
        let func = catalog.get_opcode(test_op)?;
        let registry = FunctionRegistry::shared();
        let result = registry
            .scalar(func)?
            .invoke(&[c.value.clone(), p.value.clone()])?;
        return Ok(result.as_boolean() == Some(true));
    }
    Ok(false)
}

fn test_operator(test: Cmp, opclass: Oid, catalog: &dyn Catalog) -> Result<Option<Oid>> {
    let class = catalog.opclass(opclass)?;
    let strategy = match test {
        Cmp::Lt => Strategy::Less,
        Cmp::Le => Strategy::LessEqual,
        Cmp::Eq => Strategy::Equal,
        Cmp::Ge => Strategy::GreaterEqual,
        Cmp::Gt => Strategy::Greater,
        Cmp::Ne => {
            return match class.operator(Strategy::Equal) {
                Some(eq) => Ok(catalog.operator(eq)?.negator),
                None => Ok(None),
            }
        }
    };
    Ok(class.operator(strategy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::catalog::CatalogSnapshot;
    use crate::core::DataType;

    fn cmp(op: Oid, value: i64) -> Expr {
        Expr::op(
            op,
            vec![Expr::var(1, 1, DataType::Integer), Expr::constant(Value::integer(value))],
            DataType::Boolean,
        )
    }

    fn implied(pred: Expr, clauses: &[Expr]) -> bool {
        predicate_implied_by(&pred, clauses, &CatalogSnapshot::new()).unwrap()
    }

    #[test]
    fn test_range_implication() {
        assert!(implied(cmp(INT8_LE_OP, 10), &[cmp(INT8_LT_OP, 5)]));
        assert!(implied(cmp(INT8_LT_OP, 10), &[cmp(INT8_LT_OP, 10)]));
        assert!(!implied(cmp(INT8_LT_OP, 5), &[cmp(INT8_LT_OP, 10)]));
        assert!(implied(cmp(INT8_GT_OP, 0), &[cmp(INT8_EQ_OP, 3)]));
        assert!(!implied(cmp(INT8_GT_OP, 0), &[cmp(INT8_LT_OP, 3)]));
    }

    #[test]
    fn test_not_equal() {
        assert!(implied(cmp(INT8_NE_OP, 7), &[cmp(INT8_EQ_OP, 3)]));
        assert!(!implied(cmp(INT8_NE_OP, 3), &[cmp(INT8_EQ_OP, 3)]));
        assert!(implied(cmp(INT8_NE_OP, 3), &[cmp(INT8_NE_OP, 3)]));
        assert!(implied(cmp(INT8_NE_OP, 3), &[cmp(INT8_GT_OP, 5)]));
    }

    #[test]
    fn test_commuted_constant() {
        // 5 > x is x < 5
        let clause = Expr::op(
            INT8_GT_OP,
            vec![Expr::constant(Value::integer(5)), Expr::var(1, 1, DataType::Integer)],
            DataType::Boolean,
        );
        assert!(implied(cmp(INT8_LE_OP, 10), &[clause]));
    }

    #[test]
    fn test_boolean_structure() {
        let pred = Expr::and(vec![cmp(INT8_GT_OP, 0), cmp(INT8_LT_OP, 100)]);
        assert!(implied(pred.clone(), &[cmp(INT8_EQ_OP, 50)]));
        assert!(!implied(pred, &[cmp(INT8_GT_OP, 50)]));

        let or_pred = Expr::or(vec![cmp(INT8_LT_OP, 0), cmp(INT8_GT_OP, 10)]);
        assert!(implied(or_pred, &[cmp(INT8_GT_OP, 20)]));

        let or_clause = Expr::or(vec![cmp(INT8_EQ_OP, 1), cmp(INT8_EQ_OP, 2)]);
        assert!(implied(cmp(INT8_LT_OP, 5), &[or_clause.clone()]));
        assert!(!implied(cmp(INT8_LT_OP, 2), &[or_clause]));
    }

    #[test]
    fn test_different_column_not_implied() {
        let other = Expr::op(
            INT8_LT_OP,
            vec![Expr::var(1, 2, DataType::Integer), Expr::constant(Value::integer(1))],
            DataType::Boolean,
        );
        assert!(!implied(cmp(INT8_LT_OP, 5), &[other]));
    }
}
