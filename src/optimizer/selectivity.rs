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

//! Clause selectivity estimation

use crate::catalog::oids::BOOL_EQ_OP;
use crate::catalog::{Catalog, DEFAULT_INEQ_SEL};
use crate::core::{DataType, Result, Value};
use crate::expr::{BoolOp, Expr};

/// Fraction of rows satisfying `clause`, in `[0, 1]`
///
/// Single-relation operator clauses go to the operator's restriction
/// estimator, multi-relation ones to its join estimator.
pub fn clause_selectivity(clause: &Expr, catalog: &dyn Catalog) -> Result<f64> {
    let sel = match clause {
        Expr::Const(c) => match c.value.as_boolean() {
            Some(true) => 1.0,
            _ => 0.0,
        },
        Expr::Var(v) if v.typ == DataType::Boolean => match v.relid() {
            Some(relid) => catalog.restriction_selectivity(
                BOOL_EQ_OP,
                &[clause.clone(), Expr::constant(Value::boolean(true))],
                relid,
            )?,
            None => DEFAULT_INEQ_SEL,
        },
        Expr::Bool(b) => match b.op {
            BoolOp::And => {
                let mut s = 1.0;
                for arg in &b.args {
                    s *= clause_selectivity(arg, catalog)?;
                }
                s
            }
            BoolOp::Or => {
                let mut s = 0.0;
                for arg in &b.args {
                    let s2 = clause_selectivity(arg, catalog)?;
                    s = s + s2 - s * s2;
                }
                s
            }
            BoolOp::Not => match b.args.first() {
                Some(arg) => 1.0 - clause_selectivity(arg, catalog)?,
                None => 1.0,
            },
        },
        Expr::Op(op) => {
            let relids = clause.relids();
            match relids.singleton_member() {
                Some(relid) => catalog.restriction_selectivity(op.opno, &op.args, relid)?,
                None if relids.is_empty() => DEFAULT_INEQ_SEL,
                None => catalog.join_selectivity(op.opno, &op.args)?,
            }
        }
        Expr::Func(_) => DEFAULT_INEQ_SEL,
        _ => 1.0,
    };
    Ok(sel.clamp(0.0, 1.0))
}

/// Combined selectivity of independent conjuncts
pub fn clauselist_selectivity<'a>(
    clauses: impl IntoIterator<Item = &'a Expr>,
    catalog: &dyn Catalog,
) -> Result<f64> {
    let mut s = 1.0;
    for clause in clauses {
        s *= clause_selectivity(clause, catalog)?;
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::catalog::{CatalogSnapshot, ColumnInfo, RelationInfo};

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new().with_relation(
            RelationInfo::new(1, "t", 10.0, 1000.0)
                .column(ColumnInfo::new("a", DataType::Integer).with_ndistinct(10.0))
                .column(ColumnInfo::new("flag", DataType::Boolean).with_ndistinct(2.0)),
        )
    }

    fn eq(value: i64) -> Expr {
        Expr::op(
            INT8_EQ_OP,
            vec![Expr::var(1, 1, DataType::Integer), Expr::constant(Value::integer(value))],
            DataType::Boolean,
        )
    }

    #[test]
    fn test_constants() {
        let cat = catalog();
        assert_eq!(clause_selectivity(&Expr::constant(Value::boolean(true)), &cat).unwrap(), 1.0);
        assert_eq!(clause_selectivity(&Expr::constant(Value::boolean(false)), &cat).unwrap(), 0.0);
        assert_eq!(clause_selectivity(&Expr::null_const(DataType::Boolean), &cat).unwrap(), 0.0);
    }

    #[test]
    fn test_boolean_column_is_equality_to_true() {
        let cat = catalog();
        let s = clause_selectivity(&Expr::var(1, 2, DataType::Boolean), &cat).unwrap();
        assert!((s - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_boolean_combinations() {
        let cat = catalog();
        let and = Expr::and(vec![eq(1), eq(2)]);
        assert!((clause_selectivity(&and, &cat).unwrap() - 0.01).abs() < 1e-9);
        let or = Expr::or(vec![eq(1), eq(2)]);
        assert!((clause_selectivity(&or, &cat).unwrap() - 0.19).abs() < 1e-9);
        let not = Expr::not(eq(1));
        assert!((clause_selectivity(&not, &cat).unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_function_clause_default() {
        let cat = catalog();
        let f = Expr::func(9999, vec![Expr::var(1, 1, DataType::Integer)], DataType::Boolean);
        assert!((clause_selectivity(&f, &cat).unwrap() - DEFAULT_INEQ_SEL).abs() < 1e-12);
    }
}
