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

//! Structural walks over expression trees
//!
//! `for_each_child` and `map_children` are the two primitives; everything
//! else (variable collection, substitution, volatility checks) is built on
//! them. Sublink subqueries are never entered.

use crate::catalog::{Catalog, Volatility};
use crate::core::Result;
use crate::optimizer::relids::Relids;

use super::{Expr, Var, VarNo};

impl Expr {
    /// Visit the direct children of this node
    pub fn for_each_child(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Expr::Var(_) | Expr::Const(_) | Expr::Param(_) => {}
            Expr::Op(op) => op.args.iter().for_each(|a| f(a)),
            Expr::Func(func) => func.args.iter().for_each(|a| f(a)),
            Expr::Aggref(agg) => agg.args.iter().for_each(|a| f(a)),
            Expr::Iter(it) => f(&it.expr),
            Expr::ArrayRef(ar) => {
                ar.upper.iter().for_each(|a| f(a));
                ar.lower.iter().for_each(|a| f(a));
                f(&ar.source);
                if let Some(assign) = &ar.assign {
                    f(assign);
                }
            }
            Expr::Case(c) => {
                for arm in &c.arms {
                    f(&arm.condition);
                    f(&arm.result);
                }
                if let Some(default) = &c.default {
                    f(default);
                }
            }
            Expr::Bool(b) => b.args.iter().for_each(|a| f(a)),
            Expr::SubLink(s) => {
                if let Some(test) = &s.testexpr {
                    f(test);
                }
            }
            Expr::SubPlan(s) => {
                if let Some(test) = &s.testexpr {
                    f(test);
                }
                s.args.iter().for_each(|a| f(a));
            }
        }
    }

    /// Rebuild this node with every direct child passed through `f`
    pub fn map_children(self, f: &mut dyn FnMut(Expr) -> Result<Expr>) -> Result<Expr> {
        fn map_vec(args: Vec<Expr>, f: &mut dyn FnMut(Expr) -> Result<Expr>) -> Result<Vec<Expr>> {
            args.into_iter().map(|a| f(a)).collect()
        }
        fn map_box(e: Box<Expr>, f: &mut dyn FnMut(Expr) -> Result<Expr>) -> Result<Box<Expr>> {
            Ok(Box::new(f(*e)?))
        }

        Ok(match self {
            leaf @ (Expr::Var(_) | Expr::Const(_) | Expr::Param(_)) => leaf,
            Expr::Op(mut op) => {
                op.args = map_vec(op.args, f)?;
                Expr::Op(op)
            }
            Expr::Func(mut func) => {
                func.args = map_vec(func.args, f)?;
                Expr::Func(func)
            }
            Expr::Aggref(mut agg) => {
                agg.args = map_vec(agg.args, f)?;
                Expr::Aggref(agg)
            }
            Expr::Iter(mut it) => {
                it.expr = map_box(it.expr, f)?;
                Expr::Iter(it)
            }
            Expr::ArrayRef(mut ar) => {
                ar.upper = map_vec(ar.upper, f)?;
                ar.lower = map_vec(ar.lower, f)?;
                ar.source = map_box(ar.source, f)?;
                ar.assign = ar.assign.map(|a| map_box(a, f)).transpose()?;
                Expr::ArrayRef(ar)
            }
            Expr::Case(mut c) => {
                let mut arms = Vec::with_capacity(c.arms.len());
                for mut arm in c.arms {
                    arm.condition = f(arm.condition)?;
                    arm.result = f(arm.result)?;
                    arms.push(arm);
                }
                c.arms = arms;
                c.default = c.default.map(|d| map_box(d, f)).transpose()?;
                Expr::Case(c)
            }
            Expr::Bool(mut b) => {
                b.args = map_vec(b.args, f)?;
                Expr::Bool(b)
            }
            Expr::SubLink(mut s) => {
                s.testexpr = s.testexpr.map(|t| map_box(t, f)).transpose()?;
                Expr::SubLink(s)
            }
            Expr::SubPlan(mut s) => {
                s.testexpr = s.testexpr.map(|t| map_box(t, f)).transpose()?;
                s.args = map_vec(s.args, f)?;
                Expr::SubPlan(s)
            }
        })
    }

    /// Pre-order search; true if `pred` holds for any node
    pub fn any_node(&self, pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |child| {
            if !found && child.any_node(pred) {
                found = true;
            }
        });
        found
    }

    /// Distinct variables referenced by the expression, in first-seen order
    pub fn pull_vars(&self) -> Vec<Var> {
        let mut vars = Vec::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut Vec<Var>) {
        if let Expr::Var(v) = self {
            if !vars.contains(v) {
                vars.push(v.clone());
            }
            return;
        }
        self.for_each_child(&mut |child| child.collect_vars(vars));
    }

    /// Base relations of the current query level referenced by the expression
    pub fn relids(&self) -> Relids {
        let mut relids = Relids::empty();
        for var in self.pull_vars() {
            if var.levelsup == 0 {
                if let VarNo::Rel(r) = var.varno {
                    relids.insert(r);
                }
            }
        }
        relids
    }

    /// True if the expression contains a subquery (planned or not)
    pub fn contains_subplan(&self) -> bool {
        self.any_node(&mut |e| matches!(e, Expr::SubLink(_) | Expr::SubPlan(_)))
    }

    /// True if the expression contains an aggregate reference
    pub fn contains_aggregates(&self) -> bool {
        self.any_node(&mut |e| matches!(e, Expr::Aggref(_)))
    }

    /// True if the expression references a variable of an enclosing query level
    pub fn contains_outer_level_vars(&self) -> bool {
        self.any_node(&mut |e| matches!(e, Expr::Var(v) if v.levelsup > 0))
    }

    /// True if any function or operator in the tree is volatile
    pub fn contains_volatile_functions(&self, catalog: &dyn Catalog) -> Result<bool> {
        let mut funcs = Vec::new();
        self.any_node(&mut |e| {
            match e {
                Expr::Func(f) => funcs.push(Ok(f.funcid)),
                Expr::Op(op) => funcs.push(match op.opfuncid {
                    Some(fid) => Ok(fid),
                    None => catalog.get_opcode(op.opno),
                }),
                _ => {}
            }
            false
        });
        for funcid in funcs {
            if catalog.function(funcid?)?.volatility == Volatility::Volatile {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Substitute variables; `f` returns `Some(replacement)` or `None` to keep
    pub fn replace_vars(self, f: &mut dyn FnMut(&Var) -> Result<Option<Expr>>) -> Result<Expr> {
        match self {
            Expr::Var(v) => match f(&v)? {
                Some(replacement) => Ok(replacement),
                None => Ok(Expr::Var(v)),
            },
            other => other.map_children(&mut |child| child.replace_vars(f)),
        }
    }

    /// General bottom-up rewrite; `f` sees each node after its children
    pub fn transform_up(self, f: &mut dyn FnMut(Expr) -> Result<Expr>) -> Result<Expr> {
        let rebuilt = self.map_children(&mut |child| child.transform_up(f))?;
        f(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::{INT8_EQ_OP, INT8_PLUS_OP};
    use crate::core::{DataType, Value};
    use crate::expr::{BoolExpr, BoolOp};

    fn join_clause() -> Expr {
        Expr::op(
            INT8_EQ_OP,
            vec![
                Expr::var(1, 1, DataType::Integer),
                Expr::op(
                    INT8_PLUS_OP,
                    vec![Expr::var(2, 3, DataType::Integer), Expr::var(1, 1, DataType::Integer)],
                    DataType::Integer,
                ),
            ],
            DataType::Boolean,
        )
    }

    #[test]
    fn test_pull_vars_dedups() {
        let vars = join_clause().pull_vars();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].attno, 1);
        assert_eq!(vars[1].attno, 3);
    }

    #[test]
    fn test_relids() {
        let relids = join_clause().relids();
        assert_eq!(relids.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(Expr::constant(Value::integer(1)).relids().is_empty());
    }

    #[test]
    fn test_replace_vars() {
        let replaced = join_clause()
            .replace_vars(&mut |v| {
                Ok(if v.relid() == Some(2) {
                    Some(Expr::constant(Value::integer(7)))
                } else {
                    None
                })
            })
            .unwrap();
        assert_eq!(replaced.relids().iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_transform_up_simplifies_double_not() {
        let x = Expr::var(1, 1, DataType::Boolean);
        let e = Expr::not(Expr::not(x.clone()));
        let simplified = e
            .transform_up(&mut |e| match e {
                Expr::Bool(BoolExpr { op: BoolOp::Not, mut args }) => match args.pop() {
                    Some(Expr::Bool(BoolExpr { op: BoolOp::Not, args: mut inner })) => {
                        Ok(inner.pop().unwrap_or(Expr::null_const(DataType::Boolean)))
                    }
                    Some(arg) => Ok(Expr::not(arg)),
                    None => Ok(Expr::null_const(DataType::Boolean)),
                },
                other => Ok(other),
            })
            .unwrap();
        assert_eq!(simplified, x);
    }

    #[test]
    fn test_outer_level_vars() {
        let mut v = Var::new(1, 1, DataType::Integer);
        v.levelsup = 1;
        let e = Expr::op(INT8_EQ_OP, vec![Expr::Var(v), Expr::var(2, 1, DataType::Integer)], DataType::Boolean);
        assert!(e.contains_outer_level_vars());
        assert_eq!(e.relids().iter().collect::<Vec<_>>(), vec![2]);
        assert!(!e.contains_subplan());
    }
}
