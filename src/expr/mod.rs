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

//! Expression model
//!
//! Typed expression trees shared by the planner and the executor. Every
//! node kind is a variant of [`Expr`]; walkers match exhaustively so a new
//! kind has to be handled everywhere.
//!
//! Equality (`PartialEq`) is structural and ignores the cached fields on
//! operator nodes (operator class, collation, resolved function id when the
//! operator id is known).

pub mod eval;
pub mod walker;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{AttrNumber, DataType, Oid, RelId, Value, INVALID_OID};
use crate::optimizer::query::Query;

pub use eval::{eval, eval_qual, EvalContext, SetIter};

/// Which tuple a variable reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarNo {
    /// A base relation of the current query level
    Rel(RelId),
    /// Outer (left) child tuple of a join or the single child of an upper node
    Outer,
    /// Inner (right) child tuple of a join
    Inner,
}

/// Column reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Var {
    pub varno: VarNo,
    pub attno: AttrNumber,
    /// Number of query levels up (0 = current level)
    pub levelsup: u32,
    /// Relation the column came from, kept through finalization
    pub orig_relid: RelId,
    pub orig_attno: AttrNumber,
    pub typ: DataType,
}

impl Var {
    pub fn new(relid: RelId, attno: AttrNumber, typ: DataType) -> Self {
        Self {
            varno: VarNo::Rel(relid),
            attno,
            levelsup: 0,
            orig_relid: relid,
            orig_attno: attno,
            typ,
        }
    }

    /// Base relation this variable belongs to, if it is not yet finalized
    pub fn relid(&self) -> Option<RelId> {
        match self.varno {
            VarNo::Rel(r) => Some(r),
            _ => None,
        }
    }

    /// Same column, ignoring the finalized (side, index) rewrite
    pub fn same_column(&self, other: &Var) -> bool {
        self.orig_relid == other.orig_relid
            && self.orig_attno == other.orig_attno
            && self.levelsup == other.levelsup
    }
}

/// Constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Const {
    pub typ: DataType,
    pub value: Value,
    pub byval: bool,
}

impl Const {
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// Set by the executor (subplan correlation or initplan output)
    Exec,
    /// Supplied by the caller with the query
    Extern,
    /// Placeholder for the n-th output column of a sublink's subquery
    SubLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub kind: ParamKind,
    pub id: u32,
    pub typ: DataType,
}

/// Operator application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpExpr {
    /// Operator id; `INVALID_OID` once only the function id is known
    pub opno: Oid,
    /// Implementing function, filled in by the finalizer
    pub opfuncid: Option<Oid>,
    pub result_type: DataType,
    pub args: Vec<Expr>,
    /// Cached operator class, set once resolved
    pub opclass: Option<Oid>,
    /// Cached collation, set once resolved
    pub collation: Option<Oid>,
}

impl PartialEq for OpExpr {
    fn eq(&self, other: &Self) -> bool {
        let same_op = if self.opno != INVALID_OID && other.opno != INVALID_OID {
            self.opno == other.opno
        } else {
            self.opfuncid.is_some() && self.opfuncid == other.opfuncid
        };
        same_op && self.result_type == other.result_type && self.args == other.args
    }
}

/// Function application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncExpr {
    pub funcid: Oid,
    pub args: Vec<Expr>,
    pub result_type: DataType,
    /// Attribute projection applied to a composite result
    pub projection: Option<Vec<AttrNumber>>,
    /// Function returns a set
    pub retset: bool,
}

/// Aggregate reference, evaluated by an Agg plan node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggref {
    pub aggfnoid: Oid,
    pub args: Vec<Expr>,
    pub result_type: DataType,
    /// `count(*)`
    pub star: bool,
}

/// Set-returning wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterExpr {
    pub expr: Box<Expr>,
    pub typ: DataType,
}

/// Array subscript or slice, optionally with an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayRef {
    pub upper: Vec<Expr>,
    pub lower: Vec<Expr>,
    pub source: Box<Expr>,
    pub assign: Option<Box<Expr>>,
    pub elem_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseWhen {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseExpr {
    pub arms: Vec<CaseWhen>,
    pub default: Option<Box<Expr>>,
    pub typ: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoolExpr {
    pub op: BoolOp,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubLinkKind {
    /// EXISTS (subquery)
    Exists,
    /// lhs op ANY (subquery)
    Any,
    /// lhs op ALL (subquery)
    All,
    /// Scalar (subquery)
    Expr,
}

/// Unplanned subquery placeholder
///
/// Structural walks treat the subquery as an opaque leaf; only the test
/// expression (which may reference the current level) is visited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubLink {
    pub kind: SubLinkKind,
    /// Comparison of the left-hand side against `ParamKind::SubLink` params
    pub testexpr: Option<Box<Expr>>,
    pub subquery: Box<Query>,
    pub typ: DataType,
}

/// Planned subquery reference produced by the finalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubPlan {
    /// Index into the planned statement's subplan list
    pub plan_id: usize,
    pub kind: SubLinkKind,
    pub testexpr: Option<Box<Expr>>,
    /// Parameter ids the subplan reads from the enclosing row
    pub par_param: Vec<u32>,
    /// Values for `par_param`, evaluated against the enclosing row
    pub args: Vec<Expr>,
    pub typ: DataType,
}

/// Expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Var(Var),
    Const(Const),
    Param(Param),
    Op(OpExpr),
    Func(FuncExpr),
    Aggref(Aggref),
    Iter(IterExpr),
    ArrayRef(ArrayRef),
    Case(CaseExpr),
    Bool(BoolExpr),
    SubLink(SubLink),
    SubPlan(SubPlan),
}

impl Expr {
    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn var(relid: RelId, attno: AttrNumber, typ: DataType) -> Expr {
        Expr::Var(Var::new(relid, attno, typ))
    }

    /// Reference to column `index` (1-based) of the outer child tuple
    pub fn outer_var(index: AttrNumber, typ: DataType) -> Expr {
        Expr::Var(Var {
            varno: VarNo::Outer,
            attno: index,
            levelsup: 0,
            orig_relid: 0,
            orig_attno: index,
            typ,
        })
    }

    pub fn constant(value: Value) -> Expr {
        let typ = value.data_type();
        Expr::Const(Const {
            typ,
            byval: typ.is_by_value(),
            value,
        })
    }

    pub fn null_const(typ: DataType) -> Expr {
        Expr::Const(Const {
            typ,
            value: Value::null(typ),
            byval: typ.is_by_value(),
        })
    }

    pub fn param(kind: ParamKind, id: u32, typ: DataType) -> Expr {
        Expr::Param(Param { kind, id, typ })
    }

    /// Operator with an unresolved implementation function
    pub fn op(opno: Oid, args: Vec<Expr>, result_type: DataType) -> Expr {
        Expr::Op(OpExpr {
            opno,
            opfuncid: None,
            result_type,
            args,
            opclass: None,
            collation: None,
        })
    }

    /// Operator with its implementation function already resolved
    pub fn op_resolved(opno: Oid, funcid: Oid, args: Vec<Expr>, result_type: DataType) -> Expr {
        Expr::Op(OpExpr {
            opno,
            opfuncid: Some(funcid),
            result_type,
            args,
            opclass: None,
            collation: None,
        })
    }

    pub fn func(funcid: Oid, args: Vec<Expr>, result_type: DataType) -> Expr {
        Expr::Func(FuncExpr {
            funcid,
            args,
            result_type,
            projection: None,
            retset: false,
        })
    }

    pub fn and(args: Vec<Expr>) -> Expr {
        Expr::Bool(BoolExpr {
            op: BoolOp::And,
            args,
        })
    }

    pub fn or(args: Vec<Expr>) -> Expr {
        Expr::Bool(BoolExpr {
            op: BoolOp::Or,
            args,
        })
    }

    pub fn not(arg: Expr) -> Expr {
        Expr::Bool(BoolExpr {
            op: BoolOp::Not,
            args: vec![arg],
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Result type of the expression
    pub fn type_of(&self) -> DataType {
        match self {
            Expr::Var(v) => v.typ,
            Expr::Const(c) => c.typ,
            Expr::Param(p) => p.typ,
            Expr::Op(op) => op.result_type,
            Expr::Func(f) => f.result_type,
            Expr::Aggref(a) => a.result_type,
            Expr::Iter(it) => it.typ,
            Expr::ArrayRef(ar) => {
                if ar.assign.is_some() || !ar.lower.is_empty() {
                    DataType::Array
                } else {
                    ar.elem_type
                }
            }
            Expr::Case(c) => c.typ,
            Expr::Bool(_) => DataType::Boolean,
            Expr::SubLink(s) => s.typ,
            Expr::SubPlan(s) => s.typ,
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Expr::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Expr::Const(c) => Some(c),
            _ => None,
        }
    }

    /// Binary operator clause: (opno, left, right)
    pub fn as_binary_op(&self) -> Option<(Oid, &Expr, &Expr)> {
        match self {
            Expr::Op(op) if op.args.len() == 2 => Some((op.opno, &op.args[0], &op.args[1])),
            _ => None,
        }
    }

    /// OR clause arguments
    pub fn as_or(&self) -> Option<&[Expr]> {
        match self {
            Expr::Bool(b) if b.op == BoolOp::Or => Some(&b.args),
            _ => None,
        }
    }

    /// NOT clause argument
    pub fn as_not(&self) -> Option<&Expr> {
        match self {
            Expr::Bool(b) if b.op == BoolOp::Not => b.args.first(),
            _ => None,
        }
    }

    /// Flatten top-level AND into a list of conjuncts
    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::Bool(b) if b.op == BoolOp::And => {
                b.args.into_iter().flat_map(Expr::into_conjuncts).collect()
            }
            other => vec![other],
        }
    }

    /// Inverse of [`Expr::into_conjuncts`]
    pub fn from_conjuncts(mut conjuncts: Vec<Expr>) -> Option<Expr> {
        match conjuncts.len() {
            0 => None,
            1 => conjuncts.pop(),
            _ => Some(Expr::and(conjuncts)),
        }
    }
}

// =========================================================================
// Display
// =========================================================================

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.levelsup > 0 {
            write!(f, "^{}", self.levelsup)?;
        }
        match self.varno {
            VarNo::Rel(r) => write!(f, "r{}.{}", r, self.attno),
            VarNo::Outer => write!(f, "OUTER.{}", self.attno),
            VarNo::Inner => write!(f, "INNER.{}", self.attno),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Const(c) => match &c.value {
                Value::Text(s) => write!(f, "'{}'", s),
                v => write!(f, "{}", v),
            },
            Expr::Param(p) => match p.kind {
                ParamKind::Exec => write!(f, "$exec{}", p.id),
                ParamKind::Extern => write!(f, "${}", p.id),
                ParamKind::SubLink => write!(f, "$sub{}", p.id),
            },
            Expr::Op(op) => {
                if op.opno != INVALID_OID {
                    write!(f, "op{}(", op.opno)?;
                } else {
                    write!(f, "f{}(", op.opfuncid.unwrap_or(INVALID_OID))?;
                }
                write_args(f, &op.args)?;
                write!(f, ")")
            }
            Expr::Func(func) => {
                write!(f, "f{}(", func.funcid)?;
                write_args(f, &func.args)?;
                write!(f, ")")
            }
            Expr::Aggref(agg) => {
                write!(f, "agg{}(", agg.aggfnoid)?;
                if agg.star {
                    write!(f, "*")?;
                } else {
                    write_args(f, &agg.args)?;
                }
                write!(f, ")")
            }
            Expr::Iter(it) => write!(f, "iter({})", it.expr),
            Expr::ArrayRef(ar) => {
                write!(f, "{}", ar.source)?;
                for (i, upper) in ar.upper.iter().enumerate() {
                    match ar.lower.get(i) {
                        Some(lower) => write!(f, "[{}:{}]", lower, upper)?,
                        None => write!(f, "[{}]", upper)?,
                    }
                }
                if let Some(assign) = &ar.assign {
                    write!(f, " := {}", assign)?;
                }
                Ok(())
            }
            Expr::Case(c) => {
                write!(f, "CASE")?;
                for arm in &c.arms {
                    write!(f, " WHEN {} THEN {}", arm.condition, arm.result)?;
                }
                if let Some(default) = &c.default {
                    write!(f, " ELSE {}", default)?;
                }
                write!(f, " END")
            }
            Expr::Bool(b) => match b.op {
                BoolOp::Not => write!(f, "NOT {}", b.args.first().map(|a| a.to_string()).unwrap_or_default()),
                BoolOp::And | BoolOp::Or => {
                    let sep = if b.op == BoolOp::And { " AND " } else { " OR " };
                    write!(f, "(")?;
                    for (i, arg) in b.args.iter().enumerate() {
                        if i > 0 {
                            write!(f, "{}", sep)?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ")")
                }
            },
            Expr::SubLink(s) => write!(f, "sublink({:?})", s.kind),
            Expr::SubPlan(s) => write!(f, "subplan#{}", s.plan_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::{F_INT8EQ, INT8_EQ_OP};

    #[test]
    fn test_equality_ignores_cached_fields() {
        let a = Expr::op(
            INT8_EQ_OP,
            vec![Expr::var(1, 1, DataType::Integer), Expr::constant(Value::integer(5))],
            DataType::Boolean,
        );
        let mut b = a.clone();
        if let Expr::Op(op) = &mut b {
            op.opfuncid = Some(F_INT8EQ);
            op.opclass = Some(42);
            op.collation = Some(100);
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_function_only_operator_compares_and_prints() {
        let a = Expr::Op(OpExpr {
            opno: INVALID_OID,
            opfuncid: Some(F_INT8EQ),
            result_type: DataType::Boolean,
            args: vec![Expr::outer_var(1, DataType::Integer), Expr::constant(Value::integer(1))],
            opclass: None,
            collation: None,
        });
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), format!("f{}(OUTER.1, 1)", F_INT8EQ));
    }

    #[test]
    fn test_conjunct_flattening() {
        let x = Expr::var(1, 1, DataType::Boolean);
        let y = Expr::var(2, 1, DataType::Boolean);
        let z = Expr::var(3, 1, DataType::Boolean);
        let nested = Expr::and(vec![x.clone(), Expr::and(vec![y.clone(), z.clone()])]);
        let conjuncts = nested.into_conjuncts();
        assert_eq!(conjuncts, vec![x, y, z]);
        assert!(Expr::from_conjuncts(vec![]).is_none());
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Expr::constant(Value::float(1.0)).type_of(), DataType::Float);
        assert_eq!(Expr::not(Expr::var(1, 2, DataType::Boolean)).type_of(), DataType::Boolean);
    }
}
