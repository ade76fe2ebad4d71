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

//! Expression evaluation against executor tuples

use std::sync::Arc;

use crate::core::{DataType, Error, Result, Row, Value};
use crate::functions::FunctionRegistry;

use super::{ArrayRef, BoolOp, Expr, ParamKind, VarNo};

/// Tuples and parameters visible to an expression
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Tuple read by `VarNo::Rel` variables
    pub scan: Option<&'a Row>,
    pub outer: Option<&'a Row>,
    pub inner: Option<&'a Row>,
    /// Parameter values indexed by parameter id
    pub params: &'a [Value],
    pub registry: &'a FunctionRegistry,
}

impl<'a> EvalContext<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Self {
            scan: None,
            outer: None,
            inner: None,
            params: &[],
            registry,
        }
    }

    /// Context for an upper node with a single child tuple
    pub fn for_row(registry: &'a FunctionRegistry, row: &'a Row) -> Self {
        Self {
            scan: Some(row),
            outer: Some(row),
            inner: None,
            params: &[],
            registry,
        }
    }

    pub fn with_params(mut self, params: &'a [Value]) -> Self {
        self.params = params;
        self
    }

    pub fn with_join(mut self, outer: &'a Row, inner: &'a Row) -> Self {
        self.outer = Some(outer);
        self.inner = Some(inner);
        self
    }
}

/// Evaluate an expression to a single value
pub fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value> {
    match expr {
        Expr::Var(var) => {
            if var.levelsup > 0 {
                return Err(Error::invalid_argument(format!(
                    "variable {} of an enclosing query was not replaced by a parameter",
                    var
                )));
            }
            let row = match var.varno {
                VarNo::Rel(_) => ctx.scan,
                VarNo::Outer => ctx.outer.or(ctx.scan),
                VarNo::Inner => ctx.inner,
            }
            .ok_or_else(|| Error::invalid_argument(format!("no tuple available for {}", var)))?;
            if var.attno < 1 {
                return Err(Error::not_supported(format!(
                    "system column {} in expression evaluation",
                    var
                )));
            }
            row.get(var.attno as usize - 1).cloned().ok_or_else(|| {
                Error::invalid_argument(format!(
                    "{} is past the end of a {}-column tuple",
                    var,
                    row.len()
                ))
            })
        }
        Expr::Const(c) => Ok(c.value.clone()),
        Expr::Param(p) => match p.kind {
            ParamKind::Exec | ParamKind::Extern => {
                ctx.params.get(p.id as usize).cloned().ok_or_else(|| {
                    Error::invalid_argument(format!("no value supplied for parameter {}", p.id))
                })
            }
            ParamKind::SubLink => Err(Error::not_supported(
                "sublink placeholder outside of a subplan",
            )),
        },
        Expr::Op(op) => {
            let funcid = op.opfuncid.ok_or_else(|| {
                Error::invalid_argument(format!(
                    "operator {} has no resolved implementation function",
                    op.opno
                ))
            })?;
            call_function(funcid, &op.args, op.result_type, ctx)
        }
        Expr::Func(func) => {
            if func.retset {
                return Err(Error::not_supported(
                    "set-returning function in scalar context",
                ));
            }
            let result = call_function(func.funcid, &func.args, func.result_type, ctx)?;
            match (&func.projection, &result) {
                (Some(attrs), Value::Array(items)) => {
                    let picked: Vec<Value> = attrs
                        .iter()
                        .map(|&a| items.get((a as usize).wrapping_sub(1)).cloned().unwrap_or_default())
                        .collect();
                    if picked.len() == 1 {
                        Ok(picked.into_iter().next().unwrap_or_default())
                    } else {
                        Ok(Value::array(picked))
                    }
                }
                _ => Ok(result),
            }
        }
        Expr::Aggref(agg) => Err(Error::not_supported(format!(
            "aggregate {} evaluated outside of an aggregation node",
            agg.aggfnoid
        ))),
        Expr::Iter(_) => Err(Error::not_supported(
            "set-returning expression in scalar context",
        )),
        Expr::ArrayRef(ar) => eval_array_ref(ar, ctx),
        Expr::Case(c) => {
            for arm in &c.arms {
                if eval(&arm.condition, ctx)?.as_boolean() == Some(true) {
                    return eval(&arm.result, ctx);
                }
            }
            match &c.default {
                Some(default) => eval(default, ctx),
                None => Ok(Value::null(c.typ)),
            }
        }
        Expr::Bool(b) => match b.op {
            BoolOp::And => {
                let mut saw_null = false;
                for arg in &b.args {
                    match eval(arg, ctx)?.as_boolean() {
                        Some(false) => return Ok(Value::boolean(false)),
                        None => saw_null = true,
                        Some(true) => {}
                    }
                }
                Ok(if saw_null {
                    Value::null(DataType::Boolean)
                } else {
                    Value::boolean(true)
                })
            }
            BoolOp::Or => {
                let mut saw_null = false;
                for arg in &b.args {
                    match eval(arg, ctx)?.as_boolean() {
                        Some(true) => return Ok(Value::boolean(true)),
                        None => saw_null = true,
                        Some(false) => {}
                    }
                }
                Ok(if saw_null {
                    Value::null(DataType::Boolean)
                } else {
                    Value::boolean(false)
                })
            }
            BoolOp::Not => {
                let arg = b
                    .args
                    .first()
                    .ok_or_else(|| Error::invalid_argument("NOT without an argument"))?;
                Ok(match eval(arg, ctx)?.as_boolean() {
                    Some(v) => Value::boolean(!v),
                    None => Value::null(DataType::Boolean),
                })
            }
        },
        Expr::SubLink(_) => Err(Error::not_supported(
            "unplanned sublink reached the executor",
        )),
        Expr::SubPlan(s) => Err(Error::not_supported(format!(
            "subplan {} evaluation",
            s.plan_id
        ))),
    }
}

/// Evaluate an implicitly-ANDed qualification list; NULL counts as false
pub fn eval_qual(quals: &[Expr], ctx: &EvalContext<'_>) -> Result<bool> {
    for qual in quals {
        if eval(qual, ctx)?.as_boolean() != Some(true) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn call_function(
    funcid: crate::core::Oid,
    args: &[Expr],
    result_type: DataType,
    ctx: &EvalContext<'_>,
) -> Result<Value> {
    let function = ctx.registry.scalar(funcid)?;
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval(arg, ctx)?);
    }
    if function.info().strict && values.iter().any(Value::is_null) {
        return Ok(Value::null(result_type));
    }
    function.invoke(&values)
}

fn subscript(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Option<i64>> {
    let v = eval(expr, ctx)?;
    if v.is_null() {
        return Ok(None);
    }
    v.as_int64()
        .map(Some)
        .ok_or_else(|| Error::type_error("array subscript must be an integer"))
}

fn eval_array_ref(ar: &ArrayRef, ctx: &EvalContext<'_>) -> Result<Value> {
    if ar.upper.len() > 1 {
        return Err(Error::not_supported("multi-dimensional array subscripts"));
    }
    let source = eval(&ar.source, ctx)?;
    let upper = match ar.upper.first() {
        Some(u) => subscript(u, ctx)?,
        None => return Err(Error::invalid_argument("array reference without a subscript")),
    };
    let items: Arc<[Value]> = match source {
        Value::Array(items) => items,
        Value::Null(_) if ar.assign.is_some() => Arc::from(Vec::new()),
        Value::Null(_) => return Ok(Value::null(ar.elem_type)),
        other => {
            return Err(Error::type_error(format!(
                "cannot subscript a value of type {}",
                other.data_type()
            )))
        }
    };
    let Some(upper) = upper else {
        return Ok(Value::null(ar.elem_type));
    };

    if let Some(assign) = &ar.assign {
        if upper < 1 {
            return Err(Error::invalid_argument("array subscript out of range"));
        }
        let value = eval(assign, ctx)?;
        let mut values = items.to_vec();
        let idx = upper as usize - 1;
        if values.len() <= idx {
            values.resize(idx + 1, Value::null(ar.elem_type));
        }
        values[idx] = value;
        return Ok(Value::array(values));
    }

    match ar.lower.first() {
        Some(lower) => {
            let Some(lower) = subscript(lower, ctx)? else {
                return Ok(Value::null(DataType::Array));
            };
            let lo = lower.max(1) as usize;
            let hi = (upper.max(0) as usize).min(items.len());
            if lo > hi {
                return Ok(Value::array(Vec::new()));
            }
            Ok(Value::array(items[lo - 1..hi].to_vec()))
        }
        None => {
            if upper < 1 {
                return Ok(Value::null(ar.elem_type));
            }
            Ok(items
                .get(upper as usize - 1)
                .cloned()
                .unwrap_or(Value::null(ar.elem_type)))
        }
    }
}

/// Forward-only cursor over the values of a set-returning expression
///
/// There is no restart; callers that need to revisit values call
/// [`SetIter::materialize`] first.
pub struct SetIter {
    items: Arc<[Value]>,
    pos: usize,
}

impl SetIter {
    /// Evaluate `expr` as a set: an iterator wrapper yields the elements of
    /// its array-valued operand, any other expression yields one value
    pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<SetIter> {
        let items: Arc<[Value]> = match expr {
            Expr::Iter(it) => match eval(&it.expr, ctx)? {
                Value::Array(items) => items,
                Value::Null(_) => Arc::from(Vec::new()),
                single => Arc::from(vec![single]),
            },
            other => Arc::from(vec![eval(other, ctx)?]),
        };
        Ok(SetIter { items, pos: 0 })
    }

    /// Collect the remaining values
    pub fn materialize(self) -> Vec<Value> {
        self.items[self.pos.min(self.items.len())..].to_vec()
    }
}

impl Iterator for SetIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let value = self.items.get(self.pos).cloned();
        if value.is_some() {
            self.pos += 1;
        }
        value
    }
}
