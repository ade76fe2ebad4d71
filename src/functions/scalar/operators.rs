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

//! Operator implementation functions
//!
//! Comparison and arithmetic for the built-in types. Every function here
//! is strict; the evaluator never passes NULL arguments.

use std::cmp::Ordering;

use crate::catalog::oids::*;
use crate::core::{DataType, Error, Oid, Result, Value};
use crate::functions::{BuiltinFunction, FunctionInfo, FunctionType};

use super::super::registry::FunctionRegistry;

fn two_args(args: &[Value]) -> Result<(&Value, &Value)> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(Error::invalid_argument(format!(
            "binary operator called with {} arguments",
            args.len()
        ))),
    }
}

fn compare_args(args: &[Value]) -> Result<Ordering> {
    let (a, b) = two_args(args)?;
    a.compare(b)
}

fn op_eq(args: &[Value]) -> Result<Value> {
    Ok(Value::boolean(compare_args(args)? == Ordering::Equal))
}

fn op_ne(args: &[Value]) -> Result<Value> {
    Ok(Value::boolean(compare_args(args)? != Ordering::Equal))
}

fn op_lt(args: &[Value]) -> Result<Value> {
    Ok(Value::boolean(compare_args(args)? == Ordering::Less))
}

fn op_le(args: &[Value]) -> Result<Value> {
    Ok(Value::boolean(compare_args(args)? != Ordering::Greater))
}

fn op_gt(args: &[Value]) -> Result<Value> {
    Ok(Value::boolean(compare_args(args)? == Ordering::Greater))
}

fn op_ge(args: &[Value]) -> Result<Value> {
    Ok(Value::boolean(compare_args(args)? != Ordering::Less))
}

fn int_args(args: &[Value]) -> Result<(i64, i64)> {
    let (a, b) = two_args(args)?;
    match (a.as_int64(), b.as_int64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::type_error("bigint operator applied to non-integer input")),
    }
}

fn float_args(args: &[Value]) -> Result<(f64, f64)> {
    let (a, b) = two_args(args)?;
    match (a.as_float64(), b.as_float64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::type_error("double precision operator applied to non-numeric input")),
    }
}

fn int8pl(args: &[Value]) -> Result<Value> {
    let (a, b) = int_args(args)?;
    a.checked_add(b)
        .map(Value::integer)
        .ok_or(Error::NumericOutOfRange("bigint"))
}

fn int8mi(args: &[Value]) -> Result<Value> {
    let (a, b) = int_args(args)?;
    a.checked_sub(b)
        .map(Value::integer)
        .ok_or(Error::NumericOutOfRange("bigint"))
}

fn int8mul(args: &[Value]) -> Result<Value> {
    let (a, b) = int_args(args)?;
    a.checked_mul(b)
        .map(Value::integer)
        .ok_or(Error::NumericOutOfRange("bigint"))
}

fn int8div(args: &[Value]) -> Result<Value> {
    let (a, b) = int_args(args)?;
    if b == 0 {
        return Err(Error::DivisionByZero);
    }
    a.checked_div(b)
        .map(Value::integer)
        .ok_or(Error::NumericOutOfRange("bigint"))
}

fn check_float(v: f64, inputs_finite: bool) -> Result<Value> {
    if v.is_infinite() && inputs_finite {
        return Err(Error::NumericOutOfRange("double precision"));
    }
    Ok(Value::float(v))
}

fn float8pl(args: &[Value]) -> Result<Value> {
    let (a, b) = float_args(args)?;
    check_float(a + b, a.is_finite() && b.is_finite())
}

fn float8mi(args: &[Value]) -> Result<Value> {
    let (a, b) = float_args(args)?;
    check_float(a - b, a.is_finite() && b.is_finite())
}

fn float8mul(args: &[Value]) -> Result<Value> {
    let (a, b) = float_args(args)?;
    check_float(a * b, a.is_finite() && b.is_finite())
}

fn float8div(args: &[Value]) -> Result<Value> {
    let (a, b) = float_args(args)?;
    if b == 0.0 {
        return Err(Error::DivisionByZero);
    }
    check_float(a / b, a.is_finite() && b.is_finite())
}

fn textcat(args: &[Value]) -> Result<Value> {
    let (a, b) = two_args(args)?;
    match (a.as_string(), b.as_string()) {
        (Some(a), Some(b)) => Ok(Value::text(a + &b)),
        _ => Err(Error::type_error("text concatenation of NULL")),
    }
}

fn info(oid: Oid, name: &'static str, arg: DataType, ret: DataType) -> FunctionInfo {
    FunctionInfo::new(oid, name, FunctionType::Scalar, vec![arg, arg], ret)
}

/// Register every operator implementation function
pub fn register(registry: &mut FunctionRegistry) {
    type Body = fn(&[Value]) -> Result<Value>;
    let comparisons: [(DataType, [(Oid, &'static str); 6]); 4] = [
        (
            DataType::Integer,
            [
                (F_INT8EQ, "int8eq"),
                (F_INT8NE, "int8ne"),
                (F_INT8LT, "int8lt"),
                (F_INT8LE, "int8le"),
                (F_INT8GT, "int8gt"),
                (F_INT8GE, "int8ge"),
            ],
        ),
        (
            DataType::Float,
            [
                (F_FLOAT8EQ, "float8eq"),
                (F_FLOAT8NE, "float8ne"),
                (F_FLOAT8LT, "float8lt"),
                (F_FLOAT8LE, "float8le"),
                (F_FLOAT8GT, "float8gt"),
                (F_FLOAT8GE, "float8ge"),
            ],
        ),
        (
            DataType::Text,
            [
                (F_TEXTEQ, "texteq"),
                (F_TEXTNE, "textne"),
                (F_TEXT_LT, "text_lt"),
                (F_TEXT_LE, "text_le"),
                (F_TEXT_GT, "text_gt"),
                (F_TEXT_GE, "text_ge"),
            ],
        ),
        (
            DataType::Timestamp,
            [
                (F_TIMESTAMP_EQ, "timestamp_eq"),
                (F_TIMESTAMP_NE, "timestamp_ne"),
                (F_TIMESTAMP_LT, "timestamp_lt"),
                (F_TIMESTAMP_LE, "timestamp_le"),
                (F_TIMESTAMP_GT, "timestamp_gt"),
                (F_TIMESTAMP_GE, "timestamp_ge"),
            ],
        ),
    ];
    let bodies: [Body; 6] = [op_eq, op_ne, op_lt, op_le, op_gt, op_ge];
    for (typ, funcs) in comparisons {
        for ((oid, name), body) in funcs.into_iter().zip(bodies) {
            registry.register_scalar(BuiltinFunction::new(
                info(oid, name, typ, DataType::Boolean),
                body,
            ));
        }
    }

    registry.register_scalar(BuiltinFunction::new(
        info(F_BOOLEQ, "booleq", DataType::Boolean, DataType::Boolean),
        op_eq,
    ));
    registry.register_scalar(BuiltinFunction::new(
        info(F_TIDEQ, "tideq", DataType::Tid, DataType::Boolean),
        op_eq,
    ));

    let arithmetic: [(Oid, &'static str, DataType, Body); 9] = [
        (F_INT8PL, "int8pl", DataType::Integer, int8pl),
        (F_INT8MI, "int8mi", DataType::Integer, int8mi),
        (F_INT8MUL, "int8mul", DataType::Integer, int8mul),
        (F_INT8DIV, "int8div", DataType::Integer, int8div),
        (F_FLOAT8PL, "float8pl", DataType::Float, float8pl),
        (F_FLOAT8MI, "float8mi", DataType::Float, float8mi),
        (F_FLOAT8MUL, "float8mul", DataType::Float, float8mul),
        (F_FLOAT8DIV, "float8div", DataType::Float, float8div),
        (F_TEXTCAT, "textcat", DataType::Text, textcat),
    ];
    for (oid, name, typ, body) in arithmetic {
        registry.register_scalar(BuiltinFunction::new(info(oid, name, typ, typ), body));
    }
}
