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

//! SUM aggregate support functions
//!
//! Both variants start from a NULL state; the executor adopts the first
//! non-NULL input as the state, so the transition functions only ever see
//! a non-NULL state.

use crate::catalog::oids::*;
use crate::core::{DataType, Error, Result, Value};
use crate::functions::{AggregateDef, FunctionInfo, FunctionType, TransitionFunction};

use super::super::registry::FunctionRegistry;
use super::single_arg;

fn int8_sum_accum(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?;
    match (state.as_int64(), x.as_int64()) {
        (Some(s), Some(x)) => s
            .checked_add(x)
            .map(Value::integer)
            .ok_or(Error::NumericOutOfRange("bigint")),
        _ => Err(Error::type_error("sum(bigint) applied to non-integer input")),
    }
}

fn int8_sum_inv(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?;
    match (state.as_int64(), x.as_int64()) {
        (Some(s), Some(x)) => s
            .checked_sub(x)
            .map(Value::integer)
            .ok_or(Error::NumericOutOfRange("bigint")),
        _ => Err(Error::type_error("sum(bigint) applied to non-integer input")),
    }
}

fn float8_sum_accum(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?;
    match (state.as_float64(), x.as_float64()) {
        (Some(s), Some(x)) => Ok(Value::float(s + x)),
        _ => Err(Error::type_error("sum(double precision) applied to non-numeric input")),
    }
}

fn float8_sum_inv(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?;
    match (state.as_float64(), x.as_float64()) {
        // Removing an infinity or NaN cannot restore a finite sum
        (Some(_), Some(x)) if !x.is_finite() => Ok(Value::null(DataType::Float)),
        (Some(s), Some(x)) => Ok(Value::float(s - x)),
        _ => Err(Error::type_error("sum(double precision) applied to non-numeric input")),
    }
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    for (oid, name, typ, body) in [
        (F_INT8_SUM_ACCUM, "int8_sum_accum", DataType::Integer, int8_sum_accum as fn(Value, &[Value]) -> Result<Value>),
        (F_INT8_SUM_INV, "int8_sum_inv", DataType::Integer, int8_sum_inv),
        (F_FLOAT8_SUM_ACCUM, "float8_sum_accum", DataType::Float, float8_sum_accum),
        (F_FLOAT8_SUM_INV, "float8_sum_inv", DataType::Float, float8_sum_inv),
    ] {
        registry.register_scalar(TransitionFunction::new(
            FunctionInfo::new(oid, name, FunctionType::AggregateSupport, vec![typ, typ], typ),
            body,
        ));
    }

    registry.register_aggregate(
        AggregateDef::new(
            AGG_SUM_INT8,
            "sum",
            vec![DataType::Integer],
            DataType::Integer,
            F_INT8_SUM_ACCUM,
            DataType::Integer,
        )
        .with_inverse(F_INT8_SUM_INV),
    );
    registry.register_aggregate(
        AggregateDef::new(
            AGG_SUM_FLOAT8,
            "sum",
            vec![DataType::Float],
            DataType::Float,
            F_FLOAT8_SUM_ACCUM,
            DataType::Float,
        )
        .with_inverse(F_FLOAT8_SUM_INV),
    );
}
