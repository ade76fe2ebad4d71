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

//! AVG aggregate support functions
//!
//! The transition state is a two-element array `{count, sum}`. The
//! transition functions update it in place when they hold the only
//! reference, which is the case whenever the executor passes its own state.

use std::sync::Arc;

use crate::catalog::oids::*;
use crate::core::{DataType, Error, Result, Value};
use crate::functions::{
    AggregateDef, BuiltinFunction, FunctionInfo, FunctionType, TransitionFunction,
};

use super::super::registry::FunctionRegistry;
use super::single_arg;

fn bad_state() -> Error {
    Error::type_error("avg transition state must be {count, sum}")
}

/// Apply `step` to the {count, sum} pair, reusing the array when unshared
fn update_state(
    mut state: Value,
    step: impl FnOnce(&mut Value, &mut Value) -> Result<()>,
) -> Result<Value> {
    if let Value::Array(items) = &mut state {
        if items.len() != 2 {
            return Err(bad_state());
        }
        if let Some(slots) = Arc::get_mut(items) {
            let (count, rest) = slots.split_at_mut(1);
            step(&mut count[0], &mut rest[0])?;
            return Ok(state);
        }
        let mut copy = items.to_vec();
        let (count, rest) = copy.split_at_mut(1);
        step(&mut count[0], &mut rest[0])?;
        return Ok(Value::array(copy));
    }
    Err(bad_state())
}

fn adjust_count(count: &mut Value, delta: i64) -> Result<()> {
    let n = count.as_int64().ok_or_else(bad_state)?;
    *count = Value::integer(n + delta);
    Ok(())
}

fn int8_avg_accum(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?
        .as_int64()
        .ok_or_else(|| Error::type_error("avg(bigint) applied to non-integer input"))?;
    update_state(state, |count, sum| {
        adjust_count(count, 1)?;
        let s = sum.as_int64().ok_or_else(bad_state)?;
        *sum = Value::integer(s.checked_add(x).ok_or(Error::NumericOutOfRange("bigint"))?);
        Ok(())
    })
}

fn int8_avg_inv(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?
        .as_int64()
        .ok_or_else(|| Error::type_error("avg(bigint) applied to non-integer input"))?;
    update_state(state, |count, sum| {
        adjust_count(count, -1)?;
        let s = sum.as_int64().ok_or_else(bad_state)?;
        *sum = Value::integer(s.checked_sub(x).ok_or(Error::NumericOutOfRange("bigint"))?);
        Ok(())
    })
}

fn float8_avg_accum(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?
        .as_float64()
        .ok_or_else(|| Error::type_error("avg(double precision) applied to non-numeric input"))?;
    update_state(state, |count, sum| {
        adjust_count(count, 1)?;
        let s = sum.as_float64().ok_or_else(bad_state)?;
        *sum = Value::float(s + x);
        Ok(())
    })
}

fn float8_avg_inv(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?
        .as_float64()
        .ok_or_else(|| Error::type_error("avg(double precision) applied to non-numeric input"))?;
    if !x.is_finite() {
        return Ok(Value::null(DataType::Array));
    }
    update_state(state, |count, sum| {
        adjust_count(count, -1)?;
        let s = sum.as_float64().ok_or_else(bad_state)?;
        *sum = Value::float(s - x);
        Ok(())
    })
}

fn avg_final(args: &[Value]) -> Result<Value> {
    let items = single_arg(args)?.as_array().ok_or_else(bad_state)?;
    let (count, sum) = match items {
        [count, sum] => (count.as_int64().ok_or_else(bad_state)?, sum),
        _ => return Err(bad_state()),
    };
    if count == 0 {
        return Ok(Value::null(DataType::Float));
    }
    let sum = sum.as_float64().ok_or_else(bad_state)?;
    Ok(Value::float(sum / count as f64))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    for (oid, name, arg, body) in [
        (F_INT8_AVG_ACCUM, "int8_avg_accum", DataType::Integer, int8_avg_accum as fn(Value, &[Value]) -> Result<Value>),
        (F_INT8_AVG_INV, "int8_avg_inv", DataType::Integer, int8_avg_inv),
        (F_FLOAT8_AVG_ACCUM, "float8_avg_accum", DataType::Float, float8_avg_accum),
        (F_FLOAT8_AVG_INV, "float8_avg_inv", DataType::Float, float8_avg_inv),
    ] {
        registry.register_scalar(TransitionFunction::new(
            FunctionInfo::new(
                oid,
                name,
                FunctionType::AggregateSupport,
                vec![DataType::Array, arg],
                DataType::Array,
            ),
            body,
        ));
    }
    registry.register_scalar(BuiltinFunction::new(
        FunctionInfo::new(
            F_AVG_FINAL,
            "avg_final",
            FunctionType::AggregateSupport,
            vec![DataType::Array],
            DataType::Float,
        ),
        avg_final,
    ));

    registry.register_aggregate(
        AggregateDef::new(
            AGG_AVG_INT8,
            "avg",
            vec![DataType::Integer],
            DataType::Float,
            F_INT8_AVG_ACCUM,
            DataType::Array,
        )
        .with_inverse(F_INT8_AVG_INV)
        .with_final(F_AVG_FINAL)
        .with_init(Value::array(vec![Value::integer(0), Value::integer(0)])),
    );
    registry.register_aggregate(
        AggregateDef::new(
            AGG_AVG_FLOAT8,
            "avg",
            vec![DataType::Float],
            DataType::Float,
            F_FLOAT8_AVG_ACCUM,
            DataType::Array,
        )
        .with_inverse(F_FLOAT8_AVG_INV)
        .with_final(F_AVG_FINAL)
        .with_init(Value::array(vec![Value::integer(0), Value::float(0.0)])),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_state() -> Value {
        Value::array(vec![Value::integer(0), Value::float(0.0)])
    }

    #[test]
    fn test_avg_forward_and_inverse() {
        let mut state = float_state();
        for x in [1.0, 2.0, 3.0] {
            state = float8_avg_accum(state, &[Value::float(x)]).unwrap();
        }
        assert_eq!(avg_final(&[state.clone()]).unwrap(), Value::float(2.0));
        state = float8_avg_inv(state, &[Value::float(1.0)]).unwrap();
        assert_eq!(avg_final(&[state]).unwrap(), Value::float(2.5));
    }

    #[test]
    fn test_avg_of_nothing_is_null() {
        assert!(avg_final(&[float_state()]).unwrap().is_null());
    }

    #[test]
    fn test_shared_state_is_not_mutated() {
        let state = Value::array(vec![Value::integer(1), Value::integer(4)]);
        let keep = state.clone();
        let next = int8_avg_accum(state, &[Value::integer(2)]).unwrap();
        assert_eq!(keep.to_string(), "{1,4}");
        assert_eq!(next.to_string(), "{2,6}");
    }

    #[test]
    fn test_unique_state_is_updated_in_place() {
        let state = Value::array(vec![Value::integer(1), Value::integer(4)]);
        let before = match &state {
            Value::Array(items) => Arc::as_ptr(items) as *const Value,
            _ => unreachable!(),
        };
        let next = int8_avg_accum(state, &[Value::integer(2)]).unwrap();
        match &next {
            Value::Array(items) => assert_eq!(Arc::as_ptr(items) as *const Value, before),
            _ => panic!("expected array state"),
        }
    }
}
