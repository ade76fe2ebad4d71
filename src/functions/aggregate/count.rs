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

//! COUNT aggregate support functions
//!
//! `count(x)` relies on strictness to skip NULL inputs; `count(*)` has no
//! arguments and counts every row.

use crate::catalog::oids::*;
use crate::core::{DataType, Error, Result, Value};
use crate::functions::{AggregateDef, FunctionInfo, FunctionType, TransitionFunction};

use super::super::registry::FunctionRegistry;

fn counter(state: &Value) -> Result<i64> {
    state
        .as_int64()
        .ok_or_else(|| Error::type_error("count state must be an integer"))
}

fn int8inc(state: Value, _args: &[Value]) -> Result<Value> {
    counter(&state)?
        .checked_add(1)
        .map(Value::integer)
        .ok_or(Error::NumericOutOfRange("bigint"))
}

fn int8dec(state: Value, _args: &[Value]) -> Result<Value> {
    counter(&state)?
        .checked_sub(1)
        .map(Value::integer)
        .ok_or(Error::NumericOutOfRange("bigint"))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    let any_args = vec![DataType::Integer, DataType::Null];
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(F_INT8INC_ANY, "int8inc_any", FunctionType::AggregateSupport, any_args.clone(), DataType::Integer),
        int8inc,
    ));
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(F_INT8DEC_ANY, "int8dec_any", FunctionType::AggregateSupport, any_args, DataType::Integer),
        int8dec,
    ));
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(F_INT8INC, "int8inc", FunctionType::AggregateSupport, vec![DataType::Integer], DataType::Integer),
        int8inc,
    ));
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(F_INT8DEC, "int8dec", FunctionType::AggregateSupport, vec![DataType::Integer], DataType::Integer),
        int8dec,
    ));

    registry.register_aggregate(
        AggregateDef::new(
            AGG_COUNT_ANY,
            "count",
            vec![DataType::Null],
            DataType::Integer,
            F_INT8INC_ANY,
            DataType::Integer,
        )
        .with_inverse(F_INT8DEC_ANY)
        .with_init(Value::integer(0)),
    );
    registry.register_aggregate(
        AggregateDef::new(
            AGG_COUNT_STAR,
            "count",
            vec![],
            DataType::Integer,
            F_INT8INC,
            DataType::Integer,
        )
        .with_inverse(F_INT8DEC)
        .with_init(Value::integer(0)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_up_and_down() {
        let mut state = Value::integer(0);
        state = int8inc(state, &[Value::text("a")]).unwrap();
        state = int8inc(state, &[]).unwrap();
        assert_eq!(state, Value::integer(2));
        state = int8dec(state, &[]).unwrap();
        assert_eq!(state, Value::integer(1));
    }

    #[test]
    fn test_count_rejects_non_integer_state() {
        assert!(int8inc(Value::text("x"), &[]).is_err());
    }
}
