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

//! STRING_AGG aggregate support function
//!
//! Non-strict with a NULL initial state: the transition function itself
//! decides what a NULL value or a NULL state means.

use crate::catalog::oids::*;
use crate::core::{DataType, Error, Result, Value};
use crate::functions::{AggregateDef, FunctionInfo, FunctionType, TransitionFunction};

use super::super::registry::FunctionRegistry;

/// STRING_AGG(value, delimiter): delimiter goes between values, not before
/// the first one
fn string_agg_transfn(state: Value, args: &[Value]) -> Result<Value> {
    let (value, delimiter) = match args {
        [value, delimiter] => (value, delimiter),
        _ => {
            return Err(Error::invalid_argument(format!(
                "string_agg expects 2 arguments, got {}",
                args.len()
            )))
        }
    };
    if value.is_null() {
        return Ok(state);
    }
    let value = value.as_string().unwrap_or_default();
    match state.as_str() {
        None if state.is_null() => Ok(Value::text(value)),
        None => Err(Error::type_error("string_agg state must be text")),
        Some(acc) => {
            let delimiter = delimiter.as_string().unwrap_or_default();
            let mut out = String::with_capacity(acc.len() + delimiter.len() + value.len());
            out.push_str(acc);
            out.push_str(&delimiter);
            out.push_str(&value);
            Ok(Value::text(out))
        }
    }
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(
            F_STRING_AGG_TRANSFN,
            "string_agg_transfn",
            FunctionType::AggregateSupport,
            vec![DataType::Text, DataType::Text, DataType::Text],
            DataType::Text,
        )
        .non_strict(),
        string_agg_transfn,
    ));
    registry.register_aggregate(AggregateDef::new(
        AGG_STRING_AGG,
        "string_agg",
        vec![DataType::Text, DataType::Text],
        DataType::Text,
        F_STRING_AGG_TRANSFN,
        DataType::Text,
    ));
}
