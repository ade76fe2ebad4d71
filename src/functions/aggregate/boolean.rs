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

//! BOOL_AND and BOOL_OR aggregate support functions

use crate::catalog::oids::*;
use crate::core::{DataType, Error, Result, Value};
use crate::functions::{AggregateDef, FunctionInfo, FunctionType, TransitionFunction};

use super::super::registry::FunctionRegistry;
use super::single_arg;

fn bools(state: &Value, args: &[Value]) -> Result<(bool, bool)> {
    match (state.as_boolean(), single_arg(args)?.as_boolean()) {
        (Some(s), Some(x)) => Ok((s, x)),
        _ => Err(Error::type_error("boolean aggregate applied to non-boolean input")),
    }
}

fn booland_statefunc(state: Value, args: &[Value]) -> Result<Value> {
    let (s, x) = bools(&state, args)?;
    Ok(Value::boolean(s && x))
}

fn boolor_statefunc(state: Value, args: &[Value]) -> Result<Value> {
    let (s, x) = bools(&state, args)?;
    Ok(Value::boolean(s || x))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    let sig = vec![DataType::Boolean, DataType::Boolean];
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(
            F_BOOLAND_STATEFUNC,
            "booland_statefunc",
            FunctionType::AggregateSupport,
            sig.clone(),
            DataType::Boolean,
        ),
        booland_statefunc,
    ));
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(
            F_BOOLOR_STATEFUNC,
            "boolor_statefunc",
            FunctionType::AggregateSupport,
            sig,
            DataType::Boolean,
        ),
        boolor_statefunc,
    ));

    registry.register_aggregate(AggregateDef::new(
        AGG_BOOL_AND,
        "bool_and",
        vec![DataType::Boolean],
        DataType::Boolean,
        F_BOOLAND_STATEFUNC,
        DataType::Boolean,
    ));
    registry.register_aggregate(AggregateDef::new(
        AGG_BOOL_OR,
        "bool_or",
        vec![DataType::Boolean],
        DataType::Boolean,
        F_BOOLOR_STATEFUNC,
        DataType::Boolean,
    ));
}
