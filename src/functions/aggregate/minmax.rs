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

//! MIN and MAX aggregate support functions
//!
//! No inverse transition exists: removing the current extreme would need
//! the whole frame, so sliding frames restart these aggregates.

use std::cmp::Ordering;

use crate::catalog::oids::*;
use crate::core::{DataType, Oid, Result, Value};
use crate::functions::{AggregateDef, FunctionInfo, FunctionType, TransitionFunction};

use super::super::registry::FunctionRegistry;
use super::single_arg;

fn value_larger(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?;
    Ok(if x.compare(&state)? == Ordering::Greater {
        x.clone()
    } else {
        state
    })
}

fn value_smaller(state: Value, args: &[Value]) -> Result<Value> {
    let x = single_arg(args)?;
    Ok(if x.compare(&state)? == Ordering::Less {
        x.clone()
    } else {
        state
    })
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(
            F_VALUE_LARGER,
            "value_larger",
            FunctionType::AggregateSupport,
            vec![DataType::Null, DataType::Null],
            DataType::Null,
        ),
        value_larger,
    ));
    registry.register_scalar(TransitionFunction::new(
        FunctionInfo::new(
            F_VALUE_SMALLER,
            "value_smaller",
            FunctionType::AggregateSupport,
            vec![DataType::Null, DataType::Null],
            DataType::Null,
        ),
        value_smaller,
    ));

    let variants: [(Oid, Oid, DataType); 3] = [
        (AGG_MAX_INT8, AGG_MIN_INT8, DataType::Integer),
        (AGG_MAX_FLOAT8, AGG_MIN_FLOAT8, DataType::Float),
        (AGG_MAX_TEXT, AGG_MIN_TEXT, DataType::Text),
    ];
    for (max_oid, min_oid, typ) in variants {
        registry.register_aggregate(AggregateDef::new(
            max_oid,
            "max",
            vec![typ],
            typ,
            F_VALUE_LARGER,
            typ,
        ));
        registry.register_aggregate(AggregateDef::new(
            min_oid,
            "min",
            vec![typ],
            typ,
            F_VALUE_SMALLER,
            typ,
        ));
    }
}
