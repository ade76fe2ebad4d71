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

//! Built-in aggregates
//!
//! Each aggregate is an [`AggregateDef`](super::AggregateDef) plus the
//! support functions it names. SUM, COUNT and AVG carry inverse transition
//! functions and run in moving-aggregate mode over sliding frames.

mod avg;
mod boolean;
mod count;
mod minmax;
mod string_agg;
mod sum;

use crate::core::{Error, Result, Value};

use super::registry::FunctionRegistry;

pub(crate) fn single_arg(args: &[Value]) -> Result<&Value> {
    match args {
        [x] => Ok(x),
        _ => Err(Error::invalid_argument(format!(
            "aggregate support function expects 1 argument, got {}",
            args.len()
        ))),
    }
}

/// Register every built-in aggregate and its support functions
pub fn register(registry: &mut FunctionRegistry) {
    sum::register(registry);
    count::register(registry);
    avg::register(registry);
    minmax::register(registry);
    boolean::register(registry);
    string_agg::register(registry);
}
