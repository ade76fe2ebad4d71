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

//! NTILE window function

use crate::core::{DataType, Error, Result, Value};
use crate::executor::window::WindowObject;
use crate::functions::WindowFunction;

#[derive(Default)]
struct NtileContext {
    /// Current bucket; 0 before the first row
    ntile: i64,
    rows_per_bucket: i64,
    /// Rows in the current bucket
    boundary: i64,
    /// Buckets that get one extra row
    remainder: i64,
}

/// NTILE window function
///
/// Splits the partition into `n` buckets as evenly as possible; leading
/// buckets take one extra row when the row count is not divisible by `n`.
#[derive(Default)]
pub struct NtileFunction;

impl WindowFunction for NtileFunction {
    fn name(&self) -> &'static str {
        "ntile"
    }

    fn arg_range(&self) -> (usize, usize) {
        (1, 1)
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        if winobj.partition_local::<NtileContext>()?.ntile == 0 {
            let total = winobj.partition_row_count()?;
            let nbuckets = winobj.arg_current(0)?;
            if nbuckets.is_null() {
                return Ok(Value::null(DataType::Integer));
            }
            let nbuckets = nbuckets.as_int64().ok_or_else(|| {
                Error::type_error(format!(
                    "argument of ntile must be an integer, got {}",
                    nbuckets.data_type()
                ))
            })?;
            if nbuckets <= 0 {
                return Err(Error::invalid_argument(
                    "argument of ntile must be greater than zero",
                ));
            }
            let context = winobj.partition_local::<NtileContext>()?;
            context.ntile = 1;
            context.rows_per_bucket = 0;
            context.boundary = total / nbuckets;
            if context.boundary <= 0 {
                context.boundary = 1;
            } else {
                context.remainder = total % nbuckets;
                if context.remainder != 0 {
                    context.boundary += 1;
                }
            }
        }

        let context = winobj.partition_local::<NtileContext>()?;
        context.rows_per_bucket += 1;
        if context.boundary < context.rows_per_bucket {
            if context.remainder != 0 && context.ntile == context.remainder {
                context.remainder = 0;
                context.boundary -= 1;
            }
            context.ntile += 1;
            context.rows_per_bucket = 1;
        }
        Ok(Value::integer(context.ntile))
    }
}
