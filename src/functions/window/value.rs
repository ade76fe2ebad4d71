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

//! FIRST_VALUE, LAST_VALUE and NTH_VALUE window functions
//!
//! These read the frame, not the partition, and honor the frame's
//! exclusion clause.

use crate::core::{Error, Result, Value};
use crate::executor::window::{Seek, WindowObject};
use crate::functions::WindowFunction;

fn or_null(value: Option<Value>, winobj: &WindowObject<'_>) -> Value {
    value.unwrap_or_else(|| Value::null(winobj.arg_type(0)))
}

/// FIRST_VALUE window function
#[derive(Default)]
pub struct FirstValueFunction;

impl WindowFunction for FirstValueFunction {
    fn name(&self) -> &'static str {
        "first_value"
    }

    fn arg_range(&self) -> (usize, usize) {
        (1, 1)
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let value = winobj.arg_in_frame(0, 0, Seek::Head, true)?;
        Ok(or_null(value, winobj))
    }
}

/// LAST_VALUE window function
#[derive(Default)]
pub struct LastValueFunction;

impl WindowFunction for LastValueFunction {
    fn name(&self) -> &'static str {
        "last_value"
    }

    fn arg_range(&self) -> (usize, usize) {
        (1, 1)
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let value = winobj.arg_in_frame(0, 0, Seek::Tail, true)?;
        Ok(or_null(value, winobj))
    }
}

/// NTH_VALUE window function
///
/// `nth_value(value, n)` is `value` on the n-th row of the frame (1-based),
/// NULL when the frame is shorter.
#[derive(Default)]
pub struct NthValueFunction;

impl WindowFunction for NthValueFunction {
    fn name(&self) -> &'static str {
        "nth_value"
    }

    fn arg_range(&self) -> (usize, usize) {
        (2, 2)
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let nth = winobj.arg_current(1)?;
        if nth.is_null() {
            return Ok(Value::null(winobj.arg_type(0)));
        }
        let nth = nth.as_int64().ok_or_else(|| {
            Error::type_error(format!(
                "argument of nth_value must be an integer, got {}",
                nth.data_type()
            ))
        })?;
        if nth <= 0 {
            return Err(Error::invalid_argument(
                "argument of nth_value must be greater than zero",
            ));
        }
        let const_offset = winobj.arg_is_constant(1);
        let value = winobj.arg_in_frame(0, nth - 1, Seek::Head, const_offset)?;
        Ok(or_null(value, winobj))
    }
}
