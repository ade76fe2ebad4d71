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

//! ROW_NUMBER window function

use crate::core::{Result, Value};
use crate::executor::window::WindowObject;
use crate::functions::WindowFunction;

/// ROW_NUMBER window function
///
/// Numbers the rows of each partition from 1, in input order. Never looks
/// back, so the mark follows the current row.
#[derive(Default)]
pub struct RowNumberFunction;

impl WindowFunction for RowNumberFunction {
    fn name(&self) -> &'static str {
        "row_number"
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let curpos = winobj.current_position();
        winobj.set_mark_position(curpos)?;
        Ok(Value::integer(curpos + 1))
    }
}
