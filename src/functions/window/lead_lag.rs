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

//! LEAD and LAG window functions

use crate::core::{Error, Result, Value};
use crate::executor::window::{Seek, WindowObject};
use crate::functions::WindowFunction;

/// LEAD and LAG window functions
///
/// `lag(value [, offset [, default]])` reads `value` from the row `offset`
/// rows before the current one (after it for `lead`). The offset defaults
/// to 1. Outside the partition the result is `default`, or NULL without
/// one. A constant offset lets the function move its mark along with the
/// rows it reads.
pub struct LeadLagFunction {
    forward: bool,
    nargs: usize,
}

impl LeadLagFunction {
    pub fn lag(nargs: usize) -> Self {
        Self {
            forward: false,
            nargs,
        }
    }

    pub fn lead(nargs: usize) -> Self {
        Self {
            forward: true,
            nargs,
        }
    }
}

impl WindowFunction for LeadLagFunction {
    fn name(&self) -> &'static str {
        if self.forward {
            "lead"
        } else {
            "lag"
        }
    }

    fn arg_range(&self) -> (usize, usize) {
        (self.nargs, self.nargs)
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let null = Value::null(winobj.arg_type(0));
        let (offset, const_offset) = if self.nargs >= 2 {
            let offset = winobj.arg_current(1)?;
            if offset.is_null() {
                return Ok(null);
            }
            let offset = offset.as_int64().ok_or_else(|| {
                Error::type_error(format!(
                    "offset of {} must be an integer, got {}",
                    self.name(),
                    offset.data_type()
                ))
            })?;
            (offset, winobj.arg_is_constant(1))
        } else {
            (1, true)
        };

        let relpos = if self.forward { offset } else { -offset };
        match winobj.arg_in_partition(0, relpos, Seek::Current, const_offset)? {
            Some(value) => Ok(value),
            None if self.nargs == 3 => winobj.arg_current(2),
            None => Ok(null),
        }
    }
}
