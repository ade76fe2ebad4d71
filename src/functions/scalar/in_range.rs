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

//! In-range support functions for RANGE frames with an offset
//!
//! `in_range(val, base, offset, sub, less)` answers whether `val` lies on
//! the correct side of `base ± offset`:
//!
//! - `sub` selects `base - offset` instead of `base + offset`
//! - `less` selects `val <= bound` instead of `val >= bound`

use chrono::Duration;

use crate::catalog::oids::{F_IN_RANGE_FLOAT8, F_IN_RANGE_INT8, F_IN_RANGE_TIMESTAMP};
use crate::core::{DataType, Error, Result, Value};
use crate::functions::{BuiltinFunction, FunctionInfo, FunctionType};

use super::super::registry::FunctionRegistry;

struct InRangeArgs<'a> {
    val: &'a Value,
    base: &'a Value,
    offset: &'a Value,
    sub: bool,
    less: bool,
}

fn unpack(args: &[Value]) -> Result<InRangeArgs<'_>> {
    match args {
        [val, base, offset, sub, less] => Ok(InRangeArgs {
            val,
            base,
            offset,
            sub: sub.as_boolean().unwrap_or(false),
            less: less.as_boolean().unwrap_or(false),
        }),
        _ => Err(Error::invalid_argument(format!(
            "in_range expects 5 arguments, got {}",
            args.len()
        ))),
    }
}

fn invalid_size() -> Error {
    Error::invalid_argument("invalid preceding or following size in window function")
}

fn in_range_int8(args: &[Value]) -> Result<Value> {
    let a = unpack(args)?;
    let (val, base, offset) = match (a.val.as_int64(), a.base.as_int64(), a.offset.as_int64()) {
        (Some(v), Some(b), Some(o)) => (v, b, o),
        _ => return Err(Error::type_error("in_range for bigint applied to non-integer input")),
    };
    if offset < 0 {
        return Err(invalid_size());
    }
    let sum = if a.sub {
        base.checked_sub(offset)
    } else {
        base.checked_add(offset)
    };
    Ok(Value::boolean(match sum {
        // The true bound is beyond every representable value
        None => {
            if a.sub {
                !a.less
            } else {
                a.less
            }
        }
        Some(sum) => {
            if a.less {
                val <= sum
            } else {
                val >= sum
            }
        }
    }))
}

fn in_range_float8(args: &[Value]) -> Result<Value> {
    let a = unpack(args)?;
    let (val, base, offset) =
        match (a.val.as_float64(), a.base.as_float64(), a.offset.as_float64()) {
            (Some(v), Some(b), Some(o)) => (v, b, o),
            _ => {
                return Err(Error::type_error(
                    "in_range for double precision applied to non-numeric input",
                ))
            }
        };
    if offset.is_nan() || offset < 0.0 {
        return Err(invalid_size());
    }
    // NaN sorts above every other value
    if val.is_nan() {
        return Ok(Value::boolean(if base.is_nan() { true } else { !a.less }));
    }
    if base.is_nan() {
        return Ok(Value::boolean(a.less));
    }
    // inf - inf would be NaN; every value is in range of an infinite bound
    if offset.is_infinite() && base.is_infinite() && (if a.sub { base > 0.0 } else { base < 0.0 }) {
        return Ok(Value::boolean(true));
    }
    let sum = if a.sub { base - offset } else { base + offset };
    Ok(Value::boolean(if a.less { val <= sum } else { val >= sum }))
}

fn in_range_timestamp(args: &[Value]) -> Result<Value> {
    let a = unpack(args)?;
    let (val, base) = match (a.val.as_timestamp(), a.base.as_timestamp()) {
        (Some(v), Some(b)) => (v, b),
        _ => return Err(Error::type_error("in_range for timestamp applied to non-timestamp input")),
    };
    let micros = match a.offset {
        Value::Integer(secs) => secs.checked_mul(1_000_000),
        Value::Float(secs) if secs.is_finite() => Some((secs * 1_000_000.0) as i64),
        _ => None,
    }
    .ok_or_else(invalid_size)?;
    if micros < 0 {
        return Err(invalid_size());
    }
    let delta = Duration::microseconds(micros);
    let sum = if a.sub {
        base.checked_sub_signed(delta)
    } else {
        base.checked_add_signed(delta)
    };
    Ok(Value::boolean(match sum {
        None => {
            if a.sub {
                !a.less
            } else {
                a.less
            }
        }
        Some(sum) => {
            if a.less {
                val <= sum
            } else {
                val >= sum
            }
        }
    }))
}

fn info(oid: crate::core::Oid, name: &'static str, typ: DataType, offset: DataType) -> FunctionInfo {
    FunctionInfo::new(
        oid,
        name,
        FunctionType::Scalar,
        vec![typ, typ, offset, DataType::Boolean, DataType::Boolean],
        DataType::Boolean,
    )
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_scalar(BuiltinFunction::new(
        info(F_IN_RANGE_INT8, "in_range_int8", DataType::Integer, DataType::Integer),
        in_range_int8,
    ));
    registry.register_scalar(BuiltinFunction::new(
        info(F_IN_RANGE_FLOAT8, "in_range_float8", DataType::Float, DataType::Float),
        in_range_float8,
    ));
    registry.register_scalar(BuiltinFunction::new(
        info(
            F_IN_RANGE_TIMESTAMP,
            "in_range_timestamp",
            DataType::Timestamp,
            DataType::Integer,
        ),
        in_range_timestamp,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn call(f: fn(&[Value]) -> Result<Value>, val: Value, base: Value, off: Value, sub: bool, less: bool) -> bool {
        f(&[val, base, off, Value::boolean(sub), Value::boolean(less)])
            .unwrap()
            .as_boolean()
            .unwrap()
    }

    #[test]
    fn test_int8_preceding() {
        // val >= base - offset
        assert!(call(in_range_int8, Value::integer(8), Value::integer(10), Value::integer(2), true, false));
        assert!(!call(in_range_int8, Value::integer(7), Value::integer(10), Value::integer(2), true, false));
    }

    #[test]
    fn test_int8_overflow_short_circuits() {
        assert!(call(
            in_range_int8,
            Value::integer(0),
            Value::integer(i64::MAX),
            Value::integer(10),
            false,
            true
        ));
    }

    #[test]
    fn test_negative_offset_rejected() {
        let r = in_range_int8(&[
            Value::integer(1),
            Value::integer(1),
            Value::integer(-1),
            Value::boolean(false),
            Value::boolean(false),
        ]);
        assert!(r.is_err());
    }

    #[test]
    fn test_float_nan_ordering() {
        assert!(call(in_range_float8, Value::float(f64::NAN), Value::float(1.0), Value::float(1.0), false, false));
        assert!(!call(in_range_float8, Value::float(f64::NAN), Value::float(1.0), Value::float(1.0), false, true));
        assert!(call(in_range_float8, Value::float(1.5), Value::float(1.0), Value::float(0.5), false, true));
    }

    #[test]
    fn test_timestamp_seconds_offset() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let val = Utc.with_ymd_and_hms(2024, 1, 1, 11, 59, 30).unwrap();
        assert!(call(
            in_range_timestamp,
            Value::timestamp(val),
            Value::timestamp(base),
            Value::integer(60),
            true,
            false
        ));
        assert!(!call(
            in_range_timestamp,
            Value::timestamp(val),
            Value::timestamp(base),
            Value::integer(10),
            true,
            false
        ));
    }
}
