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

//! Window operator specification
//!
//! Everything the planner hands to a [`WindowAgg`](super::WindowAgg):
//! grouping columns with their equality functions, the frame, offsets, the
//! in-range support function and the window function list. The spec
//! serializes with serde so test fixtures can be stored as JSON.

use serde::{Deserialize, Serialize};

use crate::core::{DataType, Error, Oid, Result, Value, INVALID_OID};
use crate::expr::Expr;
use crate::functions::{AggregateDef, FinalModify};

use super::frame::FrameOptions;

/// A PARTITION BY or ORDER BY column of the input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupColumn {
    /// 0-based index into the input row
    pub column: usize,
    /// Equality operator, kept for display
    pub eq_op: Oid,
    /// Function implementing the equality operator
    pub eq_func: Oid,
}

impl GroupColumn {
    pub fn new(column: usize, eq_op: Oid, eq_func: Oid) -> Self {
        Self {
            column,
            eq_op,
            eq_func,
        }
    }
}

/// In-range support for RANGE frames with an offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InRangeSpec {
    /// `in_range(val, base, offset, sub, less)` support function
    pub func: Oid,
    pub collation: Oid,
    /// ORDER BY column sorts ascending
    pub ascending: bool,
    pub nulls_first: bool,
}

/// Whether a window function is a pure window function or a plain aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowFuncKind {
    Pure,
    Aggregate,
}

/// Aggregate support bindings carried in the spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSupport {
    pub transfn: Oid,
    pub invtransfn: Option<Oid>,
    pub finalfn: Option<Oid>,
    pub final_modify: FinalModify,
    pub trans_type: DataType,
    /// `None` means the initial transition value is NULL
    pub init_value: Option<Value>,
}

impl From<&AggregateDef> for AggregateSupport {
    fn from(def: &AggregateDef) -> Self {
        Self {
            transfn: def.transfn,
            invtransfn: def.invtransfn,
            finalfn: def.finalfn,
            final_modify: def.final_modify,
            trans_type: def.trans_type,
            init_value: def.init_value.clone(),
        }
    }
}

/// One window function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFuncDesc {
    pub kind: WindowFuncKind,
    /// Window function or aggregate id
    pub fnoid: Oid,
    /// Arguments, evaluated against input rows
    pub args: Vec<Expr>,
    /// FILTER clause (aggregates only)
    pub filter: Option<Expr>,
    pub collation: Oid,
    pub result_type: DataType,
    /// Aggregate bindings; looked up by `fnoid` in the registry when absent
    pub support: Option<AggregateSupport>,
}

impl WindowFuncDesc {
    /// A pure window function call
    pub fn pure(fnoid: Oid, args: Vec<Expr>, result_type: DataType) -> Self {
        Self {
            kind: WindowFuncKind::Pure,
            fnoid,
            args,
            filter: None,
            collation: INVALID_OID,
            result_type,
            support: None,
        }
    }

    /// A plain aggregate used as a window function
    pub fn aggregate(fnoid: Oid, args: Vec<Expr>, result_type: DataType) -> Self {
        Self {
            kind: WindowFuncKind::Aggregate,
            ..Self::pure(fnoid, args, result_type)
        }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_support(mut self, support: AggregateSupport) -> Self {
        self.support = Some(support);
        self
    }
}

/// Complete window operator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowAggSpec {
    pub partition_by: Vec<GroupColumn>,
    pub order_by: Vec<GroupColumn>,
    pub frame: FrameOptions,
    /// Evaluated once per scan; must be a non-null integer for ROWS/GROUPS
    pub start_offset: Option<Expr>,
    pub end_offset: Option<Expr>,
    pub in_range: Option<InRangeSpec>,
    pub functions: Vec<WindowFuncDesc>,
    /// Evaluated against output rows; failure switches to pass-through
    pub run_condition: Option<Expr>,
    /// Evaluated against output rows; failing rows are not returned
    pub qual: Option<Expr>,
    /// Topmost window operator of its plan stack
    pub top_window: bool,
}

impl Default for WindowAggSpec {
    fn default() -> Self {
        Self {
            partition_by: Vec::new(),
            order_by: Vec::new(),
            frame: FrameOptions::default(),
            start_offset: None,
            end_offset: None,
            in_range: None,
            functions: Vec::new(),
            run_condition: None,
            qual: None,
            top_window: true,
        }
    }
}

impl WindowAggSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_by(mut self, column: GroupColumn) -> Self {
        self.partition_by.push(column);
        self
    }

    pub fn order_by(mut self, column: GroupColumn) -> Self {
        self.order_by.push(column);
        self
    }

    pub fn frame(mut self, frame: FrameOptions) -> Self {
        self.frame = frame;
        self
    }

    pub fn start_offset(mut self, offset: Expr) -> Self {
        self.start_offset = Some(offset);
        self
    }

    pub fn end_offset(mut self, offset: Expr) -> Self {
        self.end_offset = Some(offset);
        self
    }

    pub fn in_range(mut self, in_range: InRangeSpec) -> Self {
        self.in_range = Some(in_range);
        self
    }

    pub fn function(mut self, desc: WindowFuncDesc) -> Self {
        self.functions.push(desc);
        self
    }

    pub fn run_condition(mut self, cond: Expr) -> Self {
        self.run_condition = Some(cond);
        self
    }

    pub fn qual(mut self, qual: Expr) -> Self {
        self.qual = Some(qual);
        self
    }

    pub fn top_window(mut self, top: bool) -> Self {
        self.top_window = top;
        self
    }

    /// Parse a JSON spec and validate it
    pub fn from_json(source: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(source)
            .map_err(|e| Error::invalid_argument(format!("invalid window spec: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::internal(format!("window spec serialization failed: {}", e)))
    }

    /// Check the spec is internally consistent
    pub fn validate(&self) -> Result<()> {
        self.frame.validate()?;
        let f = self.frame;
        if f.intersects(FrameOptions::START_OFFSET) && self.start_offset.is_none() {
            return Err(Error::invalid_argument(
                "frame starting offset is required by the frame options",
            ));
        }
        if f.intersects(FrameOptions::END_OFFSET) && self.end_offset.is_none() {
            return Err(Error::invalid_argument(
                "frame ending offset is required by the frame options",
            ));
        }
        let has_offset = f.intersects(FrameOptions::START_OFFSET | FrameOptions::END_OFFSET);
        if f.contains(FrameOptions::RANGE) && has_offset {
            if self.order_by.len() != 1 {
                return Err(Error::invalid_argument(format!(
                    "RANGE with offset requires exactly one ORDER BY column, got {}",
                    self.order_by.len()
                )));
            }
            if self.in_range.is_none() {
                return Err(Error::invalid_argument(
                    "RANGE with offset requires an in-range support function",
                ));
            }
        }
        if f.contains(FrameOptions::GROUPS) && self.order_by.is_empty() {
            return Err(Error::invalid_argument("GROUPS mode requires an ORDER BY clause"));
        }
        for desc in &self.functions {
            if desc.kind == WindowFuncKind::Pure && desc.filter.is_some() {
                return Err(Error::invalid_argument(
                    "FILTER is only allowed for aggregates used as window functions",
                ));
            }
        }
        Ok(())
    }

    /// Columns the operator appends to each input row
    pub fn output_types(&self) -> Vec<DataType> {
        self.functions.iter().map(|f| f.result_type).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;

    fn rows_frame() -> FrameOptions {
        FrameOptions::NONDEFAULT
            | FrameOptions::ROWS
            | FrameOptions::BETWEEN
            | FrameOptions::START_OFFSET_PRECEDING
            | FrameOptions::END_CURRENT_ROW
    }

    #[test]
    fn test_spec_json_round_trip() {
        let spec = WindowAggSpec::new()
            .partition_by(GroupColumn::new(0, TEXT_EQ_OP, F_TEXTEQ))
            .order_by(GroupColumn::new(1, INT8_EQ_OP, F_INT8EQ))
            .frame(rows_frame())
            .start_offset(Expr::constant(Value::integer(2)))
            .function(WindowFuncDesc::aggregate(
                AGG_SUM_INT8,
                vec![Expr::outer_var(2, DataType::Integer)],
                DataType::Integer,
            ));
        let json = spec.to_json().unwrap();
        let back = WindowAggSpec::from_json(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_missing_offset_rejected() {
        let spec = WindowAggSpec::new().frame(rows_frame());
        assert_eq!(
            spec.validate().unwrap_err().category(),
            crate::core::ErrorCategory::InvalidArgument
        );
    }

    #[test]
    fn test_range_offset_needs_one_order_column_and_in_range() {
        let frame = FrameOptions::NONDEFAULT
            | FrameOptions::RANGE
            | FrameOptions::BETWEEN
            | FrameOptions::START_OFFSET_PRECEDING
            | FrameOptions::END_CURRENT_ROW;
        let spec = WindowAggSpec::new()
            .frame(frame)
            .start_offset(Expr::constant(Value::integer(1)));
        assert!(spec.validate().is_err());
        let spec = spec.order_by(GroupColumn::new(0, INT8_EQ_OP, F_INT8EQ));
        assert!(spec.validate().is_err());
        let spec = spec.in_range(InRangeSpec {
            func: F_IN_RANGE_INT8,
            collation: INVALID_OID,
            ascending: true,
            nulls_first: false,
        });
        assert!(spec.validate().is_ok());
    }
}
