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

//! Window function executor
//!
//! [`WindowAgg`] consumes input sorted by the PARTITION BY keys and then the
//! ORDER BY keys, and emits each input row extended with one column per
//! window function. One partition at a time is buffered in a
//! [`Tuplestore`](super::tuplestore::Tuplestore); rows are read from the
//! child only as far as the functions and the frame need them.
//!
//! Supported:
//! - ROWS, RANGE and GROUPS frames with UNBOUNDED, CURRENT ROW and offset
//!   bounds, and EXCLUDE CURRENT ROW / GROUP / TIES
//! - Pure window functions through [`WindowObject`]
//! - Plain aggregates, incrementally with inverse transitions when the
//!   frame head moves
//! - Run conditions that stop evaluation early, and a row filter

mod aggregate;
pub mod frame;
pub mod spec;
mod state;
mod winobj;

use std::any::Any;
use std::sync::Arc;

use tracing::debug;

use crate::core::{DataType, Error, Result, Row, Value};
use crate::expr::{eval_qual, EvalContext, Expr};
use crate::functions::WindowFunction;

use super::context::ExecutionContext;
use super::operator::Operator;

use aggregate::{AggregateSet, PerAgg};
use state::WindowState;
use winobj::WinCursor;

pub use aggregate::AggregateStats;
pub use frame::FrameOptions;
pub use spec::{
    AggregateSupport, GroupColumn, InRangeSpec, WindowAggSpec, WindowFuncDesc, WindowFuncKind,
};
pub use state::{FrameCheck, RunStatus};
pub use winobj::{Seek, WindowObject};

/// Runtime state of one pure window function
struct PerFunc {
    wfuncno: usize,
    func: Arc<dyn WindowFunction>,
    args: Vec<Expr>,
    cursor: WinCursor,
    /// Partition-local state, dropped at each partition boundary
    local: Option<Box<dyn Any + Send>>,
}

/// Window operator
pub struct WindowAgg {
    state: WindowState,
    funcs: Vec<PerFunc>,
    aggs: Option<AggregateSet>,
    /// Function results for the current row, indexed by function number
    results: Vec<Value>,
    result_types: Vec<DataType>,
    run_condition: Option<Expr>,
    qual: Option<Expr>,
    top_window: bool,
    use_pass_through: bool,
    /// Offsets are evaluated on the first row of each scan
    all_first: bool,
    /// Partition whose function state is live
    seen_partition: u64,
    rows_filtered: u64,
}

impl WindowAgg {
    /// Build the operator over `child`
    ///
    /// Checks the spec and binds every function; aggregates that cannot run
    /// over a window are rejected here.
    pub fn new(
        spec: WindowAggSpec,
        child: Box<dyn Operator>,
        ctx: ExecutionContext,
    ) -> Result<Self> {
        spec.validate()?;
        let registry = ctx.registry().clone();
        let mut state = WindowState::new(&spec, child, ctx)?;
        let frame = spec.frame;

        let mut funcs = Vec::new();
        let mut aggs = Vec::new();
        for (wfuncno, desc) in spec.functions.iter().enumerate() {
            match desc.kind {
                WindowFuncKind::Pure => {
                    let func = registry.window(desc.fnoid)?.clone();
                    let (min, max) = func.arg_range();
                    if desc.args.len() < min || desc.args.len() > max {
                        return Err(Error::invalid_argument(format!(
                            "{} takes between {} and {} arguments, got {}",
                            func.name(),
                            min,
                            max,
                            desc.args.len()
                        )));
                    }
                    let cursor = state.alloc_cursor(true);
                    funcs.push(PerFunc {
                        wfuncno,
                        func,
                        args: desc.args.clone(),
                        cursor,
                        local: None,
                    });
                }
                WindowFuncKind::Aggregate => {
                    aggs.push(PerAgg::new(wfuncno, desc, frame, &registry)?);
                }
            }
        }
        let aggs = if aggs.is_empty() {
            None
        } else {
            // Restarts after a moving head or an exclusion re-read the frame
            let cursor = state.alloc_cursor(frame.head_can_move() || frame.has_exclusion());
            Some(AggregateSet::new(aggs, cursor))
        };

        let result_types = spec.output_types();
        let use_pass_through = !spec.top_window || !spec.partition_by.is_empty();
        debug!(
            functions = spec.functions.len(),
            frame = %frame,
            "window operator built"
        );
        Ok(Self {
            state,
            funcs,
            aggs,
            results: result_types.iter().map(|t| Value::null(*t)).collect(),
            result_types,
            run_condition: spec.run_condition,
            qual: spec.qual,
            top_window: spec.top_window,
            use_pass_through,
            all_first: true,
            seen_partition: 0,
            rows_filtered: 0,
        })
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    /// Partitions started since the last rescan
    pub fn partitions(&self) -> u64 {
        self.state.partitions
    }

    /// Rows dropped by the filter
    pub fn rows_filtered(&self) -> u64 {
        self.rows_filtered
    }

    /// Times the partition buffer moved to disk
    pub fn spill_count(&self) -> u64 {
        self.state.buffer.spill_count()
    }

    /// Transition counters of each aggregate, in function order
    pub fn aggregate_stats(&self) -> Vec<AggregateStats> {
        self.aggs
            .as_ref()
            .map(|set| set.aggs.iter().map(|a| a.stats()).collect())
            .unwrap_or_default()
    }

    fn null_results(&mut self) {
        for (slot, typ) in self.results.iter_mut().zip(&self.result_types) {
            *slot = Value::null(*typ);
        }
    }

    /// Drop partition-scoped function state
    fn reset_function_state(&mut self) {
        for func in &mut self.funcs {
            func.local = None;
        }
        if let Some(aggs) = self.aggs.as_mut() {
            aggs.release_partition();
            aggs.begin_partition();
        }
    }

    fn passes(&self, cond: &Expr, row: &Row) -> Result<bool> {
        let ctx = EvalContext::for_row(self.state.ctx.registry(), row)
            .with_params(self.state.ctx.params());
        eval_qual(std::slice::from_ref(cond), &ctx)
    }

    fn evaluate_functions(&mut self) -> Result<()> {
        for func in &mut self.funcs {
            let mut winobj =
                WindowObject::new(&mut self.state, &func.args, func.cursor, &mut func.local);
            self.results[func.wfuncno] = func.func.evaluate(&mut winobj)?;
        }
        if let Some(aggs) = self.aggs.as_mut() {
            aggs.evaluate(&mut self.state, &mut self.results)?;
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        self.state.release_partition();
        self.reset_function_state();
        self.state.status = RunStatus::Done;
        self.state.child.close()
    }
}

impl Operator for WindowAgg {
    fn open(&mut self) -> Result<()> {
        self.state.child.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if self.state.status == RunStatus::Done {
            return Ok(None);
        }
        if self.all_first {
            self.state.compute_offsets()?;
            self.all_first = false;
        }

        loop {
            if let Err(err) = self.state.ctx.check_cancelled() {
                self.abort()?;
                return Err(err);
            }
            if !self.state.advance_current()? {
                return Ok(None);
            }
            if self.state.partitions != self.seen_partition {
                self.seen_partition = self.state.partitions;
                self.reset_function_state();
                self.null_results();
            }

            let row = self.state.fetch_current()?;
            if self.state.status == RunStatus::Run {
                self.evaluate_functions()?;
            }
            self.state.refresh_frame_pointers()?;
            self.state.buffer.trim();

            let mut values = row.into_values();
            values.extend(self.results.iter().cloned());
            let output = Row::from_values(values);

            if self.state.status == RunStatus::Run {
                if let Some(cond) = &self.run_condition {
                    if !self.passes(cond, &output)? {
                        if !self.use_pass_through {
                            self.state.status = RunStatus::Done;
                            return Ok(None);
                        }
                        self.null_results();
                        if self.top_window {
                            self.state.status = RunStatus::PassthroughStrict;
                            continue;
                        }
                        self.state.status = RunStatus::Passthrough;
                    }
                }
                if let Some(qual) = &self.qual {
                    if !self.passes(qual, &output)? {
                        self.rows_filtered += 1;
                        continue;
                    }
                }
                return Ok(Some(output));
            } else if !self.top_window {
                return Ok(Some(output));
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.state.release_partition();
        self.reset_function_state();
        self.state.child.close()
    }

    fn rescan(&mut self) -> Result<()> {
        self.state.reset();
        self.reset_function_state();
        self.null_results();
        self.all_first = true;
        self.seen_partition = 0;
        self.rows_filtered = 0;
        self.state.child.rescan()
    }

    fn estimated_rows(&self) -> Option<usize> {
        self.state.child.estimated_rows()
    }

    fn name(&self) -> &str {
        "WindowAgg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::executor::operator::{collect_rows, VecSource};
    use crate::row;

    fn source(rows: Vec<Row>) -> Box<dyn Operator> {
        Box::new(VecSource::new(rows))
    }

    fn last_column(rows: &[Row]) -> Vec<Value> {
        rows.iter()
            .map(|r| r.get(r.len() - 1).cloned().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_row_number_restarts_per_partition() {
        let spec = WindowAggSpec::new()
            .partition_by(GroupColumn::new(0, TEXT_EQ_OP, F_TEXTEQ))
            .function(WindowFuncDesc::pure(WIN_ROW_NUMBER, vec![], DataType::Integer));
        let input = vec![row!["a", 1], row!["a", 2], row!["b", 3], row!["b", 4], row!["b", 5]];
        let mut op = WindowAgg::new(spec, source(input), ExecutionContext::new()).unwrap();
        op.open().unwrap();
        let rows = collect_rows(&mut op).unwrap();
        assert_eq!(
            last_column(&rows),
            vec![1, 2, 1, 2, 3].into_iter().map(Value::integer).collect::<Vec<_>>()
        );
        assert_eq!(op.partitions(), 2);
    }

    #[test]
    fn test_empty_input() {
        let spec = WindowAggSpec::new().function(WindowFuncDesc::pure(
            WIN_ROW_NUMBER,
            vec![],
            DataType::Integer,
        ));
        let mut op = WindowAgg::new(spec, source(vec![]), ExecutionContext::new()).unwrap();
        op.open().unwrap();
        assert!(op.next().unwrap().is_none());
        assert_eq!(op.status(), RunStatus::Done);
    }

    #[test]
    fn test_wrong_argument_count_rejected() {
        let spec = WindowAggSpec::new().function(WindowFuncDesc::pure(
            WIN_ROW_NUMBER,
            vec![Expr::constant(Value::integer(1))],
            DataType::Integer,
        ));
        let err = WindowAgg::new(spec, source(vec![]), ExecutionContext::new())
            .err()
            .unwrap();
        assert_eq!(err.category(), crate::core::ErrorCategory::InvalidArgument);
    }

    #[test]
    fn test_cancellation_stops_the_scan() {
        let spec = WindowAggSpec::new().function(WindowFuncDesc::pure(
            WIN_ROW_NUMBER,
            vec![],
            DataType::Integer,
        ));
        let ctx = ExecutionContext::new();
        let handle = ctx.cancellation_handle();
        let mut op = WindowAgg::new(spec, source(vec![row![1], row![2]]), ctx).unwrap();
        op.open().unwrap();
        assert!(op.next().unwrap().is_some());
        handle.cancel();
        assert_eq!(op.next(), Err(Error::QueryCancelled));
        assert!(op.next().unwrap().is_none());
    }
}
