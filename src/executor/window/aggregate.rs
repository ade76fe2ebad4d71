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

//! Plain aggregates evaluated over window frames
//!
//! Rows enter an aggregate through its transition function as the frame
//! end advances. When the frame head advances, rows leave through the
//! inverse transition function if the aggregate has one ("moving" mode);
//! otherwise, or when the inverse cannot undo a row, the aggregate is
//! restarted from its initial state and the whole frame is re-aggregated.

use std::sync::Arc;

use tracing::trace;

use crate::core::{DataType, Error, Result, Row, Value};
use crate::expr::{eval, EvalContext, Expr};
use crate::functions::{FinalModify, FunctionRegistry, ScalarFunction, Volatility};

use super::super::context::ExecutionContext;
use super::super::memory::{MemoryArena, Transition};
use super::frame::FrameOptions;
use super::spec::{AggregateSupport, WindowFuncDesc};
use super::state::{FrameCheck, WindowState};
use super::winobj::WinCursor;

/// Transition counters of one window aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Forward transition function calls
    pub forward_calls: u64,
    /// Inverse transition function calls
    pub inverse_calls: u64,
    /// Times the aggregate was reset to its initial state and re-aggregated
    pub restarts: u64,
    /// Inverse calls that could not remove a row
    pub inverse_failures: u64,
}

fn contains_volatile(expr: &Expr, registry: &FunctionRegistry) -> bool {
    let is_volatile = |oid| {
        registry
            .function_info(oid)
            .map(|info| info.volatility == Volatility::Volatile)
            .unwrap_or(false)
    };
    expr.any_node(&mut |e| match e {
        Expr::Func(f) => is_volatile(f.funcid),
        Expr::Op(op) => op.opfuncid.is_some_and(is_volatile),
        _ => false,
    })
}

/// Runtime state of one aggregate
pub(crate) struct PerAgg {
    /// Output slot of this aggregate
    pub(crate) wfuncno: usize,
    name: String,
    args: Vec<Expr>,
    filter: Option<Expr>,
    result_type: DataType,
    transfn: Arc<dyn ScalarFunction>,
    transfn_strict: bool,
    invtransfn: Option<Arc<dyn ScalarFunction>>,
    finalfn: Option<Arc<dyn ScalarFunction>>,
    finalfn_strict: bool,
    init_value: Value,
    trans: Transition<Value>,
    /// Rows currently aggregated into `trans`
    trans_count: i64,
    result: Value,
    restart: bool,
    /// Moving aggregates own their transition value
    private_arena: Option<MemoryArena>,
    stats: AggregateStats,
}

impl PerAgg {
    /// Bind an aggregate call and check it can run as a window aggregate
    pub(crate) fn new(
        wfuncno: usize,
        desc: &WindowFuncDesc,
        frame: FrameOptions,
        registry: &FunctionRegistry,
    ) -> Result<Self> {
        let (name, support) = match &desc.support {
            Some(s) => (format!("aggregate {}", desc.fnoid), s.clone()),
            None => {
                let def = registry.aggregate(desc.fnoid)?;
                (def.name.to_string(), AggregateSupport::from(def))
            }
        };
        if support.final_modify != FinalModify::ReadOnly {
            return Err(Error::not_supported(format!(
                "{} does not support use as a window function",
                name
            )));
        }

        let use_moving = support.invtransfn.is_some()
            && frame.head_can_move()
            && !desc
                .args
                .iter()
                .chain(desc.filter.iter())
                .any(|e| contains_volatile(e, registry) || e.contains_subplan());

        let transfn = registry.scalar(support.transfn)?.clone();
        let transfn_strict = transfn.info().strict;
        let invtransfn = match support.invtransfn {
            Some(oid) if use_moving => {
                let inv = registry.scalar(oid)?.clone();
                if inv.info().strict != transfn_strict {
                    return Err(Error::not_supported(format!(
                        "strictness of {}'s forward and inverse transition functions must match",
                        name
                    )));
                }
                Some(inv)
            }
            _ => None,
        };
        let (finalfn, finalfn_strict) = match support.finalfn {
            Some(oid) => {
                let f = registry.scalar(oid)?.clone();
                let strict = f.info().strict;
                (Some(f), strict)
            }
            None => (None, false),
        };

        if transfn_strict && support.init_value.is_none() {
            let compatible = desc
                .args
                .first()
                .is_some_and(|a| a.type_of().is_binary_coercible_to(support.trans_type));
            if !compatible {
                return Err(Error::invalid_argument(format!(
                    "{} must have compatible input type and transition type",
                    name
                )));
            }
        }

        let init_value = support
            .init_value
            .clone()
            .unwrap_or_else(|| Value::null(support.trans_type));
        Ok(Self {
            wfuncno,
            name,
            args: desc.args.clone(),
            filter: desc.filter.clone(),
            result_type: desc.result_type,
            transfn,
            transfn_strict,
            private_arena: invtransfn.as_ref().map(|_| MemoryArena::new("moving aggregate")),
            invtransfn,
            finalfn,
            finalfn_strict,
            trans: Transition::unowned(init_value.clone()),
            init_value,
            trans_count: 0,
            result: Value::null(desc.result_type),
            restart: true,
            stats: AggregateStats::default(),
        })
    }

    pub(crate) fn stats(&self) -> AggregateStats {
        self.stats
    }

    pub(crate) fn is_moving(&self) -> bool {
        self.invtransfn.is_some()
    }

    /// Back to the initial state without counting a restart
    fn reinitialize(&mut self) {
        if let Some(arena) = self.private_arena.as_mut() {
            arena.reset();
        }
        self.trans = Transition::unowned(self.init_value.clone());
        self.trans_count = 0;
        self.result = Value::null(self.result_type);
    }

    fn initialize(&mut self) {
        self.reinitialize();
        self.stats.restarts += 1;
    }

    /// Evaluate FILTER and the arguments on `row`; `None` when filtered out
    fn eval_inputs(&self, row: &Row, ctx: &ExecutionContext) -> Result<Option<Vec<Value>>> {
        let ectx = EvalContext::for_row(ctx.registry(), row).with_params(ctx.params());
        if let Some(filter) = &self.filter {
            if eval(filter, &ectx)?.as_boolean() != Some(true) {
                return Ok(None);
            }
        }
        let args = self
            .args
            .iter()
            .map(|a| eval(a, &ectx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(args))
    }

    /// Add one row
    fn advance(&mut self, args: &[Value], shared: &mut MemoryArena) -> Result<()> {
        let arena = match self.private_arena.as_mut() {
            Some(a) => a,
            None => shared,
        };
        if self.transfn_strict {
            if args.iter().any(Value::is_null) {
                return Ok(());
            }
            if self.trans_count == 0 && self.trans.get().is_null() {
                // First non-null input becomes the state
                let first = args.first().cloned().unwrap_or_default();
                self.trans = Transition::new_in(arena, first);
                self.trans_count = 1;
                return Ok(());
            }
            if self.trans.get().is_null() {
                return Ok(());
            }
        }
        let transfn = &self.transfn;
        let old = std::mem::replace(&mut self.trans, Transition::unowned(Value::default()));
        let new = old.take_and_replace(arena, |state| transfn.invoke_transition(state, args))?;
        if new.get().is_null() && self.invtransfn.is_some() {
            return Err(Error::invariant(format!(
                "moving-aggregate transition function of {} must not return null",
                self.name
            )));
        }
        self.trans = new;
        self.trans_count += 1;
        self.stats.forward_calls += 1;
        Ok(())
    }

    /// Remove one row; false when the inverse could not remove it
    fn advance_base(&mut self, args: &[Value]) -> Result<bool> {
        let Some(invtransfn) = self.invtransfn.clone() else {
            return Ok(false);
        };
        if self.transfn_strict && args.iter().any(Value::is_null) {
            return Ok(true);
        }
        if self.trans.get().is_null() {
            return Err(Error::invariant(format!(
                "transition value of {} is NULL before inverse transition",
                self.name
            )));
        }
        if self.trans_count == 1 {
            // The inverse must not remove the last row
            self.reinitialize();
            return Ok(true);
        }
        let arena = self
            .private_arena
            .as_mut()
            .ok_or_else(|| Error::invariant("moving aggregate has no private arena"))?;
        let old = std::mem::replace(&mut self.trans, Transition::unowned(Value::default()));
        let new = old.take_and_replace(arena, |state| invtransfn.invoke_transition(state, args))?;
        self.stats.inverse_calls += 1;
        if new.get().is_null() {
            self.stats.inverse_failures += 1;
            return Ok(false);
        }
        self.trans = new;
        self.trans_count -= 1;
        Ok(true)
    }

    fn finalize(&mut self) -> Result<Value> {
        let state = self.trans.get();
        let value = match &self.finalfn {
            Some(_) if self.finalfn_strict && state.is_null() => Value::null(self.result_type),
            Some(finalfn) => finalfn.invoke(std::slice::from_ref(state))?,
            None => state.clone(),
        };
        self.result = value.clone();
        Ok(value)
    }
}

/// All aggregates of one window operator, sharing a read pointer
pub(crate) struct AggregateSet {
    pub(crate) aggs: Vec<PerAgg>,
    pub(crate) cursor: WinCursor,
    /// Holds transition values of non-moving aggregates
    shared_arena: MemoryArena,
    aggregatedbase: i64,
    aggregatedupto: i64,
    /// Row at `aggregatedupto`, when already fetched
    agg_row: Option<Row>,
}

impl AggregateSet {
    pub(crate) fn new(aggs: Vec<PerAgg>, cursor: WinCursor) -> Self {
        Self {
            aggs,
            cursor,
            shared_arena: MemoryArena::new("window aggregates"),
            aggregatedbase: 0,
            aggregatedupto: 0,
            agg_row: None,
        }
    }

    /// Reset row counters at the start of a partition
    pub(crate) fn begin_partition(&mut self) {
        self.aggregatedbase = 0;
        self.aggregatedupto = 0;
        self.agg_row = None;
    }

    pub(crate) fn release_partition(&mut self) {
        self.shared_arena.reset();
        for agg in &mut self.aggs {
            agg.reinitialize();
        }
        self.agg_row = None;
    }

    /// Compute every aggregate for the current row into `results`
    pub(crate) fn evaluate(&mut self, state: &mut WindowState, results: &mut [Value]) -> Result<()> {
        if self.aggs.is_empty() {
            return Ok(());
        }
        state.update_frameheadpos()?;
        let head = state.frameheadpos;
        let cur = state.currentpos;
        if head < self.aggregatedbase {
            return Err(Error::invariant("window frame head moved backward"));
        }

        let frame = state.frame;
        // Same frame as the previous row: reuse the saved results
        if self.aggregatedbase == head
            && frame.intersects(FrameOptions::END_UNBOUNDED_FOLLOWING | FrameOptions::END_CURRENT_ROW)
            && !frame.has_exclusion()
            && self.aggregatedbase <= cur
            && self.aggregatedupto > cur
        {
            for agg in &self.aggs {
                results[agg.wfuncno] = agg.result.clone();
            }
            return Ok(());
        }

        let numaggs = self.aggs.len();
        let mut numaggs_restart = 0;
        for agg in &mut self.aggs {
            agg.restart = cur == 0
                || (self.aggregatedbase != head && !agg.is_moving())
                || frame.has_exclusion()
                || self.aggregatedupto <= head;
            if agg.restart {
                numaggs_restart += 1;
            }
        }

        // Remove rows that fell off the top of the frame
        while numaggs_restart < numaggs && self.aggregatedbase < head {
            let row = state
                .window_gettupleslot(&self.cursor, self.aggregatedbase)?
                .ok_or_else(|| Error::invariant("could not re-fetch previously fetched frame row"))?;
            for agg in self.aggs.iter_mut().filter(|a| !a.restart) {
                let removed = match agg.eval_inputs(&row, &state.ctx)? {
                    Some(args) => agg.advance_base(&args)?,
                    None => true,
                };
                if !removed {
                    trace!(aggregate = %agg.name, "inverse transition failed, restarting");
                    agg.restart = true;
                    numaggs_restart += 1;
                }
            }
            self.aggregatedbase += 1;
        }
        self.aggregatedbase = head;
        if self.cursor.has_mark {
            state.set_mark(&self.cursor, head)?;
        }

        if numaggs_restart > 0 {
            self.shared_arena.reset();
        }
        for agg in &mut self.aggs {
            if agg.restart {
                agg.initialize();
            } else {
                agg.result = Value::null(agg.result_type);
            }
        }

        let nonrestarted_upto = self.aggregatedupto;
        if numaggs_restart > 0 && self.aggregatedupto != head {
            self.aggregatedupto = head;
            self.agg_row = None;
        }

        loop {
            let row = match self.agg_row.take() {
                Some(row) => row,
                None => match state.window_gettupleslot(&self.cursor, self.aggregatedupto)? {
                    Some(row) => row,
                    None => break,
                },
            };
            match state.row_is_in_frame(self.aggregatedupto, &row)? {
                FrameCheck::PastEnd => {
                    self.agg_row = Some(row);
                    break;
                }
                FrameCheck::Outside => {}
                FrameCheck::Inside => {
                    let upto = self.aggregatedupto;
                    for agg in &mut self.aggs {
                        if !agg.restart && upto < nonrestarted_upto {
                            continue;
                        }
                        if let Some(args) = agg.eval_inputs(&row, &state.ctx)? {
                            agg.advance(&args, &mut self.shared_arena)?;
                        }
                    }
                }
            }
            self.aggregatedupto += 1;
        }

        for agg in &mut self.aggs {
            results[agg.wfuncno] = agg.finalize()?;
        }
        Ok(())
    }
}
