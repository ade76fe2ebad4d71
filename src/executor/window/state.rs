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

//! Partition buffering and frame tracking
//!
//! [`WindowState`] owns the child operator and the partition tuplestore. It
//! spools input rows lazily, tracks the current row, and keeps the frame
//! head, frame tail and peer-group tail positions up to date. Positions are
//! 0-based within the current partition; tail positions are exclusive.

use std::sync::Arc;

use tracing::trace;

use crate::core::{Error, Result, Row, Value};
use crate::expr::{eval, EvalContext, Expr};
use crate::functions::ScalarFunction;

use super::super::context::ExecutionContext;
use super::super::memory::MemoryArena;
use super::super::operator::Operator;
use super::super::tuplestore::{PointerFlags, ReadPointerId, Tuplestore};
use super::frame::FrameOptions;
use super::spec::{GroupColumn, WindowAggSpec};
use super::winobj::WinCursor;

/// Execution status of a window operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Evaluating window functions
    Run,
    /// Run condition failed; rows are returned with NULL results until the
    /// partition ends
    Passthrough,
    /// Run condition failed in the top window; the rest of the partition is
    /// read and discarded
    PassthroughStrict,
    /// No more output
    Done,
}

/// Where a partition row lies relative to the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCheck {
    /// The row and every row after it are past the frame end
    PastEnd,
    /// The row is outside the frame, but later rows may be inside
    Outside,
    Inside,
}

struct ResolvedColumn {
    column: usize,
    eq: Arc<dyn ScalarFunction>,
}

struct ResolvedInRange {
    column: usize,
    func: Arc<dyn ScalarFunction>,
    ascending: bool,
    nulls_first: bool,
}

fn resolve_columns(
    columns: &[GroupColumn],
    ctx: &ExecutionContext,
) -> Result<Vec<ResolvedColumn>> {
    columns
        .iter()
        .map(|c| {
            Ok(ResolvedColumn {
                column: c.column,
                eq: ctx.registry().scalar(c.eq_func)?.clone(),
            })
        })
        .collect()
}

fn column_value(row: &Row, column: usize) -> Result<&Value> {
    row.get(column).ok_or_else(|| {
        Error::invalid_argument(format!(
            "window column {} is out of range for a row of {} columns",
            column,
            row.len()
        ))
    })
}

/// NULLs match each other; otherwise the column's equality function decides
fn columns_match(columns: &[ResolvedColumn], a: &Row, b: &Row) -> Result<bool> {
    for col in columns {
        let x = column_value(a, col.column)?;
        let y = column_value(b, col.column)?;
        match (x.is_null(), y.is_null()) {
            (true, true) => continue,
            (true, false) | (false, true) => return Ok(false),
            (false, false) => {
                if col.eq.invoke(&[x.clone(), y.clone()])?.as_boolean() != Some(true) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn unexpected_end() -> Error {
    Error::invariant("unexpected end of tuplestore")
}

/// Partition buffer, current row and frame positions of a window operator
pub(crate) struct WindowState {
    pub(crate) child: Box<dyn Operator>,
    pub(crate) ctx: ExecutionContext,
    pub(crate) frame: FrameOptions,
    partition_by: Vec<ResolvedColumn>,
    order_by: Vec<ResolvedColumn>,
    in_range: Option<ResolvedInRange>,
    start_offset: Option<Expr>,
    end_offset: Option<Expr>,
    start_offset_value: Value,
    end_offset_value: Value,

    pub(crate) buffer: Tuplestore,
    current_ptr: ReadPointerId,
    framehead_ptr: Option<ReadPointerId>,
    frametail_ptr: Option<ReadPointerId>,
    grouptail_ptr: Option<ReadPointerId>,

    pub(crate) status: RunStatus,
    pub(crate) partition_spooled: bool,
    pub(crate) more_partitions: bool,
    pub(crate) next_partition: bool,
    pub(crate) partitions: u64,

    pub(crate) spooled_rows: i64,
    pub(crate) currentpos: i64,
    pub(crate) frameheadpos: i64,
    pub(crate) frametailpos: i64,
    pub(crate) groupheadpos: i64,
    pub(crate) grouptailpos: i64,
    currentgroup: i64,
    frameheadgroup: i64,
    frametailgroup: i64,
    framehead_valid: bool,
    frametail_valid: bool,
    grouptail_valid: bool,

    first_part_row: Option<Row>,
    pub(crate) current_row: Option<Row>,
    framehead_row: Option<Row>,
    frametail_row: Option<Row>,

    /// Holds partition-local function state
    pub(crate) partition_arena: MemoryArena,
}

impl WindowState {
    pub(crate) fn new(
        spec: &WindowAggSpec,
        child: Box<dyn Operator>,
        ctx: ExecutionContext,
    ) -> Result<Self> {
        let frame = spec.frame;
        let partition_by = resolve_columns(&spec.partition_by, &ctx)?;
        let order_by = resolve_columns(&spec.order_by, &ctx)?;
        let in_range = match (&spec.in_range, spec.order_by.first()) {
            (Some(r), Some(col)) if frame.contains(FrameOptions::RANGE) => {
                Some(ResolvedInRange {
                    column: col.column,
                    func: ctx.registry().scalar(r.func)?.clone(),
                    ascending: r.ascending,
                    nulls_first: r.nulls_first,
                })
            }
            _ => None,
        };

        let mut buffer = Tuplestore::new(ctx.config().tuplestore_config());
        let ordered = !order_by.is_empty();
        let mut framehead_ptr = None;
        let mut frametail_ptr = None;
        if frame.is_range_or_groups() {
            if (frame.contains(FrameOptions::START_CURRENT_ROW) && ordered)
                || frame.intersects(FrameOptions::START_OFFSET)
            {
                framehead_ptr = Some(buffer.alloc_read_pointer(PointerFlags::FORWARD));
            }
            if (frame.contains(FrameOptions::END_CURRENT_ROW) && ordered)
                || frame.intersects(FrameOptions::END_OFFSET)
            {
                frametail_ptr = Some(buffer.alloc_read_pointer(PointerFlags::FORWARD));
            }
        }
        let grouptail_ptr = (frame
            .intersects(FrameOptions::EXCLUDE_GROUP | FrameOptions::EXCLUDE_TIES)
            && ordered)
            .then(|| buffer.alloc_read_pointer(PointerFlags::FORWARD));

        Ok(Self {
            child,
            ctx,
            frame,
            partition_by,
            order_by,
            in_range,
            start_offset: spec.start_offset.clone(),
            end_offset: spec.end_offset.clone(),
            start_offset_value: Value::default(),
            end_offset_value: Value::default(),
            buffer,
            current_ptr: 0,
            framehead_ptr,
            frametail_ptr,
            grouptail_ptr,
            status: RunStatus::Run,
            partition_spooled: false,
            more_partitions: false,
            next_partition: true,
            partitions: 0,
            spooled_rows: 0,
            currentpos: 0,
            frameheadpos: 0,
            frametailpos: 0,
            groupheadpos: 0,
            grouptailpos: -1,
            currentgroup: 0,
            frameheadgroup: 0,
            frametailgroup: 0,
            framehead_valid: false,
            frametail_valid: false,
            grouptail_valid: false,
            first_part_row: None,
            current_row: None,
            framehead_row: None,
            frametail_row: None,
            partition_arena: MemoryArena::new("partition"),
        })
    }

    /// Allocate a read pointer for a window function or the aggregates
    pub(crate) fn alloc_cursor(&mut self, backward: bool) -> WinCursor {
        let flags = if backward {
            PointerFlags::BACKWARD
        } else {
            PointerFlags::FORWARD
        };
        WinCursor {
            readptr: self.buffer.alloc_read_pointer(flags),
            has_mark: backward,
        }
    }

    pub(crate) fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub(crate) fn end_offset_rows(&self) -> i64 {
        self.end_offset_value.as_int64().unwrap_or(0)
    }

    /// Evaluate the frame offsets once per scan
    pub(crate) fn compute_offsets(&mut self) -> Result<()> {
        if self.frame.intersects(FrameOptions::START_OFFSET) {
            self.start_offset_value = self.eval_offset(self.start_offset.as_ref(), "starting")?;
        }
        if self.frame.intersects(FrameOptions::END_OFFSET) {
            self.end_offset_value = self.eval_offset(self.end_offset.as_ref(), "ending")?;
        }
        Ok(())
    }

    fn eval_offset(&self, expr: Option<&Expr>, which: &str) -> Result<Value> {
        let expr = expr.ok_or_else(|| {
            Error::invalid_argument(format!("frame {} offset is missing", which))
        })?;
        let ectx = EvalContext::new(self.ctx.registry()).with_params(self.ctx.params());
        let value = eval(expr, &ectx)?;
        if value.is_null() {
            return Err(Error::invalid_argument(format!(
                "frame {} offset must not be null",
                which
            )));
        }
        if self.frame.intersects(FrameOptions::ROWS | FrameOptions::GROUPS) {
            match value.as_int64() {
                Some(n) if n < 0 => {
                    return Err(Error::invalid_argument(format!(
                        "frame {} offset must not be negative",
                        which
                    )))
                }
                Some(n) => return Ok(Value::integer(n)),
                None => {
                    return Err(Error::type_error(format!(
                        "frame {} offset must be an integer, got {}",
                        which,
                        value.data_type()
                    )))
                }
            }
        }
        Ok(value)
    }

    // =========================================================================
    // Partition lifecycle
    // =========================================================================

    pub(crate) fn are_peers(&self, a: &Row, b: &Row) -> Result<bool> {
        if self.order_by.is_empty() {
            return Ok(true);
        }
        columns_match(&self.order_by, a, b)
    }

    /// Read input rows into the buffer until row `pos` is spooled
    ///
    /// `pos == -1` reads the whole partition. Outside of `Run` status, or
    /// once the buffer has spilled, the whole partition is read at once.
    pub(crate) fn spool_tuples(&mut self, pos: i64) -> Result<()> {
        if self.partition_spooled {
            return Ok(());
        }
        let mut pos = pos;
        if self.status != RunStatus::Run || !self.buffer.in_memory() {
            pos = -1;
        }
        while self.spooled_rows <= pos || pos == -1 {
            let Some(row) = self.child.next()? else {
                self.partition_spooled = true;
                self.more_partitions = false;
                break;
            };
            if !self.partition_by.is_empty() {
                let first = self
                    .first_part_row
                    .as_ref()
                    .ok_or_else(|| Error::invariant("partition has no first row"))?;
                if !columns_match(&self.partition_by, first, &row)? {
                    self.first_part_row = Some(row);
                    self.partition_spooled = true;
                    self.more_partitions = true;
                    break;
                }
            }
            if self.status != RunStatus::PassthroughStrict {
                self.buffer.append(row)?;
                self.spooled_rows += 1;
            }
        }
        Ok(())
    }

    /// Start a partition; its first row is buffered at position 0
    pub(crate) fn begin_partition(&mut self) -> Result<()> {
        self.partition_spooled = false;
        self.framehead_valid = false;
        self.frametail_valid = false;
        self.grouptail_valid = false;
        self.spooled_rows = 0;
        self.currentpos = 0;
        self.frameheadpos = 0;
        self.frametailpos = 0;
        self.currentgroup = 0;
        self.frameheadgroup = 0;
        self.frametailgroup = 0;
        self.groupheadpos = 0;
        self.grouptailpos = -1;
        self.framehead_row = None;
        self.frametail_row = None;
        self.current_row = None;

        if self.first_part_row.is_none() {
            match self.child.next()? {
                Some(row) => self.first_part_row = Some(row),
                None => {
                    self.partition_spooled = true;
                    self.more_partitions = false;
                    return Ok(());
                }
            }
        }
        self.next_partition = false;
        let first = self
            .first_part_row
            .clone()
            .ok_or_else(|| Error::invariant("partition has no first row"))?;
        self.buffer.append(first)?;
        self.spooled_rows += 1;
        self.partitions += 1;
        trace!(partition = self.partitions, "window partition started");
        Ok(())
    }

    /// Drop the buffered partition
    pub(crate) fn release_partition(&mut self) {
        self.buffer.clear();
        self.partition_arena.reset();
        self.partition_spooled = false;
        self.next_partition = true;
    }

    /// Forget all input, for a rescan
    pub(crate) fn reset(&mut self) {
        self.release_partition();
        self.first_part_row = None;
        self.current_row = None;
        self.framehead_row = None;
        self.frametail_row = None;
        self.more_partitions = false;
        self.status = RunStatus::Run;
        self.partitions = 0;
    }

    /// Move to the next row of the partition, or to the next partition
    ///
    /// Returns false when the input is exhausted.
    pub(crate) fn advance_current(&mut self) -> Result<bool> {
        if self.next_partition {
            self.begin_partition()?;
        } else {
            self.currentpos += 1;
            self.framehead_valid = false;
            self.frametail_valid = false;
        }
        self.spool_tuples(self.currentpos)?;
        if self.partition_spooled && self.currentpos >= self.spooled_rows {
            self.release_partition();
            if self.more_partitions {
                self.begin_partition()?;
                self.status = RunStatus::Run;
            } else {
                self.status = RunStatus::Done;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read the current row through the current-row pointer
    pub(crate) fn fetch_current(&mut self) -> Result<Row> {
        self.buffer.select(self.current_ptr)?;
        let row = self.buffer.gettupleslot(true, false)?.ok_or_else(unexpected_end)?;
        let track_groups = self.frame.intersects(
            FrameOptions::GROUPS | FrameOptions::EXCLUDE_GROUP | FrameOptions::EXCLUDE_TIES,
        );
        if track_groups && self.currentpos > 0 {
            if let Some(prev) = self.current_row.as_ref() {
                if !self.are_peers(prev, &row)? {
                    self.currentgroup += 1;
                    self.groupheadpos = self.currentpos;
                    self.grouptail_valid = false;
                }
            }
        }
        self.current_row = Some(row.clone());
        Ok(row)
    }

    fn current(&self) -> Result<Row> {
        self.current_row
            .clone()
            .ok_or_else(|| Error::invariant("window operator has no current row"))
    }

    /// Keep the auxiliary frame pointers moving so the buffer can be trimmed
    pub(crate) fn refresh_frame_pointers(&mut self) -> Result<()> {
        if self.framehead_ptr.is_some() {
            self.update_frameheadpos()?;
        }
        if self.frametail_ptr.is_some() {
            self.update_frametailpos()?;
        }
        if self.grouptail_ptr.is_some() {
            self.update_grouptailpos()?;
        }
        Ok(())
    }

    // =========================================================================
    // Row access
    // =========================================================================

    /// Fetch partition row `pos` through `cursor`
    ///
    /// Returns `None` for positions outside the partition.
    pub(crate) fn window_gettupleslot(
        &mut self,
        cursor: &WinCursor,
        pos: i64,
    ) -> Result<Option<Row>> {
        if pos < 0 {
            return Ok(None);
        }
        self.spool_tuples(pos)?;
        if pos >= self.spooled_rows {
            return Ok(None);
        }
        if cursor.has_mark && pos < self.buffer.mark(cursor.readptr)? {
            return Err(Error::invariant(
                "cannot fetch row before WindowObject's mark position",
            ));
        }
        self.buffer.select(cursor.readptr)?;
        let at = self.buffer.position(cursor.readptr)?;
        if at < pos {
            if !self.buffer.skiptuples(pos - at, true)? {
                return Err(unexpected_end());
            }
        } else if at > pos && !self.buffer.skiptuples(at - pos, false)? {
            return Err(unexpected_end());
        }
        self.buffer
            .gettupleslot(true, false)?
            .map(Some)
            .ok_or_else(unexpected_end)
    }

    pub(crate) fn set_mark(&mut self, cursor: &WinCursor, pos: i64) -> Result<()> {
        if !cursor.has_mark {
            return Err(Error::invalid_argument(
                "window cursor does not keep a mark",
            ));
        }
        self.buffer.set_mark(cursor.readptr, pos)
    }

    /// Read the next row with the active frame pointer
    fn read_next(&mut self, ptr: ReadPointerId) -> Result<Option<Row>> {
        self.buffer.select(ptr)?;
        self.buffer.gettupleslot(true, false)
    }

    fn in_range(
        &self,
        val: &Value,
        base: &Value,
        offset: &Value,
        sub: bool,
        less: bool,
    ) -> Result<bool> {
        let in_range = self
            .in_range
            .as_ref()
            .ok_or_else(|| Error::invariant("RANGE offset frame has no in-range function"))?;
        let result = in_range.func.invoke(&[
            val.clone(),
            base.clone(),
            offset.clone(),
            Value::boolean(sub),
            Value::boolean(less),
        ])?;
        Ok(result.as_boolean() == Some(true))
    }

    fn range_column(&self) -> Result<(usize, bool, bool)> {
        self.in_range
            .as_ref()
            .map(|r| (r.column, r.ascending, r.nulls_first))
            .ok_or_else(|| Error::invariant("RANGE offset frame has no in-range function"))
    }

    // =========================================================================
    // Frame head
    // =========================================================================

    pub(crate) fn update_frameheadpos(&mut self) -> Result<()> {
        if self.framehead_valid {
            return Ok(());
        }
        let frame = self.frame;
        if frame.contains(FrameOptions::START_UNBOUNDED_PRECEDING) {
            self.frameheadpos = 0;
        } else if frame.contains(FrameOptions::START_CURRENT_ROW) {
            if frame.is_rows() {
                self.frameheadpos = self.currentpos;
            } else if !self.has_order_by() {
                self.frameheadpos = 0;
            } else {
                let ptr = self.frame_ptr(self.framehead_ptr)?;
                let current = self.current()?;
                self.prime_framehead(ptr)?;
                while let Some(head) = self.framehead_row.clone() {
                    if self.are_peers(&head, &current)? {
                        break;
                    }
                    self.step_framehead(ptr)?;
                }
            }
        } else if frame.intersects(FrameOptions::START_OFFSET) {
            if frame.is_rows() {
                let mut offset = self.start_offset_value.as_int64().unwrap_or(0);
                if frame.contains(FrameOptions::START_OFFSET_PRECEDING) {
                    offset = -offset;
                }
                self.frameheadpos = self.currentpos + offset;
                if self.frameheadpos < 0 {
                    self.frameheadpos = 0;
                } else if self.frameheadpos > self.currentpos + 1 {
                    self.spool_tuples(self.frameheadpos - 1)?;
                    if self.frameheadpos > self.spooled_rows {
                        self.frameheadpos = self.spooled_rows;
                    }
                }
            } else if frame.contains(FrameOptions::RANGE) {
                let (column, ascending, nulls_first) = self.range_column()?;
                let mut sub = frame.contains(FrameOptions::START_OFFSET_PRECEDING);
                let mut less = false;
                if !ascending {
                    sub = !sub;
                    less = true;
                }
                let ptr = self.frame_ptr(self.framehead_ptr)?;
                let current = self.current()?;
                let offset = self.start_offset_value.clone();
                self.prime_framehead(ptr)?;
                while let Some(head) = self.framehead_row.clone() {
                    let headval = column_value(&head, column)?;
                    let currval = column_value(&current, column)?;
                    if headval.is_null() || currval.is_null() {
                        // Null ordering alone decides
                        if nulls_first {
                            if !headval.is_null() || currval.is_null() {
                                break;
                            }
                        } else if headval.is_null() || !currval.is_null() {
                            break;
                        }
                    } else if self.in_range(headval, currval, &offset, sub, less)? {
                        break;
                    }
                    self.step_framehead(ptr)?;
                }
            } else if frame.contains(FrameOptions::GROUPS) {
                let offset = self.start_offset_value.as_int64().unwrap_or(0);
                let minheadgroup = if frame.contains(FrameOptions::START_OFFSET_PRECEDING) {
                    self.currentgroup - offset
                } else {
                    self.currentgroup + offset
                };
                let ptr = self.frame_ptr(self.framehead_ptr)?;
                self.prime_framehead(ptr)?;
                while let Some(prev) = self.framehead_row.clone() {
                    if self.frameheadgroup >= minheadgroup {
                        break;
                    }
                    self.step_framehead(ptr)?;
                    if let Some(head) = self.framehead_row.as_ref() {
                        if !self.are_peers(&prev, head)? {
                            self.frameheadgroup += 1;
                        }
                    }
                }
            }
        } else {
            return Err(Error::invariant(format!(
                "frame options {} have no start bound",
                frame
            )));
        }
        self.framehead_valid = true;
        Ok(())
    }

    fn frame_ptr(&self, ptr: Option<ReadPointerId>) -> Result<ReadPointerId> {
        ptr.ok_or_else(|| Error::invariant("frame boundary has no read pointer"))
    }

    fn prime_framehead(&mut self, ptr: ReadPointerId) -> Result<()> {
        if self.frameheadpos == 0 && self.framehead_row.is_none() {
            let row = self.read_next(ptr)?.ok_or_else(unexpected_end)?;
            self.framehead_row = Some(row);
        }
        Ok(())
    }

    /// Advance the head by one row; the position moves even past the end
    fn step_framehead(&mut self, ptr: ReadPointerId) -> Result<()> {
        self.frameheadpos += 1;
        self.spool_tuples(self.frameheadpos)?;
        self.framehead_row = self.read_next(ptr)?;
        Ok(())
    }

    // =========================================================================
    // Frame tail
    // =========================================================================

    pub(crate) fn update_frametailpos(&mut self) -> Result<()> {
        if self.frametail_valid {
            return Ok(());
        }
        let frame = self.frame;
        if frame.contains(FrameOptions::END_UNBOUNDED_FOLLOWING) {
            self.spool_tuples(-1)?;
            self.frametailpos = self.spooled_rows;
        } else if frame.contains(FrameOptions::END_CURRENT_ROW) {
            if frame.is_rows() {
                self.frametailpos = self.currentpos + 1;
            } else if !self.has_order_by() {
                self.spool_tuples(-1)?;
                self.frametailpos = self.spooled_rows;
            } else {
                let ptr = self.frame_ptr(self.frametail_ptr)?;
                let current = self.current()?;
                self.prime_frametail(ptr)?;
                while let Some(tail) = self.frametail_row.clone() {
                    if self.frametailpos > self.currentpos && !self.are_peers(&tail, &current)? {
                        break;
                    }
                    self.step_frametail(ptr)?;
                }
            }
        } else if frame.intersects(FrameOptions::END_OFFSET) {
            if frame.is_rows() {
                let mut offset = self.end_offset_rows();
                if frame.contains(FrameOptions::END_OFFSET_PRECEDING) {
                    offset = -offset;
                }
                self.frametailpos = self.currentpos + offset + 1;
                if self.frametailpos < 0 {
                    self.frametailpos = 0;
                } else if self.frametailpos > self.currentpos + 1 {
                    self.spool_tuples(self.frametailpos - 1)?;
                    if self.frametailpos > self.spooled_rows {
                        self.frametailpos = self.spooled_rows;
                    }
                }
            } else if frame.contains(FrameOptions::RANGE) {
                let (column, ascending, nulls_first) = self.range_column()?;
                let mut sub = frame.contains(FrameOptions::END_OFFSET_PRECEDING);
                let mut less = true;
                if !ascending {
                    sub = !sub;
                    less = false;
                }
                let ptr = self.frame_ptr(self.frametail_ptr)?;
                let current = self.current()?;
                let offset = self.end_offset_value.clone();
                self.prime_frametail(ptr)?;
                while let Some(tail) = self.frametail_row.clone() {
                    let tailval = column_value(&tail, column)?;
                    let currval = column_value(&current, column)?;
                    if tailval.is_null() || currval.is_null() {
                        if nulls_first {
                            if !tailval.is_null() {
                                break;
                            }
                        } else if !currval.is_null() {
                            break;
                        }
                    } else if !self.in_range(tailval, currval, &offset, sub, less)? {
                        break;
                    }
                    self.step_frametail(ptr)?;
                }
            } else if frame.contains(FrameOptions::GROUPS) {
                let offset = self.end_offset_rows();
                let maxtailgroup = if frame.contains(FrameOptions::END_OFFSET_PRECEDING) {
                    self.currentgroup - offset
                } else {
                    self.currentgroup + offset
                };
                let ptr = self.frame_ptr(self.frametail_ptr)?;
                self.prime_frametail(ptr)?;
                while let Some(prev) = self.frametail_row.clone() {
                    if self.frametailgroup > maxtailgroup {
                        break;
                    }
                    self.step_frametail(ptr)?;
                    if let Some(tail) = self.frametail_row.as_ref() {
                        if !self.are_peers(&prev, tail)? {
                            self.frametailgroup += 1;
                        }
                    }
                }
            }
        } else {
            return Err(Error::invariant(format!(
                "frame options {} have no end bound",
                frame
            )));
        }
        self.frametail_valid = true;
        Ok(())
    }

    fn prime_frametail(&mut self, ptr: ReadPointerId) -> Result<()> {
        if self.frametailpos == 0 && self.frametail_row.is_none() {
            let row = self.read_next(ptr)?.ok_or_else(unexpected_end)?;
            self.frametail_row = Some(row);
        }
        Ok(())
    }

    fn step_frametail(&mut self, ptr: ReadPointerId) -> Result<()> {
        self.frametailpos += 1;
        self.spool_tuples(self.frametailpos)?;
        self.frametail_row = self.read_next(ptr)?;
        Ok(())
    }

    // =========================================================================
    // Peer group tail
    // =========================================================================

    /// Find the first row after the current row's peer group
    pub(crate) fn update_grouptailpos(&mut self) -> Result<()> {
        if self.grouptail_valid {
            return Ok(());
        }
        if !self.has_order_by() {
            self.spool_tuples(-1)?;
            self.grouptailpos = self.spooled_rows;
            self.grouptail_valid = true;
            return Ok(());
        }
        let ptr = self.frame_ptr(self.grouptail_ptr)?;
        let current = self.current()?;
        loop {
            self.grouptailpos += 1;
            self.spool_tuples(self.grouptailpos)?;
            let Some(row) = self.read_next(ptr)? else {
                break;
            };
            if self.grouptailpos > self.currentpos && !self.are_peers(&row, &current)? {
                break;
            }
        }
        self.grouptail_valid = true;
        Ok(())
    }

    // =========================================================================
    // Frame membership
    // =========================================================================

    /// Classify partition row `pos` (holding `row`) against the current frame
    pub(crate) fn row_is_in_frame(&mut self, pos: i64, row: &Row) -> Result<FrameCheck> {
        let frame = self.frame;
        self.update_frameheadpos()?;
        if pos < self.frameheadpos {
            return Ok(FrameCheck::Outside);
        }

        if frame.contains(FrameOptions::END_CURRENT_ROW) {
            if frame.is_rows() {
                if pos > self.currentpos {
                    return Ok(FrameCheck::PastEnd);
                }
            } else if pos > self.currentpos {
                let current = self.current()?;
                if !self.are_peers(row, &current)? {
                    return Ok(FrameCheck::PastEnd);
                }
            }
        } else if frame.intersects(FrameOptions::END_OFFSET) {
            if frame.is_rows() {
                let mut offset = self.end_offset_rows();
                if frame.contains(FrameOptions::END_OFFSET_PRECEDING) {
                    offset = -offset;
                }
                if pos > self.currentpos + offset {
                    return Ok(FrameCheck::PastEnd);
                }
            } else {
                self.update_frametailpos()?;
                if pos >= self.frametailpos {
                    return Ok(FrameCheck::PastEnd);
                }
            }
        }

        if frame.contains(FrameOptions::EXCLUDE_CURRENT_ROW) {
            if pos == self.currentpos {
                return Ok(FrameCheck::Outside);
            }
        } else if frame.contains(FrameOptions::EXCLUDE_GROUP)
            || (frame.contains(FrameOptions::EXCLUDE_TIES) && pos != self.currentpos)
        {
            if !self.has_order_by() {
                return Ok(FrameCheck::Outside);
            }
            if pos >= self.groupheadpos {
                self.update_grouptailpos()?;
                if pos < self.grouptailpos {
                    return Ok(FrameCheck::Outside);
                }
            }
        }
        Ok(FrameCheck::Inside)
    }
}
