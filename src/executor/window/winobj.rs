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

//! Window function access API
//!
//! A pure window function sees the partition only through a
//! [`WindowObject`]. Every object has its own read pointer and mark; rows
//! before the mark may already be discarded, so fetching them fails.

use std::any::Any;

use crate::core::{DataType, Error, Result, Row, Value};
use crate::expr::{eval, EvalContext, Expr, ParamKind};

use super::super::tuplestore::ReadPointerId;
use super::frame::FrameOptions;
use super::state::{FrameCheck, WindowState};

/// Reference point for relative row access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seek {
    /// Relative to the current row
    Current,
    /// Relative to the first row of the partition or frame
    Head,
    /// Relative to the last row of the partition or frame
    Tail,
}

/// Read pointer owned by one window function (or by all aggregates)
#[derive(Debug, Clone, Copy)]
pub(crate) struct WinCursor {
    pub(crate) readptr: ReadPointerId,
    /// Pointer is backward-capable and keeps a mark
    pub(crate) has_mark: bool,
}

/// Handle a window function uses to read its partition
pub struct WindowObject<'a> {
    state: &'a mut WindowState,
    args: &'a [Expr],
    cursor: WinCursor,
    local: &'a mut Option<Box<dyn Any + Send>>,
}

impl<'a> WindowObject<'a> {
    pub(crate) fn new(
        state: &'a mut WindowState,
        args: &'a [Expr],
        cursor: WinCursor,
        local: &'a mut Option<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            state,
            args,
            cursor,
            local,
        }
    }

    /// Position of the current row within the partition
    pub fn current_position(&self) -> i64 {
        self.state.currentpos
    }

    /// Total rows in the partition; reads the rest of it if needed
    pub fn partition_row_count(&mut self) -> Result<i64> {
        self.state.spool_tuples(-1)?;
        Ok(self.state.spooled_rows)
    }

    /// Declare that rows before `pos` will not be fetched again
    pub fn set_mark_position(&mut self, pos: i64) -> Result<()> {
        self.state.set_mark(&self.cursor, pos)
    }

    /// Whether the rows at `pos1` and `pos2` sort as peers
    pub fn rows_are_peers(&mut self, pos1: i64, pos2: i64) -> Result<bool> {
        if !self.state.has_order_by() {
            return Ok(true);
        }
        let a = self.fetch_required(pos1)?;
        let b = self.fetch_required(pos2)?;
        self.state.are_peers(&a, &b)
    }

    fn fetch_required(&mut self, pos: i64) -> Result<Row> {
        self.state
            .window_gettupleslot(&self.cursor, pos)?
            .ok_or_else(|| {
                Error::invalid_argument(format!("specified position is out of window: {}", pos))
            })
    }

    fn eval_arg(&self, argno: usize, row: &Row) -> Result<Value> {
        let expr = self.args.get(argno).ok_or_else(|| {
            Error::invalid_argument(format!(
                "window function argument {} does not exist ({} given)",
                argno,
                self.args.len()
            ))
        })?;
        let registry = self.state.ctx.registry();
        let ctx = EvalContext::for_row(registry, row).with_params(self.state.ctx.params());
        eval(expr, &ctx)
    }

    /// Evaluate argument `argno` on a row relative to the partition
    ///
    /// Returns `None` when the row is outside the partition. With
    /// `set_mark` the mark moves to the fetched row.
    pub fn arg_in_partition(
        &mut self,
        argno: usize,
        relpos: i64,
        seek: Seek,
        set_mark: bool,
    ) -> Result<Option<Value>> {
        let abs_pos = match seek {
            Seek::Current => self.state.currentpos + relpos,
            Seek::Head => relpos,
            Seek::Tail => {
                self.state.spool_tuples(-1)?;
                self.state.spooled_rows - 1 + relpos
            }
        };
        let Some(row) = self.state.window_gettupleslot(&self.cursor, abs_pos)? else {
            return Ok(None);
        };
        if set_mark {
            self.set_mark_position(abs_pos)?;
        }
        self.eval_arg(argno, &row).map(Some)
    }

    /// Evaluate argument `argno` on a row relative to the frame
    ///
    /// Returns `None` when the row is outside the frame, including rows
    /// removed by the frame's exclusion clause.
    pub fn arg_in_frame(
        &mut self,
        argno: usize,
        relpos: i64,
        seek: Seek,
        set_mark: bool,
    ) -> Result<Option<Value>> {
        let exclusion = self.state.frame.exclusion();
        let (abs_pos, mark_pos) = match seek {
            Seek::Current => {
                return Err(Error::invalid_argument(
                    "Seek::Current is not supported for frame access",
                ))
            }
            Seek::Head => {
                if relpos < 0 {
                    return Ok(None);
                }
                self.state.update_frameheadpos()?;
                let head = self.state.frameheadpos;
                let mut abs_pos = head + relpos;
                let mark_pos = abs_pos;
                let cur = self.state.currentpos;
                if exclusion == FrameOptions::EXCLUDE_CURRENT_ROW {
                    if abs_pos >= cur && cur >= head {
                        abs_pos += 1;
                    }
                } else if exclusion == FrameOptions::EXCLUDE_GROUP
                    || exclusion == FrameOptions::EXCLUDE_TIES
                {
                    self.state.update_grouptailpos()?;
                    let (ghead, gtail) = (self.state.groupheadpos, self.state.grouptailpos);
                    if abs_pos >= ghead && gtail > head {
                        let overlapstart = ghead.max(head);
                        if exclusion == FrameOptions::EXCLUDE_GROUP {
                            abs_pos += gtail - overlapstart;
                        } else if abs_pos == overlapstart {
                            abs_pos = cur;
                        } else {
                            abs_pos += gtail - overlapstart - 1;
                        }
                    }
                }
                (abs_pos, mark_pos)
            }
            Seek::Tail => {
                if relpos > 0 {
                    return Ok(None);
                }
                self.state.update_frametailpos()?;
                let tail = self.state.frametailpos;
                let mut abs_pos = tail - 1 + relpos;
                let cur = self.state.currentpos;
                if exclusion.bits() == 0 {
                    (abs_pos, abs_pos)
                } else {
                    if exclusion == FrameOptions::EXCLUDE_CURRENT_ROW {
                        if abs_pos <= cur && cur < tail {
                            abs_pos -= 1;
                        }
                    } else {
                        self.state.update_grouptailpos()?;
                        let (ghead, gtail) = (self.state.groupheadpos, self.state.grouptailpos);
                        if abs_pos < gtail && ghead < tail {
                            let overlapend = gtail.min(tail);
                            if exclusion == FrameOptions::EXCLUDE_GROUP {
                                abs_pos -= overlapend - ghead;
                            } else if abs_pos == overlapend - 1 {
                                abs_pos = cur;
                            } else {
                                abs_pos -= overlapend - 1 - ghead;
                            }
                        }
                    }
                    // Exclusion may reach back anywhere in the frame
                    self.state.update_frameheadpos()?;
                    if abs_pos < self.state.frameheadpos {
                        return Ok(None);
                    }
                    (abs_pos, self.state.frameheadpos)
                }
            }
        };

        let Some(row) = self.state.window_gettupleslot(&self.cursor, abs_pos)? else {
            return Ok(None);
        };
        if self.state.row_is_in_frame(abs_pos, &row)? != FrameCheck::Inside {
            return Ok(None);
        }
        if set_mark {
            self.set_mark_position(mark_pos)?;
        }
        self.eval_arg(argno, &row).map(Some)
    }

    /// Evaluate argument `argno` on the current row
    pub fn arg_current(&mut self, argno: usize) -> Result<Value> {
        let row = self
            .state
            .current_row
            .clone()
            .ok_or_else(|| Error::invariant("window operator has no current row"))?;
        self.eval_arg(argno, &row)
    }

    /// Whether argument `argno` has the same value on every row
    pub fn arg_is_constant(&self, argno: usize) -> bool {
        match self.args.get(argno) {
            Some(Expr::Const(_)) => true,
            Some(Expr::Param(p)) => p.kind == ParamKind::Extern,
            _ => false,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Declared type of argument `argno`
    pub fn arg_type(&self, argno: usize) -> DataType {
        self.args
            .get(argno)
            .map(Expr::type_of)
            .unwrap_or(DataType::Null)
    }

    /// State that lives until the end of the current partition
    ///
    /// Created with `T::default()` on first use in each partition.
    pub fn partition_local<T: Default + Send + 'static>(&mut self) -> Result<&mut T> {
        if self.local.is_none() {
            self.state.partition_arena.charge(std::mem::size_of::<T>());
            *self.local = Some(Box::new(T::default()));
        }
        self.local
            .as_mut()
            .and_then(|b| b.downcast_mut::<T>())
            .ok_or_else(|| {
                Error::invalid_argument("partition-local state was created with another type")
            })
    }
}
