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

//! RANK, DENSE_RANK, PERCENT_RANK and CUME_DIST window functions
//!
//! All four track peer groups: a new group starts where the current row
//! is not a peer of the row before it.

use crate::core::{Result, Value};
use crate::executor::window::WindowObject;
use crate::functions::WindowFunction;

#[derive(Default)]
struct RankContext {
    /// 0 until the first row of the partition
    rank: i64,
}

/// Whether the current row starts a new peer group
///
/// The first row of a partition does not count as a change. Moves the mark
/// to the current row once the previous row has been read.
fn rank_up(winobj: &mut WindowObject<'_>) -> Result<bool> {
    let curpos = winobj.current_position();
    let first = {
        let context = winobj.partition_local::<RankContext>()?;
        if context.rank == 0 {
            context.rank = 1;
            true
        } else {
            false
        }
    };
    let up = !first && !winobj.rows_are_peers(curpos - 1, curpos)?;
    winobj.set_mark_position(curpos)?;
    Ok(up)
}

/// RANK window function
///
/// Rank with gaps: peers share a rank, and the next group's rank is its
/// row number. Example: two rows tie for rank 1, the next row gets rank 3.
#[derive(Default)]
pub struct RankFunction;

impl WindowFunction for RankFunction {
    fn name(&self) -> &'static str {
        "rank"
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let up = rank_up(winobj)?;
        let curpos = winobj.current_position();
        let context = winobj.partition_local::<RankContext>()?;
        if up {
            context.rank = curpos + 1;
        }
        Ok(Value::integer(context.rank))
    }
}

/// DENSE_RANK window function
///
/// Rank without gaps: two rows tie for rank 1, the next row gets rank 2.
#[derive(Default)]
pub struct DenseRankFunction;

impl WindowFunction for DenseRankFunction {
    fn name(&self) -> &'static str {
        "dense_rank"
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let up = rank_up(winobj)?;
        let context = winobj.partition_local::<RankContext>()?;
        if up {
            context.rank += 1;
        }
        Ok(Value::integer(context.rank))
    }
}

/// PERCENT_RANK window function
///
/// `(rank - 1) / (rows - 1)`, or 0 for a single-row partition.
#[derive(Default)]
pub struct PercentRankFunction;

impl WindowFunction for PercentRankFunction {
    fn name(&self) -> &'static str {
        "percent_rank"
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let totalrows = winobj.partition_row_count()?;
        let up = rank_up(winobj)?;
        let curpos = winobj.current_position();
        let context = winobj.partition_local::<RankContext>()?;
        if up {
            context.rank = curpos + 1;
        }
        if totalrows <= 1 {
            return Ok(Value::float(0.0));
        }
        Ok(Value::float(
            (context.rank - 1) as f64 / (totalrows - 1) as f64,
        ))
    }
}

/// CUME_DIST window function
///
/// Fraction of partition rows that precede or are peers of the current row.
#[derive(Default)]
pub struct CumeDistFunction;

impl WindowFunction for CumeDistFunction {
    fn name(&self) -> &'static str {
        "cume_dist"
    }

    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value> {
        let totalrows = winobj.partition_row_count()?;
        let up = rank_up(winobj)?;
        let curpos = winobj.current_position();
        let rank = winobj.partition_local::<RankContext>()?.rank;
        if up || rank == 1 {
            // Count the peers that follow the current row
            let mut rank = curpos + 1;
            let mut row = rank;
            while row < totalrows {
                if !winobj.rows_are_peers(row - 1, row)? {
                    break;
                }
                rank += 1;
                row += 1;
            }
            winobj.partition_local::<RankContext>()?.rank = rank;
        }
        let rank = winobj.partition_local::<RankContext>()?.rank;
        Ok(Value::float(rank as f64 / totalrows as f64))
    }
}
