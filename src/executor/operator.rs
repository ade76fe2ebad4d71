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

//! Volcano-style operator interface for streaming execution.
//!
//! ```text
//! ┌──────────────┐
//! │ Consumer     │ ← Pulls rows via next()
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │ WindowAgg    │ ← Buffers one partition in a tuplestore
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │ Sorted input │ ← PARTITION BY keys major, ORDER BY keys minor
//! └──────────────┘
//! ```

use crate::core::{Result, Row};

/// Pull-based operator
///
/// The execution follows the open-next-close pattern:
///
/// 1. `open()` - Initialize the operator (called once)
/// 2. `next()` - Get the next row (called repeatedly until None)
/// 3. `close()` - Release resources (called once at end)
///
/// `rescan()` may be called between `open()` and `close()` to restart the
/// stream from its first row.
pub trait Operator: Send {
    /// Initialize the operator.
    fn open(&mut self) -> Result<()>;

    /// Get the next row from this operator.
    ///
    /// Returns:
    /// - `Ok(Some(row))` - A row is available
    /// - `Ok(None)` - No more rows (exhausted)
    /// - `Err(e)` - An error occurred
    ///
    /// After returning `None`, subsequent calls should continue to return `None`.
    fn next(&mut self) -> Result<Option<Row>>;

    /// Close the operator and release resources.
    fn close(&mut self) -> Result<()>;

    /// Restart the stream from the beginning
    fn rescan(&mut self) -> Result<()>;

    /// Get an estimate of the number of rows this operator will produce.
    fn estimated_rows(&self) -> Option<usize> {
        None
    }

    /// Get a descriptive name for this operator (for EXPLAIN).
    fn name(&self) -> &str;
}

/// Operator over a materialized vector of rows.
///
/// Rows are converted to shared storage up front so every `next()` is an
/// O(1) clone and a rescan replays the same values.
pub struct VecSource {
    rows: Vec<Row>,
    current_idx: usize,
    opened: bool,
}

impl VecSource {
    /// Create an operator from a vector of rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter().map(Row::into_shared).collect(),
            current_idx: 0,
            opened: false,
        }
    }

    /// Whether `open()` has been called
    pub fn is_open(&self) -> bool {
        self.opened
    }
}

impl Operator for VecSource {
    fn open(&mut self) -> Result<()> {
        self.current_idx = 0;
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        let row = self.rows.get(self.current_idx).cloned();
        if row.is_some() {
            self.current_idx += 1;
        }
        Ok(row)
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }

    fn rescan(&mut self) -> Result<()> {
        self.current_idx = 0;
        Ok(())
    }

    fn estimated_rows(&self) -> Option<usize> {
        Some(self.rows.len())
    }

    fn name(&self) -> &str {
        "Materialized"
    }
}

/// Drain an operator into a vector, driving open/next/close
pub fn collect_rows(op: &mut dyn Operator) -> Result<Vec<Row>> {
    op.open()?;
    let mut rows = Vec::new();
    while let Some(row) = op.next()? {
        rows.push(row);
    }
    op.close()?;
    Ok(rows)
}
