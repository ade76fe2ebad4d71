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

//! Cost model for path enumeration
//!
//! Costs are relative units anchored at one sequential page read. Every
//! path carries a startup cost (spent before the first row comes out) and a
//! total cost (spent producing every row).
//!
//! ## Approximations
//!
//! 1. **CPU costs** (`cpu_tuple_cost`, `cpu_operator_cost`, ...) are relative
//!    values; they do not correspond to CPU cycles.
//!
//! 2. **B-tree descent** is charged as `default_index_height` random page
//!    reads at startup; hash indexes pay a fraction of one.
//!
//! 3. **Sorting** is charged `2 * cpu_operator_cost` per comparison with
//!    `n * log2(n)` comparisons, plus a write and read of every page when the
//!    input does not fit in `sort_mem_bytes`.
//!
//! 4. **Hash joins** build on the inner input. When the table exceeds the
//!    hash budget the inputs are split into batches that are written out and
//!    read back once.

use super::config::DEFAULT_HASH_MEM;

/// Cost constants
#[derive(Debug, Clone, PartialEq)]
pub struct CostConstants {
    /// Cost to read one page sequentially
    pub seq_page_cost: f64,

    /// Cost to read one page at random (index and heap fetches)
    pub random_page_cost: f64,

    /// Cost to process one heap tuple
    pub cpu_tuple_cost: f64,

    /// Cost to process one index entry
    pub cpu_index_tuple_cost: f64,

    /// Cost to evaluate one operator or function
    pub cpu_operator_cost: f64,

    /// Assumed B-tree height
    pub default_index_height: u32,

    /// Page size in bytes
    pub page_size: usize,

    /// Cost to hash one row into the hash table
    pub hash_build_cost: f64,

    /// Cost to probe the hash table
    pub hash_probe_cost: f64,

    /// Hash table overhead relative to raw row size
    pub hash_memory_factor: f64,

    /// Memory a sort may use before spilling
    pub sort_mem_bytes: usize,
}

impl Default for CostConstants {
    fn default() -> Self {
        DEFAULT_COST_CONSTANTS
    }
}

/// Default cost constants
pub const DEFAULT_COST_CONSTANTS: CostConstants = CostConstants {
    seq_page_cost: 1.0,
    random_page_cost: 4.0,
    cpu_tuple_cost: 0.01,
    cpu_index_tuple_cost: 0.005,
    cpu_operator_cost: 0.0025,
    default_index_height: 3,
    page_size: 8192,
    hash_build_cost: 0.02,
    hash_probe_cost: 0.01,
    hash_memory_factor: 1.5,
    sort_mem_bytes: DEFAULT_HASH_MEM,
};

/// Added to the cost of a path whose method is disabled
///
/// Disabled methods stay available when nothing else can produce the
/// relation.
pub const DISABLE_COST: f64 = 1.0e8;

/// Per-tuple overhead added to the row width for memory estimates
const TUPLE_OVERHEAD: f64 = 16.0;

/// Largest join cardinality carried as a plain row count
const MAX_CARDINALITY: f64 = i32::MAX as f64;

/// Log base for oversized join cardinalities in the genetic orderer
const LOG_BASE: f64 = 1.5;

/// Startup and total cost of a path or plan
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathCost {
    pub startup: f64,
    pub total: f64,
}

impl PathCost {
    pub fn new(startup: f64, total: f64) -> Self {
        Self { startup, total }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Cost of producing every row after the first
    pub fn run(&self) -> f64 {
        self.total - self.startup
    }

    pub fn is_cheaper_than(&self, other: &PathCost) -> bool {
        self.total < other.total
    }

    /// Penalize the cost unless `enabled`
    pub fn penalize_unless(self, enabled: bool) -> Self {
        if enabled {
            self
        } else {
            Self::new(self.startup + DISABLE_COST, self.total + DISABLE_COST)
        }
    }
}

/// Index access method as far as costing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Ordered,
    Hashed,
}

/// Clamp an estimated row count to at least one row
pub fn clamp_row_est(rows: f64) -> f64 {
    if rows.is_nan() || rows <= 1.0 {
        1.0
    } else {
        rows.round()
    }
}

/// Join cardinality used by the exhaustive orderer
///
/// Estimates are capped at `i32::MAX`, so a larger product never looks
/// smaller than a lesser one.
pub fn cap_join_size(rows: f64) -> f64 {
    clamp_row_est(rows).min(MAX_CARDINALITY)
}

/// Join cardinality used by the genetic orderer's fitness
///
/// Estimates that reach `i32::MAX` are replaced by `ceil(log_1.5(size))`
/// to keep tour costs finite.
pub fn clamp_join_size(rows: f64) -> f64 {
    let rows = clamp_row_est(rows);
    if rows >= MAX_CARDINALITY {
        (rows.ln() / LOG_BASE.ln()).ceil()
    } else {
        rows
    }
}

/// Cost estimator
#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    constants: CostConstants,
}

impl CostEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constants(constants: CostConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &CostConstants {
        &self.constants
    }

    /// Cost of evaluating `ops` operators once
    pub fn qual_cost(&self, ops: usize) -> f64 {
        ops as f64 * self.constants.cpu_operator_cost
    }

    /// Sequential scan reading every page and testing `qual_ops` operators per tuple
    pub fn estimate_seq_scan(&self, pages: f64, tuples: f64, qual_ops: usize) -> PathCost {
        let io_cost = pages.max(1.0) * self.constants.seq_page_cost;
        let cpu_cost = tuples * (self.constants.cpu_tuple_cost + self.qual_cost(qual_ops));
        PathCost::new(0.0, io_cost + cpu_cost)
    }

    /// Index scan fetching `selectivity` of the relation
    pub fn estimate_index_scan(
        &self,
        kind: IndexKind,
        rel_pages: f64,
        rel_tuples: f64,
        index_pages: f64,
        index_tuples: f64,
        selectivity: f64,
        qual_ops: usize,
    ) -> PathCost {
        let c = &self.constants;
        let selectivity = selectivity.clamp(0.0, 1.0);
        let tuples_fetched = clamp_row_est(rel_tuples * selectivity);

        // Descent to the first matching entry
        let startup = match kind {
            IndexKind::Ordered => c.default_index_height as f64 * c.random_page_cost,
            IndexKind::Hashed => c.random_page_cost * 0.1,
        };

        let leaf_pages = (index_pages * selectivity).max(1.0);
        let index_io = match kind {
            IndexKind::Ordered => leaf_pages * c.random_page_cost,
            IndexKind::Hashed => 0.0,
        };
        let index_cpu = (index_tuples.max(rel_tuples) * selectivity).max(1.0) * c.cpu_index_tuple_cost;

        // Each fetched tuple may live on its own page
        let heap_pages = tuples_fetched.min(rel_pages.max(1.0));
        let heap_io = heap_pages * c.random_page_cost;
        let heap_cpu = tuples_fetched * (c.cpu_tuple_cost + self.qual_cost(qual_ops));

        PathCost::new(startup, startup + index_io + index_cpu + heap_io + heap_cpu)
    }

    /// TID scan fetching `ntids` tuples directly
    pub fn estimate_tid_scan(&self, ntids: usize, qual_ops: usize) -> PathCost {
        let c = &self.constants;
        let n = ntids.max(1) as f64;
        PathCost::new(
            0.0,
            n * (c.random_page_cost + c.cpu_tuple_cost + self.qual_cost(qual_ops)),
        )
    }

    /// Sort of `rows` rows of `width` bytes on top of `input`
    pub fn estimate_sort(&self, input: PathCost, rows: f64, width: usize) -> PathCost {
        let c = &self.constants;
        let rows = rows.max(2.0);
        let comparison_cost = 2.0 * c.cpu_operator_cost;
        let mut startup = input.total + comparison_cost * rows * rows.log2();

        let bytes = rows * (width as f64 + TUPLE_OVERHEAD);
        if bytes > c.sort_mem_bytes as f64 {
            let pages = (bytes / c.page_size as f64).ceil();
            // Runs are written out once and merged back in
            startup += 2.0 * pages * c.seq_page_cost;
        }
        let run = c.cpu_operator_cost * rows;
        PathCost::new(startup, startup + run)
    }

    /// Nested loop rescanning `inner` once per outer row
    pub fn estimate_nestloop(
        &self,
        outer: PathCost,
        outer_rows: f64,
        inner: PathCost,
        inner_rows: f64,
        output_rows: f64,
        qual_ops: usize,
    ) -> PathCost {
        let c = &self.constants;
        let startup = outer.startup + inner.startup;
        let total = outer.total
            + outer_rows * inner.total
            + outer_rows * inner_rows * self.qual_cost(qual_ops)
            + output_rows * c.cpu_tuple_cost;
        PathCost::new(startup, total)
    }

    /// Merge join over inputs that already arrive sorted
    pub fn estimate_merge_join(
        &self,
        outer: PathCost,
        outer_rows: f64,
        inner: PathCost,
        inner_rows: f64,
        output_rows: f64,
        qual_ops: usize,
    ) -> PathCost {
        let c = &self.constants;
        let startup = outer.startup + inner.startup;
        let merge = (outer_rows + inner_rows) * c.cpu_operator_cost;
        let total = outer.total
            + inner.total
            + merge
            + output_rows * (c.cpu_tuple_cost + self.qual_cost(qual_ops));
        PathCost::new(startup, total)
    }

    /// Hash join building on `inner`
    ///
    /// Returns `None` when the inner side would need more than
    /// `max_batches` batches under `hash_mem` bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate_hash_join(
        &self,
        outer: PathCost,
        outer_rows: f64,
        outer_width: usize,
        inner: PathCost,
        inner_rows: f64,
        inner_width: usize,
        output_rows: f64,
        hash_mem: usize,
        max_batches: usize,
    ) -> Option<PathCost> {
        let c = &self.constants;
        let inner_bytes =
            inner_rows * (inner_width as f64 + TUPLE_OVERHEAD) * c.hash_memory_factor;
        let nbatch = (inner_bytes / hash_mem.max(1) as f64).ceil().max(1.0);
        if nbatch > max_batches as f64 {
            return None;
        }

        let build = inner_rows * (c.cpu_tuple_cost + c.hash_build_cost);
        let probe = outer_rows * (c.cpu_tuple_cost + c.hash_probe_cost + c.cpu_operator_cost);

        let spill = if nbatch > 1.0 {
            let outer_pages =
                (outer_rows * (outer_width as f64 + TUPLE_OVERHEAD) / c.page_size as f64).ceil();
            let inner_pages = (inner_bytes / c.page_size as f64).ceil();
            // Everything except the first batch is written and read back
            let fanout = (nbatch - 1.0) / nbatch;
            2.0 * (outer_pages + inner_pages) * c.seq_page_cost * fanout
        } else {
            0.0
        };

        let startup = inner.total + build;
        let total = outer.total + startup + probe + spill + output_rows * c.cpu_tuple_cost;
        Some(PathCost::new(outer.startup + startup, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_scan_cost() {
        let est = CostEstimator::new();
        let cost = est.estimate_seq_scan(100.0, 10_000.0, 0);
        assert_eq!(cost.startup, 0.0);
        assert!((cost.total - (100.0 + 100.0)).abs() < 1e-9);
        let filtered = est.estimate_seq_scan(100.0, 10_000.0, 2);
        assert!(filtered.total > cost.total);
    }

    #[test]
    fn test_selective_index_scan_beats_seq_scan() {
        let est = CostEstimator::new();
        let seq = est.estimate_seq_scan(1_000.0, 100_000.0, 1);
        let idx = est.estimate_index_scan(
            IndexKind::Ordered,
            1_000.0,
            100_000.0,
            300.0,
            100_000.0,
            0.0001,
            1,
        );
        assert!(idx.is_cheaper_than(&seq));
        let unselective = est.estimate_index_scan(
            IndexKind::Ordered,
            1_000.0,
            100_000.0,
            300.0,
            100_000.0,
            0.5,
            1,
        );
        assert!(seq.is_cheaper_than(&unselective));
    }

    #[test]
    fn test_sort_grows_superlinearly() {
        let est = CostEstimator::new();
        let small = est.estimate_sort(PathCost::zero(), 1_000.0, 32);
        let large = est.estimate_sort(PathCost::zero(), 10_000.0, 32);
        assert!(large.startup > 10.0 * small.startup);
        assert!(small.total >= small.startup);
    }

    #[test]
    fn test_hash_join_budget() {
        let est = CostEstimator::new();
        let input = PathCost::new(0.0, 10.0);
        let fits = est.estimate_hash_join(input, 1000.0, 32, input, 1000.0, 32, 1000.0, 1 << 20, 1);
        assert!(fits.is_some());
        let too_big =
            est.estimate_hash_join(input, 1000.0, 32, input, 1_000_000.0, 32, 1000.0, 1 << 20, 4);
        assert!(too_big.is_none());
        let spilled =
            est.estimate_hash_join(input, 1000.0, 32, input, 1_000_000.0, 32, 1000.0, 1 << 20, 1024)
                .unwrap();
        let in_memory =
            est.estimate_hash_join(input, 1000.0, 32, input, 1_000_000.0, 32, 1000.0, 1 << 30, 1024)
                .unwrap();
        assert!(spilled.total > in_memory.total);
    }

    /// Test that capped join sizes never shrink as the product grows
    #[test]
    fn test_join_size_cap_is_monotonic() {
        let smaller = cap_join_size(2.0e9);
        let larger = cap_join_size(3.0e9);
        assert!(larger >= smaller);
        assert_eq!(larger, i32::MAX as f64);
        assert_eq!(cap_join_size(0.2), 1.0);
        assert_eq!(cap_join_size(1234.4), 1234.0);
    }

    #[test]
    fn test_join_size_clamping() {
        assert_eq!(clamp_join_size(0.2), 1.0);
        assert_eq!(clamp_join_size(1234.4), 1234.0);
        let huge = clamp_join_size(1e12);
        assert_eq!(huge, (1e12f64.ln() / 1.5f64.ln()).ceil());
        assert!(huge < 100.0);
    }
}
