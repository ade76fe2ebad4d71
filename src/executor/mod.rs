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

//! Executor
//!
//! Pull-based operators and the state they share:
//!
//! - [`operator`] - the [`Operator`] trait and a row source over a vector
//! - [`context`] - parameters, registry, work memory and cancellation
//! - [`memory`] - arena accounting for transition values
//! - [`tuplestore`] - spillable row buffer with read pointers and marks
//! - [`window`] - the window function operator

pub mod context;
pub mod memory;
pub mod operator;
pub mod tuplestore;
pub mod window;

pub use context::{CancellationHandle, ExecutionConfig, ExecutionContext, DEFAULT_WORK_MEM};
pub use memory::{ArenaId, HeapSize, MemoryArena, Transition};
pub use operator::{collect_rows, Operator, VecSource};
pub use tuplestore::{PointerFlags, ReadPointerId, Tuplestore, TuplestoreConfig};
pub use window::{
    AggregateStats, FrameOptions, GroupColumn, InRangeSpec, RunStatus, Seek, WindowAgg,
    WindowAggSpec, WindowFuncDesc, WindowFuncKind, WindowObject,
};
