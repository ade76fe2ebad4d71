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

//! # Relcore - relational query planning and window execution
//!
//! Relcore is the core of a relational query engine: a cost-based planner
//! that turns a query over base relations into an executable plan, and the
//! window aggregation operator that evaluates window functions over sorted
//! input.
//!
//! ## Quick Start
//!
//! ```rust
//! use relcore::catalog::{CatalogSnapshot, ColumnInfo, RelationInfo};
//! use relcore::core::DataType;
//! use relcore::expr::Expr;
//! use relcore::optimizer::{plan, PlannerConfig, Query, TargetEntry};
//!
//! let catalog = CatalogSnapshot::new().with_relation(
//!     RelationInfo::new(1, "t", 10.0, 1000.0).column(ColumnInfo::new("a", DataType::Integer)),
//! );
//! let query = Query::new()
//!     .relation(1)
//!     .target(TargetEntry::new(Expr::var(1, 1, DataType::Integer), "a"));
//!
//! let planned = plan(&query, &catalog, &PlannerConfig::default()).unwrap();
//! assert!(planned.plan.explain().starts_with("Seq Scan"));
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Core types ([`DataType`], [`Value`], [`Row`], [`Error`])
//! - [`catalog`] - Relation, index, operator and function metadata
//! - [`expr`] - Expression trees, walkers and evaluation
//! - [`functions`] - Operators, aggregates and window functions
//! - [`optimizer`] - Paths, join search, genetic search, plan finalization
//! - [`executor`] - Tuplestore and the window aggregation operator

pub mod catalog;
pub mod core;
pub mod executor;
pub mod expr;
pub mod functions;
pub mod optimizer;

pub use catalog::{Catalog, CatalogSnapshot};
pub use core::{DataType, Error, ErrorCategory, Result, Row, Value};
pub use executor::{
    ExecutionConfig, ExecutionContext, Operator, Tuplestore, TuplestoreConfig, WindowAgg,
    WindowAggSpec,
};
pub use expr::Expr;
pub use functions::FunctionRegistry;
pub use optimizer::{plan, GeqoConfig, Plan, PlannedStmt, PlannerConfig, Query};
