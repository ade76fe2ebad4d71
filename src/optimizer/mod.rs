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

//! Query optimizer
//!
//! Turns a [`Query`] into a finalized [`Plan`]:
//!
//! - `clauses`, `selectivity` - WHERE-clause classification and estimates
//! - `indxpath`, `joinpath`, `path` - access and join paths with pruning
//! - `joinrels`, `allpaths` - exhaustive level-by-level join search
//! - `geqo` - genetic join search for large relation counts
//! - `createplan`, `setrefs`, `subselect` - plan building and finalization
//! - `planner` - the [`plan`] entry point

pub mod allpaths;
pub mod clauses;
pub mod config;
pub mod cost;
pub mod createplan;
pub mod geqo;
pub mod indxpath;
pub mod joinpath;
pub mod joinrels;
pub mod path;
pub mod pathkeys;
pub mod plan;
pub mod planner;
pub mod predtest;
pub mod query;
pub mod relids;
pub mod relnode;
pub mod selectivity;
pub mod setrefs;
pub mod subselect;

pub use clauses::{classify_quals, ClassifiedQuals, JoinInfo, MergeOrder, RestrictInfo};
pub use config::{
    Effort, GeqoConfig, PlannerConfig, Recombination, DEFAULT_GEQO_THRESHOLD, DEFAULT_HASH_MEM,
};
pub use cost::{
    cap_join_size, clamp_join_size, clamp_row_est, CostConstants, CostEstimator, IndexKind,
    PathCost, DEFAULT_COST_CONSTANTS, DISABLE_COST,
};
pub use path::{add_path, OrIndexArm, Path, PathKind};
pub use pathkeys::{KeyComparison, PathKey, PathOrder};
pub use plan::{InitPlan, Plan, PlanKind, SortKey};
pub use planner::{plan, PlannedStmt};
pub use query::{Query, SortClause, TargetEntry, WindowClause};
pub use relids::Relids;
pub use relnode::{PlannerContext, RelOptInfo};
pub use setrefs::verify_plan_refs;
