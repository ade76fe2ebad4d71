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

//! Planner input
//!
//! A parsed and rewritten query: the base relations it reads, its target
//! list, its qualification, and the upper clauses (GROUP BY, window
//! clauses, ORDER BY) the planner stacks above the join tree.

use serde::{Deserialize, Serialize};

use crate::core::{Oid, RelId};
use crate::executor::window::{FrameOptions, InRangeSpec, WindowFuncDesc};
use crate::expr::Expr;

/// One output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub expr: Expr,
    pub name: String,
    /// Carried for upper nodes only, not part of the user-visible result
    pub resjunk: bool,
}

impl TargetEntry {
    pub fn new(expr: Expr, name: impl Into<String>) -> Self {
        Self {
            expr,
            name: name.into(),
            resjunk: false,
        }
    }

    pub fn junk(expr: Expr, name: impl Into<String>) -> Self {
        Self {
            expr,
            name: name.into(),
            resjunk: true,
        }
    }
}

/// ORDER BY, GROUP BY, PARTITION BY or window ORDER BY item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortClause {
    /// 0-based index into the query target list
    pub tle_index: usize,
    /// `<` for ascending, `>` for descending
    pub sortop: Oid,
    /// Equality operator for grouping and peer detection
    pub eqop: Oid,
    pub nulls_first: bool,
}

impl SortClause {
    pub fn new(tle_index: usize, sortop: Oid, eqop: Oid) -> Self {
        Self {
            tle_index,
            sortop,
            eqop,
            nulls_first: false,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls_first = true;
        self
    }
}

/// A window specification with the functions computed over it
///
/// Each function appends one output column, after the target list and
/// after the columns of any earlier window clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowClause {
    pub partition_by: Vec<SortClause>,
    pub order_by: Vec<SortClause>,
    pub frame: FrameOptions,
    pub start_offset: Option<Expr>,
    pub end_offset: Option<Expr>,
    pub in_range: Option<InRangeSpec>,
    /// Arguments and filters reference base relation columns
    pub functions: Vec<WindowFuncDesc>,
}

impl Default for WindowClause {
    fn default() -> Self {
        Self {
            partition_by: Vec::new(),
            order_by: Vec::new(),
            frame: FrameOptions::default(),
            start_offset: None,
            end_offset: None,
            in_range: None,
            functions: Vec::new(),
        }
    }
}

impl WindowClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_by(mut self, clause: SortClause) -> Self {
        self.partition_by.push(clause);
        self
    }

    pub fn order_by(mut self, clause: SortClause) -> Self {
        self.order_by.push(clause);
        self
    }

    pub fn frame(mut self, frame: FrameOptions) -> Self {
        self.frame = frame;
        self
    }

    pub fn offsets(mut self, start: Option<Expr>, end: Option<Expr>) -> Self {
        self.start_offset = start;
        self.end_offset = end;
        self
    }

    pub fn in_range(mut self, in_range: InRangeSpec) -> Self {
        self.in_range = Some(in_range);
        self
    }

    pub fn function(mut self, desc: WindowFuncDesc) -> Self {
        self.functions.push(desc);
        self
    }

    /// Sort order the input must arrive in
    pub fn sort_clauses(&self) -> Vec<SortClause> {
        self.partition_by
            .iter()
            .chain(self.order_by.iter())
            .cloned()
            .collect()
    }
}

/// A query ready for planning
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    /// Base relations, by catalog relation id
    pub relations: Vec<RelId>,
    pub target_list: Vec<TargetEntry>,
    pub qual: Option<Expr>,
    pub group_by: Vec<SortClause>,
    pub windows: Vec<WindowClause>,
    pub order_by: Vec<SortClause>,
    /// Overrides the planner's bushy-plan setting
    pub enable_bushy: Option<bool>,
    /// Overrides the planner's genetic-orderer setting
    pub enable_geqo: Option<bool>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, relid: RelId) -> Self {
        self.relations.push(relid);
        self
    }

    pub fn target(mut self, entry: TargetEntry) -> Self {
        self.target_list.push(entry);
        self
    }

    /// AND `clause` into the qualification
    pub fn filter(mut self, clause: Expr) -> Self {
        self.qual = match self.qual.take() {
            None => Some(clause),
            Some(existing) => {
                let mut conjuncts = existing.into_conjuncts();
                conjuncts.push(clause);
                Expr::from_conjuncts(conjuncts)
            }
        };
        self
    }

    pub fn group_by(mut self, clause: SortClause) -> Self {
        self.group_by.push(clause);
        self
    }

    pub fn window(mut self, clause: WindowClause) -> Self {
        self.windows.push(clause);
        self
    }

    pub fn order_by(mut self, clause: SortClause) -> Self {
        self.order_by.push(clause);
        self
    }

    pub fn bushy(mut self, enabled: bool) -> Self {
        self.enable_bushy = Some(enabled);
        self
    }

    pub fn geqo(mut self, enabled: bool) -> Self {
        self.enable_geqo = Some(enabled);
        self
    }

    /// True if any target entry computes an aggregate
    pub fn has_aggregates(&self) -> bool {
        self.target_list.iter().any(|t| t.expr.contains_aggregates())
    }
}
