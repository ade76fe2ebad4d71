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

//! Window Functions
//!
//! Pure window functions, evaluated once per row through a
//! [`WindowObject`](crate::executor::window::WindowObject):
//!
//! - [`RowNumberFunction`] - ROW_NUMBER()
//! - [`RankFunction`] - RANK()
//! - [`DenseRankFunction`] - DENSE_RANK()
//! - [`PercentRankFunction`] - PERCENT_RANK()
//! - [`CumeDistFunction`] - CUME_DIST()
//! - [`NtileFunction`] - NTILE(n)
//! - [`LeadLagFunction`] - LEAD/LAG(value [, offset [, default]])
//! - [`FirstValueFunction`] - FIRST_VALUE(value)
//! - [`LastValueFunction`] - LAST_VALUE(value)
//! - [`NthValueFunction`] - NTH_VALUE(value, n)

mod lead_lag;
mod ntile;
mod rank;
mod row_number;
mod value;

pub use lead_lag::LeadLagFunction;
pub use ntile::NtileFunction;
pub use rank::{CumeDistFunction, DenseRankFunction, PercentRankFunction, RankFunction};
pub use row_number::RowNumberFunction;
pub use value::{FirstValueFunction, LastValueFunction, NthValueFunction};

use crate::catalog::oids::*;

use super::registry::FunctionRegistry;

/// Register every built-in window function
pub fn register(registry: &mut FunctionRegistry) {
    registry.register_window(WIN_ROW_NUMBER, RowNumberFunction);
    registry.register_window(WIN_RANK, RankFunction);
    registry.register_window(WIN_DENSE_RANK, DenseRankFunction);
    registry.register_window(WIN_PERCENT_RANK, PercentRankFunction);
    registry.register_window(WIN_CUME_DIST, CumeDistFunction);
    registry.register_window(WIN_NTILE, NtileFunction);
    registry.register_window(WIN_LAG, LeadLagFunction::lag(1));
    registry.register_window(WIN_LAG_OFFSET, LeadLagFunction::lag(2));
    registry.register_window(WIN_LAG_OFFSET_DEFAULT, LeadLagFunction::lag(3));
    registry.register_window(WIN_LEAD, LeadLagFunction::lead(1));
    registry.register_window(WIN_LEAD_OFFSET, LeadLagFunction::lead(2));
    registry.register_window(WIN_LEAD_OFFSET_DEFAULT, LeadLagFunction::lead(3));
    registry.register_window(WIN_FIRST_VALUE, FirstValueFunction);
    registry.register_window(WIN_LAST_VALUE, LastValueFunction);
    registry.register_window(WIN_NTH_VALUE, NthValueFunction);
}
