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

//! Core types and definitions for Relcore
//!
//! This module contains the fundamental types shared by the planner and
//! the executor:
//!
//! - [`DataType`] - SQL data types (INTEGER, TEXT, FLOAT, etc.)
//! - [`Value`] - Runtime values with type information
//! - [`Row`] - A tuple (collection of values)
//! - [`Error`] - Error taxonomy for all operations

pub mod error;
pub mod row;
pub mod types;
pub mod value;

pub use error::{Error, ErrorCategory, Result};
pub use row::Row;
pub use types::{AttrNumber, DataType, Oid, RelId, CTID_ATTNO, INVALID_OID};
pub use value::{parse_timestamp, Value};
