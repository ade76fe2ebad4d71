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

//! Catalog oracle
//!
//! Read-only metadata the planner consults: relation and index statistics,
//! operator properties, operator classes, function costs and type layout.
//! Every lookup takes an id and returns an owned copy. An id the catalog
//! does not know is a programming error on the caller's side and surfaces
//! as [`Error::CatalogMismatch`](crate::core::Error::CatalogMismatch).

pub mod oids;
mod snapshot;

use serde::{Deserialize, Serialize};

use crate::core::{AttrNumber, DataType, Oid, RelId, Result};
use crate::expr::Expr;

pub use crate::functions::Volatility;
pub use snapshot::CatalogSnapshot;

/// Default selectivity of an equality clause without statistics
pub const DEFAULT_EQ_SEL: f64 = 0.005;

/// Default selectivity of an inequality or opaque function clause
pub const DEFAULT_INEQ_SEL: f64 = 1.0 / 3.0;

/// Column statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub typ: DataType,
    /// Number of distinct values; 0 when unknown
    pub ndistinct: f64,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, typ: DataType) -> Self {
        Self {
            name: name.into(),
            typ,
            ndistinct: 0.0,
        }
    }

    pub fn with_ndistinct(mut self, ndistinct: f64) -> Self {
        self.ndistinct = ndistinct;
        self
    }
}

/// Statistics of a base relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub relid: RelId,
    pub name: String,
    pub pages: f64,
    pub tuples: f64,
    /// Average row width in bytes
    pub width: usize,
    /// Columns in attribute-number order (attno 1 is `columns[0]`)
    pub columns: Vec<ColumnInfo>,
    /// Indexes defined on the relation
    pub indexes: Vec<Oid>,
}

impl RelationInfo {
    pub fn new(relid: RelId, name: impl Into<String>, pages: f64, tuples: f64) -> Self {
        Self {
            relid,
            name: name.into(),
            pages,
            tuples,
            width: 32,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn has_index(&self) -> bool {
        !self.indexes.is_empty()
    }

    /// Column metadata by attribute number; system columns have none
    pub fn column_info(&self, attno: AttrNumber) -> Option<&ColumnInfo> {
        if attno <= 0 {
            return None;
        }
        self.columns.get(attno as usize - 1)
    }
}

/// Index access method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexAm {
    /// Ordered; usable with a prefix of its keys
    BTree,
    /// Equality only; every key must be matched
    Hash,
    Other,
}

impl IndexAm {
    pub fn supports_partial_keys(&self) -> bool {
        matches!(self, IndexAm::BTree)
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self, IndexAm::BTree)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexAm::BTree => "btree",
            IndexAm::Hash => "hash",
            IndexAm::Other => "other",
        }
    }
}

/// Index metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub oid: Oid,
    pub relid: RelId,
    pub name: String,
    pub am: IndexAm,
    /// Key columns; 0 marks the key computed by `expression`
    pub keys: Vec<AttrNumber>,
    /// Operator class per key
    pub opclasses: Vec<Oid>,
    /// Partial index predicate
    pub predicate: Option<Expr>,
    /// Functional index expression
    pub expression: Option<Expr>,
    pub pages: f64,
    pub tuples: f64,
}

impl IndexInfo {
    pub fn new(oid: Oid, relid: RelId, name: impl Into<String>, am: IndexAm) -> Self {
        Self {
            oid,
            relid,
            name: name.into(),
            am,
            keys: Vec::new(),
            opclasses: Vec::new(),
            predicate: None,
            expression: None,
            pages: 1.0,
            tuples: 0.0,
        }
    }

    pub fn key(mut self, attno: AttrNumber, opclass: Oid) -> Self {
        self.keys.push(attno);
        self.opclasses.push(opclass);
        self
    }

    /// Single-key functional index over `expr`
    pub fn expression_key(mut self, expr: Expr, opclass: Oid) -> Self {
        self.keys = vec![0];
        self.opclasses = vec![opclass];
        self.expression = Some(expr);
        self
    }

    pub fn with_predicate(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_size(mut self, pages: f64, tuples: f64) -> Self {
        self.pages = pages;
        self.tuples = tuples;
        self
    }
}

/// Selectivity estimator attached to an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Estimator {
    /// `=`: one over the number of distinct values
    Eq,
    /// `<>`: complement of `Eq`
    Neq,
    /// `<`, `<=`, `>`, `>=`
    Scalar,
    /// Operator without an estimator
    None,
}

/// B-tree strategy numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Less = 1,
    LessEqual = 2,
    Equal = 3,
    GreaterEqual = 4,
    Greater = 5,
}

/// Operator metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub oid: Oid,
    pub name: String,
    pub left: DataType,
    pub right: DataType,
    pub result: DataType,
    /// Implementing function
    pub code: Oid,
    pub commutator: Option<Oid>,
    pub negator: Option<Oid>,
    /// Sort operators for the left and right input of a merge join
    pub merge_sortops: Option<(Oid, Oid)>,
    pub hashjoinable: bool,
    pub restrict: Estimator,
    pub join: Estimator,
}

/// Operator class: operators an index key supports, by strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpClassInfo {
    pub oid: Oid,
    pub am: IndexAm,
    pub input: DataType,
    pub members: Vec<(Strategy, Oid)>,
}

impl OpClassInfo {
    pub fn strategy_of(&self, opno: Oid) -> Option<Strategy> {
        self.members
            .iter()
            .find(|(_, op)| *op == opno)
            .map(|(s, _)| *s)
    }

    pub fn operator(&self, strategy: Strategy) -> Option<Oid> {
        self.members
            .iter()
            .find(|(s, _)| *s == strategy)
            .map(|(_, op)| *op)
    }
}

/// Implementation language of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Internal,
    Sql,
}

/// Per-call cost properties of a function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuncCost {
    /// Percentage of input bytes touched
    pub byte_pct: f64,
    pub per_byte_cpu: f64,
    pub per_call_cpu: f64,
    /// Output size relative to input
    pub out_in_ratio: f64,
}

impl Default for FuncCost {
    fn default() -> Self {
        Self {
            byte_pct: 100.0,
            per_byte_cpu: 0.0,
            per_call_cpu: 1.0,
            out_in_ratio: 1.0,
        }
    }
}

/// Function metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMeta {
    pub oid: Oid,
    pub name: String,
    pub volatility: Volatility,
    pub strict: bool,
    pub retset: bool,
    pub language: Language,
    /// Body of set-returning or user-defined functions
    pub source: Option<String>,
    pub cost: FuncCost,
}

/// Type layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub oid: Oid,
    pub typ: DataType,
    /// Fixed length in bytes, or -1 for variable length
    pub len: i16,
    pub byval: bool,
    pub input_func: Oid,
}

/// Read-only catalog interface used by the planner
pub trait Catalog: Send + Sync {
    fn relation_info(&self, relid: RelId) -> Result<RelationInfo>;

    fn index_info(&self, index: Oid) -> Result<IndexInfo>;

    /// Selectivity of `opno(args)` restricting a single relation
    fn restriction_selectivity(&self, opno: Oid, args: &[Expr], relid: RelId) -> Result<f64>;

    /// Selectivity of `opno(args)` joining two or more relations
    fn join_selectivity(&self, opno: Oid, args: &[Expr]) -> Result<f64>;

    /// Left and right sort operators when `opno` can drive a merge join
    fn op_mergejoinable(&self, opno: Oid, left: DataType, right: DataType)
        -> Result<Option<(Oid, Oid)>>;

    fn op_hashjoinable(&self, opno: Oid, left: DataType, right: DataType) -> Result<bool>;

    fn get_commutator(&self, opno: Oid) -> Result<Option<Oid>>;

    fn get_typlenbyval(&self, typ: Oid) -> Result<(i16, bool)>;

    /// Function implementing the operator
    fn get_opcode(&self, opno: Oid) -> Result<Oid>;

    fn get_func_cost_vector(&self, funcid: Oid) -> Result<FuncCost>;

    fn operator(&self, opno: Oid) -> Result<OperatorInfo>;

    fn opclass(&self, opclass: Oid) -> Result<OpClassInfo>;

    /// Operator classes of access method `am` that contain `opno`
    fn operator_opclasses(&self, opno: Oid, am: IndexAm) -> Result<Vec<Oid>>;

    fn function(&self, funcid: Oid) -> Result<FunctionMeta>;

    fn type_info(&self, typ: Oid) -> Result<TypeInfo>;
}
