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

//! In-memory catalog snapshot with the built-in operator table

use rustc_hash::FxHashMap;

use crate::core::{DataType, Error, Oid, RelId, Result, CTID_ATTNO, INVALID_OID};
use crate::expr::Expr;
use crate::functions::FunctionRegistry;

use super::oids::*;
use super::{
    Catalog, Estimator, FuncCost, FunctionMeta, IndexAm, IndexInfo, Language, OpClassInfo,
    OperatorInfo, RelationInfo, Strategy, TypeInfo, DEFAULT_EQ_SEL, DEFAULT_INEQ_SEL,
};

/// Immutable catalog contents for the duration of a query
///
/// Built once with the `with_*` methods and then shared read-only with the
/// planner.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    relations: FxHashMap<RelId, RelationInfo>,
    indexes: FxHashMap<Oid, IndexInfo>,
    operators: FxHashMap<Oid, OperatorInfo>,
    opclasses: FxHashMap<Oid, OpClassInfo>,
    functions: FxHashMap<Oid, FunctionMeta>,
    types: FxHashMap<Oid, TypeInfo>,
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogSnapshot {
    /// Snapshot holding only the built-in operators, functions and types
    pub fn new() -> Self {
        let mut snapshot = Self {
            relations: FxHashMap::default(),
            indexes: FxHashMap::default(),
            operators: FxHashMap::default(),
            opclasses: FxHashMap::default(),
            functions: FxHashMap::default(),
            types: FxHashMap::default(),
        };
        snapshot.load_builtins();
        snapshot
    }

    pub fn with_relation(mut self, relation: RelationInfo) -> Self {
        self.relations.insert(relation.relid, relation);
        self
    }

    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indexes.insert(index.oid, index);
        self
    }

    pub fn with_operator(mut self, operator: OperatorInfo) -> Self {
        self.operators.insert(operator.oid, operator);
        self
    }

    pub fn with_opclass(mut self, opclass: OpClassInfo) -> Self {
        self.opclasses.insert(opclass.oid, opclass);
        self
    }

    pub fn with_function(mut self, function: FunctionMeta) -> Self {
        self.functions.insert(function.oid, function);
        self
    }

    fn load_builtins(&mut self) {
        // (type, [eq, ne, lt, le, gt, ge] operators, matching functions, hashable)
        let comparisons: [(DataType, [Oid; 6], [Oid; 6], bool); 4] = [
            (
                DataType::Integer,
                [INT8_EQ_OP, INT8_NE_OP, INT8_LT_OP, INT8_LE_OP, INT8_GT_OP, INT8_GE_OP],
                [F_INT8EQ, F_INT8NE, F_INT8LT, F_INT8LE, F_INT8GT, F_INT8GE],
                true,
            ),
            (
                DataType::Float,
                [FLOAT8_EQ_OP, FLOAT8_NE_OP, FLOAT8_LT_OP, FLOAT8_LE_OP, FLOAT8_GT_OP, FLOAT8_GE_OP],
                [F_FLOAT8EQ, F_FLOAT8NE, F_FLOAT8LT, F_FLOAT8LE, F_FLOAT8GT, F_FLOAT8GE],
                true,
            ),
            (
                DataType::Text,
                [TEXT_EQ_OP, TEXT_NE_OP, TEXT_LT_OP, TEXT_LE_OP, TEXT_GT_OP, TEXT_GE_OP],
                [F_TEXTEQ, F_TEXTNE, F_TEXT_LT, F_TEXT_LE, F_TEXT_GT, F_TEXT_GE],
                true,
            ),
            (
                DataType::Timestamp,
                [
                    TIMESTAMP_EQ_OP,
                    TIMESTAMP_NE_OP,
                    TIMESTAMP_LT_OP,
                    TIMESTAMP_LE_OP,
                    TIMESTAMP_GT_OP,
                    TIMESTAMP_GE_OP,
                ],
                [
                    F_TIMESTAMP_EQ,
                    F_TIMESTAMP_NE,
                    F_TIMESTAMP_LT,
                    F_TIMESTAMP_LE,
                    F_TIMESTAMP_GT,
                    F_TIMESTAMP_GE,
                ],
                false,
            ),
        ];
        const NAMES: [&str; 6] = ["=", "<>", "<", "<=", ">", ">="];
        // Index of the commutator and negator within the same group
        const COMMUTATOR: [usize; 6] = [0, 1, 4, 5, 2, 3];
        const NEGATOR: [usize; 6] = [1, 0, 5, 4, 3, 2];

        for (typ, ops, funcs, hashable) in comparisons {
            for i in 0..6 {
                let estimator = match i {
                    0 => Estimator::Eq,
                    1 => Estimator::Neq,
                    _ => Estimator::Scalar,
                };
                self.operators.insert(
                    ops[i],
                    OperatorInfo {
                        oid: ops[i],
                        name: NAMES[i].to_string(),
                        left: typ,
                        right: typ,
                        result: DataType::Boolean,
                        code: funcs[i],
                        commutator: Some(ops[COMMUTATOR[i]]),
                        negator: Some(ops[NEGATOR[i]]),
                        merge_sortops: (i == 0).then_some((ops[2], ops[2])),
                        hashjoinable: i == 0 && hashable,
                        restrict: estimator,
                        join: estimator,
                    },
                );
            }
        }

        for (oid, typ, code, hashable) in [
            (BOOL_EQ_OP, DataType::Boolean, F_BOOLEQ, true),
            (TID_EQ_OP, DataType::Tid, F_TIDEQ, false),
        ] {
            self.operators.insert(
                oid,
                OperatorInfo {
                    oid,
                    name: "=".to_string(),
                    left: typ,
                    right: typ,
                    result: DataType::Boolean,
                    code,
                    commutator: Some(oid),
                    negator: None,
                    merge_sortops: None,
                    hashjoinable: hashable,
                    restrict: Estimator::Eq,
                    join: Estimator::Eq,
                },
            );
        }

        for (oid, name, typ, code) in [
            (INT8_PLUS_OP, "+", DataType::Integer, F_INT8PL),
            (INT8_MINUS_OP, "-", DataType::Integer, F_INT8MI),
            (INT8_MUL_OP, "*", DataType::Integer, F_INT8MUL),
            (INT8_DIV_OP, "/", DataType::Integer, F_INT8DIV),
            (FLOAT8_PLUS_OP, "+", DataType::Float, F_FLOAT8PL),
            (FLOAT8_MINUS_OP, "-", DataType::Float, F_FLOAT8MI),
            (FLOAT8_MUL_OP, "*", DataType::Float, F_FLOAT8MUL),
            (FLOAT8_DIV_OP, "/", DataType::Float, F_FLOAT8DIV),
            (TEXT_CONCAT_OP, "||", DataType::Text, F_TEXTCAT),
        ] {
            let commutes = matches!(name, "+" | "*");
            self.operators.insert(
                oid,
                OperatorInfo {
                    oid,
                    name: name.to_string(),
                    left: typ,
                    right: typ,
                    result: typ,
                    code,
                    commutator: commutes.then_some(oid),
                    negator: None,
                    merge_sortops: None,
                    hashjoinable: false,
                    restrict: Estimator::None,
                    join: Estimator::None,
                },
            );
        }

        let btree = |oid, input, ops: [Oid; 5]| OpClassInfo {
            oid,
            am: IndexAm::BTree,
            input,
            members: vec![
                (Strategy::Less, ops[0]),
                (Strategy::LessEqual, ops[1]),
                (Strategy::Equal, ops[2]),
                (Strategy::GreaterEqual, ops[3]),
                (Strategy::Greater, ops[4]),
            ],
        };
        for opclass in [
            btree(
                INT8_BTREE_OPS,
                DataType::Integer,
                [INT8_LT_OP, INT8_LE_OP, INT8_EQ_OP, INT8_GE_OP, INT8_GT_OP],
            ),
            btree(
                FLOAT8_BTREE_OPS,
                DataType::Float,
                [FLOAT8_LT_OP, FLOAT8_LE_OP, FLOAT8_EQ_OP, FLOAT8_GE_OP, FLOAT8_GT_OP],
            ),
            btree(
                TEXT_BTREE_OPS,
                DataType::Text,
                [TEXT_LT_OP, TEXT_LE_OP, TEXT_EQ_OP, TEXT_GE_OP, TEXT_GT_OP],
            ),
            btree(
                TIMESTAMP_BTREE_OPS,
                DataType::Timestamp,
                [
                    TIMESTAMP_LT_OP,
                    TIMESTAMP_LE_OP,
                    TIMESTAMP_EQ_OP,
                    TIMESTAMP_GE_OP,
                    TIMESTAMP_GT_OP,
                ],
            ),
            OpClassInfo {
                oid: INT8_HASH_OPS,
                am: IndexAm::Hash,
                input: DataType::Integer,
                members: vec![(Strategy::Equal, INT8_EQ_OP)],
            },
            OpClassInfo {
                oid: TEXT_HASH_OPS,
                am: IndexAm::Hash,
                input: DataType::Text,
                members: vec![(Strategy::Equal, TEXT_EQ_OP)],
            },
            OpClassInfo {
                oid: TID_BTREE_OPS,
                am: IndexAm::BTree,
                input: DataType::Tid,
                members: vec![(Strategy::Equal, TID_EQ_OP)],
            },
        ] {
            self.opclasses.insert(opclass.oid, opclass);
        }

        let registry = FunctionRegistry::shared();
        for oid in registry.scalar_oids() {
            if let Ok(info) = registry.function_info(oid) {
                self.functions.insert(
                    oid,
                    FunctionMeta {
                        oid,
                        name: info.name.to_string(),
                        volatility: info.volatility,
                        strict: info.strict,
                        retset: false,
                        language: Language::Internal,
                        source: None,
                        cost: FuncCost::default(),
                    },
                );
            }
        }

        for v in 0..8u8 {
            if let Some(typ) = DataType::from_u8(v) {
                let oid = typ.type_oid();
                self.types.insert(
                    oid,
                    TypeInfo {
                        oid,
                        typ,
                        len: typ.typlen(),
                        byval: typ.is_by_value(),
                        input_func: INVALID_OID,
                    },
                );
            }
        }
    }

    /// Distinct count of a column referenced by `expr`, if known
    fn ndistinct(&self, expr: &Expr) -> Option<f64> {
        let var = expr.as_var()?;
        let rel = self.relations.get(&var.relid()?)?;
        if var.attno == CTID_ATTNO {
            return Some(rel.tuples.max(1.0));
        }
        rel.column_info(var.attno)
            .map(|c| c.ndistinct)
            .filter(|nd| *nd > 0.0)
    }

    fn eq_selectivity(&self, args: &[Expr], relid: Option<RelId>) -> f64 {
        if args
            .iter()
            .any(|a| a.as_const().is_some_and(|c| c.value.is_null()))
        {
            return 0.0;
        }
        let nds: Vec<f64> = args
            .iter()
            .filter(|a| match (relid, a.as_var()) {
                (Some(r), Some(v)) => v.relid() == Some(r),
                _ => true,
            })
            .filter_map(|a| self.ndistinct(a))
            .collect();
        match nds.iter().cloned().fold(None, |acc: Option<f64>, nd| {
            Some(acc.map_or(nd, |a| a.max(nd)))
        }) {
            Some(nd) => 1.0 / nd,
            None => DEFAULT_EQ_SEL,
        }
    }

    fn estimate(&self, estimator: Estimator, args: &[Expr], relid: Option<RelId>) -> f64 {
        match estimator {
            Estimator::Eq => self.eq_selectivity(args, relid),
            Estimator::Neq => 1.0 - self.eq_selectivity(args, relid),
            Estimator::Scalar | Estimator::None => DEFAULT_INEQ_SEL,
        }
    }
}

impl Catalog for CatalogSnapshot {
    fn relation_info(&self, relid: RelId) -> Result<RelationInfo> {
        let mut rel = self
            .relations
            .get(&relid)
            .cloned()
            .ok_or_else(|| Error::catalog_mismatch("relation", relid))?;
        let mut indexes: Vec<Oid> = self
            .indexes
            .values()
            .filter(|i| i.relid == relid)
            .map(|i| i.oid)
            .collect();
        for oid in &rel.indexes {
            if !indexes.contains(oid) {
                indexes.push(*oid);
            }
        }
        indexes.sort_unstable();
        rel.indexes = indexes;
        Ok(rel)
    }

    fn index_info(&self, index: Oid) -> Result<IndexInfo> {
        self.indexes
            .get(&index)
            .cloned()
            .ok_or_else(|| Error::catalog_mismatch("index", index))
    }

    fn restriction_selectivity(&self, opno: Oid, args: &[Expr], relid: RelId) -> Result<f64> {
        let op = self.operator(opno)?;
        Ok(self.estimate(op.restrict, args, Some(relid)).clamp(0.0, 1.0))
    }

    fn join_selectivity(&self, opno: Oid, args: &[Expr]) -> Result<f64> {
        let op = self.operator(opno)?;
        Ok(self.estimate(op.join, args, None).clamp(0.0, 1.0))
    }

    fn op_mergejoinable(
        &self,
        opno: Oid,
        left: DataType,
        right: DataType,
    ) -> Result<Option<(Oid, Oid)>> {
        let op = self.operator(opno)?;
        if op.left != left || op.right != right {
            return Ok(None);
        }
        Ok(op.merge_sortops)
    }

    fn op_hashjoinable(&self, opno: Oid, left: DataType, right: DataType) -> Result<bool> {
        let op = self.operator(opno)?;
        Ok(op.hashjoinable && op.left == left && op.right == right)
    }

    fn get_commutator(&self, opno: Oid) -> Result<Option<Oid>> {
        Ok(self.operator(opno)?.commutator)
    }

    fn get_typlenbyval(&self, typ: Oid) -> Result<(i16, bool)> {
        let info = self.type_info(typ)?;
        Ok((info.len, info.byval))
    }

    fn get_opcode(&self, opno: Oid) -> Result<Oid> {
        Ok(self.operator(opno)?.code)
    }

    fn get_func_cost_vector(&self, funcid: Oid) -> Result<FuncCost> {
        Ok(self.function(funcid)?.cost)
    }

    fn operator(&self, opno: Oid) -> Result<OperatorInfo> {
        self.operators
            .get(&opno)
            .cloned()
            .ok_or_else(|| Error::catalog_mismatch("operator", opno))
    }

    fn opclass(&self, opclass: Oid) -> Result<OpClassInfo> {
        self.opclasses
            .get(&opclass)
            .cloned()
            .ok_or_else(|| Error::catalog_mismatch("operator class", opclass))
    }

    fn operator_opclasses(&self, opno: Oid, am: IndexAm) -> Result<Vec<Oid>> {
        let mut found: Vec<Oid> = self
            .opclasses
            .values()
            .filter(|c| c.am == am && c.strategy_of(opno).is_some())
            .map(|c| c.oid)
            .collect();
        found.sort_unstable();
        Ok(found)
    }

    fn function(&self, funcid: Oid) -> Result<FunctionMeta> {
        self.functions
            .get(&funcid)
            .cloned()
            .ok_or_else(|| Error::catalog_mismatch("function", funcid))
    }

    fn type_info(&self, typ: Oid) -> Result<TypeInfo> {
        self.types
            .get(&typ)
            .copied()
            .ok_or_else(|| Error::catalog_mismatch("type", typ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnInfo;
    use crate::core::{ErrorCategory, Value};

    fn snapshot() -> CatalogSnapshot {
        CatalogSnapshot::new()
            .with_relation(
                RelationInfo::new(1, "emp", 100.0, 10_000.0)
                    .column(ColumnInfo::new("id", DataType::Integer).with_ndistinct(10_000.0))
                    .column(ColumnInfo::new("dept", DataType::Integer).with_ndistinct(50.0)),
            )
            .with_relation(
                RelationInfo::new(2, "dept", 1.0, 50.0)
                    .column(ColumnInfo::new("id", DataType::Integer).with_ndistinct(50.0)),
            )
            .with_index(IndexInfo::new(9001, 1, "emp_id_idx", IndexAm::BTree).key(1, INT8_BTREE_OPS))
    }

    #[test]
    fn test_unknown_ids_are_catalog_mismatches() {
        let cat = snapshot();
        assert_eq!(
            cat.relation_info(99).unwrap_err().category(),
            ErrorCategory::CatalogMismatch
        );
        assert!(cat.operator(1).is_err());
        assert!(cat.get_opcode(INT8_EQ_OP).is_ok());
    }

    #[test]
    fn test_relation_lists_its_indexes() {
        let rel = snapshot().relation_info(1).unwrap();
        assert!(rel.has_index());
        assert_eq!(rel.indexes, vec![9001]);
    }

    #[test]
    fn test_equality_selectivity_uses_ndistinct() {
        let cat = snapshot();
        let args = [
            Expr::var(1, 2, DataType::Integer),
            Expr::constant(Value::integer(3)),
        ];
        let sel = cat.restriction_selectivity(INT8_EQ_OP, &args, 1).unwrap();
        assert!((sel - 0.02).abs() < 1e-9);
        let neq = cat.restriction_selectivity(INT8_NE_OP, &args, 1).unwrap();
        assert!((neq - 0.98).abs() < 1e-9);
        let lt = cat.restriction_selectivity(INT8_LT_OP, &args, 1).unwrap();
        assert!((lt - DEFAULT_INEQ_SEL).abs() < 1e-9);
    }

    #[test]
    fn test_join_selectivity_takes_larger_ndistinct() {
        let cat = snapshot();
        let args = [
            Expr::var(1, 1, DataType::Integer),
            Expr::var(2, 1, DataType::Integer),
        ];
        let sel = cat.join_selectivity(INT8_EQ_OP, &args).unwrap();
        assert!((sel - 1.0 / 10_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_and_hash_properties() {
        let cat = snapshot();
        assert_eq!(
            cat.op_mergejoinable(INT8_EQ_OP, DataType::Integer, DataType::Integer)
                .unwrap(),
            Some((INT8_LT_OP, INT8_LT_OP))
        );
        assert_eq!(
            cat.op_mergejoinable(INT8_LT_OP, DataType::Integer, DataType::Integer)
                .unwrap(),
            None
        );
        assert!(cat
            .op_hashjoinable(TEXT_EQ_OP, DataType::Text, DataType::Text)
            .unwrap());
        assert!(!cat
            .op_hashjoinable(TIMESTAMP_EQ_OP, DataType::Timestamp, DataType::Timestamp)
            .unwrap());
        assert_eq!(cat.get_commutator(INT8_LT_OP).unwrap(), Some(INT8_GT_OP));
        assert_eq!(
            cat.get_typlenbyval(DataType::Text.type_oid()).unwrap(),
            (-1, false)
        );
    }
}
