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

//! Function Registry
//!
//! Maps function ids to implementations. The built-in set is created once
//! and shared; callers that register their own functions build a private
//! registry with [`FunctionRegistry::with_builtins`].

use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;

use crate::core::{Error, Oid, Result};

use super::{AggregateDef, FunctionInfo, ScalarFunction, WindowFunction};

/// Shared built-in registry instance
static BUILTIN_REGISTRY: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();

/// Function registry keyed by function id
#[derive(Default)]
pub struct FunctionRegistry {
    scalar_functions: FxHashMap<Oid, Arc<dyn ScalarFunction>>,
    aggregates: FxHashMap<Oid, AggregateDef>,
    window_functions: FxHashMap<Oid, Arc<dyn WindowFunction>>,
}

impl FunctionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in function registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::scalar::operators::register(&mut registry);
        super::scalar::in_range::register(&mut registry);
        super::aggregate::register(&mut registry);
        super::window::register(&mut registry);
        registry
    }

    /// Get the shared built-in registry
    pub fn shared() -> Arc<FunctionRegistry> {
        BUILTIN_REGISTRY
            .get_or_init(|| Arc::new(FunctionRegistry::with_builtins()))
            .clone()
    }

    pub fn register_scalar(&mut self, function: impl ScalarFunction + 'static) {
        self.scalar_functions
            .insert(function.info().oid, Arc::new(function));
    }

    pub fn register_aggregate(&mut self, def: AggregateDef) {
        self.aggregates.insert(def.oid, def);
    }

    pub fn register_window(&mut self, oid: Oid, function: impl WindowFunction + 'static) {
        self.window_functions.insert(oid, Arc::new(function));
    }

    /// Look up a scalar (or aggregate support) function
    pub fn scalar(&self, oid: Oid) -> Result<&Arc<dyn ScalarFunction>> {
        self.scalar_functions
            .get(&oid)
            .ok_or_else(|| Error::catalog_mismatch("function", oid))
    }

    /// Function metadata for a scalar or support function
    pub fn function_info(&self, oid: Oid) -> Result<&FunctionInfo> {
        Ok(self.scalar(oid)?.info())
    }

    pub fn aggregate(&self, oid: Oid) -> Result<&AggregateDef> {
        self.aggregates
            .get(&oid)
            .ok_or_else(|| Error::catalog_mismatch("aggregate", oid))
    }

    pub fn window(&self, oid: Oid) -> Result<&Arc<dyn WindowFunction>> {
        self.window_functions
            .get(&oid)
            .ok_or_else(|| Error::catalog_mismatch("window function", oid))
    }

    pub fn is_aggregate(&self, oid: Oid) -> bool {
        self.aggregates.contains_key(&oid)
    }

    pub fn is_window_function(&self, oid: Oid) -> bool {
        self.window_functions.contains_key(&oid)
    }

    /// Ids of every registered scalar and support function
    pub fn scalar_oids(&self) -> impl Iterator<Item = Oid> + '_ {
        self.scalar_functions.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::oids::*;
    use crate::core::ErrorCategory;

    #[test]
    fn test_builtins_registered() {
        let registry = FunctionRegistry::shared();
        assert!(registry.scalar(F_INT8EQ).is_ok());
        assert!(registry.scalar(F_IN_RANGE_FLOAT8).is_ok());
        assert!(registry.is_aggregate(AGG_SUM_INT8));
        assert!(registry.is_window_function(WIN_RANK));
        assert!(registry.function_info(F_STRING_AGG_TRANSFN).map(|i| !i.strict).unwrap());
    }

    #[test]
    fn test_every_aggregate_support_function_exists() {
        let registry = FunctionRegistry::shared();
        for oid in [
            AGG_SUM_INT8,
            AGG_SUM_FLOAT8,
            AGG_COUNT_ANY,
            AGG_COUNT_STAR,
            AGG_AVG_INT8,
            AGG_AVG_FLOAT8,
            AGG_MIN_INT8,
            AGG_MAX_TEXT,
            AGG_BOOL_AND,
            AGG_BOOL_OR,
            AGG_STRING_AGG,
        ] {
            let def = registry.aggregate(oid).unwrap();
            assert!(registry.scalar(def.transfn).is_ok(), "{}", def.name);
            if let Some(inv) = def.invtransfn {
                assert!(registry.scalar(inv).is_ok(), "{}", def.name);
            }
            if let Some(f) = def.finalfn {
                assert!(registry.scalar(f).is_ok(), "{}", def.name);
            }
        }
    }

    #[test]
    fn test_unknown_function_is_catalog_mismatch() {
        let registry = FunctionRegistry::new();
        let err = registry.scalar(99999).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::CatalogMismatch);
    }
}
