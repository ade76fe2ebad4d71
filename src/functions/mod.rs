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

//! SQL Function System
//!
//! Functions are identified by catalog id:
//!
//! - [`ScalarFunction`] - operator implementations, in-range support
//!   functions and aggregate transition/final functions
//! - [`AggregateDef`] - binds an aggregate id to its support functions
//! - [`WindowFunction`] - pure window functions (ROW_NUMBER, RANK, LAG, ...)
//! - [`FunctionRegistry`] - lookup by id

pub mod aggregate;
pub mod registry;
pub mod scalar;
pub mod window;

use serde::{Deserialize, Serialize};

use crate::core::{DataType, Error, Oid, Result, Value};
use crate::executor::window::WindowObject;

pub use registry::FunctionRegistry;

/// Function type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionType {
    /// Called once per row
    Scalar,
    /// Aggregate support (transition, inverse transition, final)
    AggregateSupport,
    /// Aggregate (bound through [`AggregateDef`])
    Aggregate,
    /// Pure window function
    Window,
}

/// Whether repeated calls with the same arguments give the same result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Volatility {
    Immutable,
    Stable,
    Volatile,
}

/// What a final function may do to the transition state it is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalModify {
    /// Never modifies the state
    ReadOnly,
    /// Modifies the state, but calling it again on the same state is fine
    Shareable,
    /// Destroys the state; unusable as a window aggregate
    ReadWrite,
}

/// Function information
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub oid: Oid,
    pub name: &'static str,
    pub function_type: FunctionType,
    pub arg_types: Vec<DataType>,
    pub return_type: DataType,
    /// NULL input yields NULL output without calling the function
    pub strict: bool,
    pub volatility: Volatility,
}

impl FunctionInfo {
    pub fn new(
        oid: Oid,
        name: &'static str,
        function_type: FunctionType,
        arg_types: Vec<DataType>,
        return_type: DataType,
    ) -> Self {
        Self {
            oid,
            name,
            function_type,
            arg_types,
            return_type,
            strict: true,
            volatility: Volatility::Immutable,
        }
    }

    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn with_volatility(mut self, volatility: Volatility) -> Self {
        self.volatility = volatility;
        self
    }

    /// Validate argument count
    pub fn validate_arg_count(&self, count: usize) -> Result<()> {
        if count != self.arg_types.len() {
            return Err(Error::invalid_argument(format!(
                "{} expects {} arguments, got {}",
                self.name,
                self.arg_types.len(),
                count
            )));
        }
        Ok(())
    }
}

/// Trait for functions called with a flat argument list
pub trait ScalarFunction: Send + Sync {
    /// Get function information
    fn info(&self) -> &FunctionInfo;

    /// Call the function; strictness is handled by the caller
    fn invoke(&self, args: &[Value]) -> Result<Value>;

    /// Transition-style call: `state` is the first argument and is owned by
    /// the callee, which may update it in place and hand it back
    fn invoke_transition(&self, state: Value, args: &[Value]) -> Result<Value> {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(state);
        all.extend_from_slice(args);
        self.invoke(&all)
    }
}

/// Scalar function backed by a plain function pointer
pub struct BuiltinFunction {
    info: FunctionInfo,
    body: fn(&[Value]) -> Result<Value>,
}

impl BuiltinFunction {
    pub fn new(info: FunctionInfo, body: fn(&[Value]) -> Result<Value>) -> Self {
        Self { info, body }
    }
}

impl ScalarFunction for BuiltinFunction {
    fn info(&self) -> &FunctionInfo {
        &self.info
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.body)(args)
    }
}

/// Transition function taking its state by value
pub struct TransitionFunction {
    info: FunctionInfo,
    body: fn(Value, &[Value]) -> Result<Value>,
}

impl TransitionFunction {
    pub fn new(info: FunctionInfo, body: fn(Value, &[Value]) -> Result<Value>) -> Self {
        Self { info, body }
    }
}

impl ScalarFunction for TransitionFunction {
    fn info(&self) -> &FunctionInfo {
        &self.info
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        match args.split_first() {
            Some((state, rest)) => (self.body)(state.clone(), rest),
            None => Err(Error::invalid_argument(format!(
                "{} called without a transition state",
                self.info.name
            ))),
        }
    }

    fn invoke_transition(&self, state: Value, args: &[Value]) -> Result<Value> {
        (self.body)(state, args)
    }
}

/// Aggregate definition: binds an aggregate id to its support functions
#[derive(Debug, Clone)]
pub struct AggregateDef {
    pub oid: Oid,
    pub name: &'static str,
    pub arg_types: Vec<DataType>,
    pub result_type: DataType,
    pub transfn: Oid,
    /// Inverse transition for moving-aggregate mode
    pub invtransfn: Option<Oid>,
    pub finalfn: Option<Oid>,
    pub final_modify: FinalModify,
    pub trans_type: DataType,
    /// `None` means the initial state is NULL
    pub init_value: Option<Value>,
}

impl AggregateDef {
    pub fn new(
        oid: Oid,
        name: &'static str,
        arg_types: Vec<DataType>,
        result_type: DataType,
        transfn: Oid,
        trans_type: DataType,
    ) -> Self {
        Self {
            oid,
            name,
            arg_types,
            result_type,
            transfn,
            invtransfn: None,
            finalfn: None,
            final_modify: FinalModify::ReadOnly,
            trans_type,
            init_value: None,
        }
    }

    pub fn with_inverse(mut self, invtransfn: Oid) -> Self {
        self.invtransfn = Some(invtransfn);
        self
    }

    pub fn with_final(mut self, finalfn: Oid) -> Self {
        self.finalfn = Some(finalfn);
        self
    }

    pub fn with_init(mut self, init: Value) -> Self {
        self.init_value = Some(init);
        self
    }

    pub fn with_final_modify(mut self, modify: FinalModify) -> Self {
        self.final_modify = modify;
        self
    }
}

/// Trait for pure window functions
///
/// Implementations reach the partition only through the [`WindowObject`],
/// which enforces the mark and frame rules of the window executor.
pub trait WindowFunction: Send + Sync {
    /// Get the function name
    fn name(&self) -> &'static str;

    /// Number of arguments accepted, inclusive range
    fn arg_range(&self) -> (usize, usize) {
        (0, 0)
    }

    /// Compute the value for the current row
    fn evaluate(&self, winobj: &mut WindowObject<'_>) -> Result<Value>;
}
