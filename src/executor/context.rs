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

//! Execution Context
//!
//! Carries the per-query state operators share: external parameter values,
//! the function registry, work-memory configuration and the cooperative
//! cancellation flag.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{Error, Result, Value};
use crate::functions::FunctionRegistry;

use super::tuplestore::TuplestoreConfig;

/// Default work memory for operator buffers (4 MiB)
pub const DEFAULT_WORK_MEM: usize = 4 * 1024 * 1024;

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Bytes a tuplestore may hold in memory before spilling
    pub work_mem_bytes: usize,
    /// Directory for spill files; the system temp directory when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            work_mem_bytes: DEFAULT_WORK_MEM,
            temp_dir: None,
        }
    }
}

impl ExecutionConfig {
    pub fn with_work_mem(mut self, bytes: usize) -> Self {
        self.work_mem_bytes = bytes;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Tuplestore settings derived from this configuration
    pub fn tuplestore_config(&self) -> TuplestoreConfig {
        TuplestoreConfig {
            work_mem_bytes: self.work_mem_bytes,
            temp_dir: self.temp_dir.clone(),
        }
    }
}

/// Execution context for one query
///
/// Cloning is cheap; clones share the parameter list and the cancellation
/// flag.
#[derive(Clone)]
pub struct ExecutionContext {
    /// External parameter values ($1, $2, ...) and subplan outputs
    params: Arc<Vec<Value>>,
    registry: Arc<FunctionRegistry>,
    config: ExecutionConfig,
    /// Cancellation flag
    cancelled: Arc<AtomicBool>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("params", &self.params)
            .field("config", &self.config)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl ExecutionContext {
    /// Context with the built-in function registry and default configuration
    pub fn new() -> Self {
        Self {
            params: Arc::new(Vec::new()),
            registry: FunctionRegistry::shared(),
            config: ExecutionConfig::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create an execution context with positional parameters
    pub fn with_params(params: Vec<Value>) -> Self {
        Self {
            params: Arc::new(params),
            ..Self::new()
        }
    }

    pub fn with_registry(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Check if the query has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Cancel the query
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Get a cancellation handle that can be used from another thread
    pub fn cancellation_handle(&self) -> CancellationHandle {
        CancellationHandle {
            cancelled: self.cancelled.clone(),
        }
    }

    /// Check for cancellation and return an error if cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::QueryCancelled)
        } else {
            Ok(())
        }
    }
}

/// Handle for cancelling a query from another thread
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Cancel the query
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Check if the query has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
