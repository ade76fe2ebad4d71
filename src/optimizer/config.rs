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

//! Planner configuration
//!
//! [`PlannerConfig`] carries the cost constants, the enable flags for each
//! access and join method, and the genetic orderer settings. The genetic
//! orderer reads its parameters from a small key/value source:
//!
//! ```text
//! # geqo.conf
//! Pool_Size      = 256
//! Effort         = medium
//! Selection_Bias : 1.8
//! Random_Seed    = 42
//! ```
//!
//! Keys are case-insensitive, `=` and `:` both separate key from value, and
//! `#` starts a comment. Unknown keys are logged and ignored.

use std::path::Path;

use tracing::warn;

use crate::core::{Error, Result};

use super::cost::CostConstants;

/// Default hash table budget per hash join
pub const DEFAULT_HASH_MEM: usize = 4 * 1024 * 1024;

/// Join problems with at least this many relations go to the genetic orderer
pub const DEFAULT_GEQO_THRESHOLD: usize = 11;

pub const MIN_POOL_SIZE: usize = 128;
pub const MAX_POOL_SIZE: usize = 1024;
pub const MIN_SELECTION_BIAS: f64 = 1.5;
pub const MAX_SELECTION_BIAS: f64 = 2.0;

/// Search effort of the genetic orderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    /// Generations per doubling of the pool size
    pub fn factor(&self) -> usize {
        match self {
            Effort::Low => 1,
            Effort::Medium => 40,
            Effort::High => 80,
        }
    }
}

/// Recombination operator of the genetic orderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recombination {
    /// Edge recombination crossover
    Edge,
    /// Order crossover (OX1)
    Order,
}

/// Genetic orderer parameters
#[derive(Debug, Clone, PartialEq)]
pub struct GeqoConfig {
    /// 0 picks a size from the number of relations
    pub pool_size: usize,
    /// 0 derives the count from the pool size and effort
    pub generations: usize,
    pub effort: Effort,
    pub selection_bias: f64,
    pub random_seed: u64,
    pub recombination: Recombination,
}

impl Default for GeqoConfig {
    fn default() -> Self {
        Self {
            pool_size: 0,
            generations: 0,
            effort: Effort::Medium,
            selection_bias: MAX_SELECTION_BIAS,
            random_seed: 0,
            recombination: Recombination::Edge,
        }
    }
}

impl GeqoConfig {
    /// Parse the key/value configuration format
    ///
    /// Missing keys keep their defaults. Malformed values are errors;
    /// out-of-range values are clamped.
    pub fn parse(source: &str) -> Result<Self> {
        let mut config = Self::default();
        for (lineno, raw) in source.lines().enumerate() {
            let line = match raw.find('#') {
                Some(idx) => &raw[..idx],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let Some(idx) = line.find(['=', ':']) else {
                return Err(Error::invalid_argument(format!(
                    "geqo config line {}: expected 'key = value', got '{}'",
                    lineno + 1,
                    line
                )));
            };
            let key = line[..idx].trim().to_lowercase();
            let value = line[idx + 1..].trim();

            match key.as_str() {
                "pool_size" => {
                    let size = parse_number::<usize>(&key, value)?;
                    config.pool_size = if size == 0 {
                        0
                    } else {
                        clamp_logged(&key, size, MIN_POOL_SIZE, MAX_POOL_SIZE)
                    };
                }
                "generations" => config.generations = parse_number(&key, value)?,
                "random_seed" => config.random_seed = parse_number(&key, value)?,
                "selection_bias" => {
                    let bias = parse_number::<f64>(&key, value)?;
                    config.selection_bias =
                        clamp_logged(&key, bias, MIN_SELECTION_BIAS, MAX_SELECTION_BIAS);
                }
                "effort" => {
                    config.effort = match value.to_lowercase().as_str() {
                        "low" => Effort::Low,
                        "medium" => Effort::Medium,
                        "high" => Effort::High,
                        other => {
                            return Err(Error::invalid_argument(format!(
                                "geqo config: unknown effort '{}'",
                                other
                            )))
                        }
                    };
                }
                "recombination" => {
                    config.recombination = match value.to_lowercase().as_str() {
                        "erx" | "edge" => Recombination::Edge,
                        "ox1" | "order" => Recombination::Order,
                        other => {
                            return Err(Error::invalid_argument(format!(
                                "geqo config: unknown recombination '{}'",
                                other
                            )))
                        }
                    };
                }
                _ => warn!(key = %key, line = lineno + 1, "ignoring unknown geqo config key"),
            }
        }
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&source)
    }

    /// Pool size for a join problem with `nrels` relations
    pub fn pool_size_for(&self, nrels: usize) -> usize {
        if self.pool_size > 0 {
            return self.pool_size;
        }
        let size = 2f64.powi(nrels as i32 + 1);
        (size as usize).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
    }

    /// Number of generations for a pool of `pool_size`
    pub fn generations_for(&self, pool_size: usize) -> usize {
        if self.generations > 0 {
            return self.generations;
        }
        let log2 = (pool_size.max(2) as f64).log2().ceil() as usize;
        self.effort.factor() * log2
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        Error::invalid_argument(format!("geqo config: invalid value '{}' for {}", value, key))
    })
}

fn clamp_logged<T: PartialOrd + Copy + std::fmt::Display>(key: &str, value: T, min: T, max: T) -> T {
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };
    if clamped != value {
        warn!(key = %key, value = %value, clamped = %clamped, "geqo config value out of range");
    }
    clamped
}

/// Planner settings
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub cost: CostConstants,
    pub enable_seqscan: bool,
    pub enable_indexscan: bool,
    pub enable_tidscan: bool,
    pub enable_nestloop: bool,
    pub enable_mergejoin: bool,
    pub enable_hashjoin: bool,
    pub enable_bushy: bool,
    pub enable_geqo: bool,
    pub geqo_threshold: usize,
    /// Memory one hash table may use before it spills into batches
    pub hash_mem_bytes: usize,
    /// Hash joins needing more batches than this are not considered
    pub max_hash_batches: usize,
    pub geqo: GeqoConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cost: CostConstants::default(),
            enable_seqscan: true,
            enable_indexscan: true,
            enable_tidscan: true,
            enable_nestloop: true,
            enable_mergejoin: true,
            enable_hashjoin: true,
            enable_bushy: false,
            enable_geqo: true,
            geqo_threshold: DEFAULT_GEQO_THRESHOLD,
            hash_mem_bytes: DEFAULT_HASH_MEM,
            max_hash_batches: 1024,
            geqo: GeqoConfig::default(),
        }
    }
}

impl PlannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost(mut self, cost: CostConstants) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_seqscan(mut self, enabled: bool) -> Self {
        self.enable_seqscan = enabled;
        self
    }

    pub fn with_indexscan(mut self, enabled: bool) -> Self {
        self.enable_indexscan = enabled;
        self
    }

    pub fn with_tidscan(mut self, enabled: bool) -> Self {
        self.enable_tidscan = enabled;
        self
    }

    pub fn with_nestloop(mut self, enabled: bool) -> Self {
        self.enable_nestloop = enabled;
        self
    }

    pub fn with_mergejoin(mut self, enabled: bool) -> Self {
        self.enable_mergejoin = enabled;
        self
    }

    pub fn with_hashjoin(mut self, enabled: bool) -> Self {
        self.enable_hashjoin = enabled;
        self
    }

    pub fn with_bushy(mut self, enabled: bool) -> Self {
        self.enable_bushy = enabled;
        self
    }

    pub fn with_geqo(mut self, enabled: bool) -> Self {
        self.enable_geqo = enabled;
        self
    }

    pub fn with_geqo_threshold(mut self, threshold: usize) -> Self {
        self.geqo_threshold = threshold;
        self
    }

    pub fn with_hash_mem(mut self, bytes: usize) -> Self {
        self.hash_mem_bytes = bytes;
        self
    }

    pub fn with_geqo_config(mut self, geqo: GeqoConfig) -> Self {
        self.geqo = geqo;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = GeqoConfig::parse(
            "# tuned\nPool_Size = 256\nGENERATIONS: 10\nrandom_seed=7\nSelection_Bias = 1.75\nEffort = high\nRecombination = ox1\n",
        )
        .unwrap();
        assert_eq!(config.pool_size, 256);
        assert_eq!(config.generations, 10);
        assert_eq!(config.random_seed, 7);
        assert!((config.selection_bias - 1.75).abs() < 1e-12);
        assert_eq!(config.effort, Effort::High);
        assert_eq!(config.recombination, Recombination::Order);
    }

    #[test]
    fn test_unknown_keys_ignored_and_values_clamped() {
        let config = GeqoConfig::parse("Mutation_Rate = 3\nSelection_Bias = 3.0\nPool_Size = 5\n").unwrap();
        assert_eq!(config.selection_bias, MAX_SELECTION_BIAS);
        assert_eq!(config.pool_size, MIN_POOL_SIZE);
        assert_eq!(config.generations, 0);
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(GeqoConfig::parse("Pool_Size = lots").is_err());
        assert!(GeqoConfig::parse("Effort = extreme").is_err());
        assert!(GeqoConfig::parse("just a line").is_err());
    }

    #[test]
    fn test_derived_pool_and_generations() {
        let config = GeqoConfig::default();
        assert_eq!(config.pool_size_for(3), MIN_POOL_SIZE);
        assert_eq!(config.pool_size_for(20), MAX_POOL_SIZE);
        assert_eq!(config.pool_size_for(8), 512);
        assert_eq!(config.generations_for(128), 40 * 7);
        let low = GeqoConfig {
            effort: Effort::Low,
            ..GeqoConfig::default()
        };
        assert_eq!(low.generations_for(1024), 10);
    }
}
