// Probstat
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Construction-time configuration for the engine and the persistence loop.
//!
//! Every parameter is fixed once the engine is built; there is no runtime
//! reconfiguration.

use crate::hash::DEFAULT_SEED;
use crate::sketches::{CountMinSketch, HyperLogLog};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Cardinality error must be in (0, 1), got {0}")]
    InvalidCardinalityError(f64),
    #[error("Frequency error must be in (0, 1), got {0}")]
    InvalidFrequencyError(f64),
    #[error("Frequency failure probability must be in (0, 1), got {0}")]
    InvalidFailureProbability(f64),
    #[error("Cardinality error {0} needs more registers than supported")]
    UnreachableCardinalityError(f64),
    #[error("Frequency error {error} with failure probability {failure_probability} needs too many counters")]
    FrequencySketchTooLarge { error: f64, failure_probability: f64 },
    #[error("Top-k size must be positive")]
    InvalidTopK,
    #[error("Flush interval must be positive")]
    InvalidFlushInterval,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Sketch parameters owned by a [`crate::StatsEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target relative standard error of the distinct entity count
    pub cardinality_error: f64,
    /// Additive error of frequency estimates as a fraction of all items added
    pub frequency_error: f64,
    /// Probability that a frequency estimate exceeds its error bound
    pub frequency_failure_probability: f64,
    /// Number of heavy hitters tracked per dimension
    pub top_k: usize,
    /// Seed of the hash family shared by every sketch
    pub hash_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cardinality_error: 0.02,
            frequency_error: 0.001,
            frequency_failure_probability: 0.01,
            top_k: 5,
            hash_seed: DEFAULT_SEED,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !in_unit_interval(self.cardinality_error) {
            return Err(ConfigError::InvalidCardinalityError(self.cardinality_error));
        }
        if !in_unit_interval(self.frequency_error) {
            return Err(ConfigError::InvalidFrequencyError(self.frequency_error));
        }
        if !in_unit_interval(self.frequency_failure_probability) {
            return Err(ConfigError::InvalidFailureProbability(self.frequency_failure_probability));
        }
        if HyperLogLog::precision_for_error(self.cardinality_error).is_err() {
            return Err(ConfigError::UnreachableCardinalityError(self.cardinality_error));
        }
        if CountMinSketch::dimensions_for(self.frequency_error, self.frequency_failure_probability).is_err() {
            return Err(ConfigError::FrequencySketchTooLarge {
                error: self.frequency_error,
                failure_probability: self.frequency_failure_probability,
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK);
        }
        Ok(())
    }

    pub fn with_hash_seed(mut self, seed: u64) -> Self {
        self.hash_seed = seed;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }
}

/// Settings for the background flush loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub flush_interval_ms: u64,
    /// Read persisted blobs back into the live sketches before serving
    pub restore_on_start: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1000,
            restore_on_start: true,
        }
    }
}

impl PersistenceConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidFlushInterval);
        }
        Ok(())
    }
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value < 1.0
}
