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

//! Probabilistic Stream Statistics
//!
//! This crate maintains approximate aggregates over a high-volume stream of
//! tagged events under a fixed memory budget.
//!
//! # Core Components
//!
//! ## Sketches
//! - [`HyperLogLog`] for distinct entity counts
//! - [`CountMinSketch`] for per-key frequencies with one-sided error
//! - [`TopK`] for per-dimension heavy hitters
//!
//! ## Engine
//! - [`StatsEngine`] applies one event to every sketch atomically and
//!   answers queries under the same lock
//!
//! ## Persistence
//! - [`PersistenceCoordinator`] periodically flushes sketch state to a
//!   [`BlobStore`] and restores it on startup
//!
//! # Usage
//!
//! ```rust
//! use probstat_core::{Dimension, EngineConfig, StatsEngine};
//!
//! let engine = StatsEngine::new(EngineConfig::default()).unwrap();
//! engine.collect("profile1", "social", "fun_new");
//! engine.collect("profile2", "social", "offer_extra");
//!
//! assert!(engine.count("social") >= 2);
//! assert_eq!(engine.count_unique_entities(), 2);
//! assert_eq!(engine.top(Dimension::Attr1)[0].item_str(), "social");
//! ```

pub mod config;
pub mod engine;
pub mod hash;
pub mod persistence;
pub mod sketches;
pub mod store;

pub use config::{ConfigError, EngineConfig, PersistenceConfig};
pub use engine::{Dimension, EngineError, EngineStats, Event, StatsEngine, Structure, composite_key};
pub use hash::HashFamily;
pub use persistence::{CoordinatorState, FlushReport, PersistenceCoordinator, PersistenceError, PersistenceHandle, RestoreReport};
pub use sketches::{CountMinSketch, Element, HyperLogLog, SketchError, TopK};
pub use store::{BlobStore, FileBlobStore, MemoryBlobStore, StoreError};
