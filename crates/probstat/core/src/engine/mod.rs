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

//! Stats Engine
//!
//! Owns one cardinality estimator, one shared frequency sketch and a
//! heavy-hitter tracker per [`Dimension`]. Every sketch lives behind a single
//! exclusive lock: an event is applied to all of them in one critical
//! section, so a reader never observes a partially-applied event, and the
//! persistence snapshot always sees whole events.
//!
//! The engine is constructed once and shared as `Arc<StatsEngine>` between
//! ingestion, queries and the persistence coordinator.

pub mod keys;

pub use keys::{Dimension, Event, KEY_SEPARATOR, Structure, UnknownDimension, composite_key};

use crate::config::{ConfigError, EngineConfig};
use crate::hash::HashFamily;
use crate::sketches::{CountMinSketch, Element, HyperLogLog, PersistentSketch, SketchError, SketchResult, TopK};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Sketch error: {0}")]
    Sketch(#[from] SketchError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Point-in-time summary of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    /// Events applied since this engine was constructed
    pub events_collected: u64,
    /// Total additions to the shared frequency sketch, including restored state
    pub frequency_total: u64,
    pub memory_bytes: usize,
    pub closed: bool,
}

#[derive(Debug)]
struct Sketches {
    cardinality: HyperLogLog,
    frequency: CountMinSketch,
    /// Indexed by [`Dimension::index`]
    heavy_hitters: Vec<TopK>,
}

impl Sketches {
    fn new(config: &EngineConfig) -> SketchResult<Self> {
        let family = HashFamily::new(config.hash_seed);

        let cardinality = HyperLogLog::new(config.cardinality_error, family)?;
        let frequency = CountMinSketch::new(config.frequency_error, config.frequency_failure_probability, family.derive(1))?;
        let heavy_hitters = Dimension::ALL
            .iter()
            .map(|dimension| TopK::new(config.top_k, config.frequency_error, config.frequency_failure_probability, family.derive(2 + dimension.index() as u64)))
            .collect::<SketchResult<Vec<_>>>()?;

        Ok(Self {
            cardinality,
            frequency,
            heavy_hitters,
        })
    }

    fn apply(&mut self, entity_id: &str, attr1: &str, attr2: &str) {
        let [entity, first, second, entity_first, entity_first_second, first_second] = keys::frequency_keys(entity_id, attr1, attr2);

        self.frequency
            .add(entity.as_bytes())
            .add(first.as_bytes())
            .add(second.as_bytes())
            .add(entity_first.as_bytes())
            .add(entity_first_second.as_bytes())
            .add(first_second.as_bytes());

        self.cardinality.add(entity.as_bytes());

        self.heavy_hitters[Dimension::Entity.index()].add(entity.as_bytes());
        self.heavy_hitters[Dimension::Attr1.index()].add(first.as_bytes());
        self.heavy_hitters[Dimension::Attr2.index()].add(second.as_bytes());
        self.heavy_hitters[Dimension::Attr1Attr2.index()].add(first_second.as_bytes());
    }

    fn encode(&self, structure: Structure) -> SketchResult<Vec<u8>> {
        match structure {
            Structure::Cardinality => self.cardinality.to_bytes(),
            Structure::Frequency => self.frequency.to_bytes(),
            Structure::TopK(dimension) => self.heavy_hitters[dimension.index()].to_bytes(),
        }
    }

    fn restore(&mut self, structure: Structure, data: &[u8]) -> SketchResult<()> {
        match structure {
            Structure::Cardinality => self.cardinality = self.cardinality.from_bytes_compatible(data)?,
            Structure::Frequency => self.frequency = self.frequency.from_bytes_compatible(data)?,
            Structure::TopK(dimension) => {
                let slot = &mut self.heavy_hitters[dimension.index()];
                *slot = slot.from_bytes_compatible(data)?;
            }
        }
        Ok(())
    }

    fn memory_bytes(&self) -> usize {
        self.cardinality.memory_bytes() + self.frequency.memory_bytes() + self.heavy_hitters.iter().map(TopK::memory_bytes).sum::<usize>()
    }
}

/// Concurrency-safe owner of every sketch
#[derive(Debug)]
pub struct StatsEngine {
    config: EngineConfig,
    sketches: Mutex<Sketches>,
    events: AtomicU64,
    /// Written and read while holding `sketches`
    closed: AtomicBool,
}

impl StatsEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let sketches = Sketches::new(&config)?;

        info!(
            "Stats engine ready: {} HLL registers, {}x{} count-min, top-{} per dimension, {} bytes",
            sketches.cardinality.registers().len(),
            sketches.frequency.depth(),
            sketches.frequency.width(),
            config.top_k,
            sketches.memory_bytes()
        );

        Ok(Self {
            config,
            sketches: Mutex::new(sketches),
            events: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply one event to every sketch atomically.
    ///
    /// Empty strings are valid, distinct values. Events arriving after
    /// [`StatsEngine::close`] are dropped.
    pub fn collect(&self, entity_id: &str, attr1: &str, attr2: &str) {
        {
            let mut sketches = self.sketches.lock();
            if self.closed.load(Ordering::Acquire) {
                debug!("Dropping event for entity '{}': engine is closed", entity_id);
                return;
            }
            sketches.apply(entity_id, attr1, attr2);
        }

        self.events.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("probstat_events_collected_total", 1);
    }

    pub fn collect_event(&self, event: &Event) {
        self.collect(&event.entity_id, &event.attr1, &event.attr2);
    }

    /// Estimated number of events carrying `key`, never below the true count
    pub fn count(&self, key: &str) -> u64 {
        self.sketches.lock().frequency.count(key.as_bytes())
    }

    /// Like [`StatsEngine::count`] for a key built with [`composite_key`]
    pub fn count_composite(&self, parts: &[&str]) -> u64 {
        self.count(&composite_key(parts))
    }

    pub fn count_unique_entities(&self) -> u64 {
        self.sketches.lock().cardinality.count()
    }

    /// Heavy hitters of `dimension`, highest estimate first
    pub fn top(&self, dimension: Dimension) -> Vec<Element> {
        self.sketches.lock().heavy_hitters[dimension.index()].elements()
    }

    /// Stop accepting events. Queries and snapshots keep working.
    pub fn close(&self) {
        let _sketches = self.sketches.lock();
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Stats engine closed after {} events", self.events.load(Ordering::Relaxed));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn events_collected(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Serialize every structure in one critical section.
    ///
    /// Read-only: the live sketches are not modified.
    pub fn snapshot(&self) -> EngineResult<Vec<(Structure, Vec<u8>)>> {
        let sketches = self.sketches.lock();
        let mut blobs = Vec::with_capacity(Structure::ALL.len());
        for structure in Structure::ALL {
            blobs.push((structure, sketches.encode(structure)?));
        }
        Ok(blobs)
    }

    /// Replace one live structure with a persisted blob.
    ///
    /// The blob must have been produced by an engine with the same
    /// configuration; otherwise the live structure is left untouched.
    pub fn restore(&self, structure: Structure, data: &[u8]) -> EngineResult<()> {
        self.sketches.lock().restore(structure, data)?;
        debug!("Restored {} from {} bytes", structure, data.len());
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        let sketches = self.sketches.lock();
        EngineStats {
            events_collected: self.events_collected(),
            frequency_total: sketches.frequency.total(),
            memory_bytes: sketches.memory_bytes(),
            closed: self.is_closed(),
        }
    }
}
