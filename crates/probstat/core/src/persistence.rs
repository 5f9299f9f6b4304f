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

//! Persistence Coordinator
//!
//! Keeps the durable copy of every engine structure at most one flush
//! interval behind the live state.
//!
//! # Lifecycle
//!
//! 1. [`PersistenceCoordinator::start`] makes sure a row exists for every
//!    structure and, when enabled, restores persisted state into the engine.
//! 2. [`PersistenceCoordinator::spawn`] runs the periodic flush loop on the
//!    tokio runtime.
//! 3. [`PersistenceHandle::shutdown`] stops ingestion, lets an in-progress
//!    flush finish, runs one final flush and joins the loop.
//!
//! A flush serializes every structure under the engine lock, then writes the
//! blobs after the lock is released. Store failures are logged and retried on
//! the next tick; they never reach ingestion.

use crate::config::{ConfigError, PersistenceConfig};
use crate::engine::{EngineError, StatsEngine, Structure};
use crate::store::{BlobStore, StoreError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Flush task failed: {0}")]
    Task(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoordinatorState {
    Idle = 0,
    Flushing = 1,
    Stopped = 2,
}

impl CoordinatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => CoordinatorState::Idle,
            1 => CoordinatorState::Flushing,
            _ => CoordinatorState::Stopped,
        }
    }
}

/// Outcome of one flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: Vec<Structure>,
    pub failed: Vec<Structure>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of restoring persisted state on startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<Structure>,
    /// Missing or empty rows
    pub skipped: Vec<Structure>,
    /// Rows that could not be decoded or do not match the engine configuration
    pub failed: Vec<Structure>,
}

#[derive(Debug)]
pub struct PersistenceCoordinator {
    engine: Arc<StatsEngine>,
    store: Arc<dyn BlobStore>,
    config: PersistenceConfig,
    state: AtomicU8,
    flushes: AtomicU64,
    /// Serializes flushes so a manual flush never interleaves with the loop
    flush_lock: Mutex<()>,
}

impl PersistenceCoordinator {
    pub fn new(engine: Arc<StatsEngine>, store: Arc<dyn BlobStore>, config: PersistenceConfig) -> PersistenceResult<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            store,
            config,
            state: AtomicU8::new(CoordinatorState::Idle as u8),
            flushes: AtomicU64::new(0),
            flush_lock: Mutex::new(()),
        })
    }

    pub fn engine(&self) -> &Arc<StatsEngine> {
        &self.engine
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn state(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of completed flushes, successful or not
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Create an empty row for every structure that has none.
    ///
    /// Existing rows are left untouched. Any store error here is fatal.
    pub fn initialize(&self) -> PersistenceResult<()> {
        for structure in Structure::ALL {
            if self.store.insert_if_absent(structure.name(), &[])? {
                debug!("Created empty row for {}", structure);
            }
        }
        Ok(())
    }

    /// Load every persisted structure into the engine.
    ///
    /// Missing and empty rows are skipped. A row that cannot be read or
    /// decoded is logged and the corresponding live structure stays empty.
    pub fn restore(&self) -> RestoreReport {
        let mut report = RestoreReport::default();

        for structure in Structure::ALL {
            let data = match self.store.get(structure.name()) {
                Ok(Some(data)) if !data.is_empty() => data,
                Ok(_) => {
                    report.skipped.push(structure);
                    continue;
                }
                Err(e) => {
                    error!("Failed to read persisted {}: {}", structure, e);
                    report.failed.push(structure);
                    continue;
                }
            };

            match self.engine.restore(structure, &data) {
                Ok(()) => report.restored.push(structure),
                Err(e) => {
                    error!("Failed to restore {}: {}", structure, e);
                    report.failed.push(structure);
                }
            }
        }

        info!(
            "Restore finished: {} restored, {} skipped, {} failed",
            report.restored.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Startup sequence: [`Self::initialize`], then [`Self::restore`] when enabled
    pub fn start(&self) -> PersistenceResult<RestoreReport> {
        self.initialize()?;
        if self.config.restore_on_start {
            Ok(self.restore())
        } else {
            info!("Restore on start disabled, starting from empty sketches");
            Ok(RestoreReport::default())
        }
    }

    /// Write the current state of every structure to the store.
    ///
    /// Per-structure write failures are reported, not returned.
    pub fn flush(&self) -> PersistenceResult<FlushReport> {
        let _guard = self.flush_lock.lock();
        let started = Instant::now();
        self.set_flushing(true);

        let snapshot = self.engine.snapshot();
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.set_flushing(false);
                return Err(e.into());
            }
        };

        let mut report = FlushReport::default();
        for (structure, blob) in snapshot {
            match self.store.put(structure.name(), &blob) {
                Ok(()) => report.written.push(structure),
                Err(e) => {
                    warn!("Failed to persist {}: {}", structure, e);
                    report.failed.push(structure);
                }
            }
        }

        self.set_flushing(false);
        self.flushes.fetch_add(1, Ordering::Relaxed);

        let elapsed = started.elapsed();
        metrics::counter!("probstat_flush_total", 1);
        metrics::histogram!("probstat_flush_duration_seconds", elapsed.as_secs_f64());
        if !report.failed.is_empty() {
            metrics::counter!("probstat_flush_failures_total", report.failed.len() as u64);
        }

        debug!("Flushed {} structures in {:?} ({} failed)", report.written.len(), elapsed, report.failed.len());
        Ok(report)
    }

    fn set_flushing(&self, flushing: bool) {
        let (from, to) = if flushing {
            (CoordinatorState::Idle, CoordinatorState::Flushing)
        } else {
            (CoordinatorState::Flushing, CoordinatorState::Idle)
        };
        // Stopped is terminal
        let _ = self.state.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire);
    }

    async fn flush_in_background(self: &Arc<Self>) -> PersistenceResult<FlushReport> {
        let coordinator = Arc::clone(self);
        tokio::task::spawn_blocking(move || coordinator.flush())
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))?
    }

    /// Run the periodic flush loop until [`PersistenceHandle::shutdown`]
    pub fn spawn(self: Arc<Self>) -> PersistenceHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let coordinator = Arc::clone(&self);
        let interval = self.config.flush_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = coordinator.flush_in_background().await {
                            error!("Periodic flush failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            let report = coordinator.flush_in_background().await;
            coordinator.state.store(CoordinatorState::Stopped as u8, Ordering::Release);
            info!("Persistence loop stopped after {} flushes", coordinator.flush_count());
            report
        });

        info!("Persistence loop started, flushing every {:?}", interval);
        PersistenceHandle {
            coordinator: self,
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running flush loop
#[derive(Debug)]
pub struct PersistenceHandle {
    coordinator: Arc<PersistenceCoordinator>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<PersistenceResult<FlushReport>>,
}

impl PersistenceHandle {
    pub fn coordinator(&self) -> &Arc<PersistenceCoordinator> {
        &self.coordinator
    }

    /// Stop ingestion, run the final flush and wait for the loop to exit.
    ///
    /// Returns the report of the final flush.
    pub async fn shutdown(self) -> PersistenceResult<FlushReport> {
        self.coordinator.engine.close();
        // The loop may already be gone if the runtime is shutting down
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}
