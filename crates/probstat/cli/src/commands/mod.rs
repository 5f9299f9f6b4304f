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

pub mod ingest;
pub mod query;

use crate::config::ProbstatConfig;
use anyhow::Result;
use probstat_core::{FileBlobStore, PersistenceCoordinator, RestoreReport, StatsEngine};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Engine and coordinator opened against the configured store
pub struct CommandContext {
    pub config: ProbstatConfig,
    pub coordinator: Arc<PersistenceCoordinator>,
    pub restored: RestoreReport,
}

impl CommandContext {
    /// Open the store, build the engine and restore persisted state
    pub fn open(config: ProbstatConfig) -> Result<Self> {
        let store = Arc::new(FileBlobStore::open(&config.data_dir, &config.namespace)?);
        let engine = Arc::new(StatsEngine::new(config.engine.clone())?);
        let coordinator = Arc::new(PersistenceCoordinator::new(engine, store, config.persistence.clone())?);

        let restored = coordinator.start()?;
        if !restored.failed.is_empty() {
            warn!("{} structures could not be restored and start empty", restored.failed.len());
        }
        info!("Opened store at {}", config.data_dir.join(&config.namespace).display());

        Ok(Self {
            config,
            coordinator,
            restored,
        })
    }

    pub fn engine(&self) -> &Arc<StatsEngine> {
        self.coordinator.engine()
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
