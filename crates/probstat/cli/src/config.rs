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

//! CLI configuration: a TOML file with environment and flag overrides.

use anyhow::{Context, Result, bail};
use probstat_core::{EngineConfig, PersistenceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "PROBSTAT_CONFIG";
pub const DATA_DIR_ENV: &str = "PROBSTAT_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbstatConfig {
    pub data_dir: PathBuf,
    /// Store namespace, one directory under `data_dir`
    pub namespace: String,
    pub engine: EngineConfig,
    pub persistence: PersistenceConfig,
}

impl Default for ProbstatConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("probstat"),
            namespace: "prob_stats".to_string(),
            engine: EngineConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl ProbstatConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            bail!("namespace must not be empty");
        }
        self.engine.validate()?;
        self.persistence.validate()?;
        Ok(())
    }

    /// `--config` beats `$PROBSTAT_CONFIG` beats defaults; `--data-dir`
    /// beats `$PROBSTAT_DATA_DIR` beats the file.
    pub fn resolve_config(cli_config: Option<PathBuf>, cli_data_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(config_path) = cli_config {
            Self::load_from_file(config_path)?
        } else if let Ok(env_config) = std::env::var(CONFIG_ENV) {
            Self::load_from_file(env_config)?
        } else {
            Self::default()
        };

        if let Some(data_dir) = cli_data_dir {
            config.data_dir = data_dir;
        } else if let Ok(env_data_dir) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(env_data_dir);
        }

        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
        Ok(config)
    }
}
