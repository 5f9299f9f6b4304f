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

mod commands;
mod config;
mod generator;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{CommandContext, print_json};
use config::ProbstatConfig;
use generator::GeneratorConfig;
use probstat_core::Dimension;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::Level;

/// Probabilistic stream statistics
#[derive(Parser, Debug)]
#[command(name = "probstat", version, about = "Approximate counts, distinct entities and heavy hitters over an event stream")]
pub struct Cli {
    /// Path to configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory location (overrides $PROBSTAT_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a CSV file of `entity,attr1,attr2` rows (first row is a header)
    Ingest {
        /// Path to the CSV file
        csv: PathBuf,
    },

    /// Read rows from stdin until EOF or Ctrl-C, flushing in the background
    Run {
        /// Treat the first stdin row as a header
        #[arg(long)]
        header: bool,
    },

    /// Estimated frequency of a key, e.g. `social` or `profile1:social`
    Count { key: String },

    /// Estimated number of distinct entities
    Unique,

    /// Heavy hitters of a dimension: entity, attr1, attr2 or attr1:attr2
    Top { dimension: Dimension },

    /// Write a synthetic event stream and its exact counters
    Generate {
        /// Number of events to generate
        #[arg(long, default_value_t = 100_000)]
        events: u64,

        /// Number of weight-1 profiles next to the built-in heavy ones
        #[arg(long, default_value_t = 10_000)]
        profiles: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Event stream output
        #[arg(long, default_value = "test-data.csv")]
        out: PathBuf,

        /// Exact counters output
        #[arg(long, default_value = "test-stat.csv")]
        stats_out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    // The generator never touches the store
    if let Commands::Generate {
        events,
        profiles,
        seed,
        out,
        stats_out,
    } = cli.command
    {
        let config = GeneratorConfig { events, profiles, seed };
        let summary = generator::generate(&config, BufWriter::new(File::create(&out)?), BufWriter::new(File::create(&stats_out)?))?;
        return print_json(&summary);
    }

    let config = ProbstatConfig::resolve_config(cli.config, cli.data_dir)?;
    let ctx = CommandContext::open(config)?;

    match cli.command {
        Commands::Ingest { csv } => print_json(&commands::ingest::ingest_file(&ctx, &csv)?),
        Commands::Run { header } => print_json(&commands::ingest::run(&ctx, header).await?),
        Commands::Count { key } => print_json(&commands::query::count(&ctx, &key)),
        Commands::Unique => print_json(&commands::query::unique(&ctx)),
        Commands::Top { dimension } => print_json(&commands::query::top(&ctx, dimension)),
        Commands::Generate { .. } => Ok(()),
    }
}
