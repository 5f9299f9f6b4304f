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

//! Full lifecycle against the file-backed store: start, ingest, shut down,
//! restart and read the same answers back.

use probstat_core::{BlobStore, Dimension, EngineConfig, FileBlobStore, PersistenceConfig, PersistenceCoordinator, StatsEngine, Structure};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const NAMESPACE: &str = "prob_stats";

fn open_coordinator(dir: &TempDir, config: PersistenceConfig) -> Arc<PersistenceCoordinator> {
    let engine = Arc::new(StatsEngine::new(EngineConfig::default()).unwrap());
    let store = Arc::new(FileBlobStore::open(dir.path(), NAMESPACE).unwrap());
    Arc::new(PersistenceCoordinator::new(engine, store, config).unwrap())
}

fn fast_flush() -> PersistenceConfig {
    PersistenceConfig {
        flush_interval_ms: 20,
        ..Default::default()
    }
}

fn ingest(engine: &StatsEngine, events: usize) {
    for i in 0..events {
        let medium = match i % 10 {
            0..=5 => "social",
            6..=8 => "fb",
            _ => "vk",
        };
        engine.collect(&format!("profile{}", i % 25), medium, &format!("fun_{}", i % 3));
    }
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();

    let first = open_coordinator(&dir, fast_flush());
    assert!(first.start().unwrap().restored.is_empty());
    let handle = Arc::clone(&first).spawn();
    ingest(first.engine(), 3_000);
    let report = handle.shutdown().await.unwrap();
    assert!(report.is_complete());

    let expected_unique = first.engine().count_unique_entities();
    let expected_top: Vec<_> = Dimension::ALL.iter().map(|d| first.engine().top(*d)).collect();

    let second = open_coordinator(&dir, fast_flush());
    let restored = second.start().unwrap();
    assert_eq!(restored.restored.len(), Structure::ALL.len());

    let engine = second.engine();
    assert_eq!(engine.count_unique_entities(), expected_unique);
    assert_eq!(engine.count("social"), first.engine().count("social"));
    assert_eq!(engine.count("profile7:fb:fun_1"), first.engine().count("profile7:fb:fun_1"));
    let top: Vec<_> = Dimension::ALL.iter().map(|d| engine.top(*d)).collect();
    assert_eq!(top, expected_top);

    // restored sketches keep counting from where they left off
    engine.collect("profile0", "social", "fun_0");
    assert_eq!(engine.count("social"), first.engine().count("social") + 1);
}

#[tokio::test]
async fn test_restarted_loop_overwrites_rows() {
    let dir = TempDir::new().unwrap();

    let first = open_coordinator(&dir, fast_flush());
    first.start().unwrap();
    ingest(first.engine(), 100);
    Arc::clone(&first).spawn().shutdown().await.unwrap();

    let second = open_coordinator(&dir, fast_flush());
    second.start().unwrap();
    ingest(second.engine(), 100);
    Arc::clone(&second).spawn().shutdown().await.unwrap();

    let third = open_coordinator(&dir, fast_flush());
    third.start().unwrap();
    assert!(third.engine().count("social") >= 120);
    assert!((23..=27).contains(&third.engine().count_unique_entities()));
}

#[test]
fn test_corrupted_file_is_skipped_on_restore() {
    let dir = TempDir::new().unwrap();

    let first = open_coordinator(&dir, PersistenceConfig::default());
    first.start().unwrap();
    ingest(first.engine(), 500);
    assert!(first.flush().unwrap().is_complete());

    let hll_row = dir.path().join(NAMESPACE).join(format!("{}.blob", hex::encode("hll:entities")));
    let mut bytes = fs::read(&hll_row).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x55;
    fs::write(&hll_row, bytes).unwrap();

    let second = open_coordinator(&dir, PersistenceConfig::default());
    let report = second.start().unwrap();
    assert_eq!(report.failed, vec![Structure::Cardinality]);
    assert_eq!(second.engine().count_unique_entities(), 0);
    assert_eq!(second.engine().count("social"), first.engine().count("social"));
}

#[test]
fn test_first_run_creates_empty_rows() {
    let dir = TempDir::new().unwrap();
    let coordinator = open_coordinator(&dir, PersistenceConfig::default());
    coordinator.initialize().unwrap();

    let store = FileBlobStore::open(dir.path(), NAMESPACE).unwrap();
    let mut expected: Vec<String> = Structure::ALL.iter().map(|s| s.name().to_string()).collect();
    expected.sort();
    assert_eq!(store.keys().unwrap(), expected);
    for structure in Structure::ALL {
        assert_eq!(store.get(structure.name()).unwrap(), Some(Vec::new()));
    }
}
