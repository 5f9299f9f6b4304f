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

//! End-to-end accuracy and concurrency properties of the stats engine

use probstat_core::{Dimension, EngineConfig, MemoryBlobStore, PersistenceConfig, PersistenceCoordinator, StatsEngine, composite_key};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

fn create_engine(seed: u64) -> StatsEngine {
    StatsEngine::new(EngineConfig::default().with_hash_seed(seed)).unwrap()
}

fn weighted_medium(i: usize) -> &'static str {
    match i % 10 {
        0..=6 => "social",
        7 | 8 => "fb",
        _ => "gg",
    }
}

#[test]
fn test_unique_entities_within_error_bound() {
    let n = 20_000u64;
    // 4 standard errors at the default 2% target
    let tolerance = 0.08;

    for seed in 1..=5 {
        let engine = create_engine(seed);
        for i in 0..n {
            engine.collect(&format!("entity-{}", i), "m", "s");
        }
        let estimate = engine.count_unique_entities() as f64;
        let error = (estimate - n as f64).abs() / n as f64;
        assert!(error < tolerance, "seed {}: estimate {} off by {:.3}", seed, estimate, error);
    }
}

#[test]
fn test_skewed_stream_ranks_every_dimension() {
    let engine = create_engine(7);
    for i in 0..5_000 {
        let medium = weighted_medium(i);
        engine.collect(medium, medium, medium);
    }

    for dimension in [Dimension::Entity, Dimension::Attr1, Dimension::Attr2] {
        let items: Vec<String> = engine.top(dimension).iter().map(|e| e.item_str().into_owned()).collect();
        assert_eq!(items, vec!["social", "fb", "gg"], "dimension {}", dimension);
    }

    let pairs: Vec<String> = engine.top(Dimension::Attr1Attr2).iter().map(|e| e.item_str().into_owned()).collect();
    assert_eq!(pairs, vec!["social:social", "fb:fb", "gg:gg"]);
}

#[test]
fn test_joint_frequencies() {
    let engine = create_engine(3);
    let mut truth: HashMap<String, u64> = HashMap::new();

    for i in 0..3_000 {
        let entity = format!("profile{}", i % 7);
        let medium = weighted_medium(i);
        let source = if i % 4 == 0 { "offer_blackfriday" } else { "fun_new" };
        engine.collect(&entity, medium, source);

        for key in [composite_key(&[entity.as_str(), medium]), composite_key(&[medium, source]), composite_key(&[entity.as_str(), medium, source])] {
            *truth.entry(key).or_default() += 1;
        }
    }

    let total = engine.stats().frequency_total;
    let bound = (engine.config().frequency_error * total as f64).ceil() as u64;
    for (key, count) in truth {
        let estimate = engine.count(&key);
        assert!(estimate >= count, "{} undercounted", key);
        assert!(estimate <= count + bound, "{} overcounted: {} > {} + {}", key, estimate, count, bound);
    }
}

#[test]
fn test_concurrent_overlapping_writers() {
    let engine = Arc::new(create_engine(11));
    let handles: Vec<_> = (0..6)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..2_000 {
                    let entity = if i % 2 == 0 { "shared".to_string() } else { format!("own-{}", t) };
                    engine.collect(&entity, weighted_medium(i), "fun");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.events_collected(), 12_000);
    assert!(engine.count("shared") >= 6_000);
    for t in 0..6 {
        assert!(engine.count(&format!("own-{}", t)) >= 1_000);
    }
    assert!(engine.count("fun") >= 12_000);
    assert_eq!(engine.top(Dimension::Entity)[0].item_str(), "shared");
}

#[test]
fn test_store_outage_does_not_change_answers() {
    let healthy = Arc::new(create_engine(5));
    let degraded = Arc::new(create_engine(5));

    let healthy_store = Arc::new(MemoryBlobStore::new());
    let degraded_store = Arc::new(MemoryBlobStore::new());
    let healthy_coordinator = PersistenceCoordinator::new(healthy.clone(), healthy_store, PersistenceConfig::default()).unwrap();
    let degraded_coordinator = PersistenceCoordinator::new(degraded.clone(), degraded_store.clone(), PersistenceConfig::default()).unwrap();
    healthy_coordinator.start().unwrap();
    degraded_coordinator.start().unwrap();

    for i in 0..4_000 {
        if i == 1_000 {
            degraded_store.set_available(false);
        }
        if i % 500 == 0 {
            healthy_coordinator.flush().unwrap();
            degraded_coordinator.flush().unwrap();
        }
        let entity = format!("profile{}", i % 13);
        for engine in [&healthy, &degraded] {
            engine.collect(&entity, weighted_medium(i), "fun_new");
        }
    }

    assert_eq!(healthy.count_unique_entities(), degraded.count_unique_entities());
    for key in ["social", "fb", "profile3", "social:fun_new", "profile3:gg"] {
        assert_eq!(healthy.count(key), degraded.count(key));
    }
    for dimension in Dimension::ALL {
        assert_eq!(healthy.top(dimension), degraded.top(dimension));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_collect_never_undercounts(events in prop::collection::vec(("[a-c]{0,2}", "[x-z]{0,1}", "[0-9]{0,1}"), 1..200)) {
        let engine = create_engine(42);
        let mut truth: HashMap<String, u64> = HashMap::new();

        for (entity, attr1, attr2) in &events {
            engine.collect(entity, attr1, attr2);
            for key in [entity.clone(), attr1.clone(), attr2.clone(), composite_key(&[attr1.as_str(), attr2.as_str()])] {
                *truth.entry(key).or_default() += 1;
            }
        }

        for (key, count) in &truth {
            prop_assert!(engine.count(key) >= *count);
        }
        prop_assert!(engine.count_unique_entities() >= 1);
        prop_assert!(engine.top(Dimension::Entity).len() <= engine.config().top_k);
    }
}
