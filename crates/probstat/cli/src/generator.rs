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

//! Synthetic event stream generator
//!
//! Draws `pid,utm_medium,utm_source` events from weighted tag lists and keeps
//! exact counters alongside, so sketch estimates can be checked against the
//! truth. Every weighted list is expanded into a pool where a tag of weight
//! `w` appears `w` times, then sampled uniformly.

use crate::commands::ingest::format_row;
use anyhow::{Result, bail};
use probstat_core::{Event, composite_key};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

pub const EVENTS_COUNT: &str = "events_count";
pub const UNIQUE_PID: &str = "unique_pid_count";
pub const UNIQUE_PID_UTMM: &str = "unique_pid_utmm_count";
pub const UNIQUE_PID_UTMS: &str = "unique_pid_utms_count";
pub const UNIQUE_PID_UTMM_UTMS: &str = "unique_pid_utmm_utms_count";

pub const EVENTS_HEADER: &str = "pid,utm_medium,utm_source";
pub const STATS_HEADER: &str = "counter_name,count";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub word: String,
    pub weight: u32,
}

impl Tag {
    pub fn new(word: impl Into<String>, weight: u32) -> Self {
        Self { word: word.into(), weight }
    }
}

fn tags(list: &[(&str, u32)]) -> Vec<Tag> {
    list.iter().map(|(word, weight)| Tag::new(*word, *weight)).collect()
}

pub fn utm_mediums() -> Vec<Tag> {
    tags(&[("social", 4), ("fb", 2), ("gg", 1), ("vk", 1), ("mailru", 1)])
}

pub fn utm_sources() -> Vec<Tag> {
    tags(&[("fun", 3), ("yemail", 1), ("camp", 1), ("experiment", 1), ("offer", 2)])
}

/// Appended to every source as `source_suffix`
pub fn source_suffixes() -> Vec<Tag> {
    tags(&[("extra", 1), ("new", 1), ("fanboys", 1), ("blackfriday", 3)])
}

/// Frequent producers; the generator adds `profiles` more with weight 1
pub fn heavy_profiles() -> Vec<Tag> {
    tags(&[("profile1", 3), ("profile2", 3), ("profile3", 2), ("profile4", 2), ("profile5", 2), ("profile6", 2)])
}

/// Uniform sampling pool built from weighted tags
#[derive(Debug, Clone)]
pub struct WeightedPool {
    items: Vec<String>,
}

impl WeightedPool {
    pub fn new(tags: &[Tag]) -> Result<Self> {
        let items: Vec<String> = tags.iter().flat_map(|tag| std::iter::repeat(tag.word.clone()).take(tag.weight as usize)).collect();
        if items.is_empty() {
            bail!("weighted pool needs at least one tag with positive weight");
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> &str {
        &self.items[rng.gen_range(0..self.items.len())]
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub events: u64,
    /// Weight-1 profiles added next to the heavy ones
    pub profiles: usize,
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            events: 100_000,
            profiles: 10_000,
            seed: None,
        }
    }
}

pub struct Generator {
    pids: WeightedPool,
    mediums: WeightedPool,
    sources: WeightedPool,
    suffixes: WeightedPool,
    rng: StdRng,
}

impl Generator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let mut pids = heavy_profiles();
        pids.extend((0..config.profiles).map(|i| Tag::new(format!("profile{}", i + 100), 1)));

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            pids: WeightedPool::new(&pids)?,
            mediums: WeightedPool::new(&utm_mediums())?,
            sources: WeightedPool::new(&utm_sources())?,
            suffixes: WeightedPool::new(&source_suffixes())?,
            rng,
        })
    }

    pub fn next_event(&mut self) -> Event {
        let pid = self.pids.sample(&mut self.rng).to_string();
        let medium = self.mediums.sample(&mut self.rng).to_string();
        let source = format!("{}_{}", self.sources.sample(&mut self.rng), self.suffixes.sample(&mut self.rng));
        Event::new(pid, medium, source)
    }
}

/// Exact counters over every key combination of the generated stream
#[derive(Debug, Clone, Default)]
pub struct ExactStats {
    counters: BTreeMap<String, u64>,
}

impl ExactStats {
    pub fn record(&mut self, event: &Event) {
        let pid = event.entity_id.as_str();
        let medium = event.attr1.as_str();
        let source = event.attr2.as_str();

        self.bump_first_seen(pid.to_string(), UNIQUE_PID.to_string());
        self.bump(medium.to_string());
        self.bump(source.to_string());
        self.bump_first_seen(composite_key(&[pid, medium]), composite_key(&[UNIQUE_PID_UTMM, medium]));
        self.bump_first_seen(composite_key(&[pid, source]), composite_key(&[UNIQUE_PID_UTMS, source]));
        self.bump(composite_key(&[medium, source]));
        self.bump_first_seen(composite_key(&[pid, medium, source]), composite_key(&[UNIQUE_PID_UTMM_UTMS, medium, source]));
        self.bump(EVENTS_COUNT.to_string());
    }

    fn bump(&mut self, key: String) {
        *self.counters.entry(key).or_default() += 1;
    }

    /// Count `key`, and count `unique_key` the first time `key` appears
    fn bump_first_seen(&mut self, key: String, unique_key: String) {
        if !self.counters.contains_key(&key) {
            self.bump(unique_key);
        }
        self.bump(key);
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn write_csv<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "{}", STATS_HEADER)?;
        for (name, count) in &self.counters {
            writeln!(out, "{}", format_row(&[name.as_str(), count.to_string().as_str()]))?;
        }
        out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateSummary {
    pub events: u64,
    pub profiles: usize,
    pub unique_pids: u64,
    pub counters: usize,
}

/// Write `config.events` rows to `events_out` and the exact counters to `stats_out`
pub fn generate<E: Write, S: Write>(config: &GeneratorConfig, mut events_out: E, stats_out: S) -> Result<GenerateSummary> {
    let mut generator = Generator::new(config)?;
    let mut stats = ExactStats::default();

    writeln!(events_out, "{}", EVENTS_HEADER)?;
    for i in 0..config.events {
        let event = generator.next_event();
        stats.record(&event);
        writeln!(events_out, "{}", format_row(&[event.entity_id.as_str(), event.attr1.as_str(), event.attr2.as_str()]))?;
        if i > 0 && i % 100_000 == 0 {
            tracing::info!("Generated {} events", i);
        }
    }
    events_out.flush()?;
    stats.write_csv(stats_out)?;

    Ok(GenerateSummary {
        events: config.events,
        profiles: heavy_profiles().len() + config.profiles,
        unique_pids: stats.get(UNIQUE_PID),
        counters: stats.len(),
    })
}
