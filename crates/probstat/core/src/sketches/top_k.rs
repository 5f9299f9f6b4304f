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

use super::{CountMinSketch, PersistentSketch, SketchError, SketchResult};
use crate::hash::HashFamily;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Reverse;

/// A heavy hitter and its estimated frequency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub item: Vec<u8>,
    pub count: u64,
}

impl Element {
    pub fn item_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.item)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Candidate {
    item: Vec<u8>,
    count: u64,
    /// Admission sequence number, used to break ties deterministically
    admitted: u64,
}

/// Approximate top-K tracker for one dimension
///
/// Frequencies come from a private count-min sketch; at most `k` candidates
/// are kept alongside it. A new item displaces the weakest candidate only
/// when its estimate is strictly greater. Displaced items are forgotten and
/// re-enter later with whatever the sketch says about them.
///
/// Ties are broken by admission order: among candidates with the same
/// minimum estimate the most recently admitted one is evicted, and
/// [`TopK::elements`] lists equal estimates in admission order. This is an
/// implementation detail rather than a guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopK {
    k: usize,
    sketch: CountMinSketch,
    candidates: Vec<Candidate>,
    admissions: u64,
}

impl TopK {
    pub fn new(k: usize, epsilon: f64, delta: f64, family: HashFamily) -> SketchResult<Self> {
        Self::with_sketch(k, CountMinSketch::new(epsilon, delta, family)?)
    }

    pub fn with_sketch(k: usize, sketch: CountMinSketch) -> SketchResult<Self> {
        if k == 0 {
            return Err(SketchError::InvalidConfig("k must be positive".to_string()));
        }

        Ok(Self {
            k,
            sketch,
            candidates: Vec::with_capacity(k),
            admissions: 0,
        })
    }

    pub fn add(&mut self, item: &[u8]) {
        let estimate = self.sketch.add(item).count(item);

        if let Some(candidate) = self.candidates.iter_mut().find(|c| c.item == item) {
            candidate.count = estimate;
            return;
        }

        if self.candidates.len() < self.k {
            self.admit(item, estimate, None);
            return;
        }

        let weakest = self
            .candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| (c.count, Reverse(c.admitted)))
            .map(|(index, c)| (index, c.count));

        if let Some((index, count)) = weakest {
            if estimate > count {
                self.admit(item, estimate, Some(index));
            }
        }
    }

    fn admit(&mut self, item: &[u8], count: u64, replace: Option<usize>) {
        let candidate = Candidate {
            item: item.to_vec(),
            count,
            admitted: self.admissions,
        };
        self.admissions += 1;

        match replace {
            Some(index) => self.candidates[index] = candidate,
            None => self.candidates.push(candidate),
        }
    }

    /// Current heavy hitters, highest estimate first
    pub fn elements(&self) -> Vec<Element> {
        let mut ranked: Vec<&Candidate> = self.candidates.iter().collect();
        ranked.sort_by_key(|c| (Reverse(c.count), c.admitted));
        ranked
            .into_iter()
            .map(|c| Element {
                item: c.item.clone(),
                count: c.count,
            })
            .collect()
    }

    /// Sketch estimate for any item, tracked or not
    pub fn estimate(&self, item: &[u8]) -> u64 {
        self.sketch.count(item)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.sketch.memory_bytes() + self.candidates.iter().map(|c| std::mem::size_of::<Candidate>() + c.item.len()).sum::<usize>()
    }
}

impl PersistentSketch for TopK {
    const KIND: &'static str = "top-k";

    fn validate(&self) -> SketchResult<()> {
        if self.k == 0 || self.candidates.len() > self.k {
            return Err(SketchError::Decode(format!("{} candidates for k = {}", self.candidates.len(), self.k)));
        }
        self.sketch.validate()
    }

    fn is_compatible(&self, other: &Self) -> bool {
        self.k == other.k && self.sketch.is_compatible(&other.sketch)
    }
}
