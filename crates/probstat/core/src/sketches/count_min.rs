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

use super::{PersistentSketch, SketchError, SketchResult, check_unit_interval};
use crate::hash::HashFamily;
use serde::{Deserialize, Serialize};

/// Upper bound on `width * depth` (128 MiB of counters)
pub const MAX_COUNTERS: usize = 1 << 24;

/// Count-Min sketch for approximate key frequencies
///
/// A `depth × width` matrix of counters with one independently seeded hash
/// function per row. Adding a key increments one counter per row; the
/// estimate is the minimum of those counters.
///
/// # Error Bounds
///
/// For a key with true count `c` after `N` total additions:
/// - `c ≤ estimate` always
/// - `estimate ≤ c + εN` with probability `1 - δ`, where `ε = e/width` and
///   `δ = e^-depth`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountMinSketch {
    width: usize,
    depth: usize,
    /// Row-major `[depth][width]`
    counters: Vec<u64>,
    hashers: Vec<HashFamily>,
    total: u64,
}

impl CountMinSketch {
    /// Create a sketch from an additive error fraction and a failure probability.
    ///
    /// `width = ⌈e/epsilon⌉` and `depth = ⌈ln(1/delta)⌉`.
    pub fn new(epsilon: f64, delta: f64, family: HashFamily) -> SketchResult<Self> {
        let (width, depth) = Self::dimensions_for(epsilon, delta)?;
        Self::with_dimensions(width, depth, family)
    }

    /// `(width, depth)` for an error fraction and failure probability
    pub fn dimensions_for(epsilon: f64, delta: f64) -> SketchResult<(usize, usize)> {
        check_unit_interval("epsilon", epsilon)?;
        check_unit_interval("delta", delta)?;

        let width = (std::f64::consts::E / epsilon).ceil() as usize;
        let depth = ((1.0 / delta).ln().ceil() as usize).max(1);
        Self::check_dimensions(width, depth)?;
        Ok((width, depth))
    }

    fn check_dimensions(width: usize, depth: usize) -> SketchResult<()> {
        if width == 0 || depth == 0 {
            return Err(SketchError::InvalidConfig("width and depth must be positive".to_string()));
        }
        match width.checked_mul(depth) {
            Some(cells) if cells <= MAX_COUNTERS => Ok(()),
            _ => Err(SketchError::InvalidConfig(format!(
                "{}x{} counters exceed the limit of {}",
                depth, width, MAX_COUNTERS
            ))),
        }
    }

    pub fn with_dimensions(width: usize, depth: usize, family: HashFamily) -> SketchResult<Self> {
        Self::check_dimensions(width, depth)?;

        Ok(Self {
            width,
            depth,
            counters: vec![0; width * depth],
            hashers: family.derive_many(depth),
            total: 0,
        })
    }

    #[inline]
    fn cell(&self, row: usize, key: &[u8]) -> usize {
        let column = (self.hashers[row].hash(key) % self.width as u64) as usize;
        row * self.width + column
    }

    /// Increment `key` by one. Returns `self` so the keys of one event can be chained.
    pub fn add(&mut self, key: &[u8]) -> &mut Self {
        self.add_count(key, 1)
    }

    pub fn add_count(&mut self, key: &[u8], count: u64) -> &mut Self {
        for row in 0..self.depth {
            let cell = self.cell(row, key);
            self.counters[cell] = self.counters[cell].saturating_add(count);
        }
        self.total = self.total.saturating_add(count);
        self
    }

    /// Estimated frequency of `key`; never below the true count
    pub fn count(&self, key: &[u8]) -> u64 {
        (0..self.depth).map(|row| self.counters[self.cell(row, key)]).min().unwrap_or(0)
    }

    /// Total number of additions, `N`
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Effective additive error fraction, `e/width`
    pub fn epsilon(&self) -> f64 {
        std::f64::consts::E / self.width as f64
    }

    /// Absolute over-count bound `εN` that holds with probability `1 - δ`
    pub fn error_bound(&self) -> u64 {
        (self.epsilon() * self.total as f64).ceil() as u64
    }

    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.counters.len() * std::mem::size_of::<u64>() + self.hashers.len() * std::mem::size_of::<HashFamily>()
    }
}

impl PersistentSketch for CountMinSketch {
    const KIND: &'static str = "count-min";

    fn validate(&self) -> SketchResult<()> {
        Self::check_dimensions(self.width, self.depth).map_err(|e| SketchError::Decode(e.to_string()))?;
        if self.counters.len() != self.width * self.depth {
            return Err(SketchError::Decode(format!(
                "{} counters for a {}x{} sketch",
                self.counters.len(),
                self.depth,
                self.width
            )));
        }
        if self.hashers.len() != self.depth {
            return Err(SketchError::Decode(format!("{} hashers for depth {}", self.hashers.len(), self.depth)));
        }
        Ok(())
    }

    fn is_compatible(&self, other: &Self) -> bool {
        self.width == other.width && self.depth == other.depth && self.hashers == other.hashers
    }
}
