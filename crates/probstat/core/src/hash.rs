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

//! Seeded hash functions shared by every sketch.
//!
//! Hashes must be stable across processes and platforms: a sketch restored
//! from the blob store keeps hashing new items into the same registers and
//! columns it used before the restart. `std`'s `DefaultHasher` gives no such
//! guarantee, so the family is built on xxh3.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Seed used when the configuration does not provide one
pub const DEFAULT_SEED: u64 = 0x5eed_0f_9b0b_57a7;

/// A deterministic 64-bit hash function over byte strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashFamily {
    seed: u64,
}

impl HashFamily {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Hash `data` to a uniformly distributed 64-bit value
    #[inline]
    pub fn hash(&self, data: &[u8]) -> u64 {
        xxh3_64_with_seed(data, self.seed)
    }

    /// Derive the `index`-th member of the family.
    ///
    /// Members are independently seeded so that two rows of a count-min
    /// sketch do not collide on the same pairs of keys.
    pub fn derive(&self, index: u64) -> Self {
        Self::new(mix64(self.seed ^ index.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15)))
    }

    /// Derive `count` members in order
    pub fn derive_many(&self, count: usize) -> Vec<Self> {
        (0..count as u64).map(|i| self.derive(i)).collect()
    }
}

impl Default for HashFamily {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

/// splitmix64 finalizer
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
