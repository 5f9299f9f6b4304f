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

pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;

/// HyperLogLog distinct-count estimator
///
/// Keeps `m = 2^precision` one-byte registers. Each register holds the
/// largest rank (position of the first set bit) seen among the hashes routed
/// to it, so registers only ever grow and the estimator never forgets an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
    hasher: HashFamily,
}

impl HyperLogLog {
    /// Create an estimator for a target relative standard error.
    ///
    /// The register count is `(1.04 / relative_error)²` rounded up to the next
    /// power of two.
    pub fn new(relative_error: f64, hasher: HashFamily) -> SketchResult<Self> {
        Self::with_precision(Self::precision_for_error(relative_error)?, hasher)
    }

    pub fn with_precision(precision: u8, hasher: HashFamily) -> SketchResult<Self> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(SketchError::InvalidConfig(format!(
                "precision must be in {}..={}, got {}",
                MIN_PRECISION, MAX_PRECISION, precision
            )));
        }

        Ok(Self {
            precision,
            registers: vec![0; 1 << precision],
            hasher,
        })
    }

    /// Smallest precision whose register count reaches `(1.04 / relative_error)²`.
    ///
    /// Loose targets are rounded up to [`MIN_PRECISION`]; a target that needs
    /// more than `2^MAX_PRECISION` registers is rejected.
    pub fn precision_for_error(relative_error: f64) -> SketchResult<u8> {
        check_unit_interval("relative error", relative_error)?;
        let registers = (1.04 / relative_error).powi(2).ceil();
        let precision = registers.log2().ceil().max(MIN_PRECISION as f64);
        if precision > MAX_PRECISION as f64 {
            return Err(SketchError::InvalidConfig(format!(
                "relative error {} needs 2^{} registers, at most 2^{} are supported",
                relative_error, precision, MAX_PRECISION
            )));
        }
        Ok(precision as u8)
    }

    fn alpha(register_count: usize) -> f64 {
        match register_count {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / register_count as f64),
        }
    }

    pub fn add(&mut self, item: &[u8]) {
        let hash = self.hasher.hash(item);
        let index = (hash >> (64 - self.precision)) as usize;
        let remaining = hash << self.precision;
        let max_rank = 64 - self.precision as u32 + 1;
        let rank = (remaining.leading_zeros() + 1).min(max_rank) as u8;

        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    pub fn count(&self) -> u64 {
        let m = self.registers.len() as f64;
        let mut sum = 0.0;
        let mut zeros = 0usize;
        for &register in &self.registers {
            sum += 2.0_f64.powi(-(register as i32));
            if register == 0 {
                zeros += 1;
            }
        }

        let raw = Self::alpha(self.registers.len()) * m * m / sum;

        // Linear counting below 2.5m. Hashes are 64 bits wide, so the 32-bit
        // large-range correction never applies.
        let estimate = if raw <= 2.5 * m && zeros > 0 { m * (m / zeros as f64).ln() } else { raw };

        estimate.round() as u64
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    /// Expected relative standard error, `1.04/√m`
    pub fn relative_error(&self) -> f64 {
        1.04 / (self.registers.len() as f64).sqrt()
    }

    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.registers.len()
    }
}

impl PersistentSketch for HyperLogLog {
    const KIND: &'static str = "hyperloglog";

    fn validate(&self) -> SketchResult<()> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&self.precision) {
            return Err(SketchError::Decode(format!("precision {} out of range", self.precision)));
        }
        if self.registers.len() != 1 << self.precision {
            return Err(SketchError::Decode(format!(
                "{} registers for precision {}",
                self.registers.len(),
                self.precision
            )));
        }
        let max_rank = 64 - self.precision + 1;
        if self.registers.iter().any(|&rank| rank > max_rank) {
            return Err(SketchError::Decode(format!("register rank above {}", max_rank)));
        }
        Ok(())
    }

    fn is_compatible(&self, other: &Self) -> bool {
        self.precision == other.precision && self.hasher == other.hasher
    }
}
