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

//! Streaming Sketches
//!
//! Fixed-memory probabilistic summaries of a byte-string stream.
//!
//! # Components
//!
//! ## Cardinality
//! - [`HyperLogLog`]: distinct count with relative standard error `1.04/√m`
//!
//! ## Frequency
//! - [`CountMinSketch`]: point frequency with `true ≤ estimate ≤ true + ε·N`
//!   with probability `1 - δ`
//!
//! ## Heavy Hitters
//! - [`TopK`]: the K most frequent items, backed by a private count-min sketch
//!
//! # Persistence
//!
//! Every sketch implements [`PersistentSketch`], which wraps the sketch in a
//! tagged envelope and encodes it with bincode. The encoded form carries the
//! construction parameters and hash seeds, so a decoded sketch answers every
//! query exactly like the encoded one and keeps hashing new items the same way.

pub mod count_min;
pub mod hyperloglog;
pub mod top_k;

pub use count_min::CountMinSketch;
pub use hyperloglog::HyperLogLog;
pub use top_k::{Element, TopK};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version of the blob envelope written by [`PersistentSketch::to_bytes`]
pub const BLOB_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SketchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Expected a {expected} blob, found {found}")]
    KindMismatch { expected: &'static str, found: String },
    #[error("Unsupported blob format version {0}")]
    UnsupportedVersion(u32),
    #[error("Incompatible sketch parameters: {0}")]
    Incompatible(String),
}

pub type SketchResult<T> = Result<T, SketchError>;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    kind: &'a str,
    sketch: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    version: u32,
    kind: String,
}

/// Binary encoding of a sketch's complete state
pub trait PersistentSketch: Sized + Serialize + DeserializeOwned {
    /// Tag written into the envelope so blobs of one kind are never decoded as another
    const KIND: &'static str;

    /// Check the internal invariants every operation relies on
    fn validate(&self) -> SketchResult<()>;

    /// Whether `other` was built with the same parameters and hash seeds
    fn is_compatible(&self, other: &Self) -> bool;

    fn to_bytes(&self) -> SketchResult<Vec<u8>> {
        let envelope = EnvelopeRef {
            version: BLOB_FORMAT_VERSION,
            kind: Self::KIND,
            sketch: self,
        };
        bincode::serde::encode_to_vec(&envelope, bincode::config::standard()).map_err(|e| SketchError::Encode(e.to_string()))
    }

    fn from_bytes(data: &[u8]) -> SketchResult<Self> {
        let config = bincode::config::standard();
        let (header, read): (EnvelopeHeader, usize) = bincode::serde::decode_from_slice(data, config).map_err(|e| SketchError::Decode(e.to_string()))?;

        if header.version != BLOB_FORMAT_VERSION {
            return Err(SketchError::UnsupportedVersion(header.version));
        }
        if header.kind != Self::KIND {
            return Err(SketchError::KindMismatch {
                expected: Self::KIND,
                found: header.kind,
            });
        }

        let (sketch, _): (Self, usize) = bincode::serde::decode_from_slice(&data[read..], config).map_err(|e| SketchError::Decode(e.to_string()))?;
        sketch.validate()?;
        Ok(sketch)
    }

    /// Decode `data` and check it against the live sketch it would replace
    fn from_bytes_compatible(&self, data: &[u8]) -> SketchResult<Self> {
        let restored = Self::from_bytes(data)?;
        if !self.is_compatible(&restored) {
            return Err(SketchError::Incompatible(format!("persisted {} was built with different parameters", Self::KIND)));
        }
        Ok(restored)
    }
}

pub(crate) fn check_unit_interval(name: &str, value: f64) -> SketchResult<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(SketchError::InvalidConfig(format!("{} must be in (0, 1), got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashFamily;

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let hll = HyperLogLog::new(0.05, HashFamily::default()).unwrap();
        let bytes = hll.to_bytes().unwrap();

        let err = CountMinSketch::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, SketchError::KindMismatch { expected: "count-min", .. }));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(HyperLogLog::from_bytes(&[0xff, 0x01, 0x02]), Err(SketchError::Decode(_)) | Err(SketchError::UnsupportedVersion(_))));
        assert!(HyperLogLog::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_incompatible_parameters_are_rejected() {
        let live = CountMinSketch::with_dimensions(64, 3, HashFamily::new(1)).unwrap();
        let other = CountMinSketch::with_dimensions(64, 3, HashFamily::new(2)).unwrap();
        let bytes = other.to_bytes().unwrap();

        assert!(matches!(live.from_bytes_compatible(&bytes), Err(SketchError::Incompatible(_))));
        assert!(other.from_bytes_compatible(&bytes).is_ok());
    }

    #[test]
    fn test_check_unit_interval() {
        assert!(check_unit_interval("epsilon", 0.5).is_ok());
        assert!(check_unit_interval("epsilon", 0.0).is_err());
        assert!(check_unit_interval("epsilon", 1.0).is_err());
    }
}
