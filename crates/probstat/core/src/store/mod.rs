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

//! Durable Key-Blob Storage
//!
//! Rows are `(key, data)` pairs: the key is a structure name and the data is
//! one structure's entire serialized state. Writes overwrite in place
//! (last-write-wins) and rows are never deleted.

pub mod file;
pub mod memory;

pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupted row {key}: {reason}")]
    Corruption { key: String, reason: String },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-blob store backing the persistence coordinator
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Get the blob stored under `key`
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Overwrite (or create) the row for `key`
    fn put(&self, key: &str, data: &[u8]) -> StoreResult<()>;

    /// Create the row for `key` only if it does not exist yet.
    ///
    /// Returns whether a row was inserted.
    fn insert_if_absent(&self, key: &str, data: &[u8]) -> StoreResult<bool>;

    /// Keys of every stored row
    fn keys(&self) -> StoreResult<Vec<String>>;
}
