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

//! File-backed blob store
//!
//! One directory per namespace, one file per row. The file name is the
//! hex-encoded key so that any key (including `:` and the empty string) maps
//! to a valid, unique file name. Each file is a fixed header followed by the
//! payload:
//!
//! ```text
//! +-------+---------+----------+--------+-------------+---------+
//! | magic | version | reserved | crc32  | payload len | payload |
//! | 4 B   | u16 LE  | u16      | u32 LE | u64 LE      | ...     |
//! +-------+---------+----------+--------+-------------+---------+
//! ```
//!
//! Rows are replaced atomically: the new row is written to a temporary file
//! in the same directory, synced, then renamed over the old one.

use super::{BlobStore, StoreError, StoreResult};
use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const ROW_MAGIC: [u8; 4] = *b"PSTB";
const ROW_VERSION: u16 = 1;
const HEADER_SIZE: usize = 20;
const ROW_EXTENSION: &str = "blob";

#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
    /// Serializes the check-then-write of `insert_if_absent`
    insert_lock: Mutex<()>,
}

impl FileBlobStore {
    /// Open (creating if needed) the namespace directory under `data_dir`
    pub fn open<P: AsRef<Path>>(data_dir: P, namespace: &str) -> StoreResult<Self> {
        if namespace.is_empty() || namespace == "." || namespace == ".." || namespace.contains(['/', '\\']) {
            return Err(StoreError::InvalidNamespace(namespace.to_string()));
        }

        let dir = data_dir.as_ref().join(namespace);
        fs::create_dir_all(&dir)?;
        if !fs::metadata(&dir)?.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(ErrorKind::Other, format!("{} is not a directory", dir.display()))));
        }

        debug!("Opened blob store at {}", dir.display());
        Ok(Self {
            dir,
            insert_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn row_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", hex::encode(key.as_bytes()), ROW_EXTENSION))
    }

    fn encode_row(data: &[u8]) -> Vec<u8> {
        let mut row = Vec::with_capacity(HEADER_SIZE + data.len());
        row.extend_from_slice(&ROW_MAGIC);
        row.extend_from_slice(&ROW_VERSION.to_le_bytes());
        row.extend_from_slice(&0u16.to_le_bytes());
        row.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        row.extend_from_slice(&(data.len() as u64).to_le_bytes());
        row.extend_from_slice(data);
        row
    }

    fn decode_row(key: &str, mut row: Vec<u8>) -> StoreResult<Vec<u8>> {
        let corrupt = |reason: &str| StoreError::Corruption {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if row.len() < HEADER_SIZE {
            return Err(corrupt("truncated header"));
        }
        if row[0..4] != ROW_MAGIC {
            return Err(corrupt("bad magic"));
        }

        let version = u16::from_le_bytes([row[4], row[5]]);
        if version != ROW_VERSION {
            return Err(corrupt(&format!("unsupported row version {}", version)));
        }

        let checksum = u32::from_le_bytes([row[8], row[9], row[10], row[11]]);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&row[12..20]);
        let len = u64::from_le_bytes(len_bytes) as usize;

        if row.len() - HEADER_SIZE != len {
            return Err(corrupt(&format!("expected {} payload bytes, found {}", len, row.len() - HEADER_SIZE)));
        }

        let payload = row.split_off(HEADER_SIZE);
        if crc32fast::hash(&payload) != checksum {
            return Err(corrupt("checksum mismatch"));
        }
        Ok(payload)
    }

    fn write_row(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(&Self::encode_row(data))?;
        file.as_file().sync_all()?;
        file.persist(self.row_path(key)).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.row_path(key)) {
            Ok(row) => Self::decode_row(key, row).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        self.write_row(key, data)
    }

    fn insert_if_absent(&self, key: &str, data: &[u8]) -> StoreResult<bool> {
        let _guard = self.insert_lock.lock();
        if self.row_path(key).exists() {
            return Ok(false);
        }
        self.write_row(key, data)?;
        Ok(true)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ROW_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(key) = hex::decode(stem).ok().and_then(|bytes| String::from_utf8(bytes).ok()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
