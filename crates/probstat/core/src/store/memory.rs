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

use super::{BlobStore, StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-process blob store
///
/// Can be switched offline to simulate an outage: while unavailable every
/// operation fails with [`StoreError::Unavailable`] and nothing is written.
#[derive(Debug)]
pub struct MemoryBlobStore {
    rows: RwLock<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
    writes: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of successful `put`/`insert_if_absent` writes
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.rows.read().get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        self.check_available()?;
        self.rows.write().insert(key.to_string(), data.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn insert_if_absent(&self, key: &str, data: &[u8]) -> StoreResult<bool> {
        self.check_available()?;
        let mut rows = self.rows.write();
        if rows.contains_key(key) {
            return Ok(false);
        }
        rows.insert(key.to_string(), data.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.check_available()?;
        let mut keys: Vec<String> = self.rows.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_overwrite() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.get("cms:any-key").unwrap(), None);

        store.put("cms:any-key", b"one").unwrap();
        store.put("cms:any-key", b"two").unwrap();
        assert_eq!(store.get("cms:any-key").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_insert_if_absent_never_overwrites() {
        let store = MemoryBlobStore::new();
        assert!(store.insert_if_absent("hll:entities", b"").unwrap());
        store.put("hll:entities", b"state").unwrap();
        assert!(!store.insert_if_absent("hll:entities", b"").unwrap());
        assert_eq!(store.get("hll:entities").unwrap(), Some(b"state".to_vec()));
    }

    #[test]
    fn test_outage() {
        let store = MemoryBlobStore::new();
        store.put("k", b"v").unwrap();

        store.set_available(false);
        assert!(matches!(store.get("k"), Err(StoreError::Unavailable(_))));
        assert!(matches!(store.put("k", b"w"), Err(StoreError::Unavailable(_))));
        assert!(store.keys().is_err());

        store.set_available(true);
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.keys().unwrap(), vec!["k".to_string()]);
    }
}
