// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Key-value storage seam shared by the event store, snapshot store, and
//! artifact cache.
//!
//! `store`, `snapshot`, and `cache` are all built over this single trait so
//! a caller can swap the in-memory implementation for a persistent backend
//! without touching any component logic. Keys and values are opaque byte
//! strings; ordering guarantees (used by the snapshot store's deep-time
//! index) are expressed via [`KvStore::scan_prefix`], which must return
//! entries in ascending lexicographic key order.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::TruthError;

/// Minimal ordered key-value storage trait.
pub trait KvStore: Send + Sync {
    /// Fetches the value stored at `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TruthError>;

    /// Stores `value` at `key`, overwriting any existing value.
    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), TruthError>;

    /// Removes `key`, if present.
    fn delete(&self, key: &[u8]) -> Result<(), TruthError>;

    /// Returns whether `key` is present.
    fn has(&self, key: &[u8]) -> Result<bool, TruthError> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns all `(key, value)` pairs whose key starts with `prefix`, in
    /// ascending lexicographic key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TruthError>;
}

/// In-memory `KvStore` sufficient for single-process use and for tests.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TruthError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| TruthError::StorageUnavailable("memory kv poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), TruthError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| TruthError::StorageUnavailable("memory kv poisoned".to_string()))?;
        guard.insert(key.to_vec(), value);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TruthError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| TruthError::StorageUnavailable("memory kv poisoned".to_string()))?;
        Ok(guard
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn delete(&self, key: &[u8]) -> Result<(), TruthError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| TruthError::StorageUnavailable("memory kv poisoned".to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let kv = MemoryKv::new();
        kv.put(b"a", vec![1, 2, 3]).unwrap();
        assert_eq!(kv.get(b"a").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(kv.get(b"missing").unwrap(), None);
    }

    #[test]
    fn scan_prefix_is_ascending_and_prefix_bounded() {
        let kv = MemoryKv::new();
        kv.put(b"stream/a/0001", vec![1]).unwrap();
        kv.put(b"stream/a/0002", vec![2]).unwrap();
        kv.put(b"stream/b/0001", vec![3]).unwrap();

        let results = kv.scan_prefix(b"stream/a/").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, b"stream/a/0001");
        assert_eq!(results[1].0, b"stream/a/0002");
    }
}
