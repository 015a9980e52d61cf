//! Non-persistent sub-stores.
//!
//! Both variants are plain in-memory maps outside the commitment engine.
//! They differ only in commit behavior: a [`TransientStore`] is cleared on
//! every commit, a [`MemoryStore`] survives commits (and contributes a
//! placeholder store info to the app hash; see the root store).

use crate::kv::{assert_valid_key, KVStore, KvIter};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

/// In-memory sub-store that survives commits.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let data = self.data.read().unwrap();
        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
        let mut items: Vec<_> = data
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if reverse {
            items.reverse();
        }
        items
    }

    pub(crate) fn clear(&self) {
        self.data.write().unwrap().clear();
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        assert_valid_key(key);
        self.data.read().unwrap().get(key).cloned()
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        assert_valid_key(key);
        self.data
            .write()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
    }

    fn delete(&self, key: &[u8]) {
        assert_valid_key(key);
        self.data.write().unwrap().remove(key);
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        Box::new(self.range(start, end, false).into_iter())
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        Box::new(self.range(start, end, true).into_iter())
    }
}

/// In-memory sub-store reset on every commit.
#[derive(Default)]
pub struct TransientStore {
    inner: MemoryStore,
}

impl TransientStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all contents; invoked by the commit pipeline.
    pub fn commit(&self) {
        self.inner.clear();
    }
}

impl KVStore for TransientStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        self.inner.set(key, value);
    }

    fn delete(&self, key: &[u8]) {
        self.inner.delete(key);
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        self.inner.iterator(start, end)
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        self.inner.reverse_iterator(start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set(b"k", b"v");
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
        assert!(store.has(b"k"));

        store.delete(b"k");
        assert_eq!(store.get(b"k"), None);
    }

    #[test]
    fn test_memory_store_iteration() {
        let store = MemoryStore::new();
        store.set(b"a", b"1");
        store.set(b"b", b"2");
        store.set(b"c", b"3");

        let keys: Vec<_> = store
            .iterator(Some(b"a"), Some(b"c"))
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

        let rev: Vec<_> = store.reverse_iterator(None, None).map(|(k, _)| k).collect();
        assert_eq!(rev, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_transient_clears_on_commit() {
        let store = TransientStore::new();
        store.set(b"scratch", b"data");
        assert!(store.has(b"scratch"));

        store.commit();
        assert!(!store.has(b"scratch"));
    }
}
