//! Cache layer over a set of sub-stores.
//!
//! A [`CacheMultiStore`] gives the block executor an isolated view: reads are
//! memoized, writes buffer locally, and [`write`](CacheMultiStore::write)
//! flushes them down to the parents in one pass. Version-pinned cache
//! multi-stores (query contexts) are assembled by the root store, which
//! substitutes storage-engine views for the commitment sub-stores.

use crate::iter::merge_iter;
use crate::kv::{assert_valid_key, KVStore, KvIter};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock};
use strata_types::StoreKey;

/// Read-memoizing, write-buffering layer over one parent store.
pub struct CacheStore {
    parent: Arc<dyn KVStore>,
    /// Buffered writes; `None` marks a delete.
    dirty: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    /// Memoized parent reads, misses included.
    reads: RwLock<HashMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl CacheStore {
    /// Wrap a parent store.
    pub fn new(parent: Arc<dyn KVStore>) -> Self {
        Self {
            parent,
            dirty: RwLock::new(BTreeMap::new()),
            reads: RwLock::new(HashMap::new()),
        }
    }

    /// Flush buffered writes to the parent and drop all cached state.
    pub fn write(&self) {
        let mut dirty = self.dirty.write().unwrap();
        for (key, value) in dirty.iter() {
            match value {
                Some(value) => self.parent.set(key, value),
                None => self.parent.delete(key),
            }
        }
        dirty.clear();
        self.reads.write().unwrap().clear();
    }

    fn dirty_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        let dirty = self.dirty.read().unwrap();
        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
        let mut items: Vec<_> = dirty
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if reverse {
            items.reverse();
        }
        items
    }
}

impl KVStore for CacheStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        assert_valid_key(key);
        if let Some(buffered) = self.dirty.read().unwrap().get(key) {
            return buffered.clone();
        }
        if let Some(cached) = self.reads.read().unwrap().get(key) {
            return cached.clone();
        }
        let value = self.parent.get(key);
        self.reads
            .write()
            .unwrap()
            .insert(key.to_vec(), value.clone());
        value
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        assert_valid_key(key);
        self.dirty
            .write()
            .unwrap()
            .insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&self, key: &[u8]) {
        assert_valid_key(key);
        self.dirty.write().unwrap().insert(key.to_vec(), None);
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        let overlay = self.dirty_range(start, end, false);
        merge_iter(overlay, self.parent.iterator(start, end), false)
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        let overlay = self.dirty_range(start, end, true);
        merge_iter(overlay, self.parent.reverse_iterator(start, end), true)
    }
}

/// A cache layer over a whole sub-store set, keyed by store name.
pub struct CacheMultiStore {
    stores: HashMap<String, Arc<CacheStore>>,
}

impl CacheMultiStore {
    pub(crate) fn new(parents: impl IntoIterator<Item = (String, Arc<dyn KVStore>)>) -> Self {
        Self {
            stores: parents
                .into_iter()
                .map(|(name, parent)| (name, Arc::new(CacheStore::new(parent))))
                .collect(),
        }
    }

    /// The cached sub-store mounted under `key`, if present.
    pub fn store(&self, key: &StoreKey) -> Option<Arc<CacheStore>> {
        self.store_by_name(key.name())
    }

    /// The cached sub-store with the given name, if present.
    pub fn store_by_name(&self, name: &str) -> Option<Arc<CacheStore>> {
        self.stores.get(name).cloned()
    }

    /// Flush every cached sub-store's buffered writes to its parent.
    pub fn write(&self) {
        for store in self.stores.values() {
            store.write();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemoryStore;

    #[test]
    fn test_cache_isolates_until_write() {
        let parent: Arc<dyn KVStore> = Arc::new(MemoryStore::new());
        parent.set(b"a", b"1");

        let cache = CacheStore::new(parent.clone());
        cache.set(b"b", b"2");
        cache.delete(b"a");

        // Parent untouched until flush.
        assert_eq!(parent.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(parent.get(b"b"), None);
        assert_eq!(cache.get(b"a"), None);
        assert_eq!(cache.get(b"b"), Some(b"2".to_vec()));

        cache.write();
        assert_eq!(parent.get(b"a"), None);
        assert_eq!(parent.get(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_cache_iterator_layers_dirty_writes() {
        let parent: Arc<dyn KVStore> = Arc::new(MemoryStore::new());
        parent.set(b"a", b"1");
        parent.set(b"c", b"3");

        let cache = CacheStore::new(parent);
        cache.set(b"b", b"2");
        cache.delete(b"c");

        let keys: Vec<_> = cache.iterator(None, None).map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_multi_store_write_flushes_all() {
        let p1: Arc<dyn KVStore> = Arc::new(MemoryStore::new());
        let p2: Arc<dyn KVStore> = Arc::new(MemoryStore::new());
        let cms = CacheMultiStore::new(vec![
            ("one".to_string(), p1.clone()),
            ("two".to_string(), p2.clone()),
        ]);

        cms.store_by_name("one").unwrap().set(b"k", b"v1");
        cms.store_by_name("two").unwrap().set(b"k", b"v2");
        assert!(cms.store_by_name("three").is_none());

        cms.write();
        assert_eq!(p1.get(b"k"), Some(b"v1".to_vec()));
        assert_eq!(p2.get(b"k"), Some(b"v2".to_vec()));
    }
}
