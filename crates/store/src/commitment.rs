//! Commitment sub-store: one authenticated tree plus a pending change set.
//!
//! Writes buffer in the store until the commit pipeline drains them with
//! [`pop_change_set`](CommitmentStore::pop_change_set); reads see the buffer
//! layered over the committed tree. The tree handle is replaced in place
//! after every commit because the commitment engine may swap its internal
//! trees when it commits.

use crate::iter::merge_iter;
use crate::kv::{assert_valid_key, KVStore, KvIter};
use crate::sc::Tree;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};
use strata_types::{ChangeSet, KvPair};

/// A sub-store backed by one tree of the state-commitment engine.
pub struct CommitmentStore {
    name: String,
    tree: RwLock<Arc<dyn Tree>>,
    pending: Mutex<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl CommitmentStore {
    /// Wrap a tree handle.
    pub fn new(name: impl Into<String>, tree: Arc<dyn Tree>) -> Self {
        Self {
            name: name.into(),
            tree: RwLock::new(tree),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// The sub-store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current tree handle.
    pub fn tree(&self) -> Arc<dyn Tree> {
        self.tree.read().unwrap().clone()
    }

    /// Replace the tree handle after a commit swapped the engine's trees.
    pub fn reset_tree(&self, tree: Arc<dyn Tree>) {
        *self.tree.write().unwrap() = tree;
    }

    /// Atomically drain the pending change set, leaving the buffer empty.
    ///
    /// Pairs come out in ascending key order; within one version the buffer
    /// keeps only the last write per key.
    pub fn pop_change_set(&self) -> ChangeSet {
        let mut pending = self.pending.lock().unwrap();
        let drained = std::mem::take(&mut *pending);
        ChangeSet {
            pairs: drained
                .into_iter()
                .map(|(key, value)| KvPair { key, value })
                .collect(),
        }
    }

    /// Snapshot of the pending buffer restricted to `[start, end)`, in the
    /// requested direction.
    fn pending_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        let pending = self.pending.lock().unwrap();
        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
        let mut items: Vec<_> = pending
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if reverse {
            items.reverse();
        }
        items
    }
}

impl KVStore for CommitmentStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        assert_valid_key(key);
        if let Some(buffered) = self.pending.lock().unwrap().get(key) {
            return buffered.clone();
        }
        self.tree.read().unwrap().get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        assert_valid_key(key);
        self.pending
            .lock()
            .unwrap()
            .insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&self, key: &[u8]) {
        assert_valid_key(key);
        self.pending.lock().unwrap().insert(key.to_vec(), None);
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        let overlay = self.pending_range(start, end, false);
        let base = self.tree.read().unwrap().iterator(start, end);
        merge_iter(overlay, base, false)
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        let overlay = self.pending_range(start, end, true);
        let base = self.tree.read().unwrap().reverse_iterator(start, end);
        merge_iter(overlay, base, true)
    }
}
