//! Read-only sub-store view over the state-storage engine.

use crate::kv::{assert_valid_key, KVStore, KvIter};
use crate::ss::StateStore;
use std::sync::Arc;

/// A sub-store pinned to one `(store_name, version)` of the storage engine.
///
/// Serves non-proof historical reads. Writes are a contract violation and
/// panic; engine read errors (a view outliving the retention window) panic
/// too, because the `KVStore` surface has no error channel. The query router
/// talks to the engine directly and surfaces those conditions as typed errors
/// instead.
pub struct StateView {
    ss: Arc<dyn StateStore>,
    store_name: String,
    version: i64,
}

impl StateView {
    /// Pin `store_name` at `version`.
    pub fn new(ss: Arc<dyn StateStore>, store_name: impl Into<String>, version: i64) -> Self {
        Self {
            ss,
            store_name: store_name.into(),
            version,
        }
    }

    /// The pinned version.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// The pinned sub-store name.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }
}

impl KVStore for StateView {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        assert_valid_key(key);
        self.ss
            .get(&self.store_name, self.version, key)
            .unwrap_or_else(|e| panic!("state storage read failed: {e}"))
    }

    fn set(&self, _key: &[u8], _value: &[u8]) {
        panic!(
            "cannot write to read-only view of store {} at version {}",
            self.store_name, self.version
        );
    }

    fn delete(&self, _key: &[u8]) {
        panic!(
            "cannot write to read-only view of store {} at version {}",
            self.store_name, self.version
        );
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        self.ss
            .iterator(&self.store_name, self.version, start, end)
            .unwrap_or_else(|e| panic!("state storage scan failed: {e}"))
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        self.ss
            .reverse_iterator(&self.store_name, self.version, start, end)
            .unwrap_or_else(|e| panic!("state storage scan failed: {e}"))
    }
}
