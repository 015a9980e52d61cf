//! In-memory state-storage engine.

use crossbeam::channel::Receiver;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;
use strata_store::ss::{SnapshotLeaf, StateStore};
use strata_store::KvIter;
use strata_types::{NamedChangeSet, StoreError};

/// Per key: value (or tombstone) at each version that touched it.
type KeyVersions = BTreeMap<i64, Option<Vec<u8>>>;
type StoreData = BTreeMap<Vec<u8>, KeyVersions>;

struct SsInner {
    stores: HashMap<String, StoreData>,
    latest: i64,
    earliest: i64,
}

impl SsInner {
    fn check_version(&self, version: i64) -> Result<(), StoreError> {
        if version < self.earliest {
            return Err(StoreError::PrunedHeight { height: version });
        }
        Ok(())
    }
}

/// In-memory state-storage engine: a multi-version map per sub-store.
///
/// Each key keeps its value per touching version; a read at version `v`
/// resolves to the newest entry `<= v`. Pruning collapses everything at or
/// below the cutoff into a single base entry per key and moves the earliest
/// readable version past the cutoff.
pub struct MemStateStore {
    inner: RwLock<SsInner>,
}

impl MemStateStore {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SsInner {
                stores: HashMap::new(),
                latest: 0,
                earliest: 1,
            }),
        }
    }

    fn range(
        &self,
        store_name: &str,
        version: i64,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let inner = self.inner.read().unwrap();
        inner.check_version(version)?;

        let store = match inner.stores.get(store_name) {
            Some(store) => store,
            None => return Ok(Vec::new()),
        };
        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));

        Ok(store
            .range((lower, upper))
            .filter_map(|(key, versions)| {
                resolve(versions, version).map(|value| (key.clone(), value))
            })
            .collect())
    }
}

impl Default for MemStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest value at or below `version`; `None` for absent or deleted.
fn resolve(versions: &KeyVersions, version: i64) -> Option<Vec<u8>> {
    versions
        .range(..=version)
        .next_back()
        .and_then(|(_, value)| value.clone())
}

impl StateStore for MemStateStore {
    fn get(
        &self,
        store_name: &str,
        version: i64,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.inner.read().unwrap();
        inner.check_version(version)?;
        Ok(inner
            .stores
            .get(store_name)
            .and_then(|store| store.get(key))
            .and_then(|versions| resolve(versions, version)))
    }

    fn iterator(
        &self,
        store_name: &str,
        version: i64,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<KvIter, StoreError> {
        let items = self.range(store_name, version, start, end)?;
        Ok(Box::new(items.into_iter()))
    }

    fn reverse_iterator(
        &self,
        store_name: &str,
        version: i64,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<KvIter, StoreError> {
        let mut items = self.range(store_name, version, start, end)?;
        items.reverse();
        Ok(Box::new(items.into_iter()))
    }

    fn latest_version(&self) -> i64 {
        self.inner.read().unwrap().latest
    }

    fn earliest_version(&self) -> i64 {
        self.inner.read().unwrap().earliest
    }

    fn apply_changeset(&self, version: i64, changeset: &NamedChangeSet) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let store = inner.stores.entry(changeset.name.clone()).or_default();
        for pair in &changeset.changeset.pairs {
            store
                .entry(pair.key.clone())
                .or_default()
                .insert(version, pair.value.clone());
        }
        inner.latest = inner.latest.max(version);
        Ok(())
    }

    fn prune(&self, version: i64) -> Result<(), StoreError> {
        if version <= 0 {
            return Ok(());
        }
        let mut inner = self.inner.write().unwrap();

        for store in inner.stores.values_mut() {
            store.retain(|_, versions| {
                let later = versions.split_off(&(version + 1));
                let base = versions.iter().next_back().map(|(v, value)| (*v, value.clone()));
                *versions = later;
                match base {
                    // A live base value stays as the floor for later reads.
                    Some((v, value @ Some(_))) => {
                        versions.entry(v).or_insert(value);
                    }
                    // A tombstone base only matters while newer entries exist.
                    Some((_, None)) | None => {}
                }
                !versions.is_empty()
            });
        }
        inner.earliest = inner.earliest.max(version + 1);
        Ok(())
    }

    fn import(&self, version: i64, leaves: Receiver<SnapshotLeaf>) -> Result<(), StoreError> {
        let mut stores: HashMap<String, StoreData> = HashMap::new();
        let mut count = 0usize;
        for leaf in leaves {
            stores
                .entry(leaf.store_name)
                .or_default()
                .entry(leaf.key)
                .or_default()
                .insert(version, Some(leaf.value));
            count += 1;
        }

        let mut inner = self.inner.write().unwrap();
        inner.stores = stores;
        inner.latest = version;
        inner.earliest = version;
        tracing::debug!(version, leaves = count, "imported state storage snapshot");
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
