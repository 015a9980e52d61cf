//! State-storage engine contract.
//!
//! The storage engine is an external collaborator: an unauthenticated,
//! versioned key/value store optimized for historical reads and pruning of
//! old versions. It is optional; without it the commitment engine alone
//! serves queries. The root feeds it asynchronously from the commit pipeline
//! and prunes it from a background loop.

use crate::kv::KvIter;
use crossbeam::channel::Receiver;
use strata_types::{NamedChangeSet, StoreError};

/// One leaf forwarded to the storage engine during snapshot restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLeaf {
    /// Sub-store the leaf belongs to.
    pub store_name: String,
    /// Application key.
    pub key: Vec<u8>,
    /// Application value.
    pub value: Vec<u8>,
}

/// The state-storage engine.
///
/// Reads are versioned: `version` pins the view, and versions outside the
/// retention window fail with [`StoreError::PrunedHeight`]. Writes arrive as
/// whole change sets from the apply loop, never key by key.
pub trait StateStore: Send + Sync {
    /// Get `key` in `store_name` as of `version`.
    fn get(&self, store_name: &str, version: i64, key: &[u8])
        -> Result<Option<Vec<u8>>, StoreError>;

    /// Whether `key` exists in `store_name` as of `version`.
    fn has(&self, store_name: &str, version: i64, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(store_name, version, key)?.is_some())
    }

    /// Ascending iterator over `[start, end)` in `store_name` as of `version`.
    fn iterator(
        &self,
        store_name: &str,
        version: i64,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<KvIter, StoreError>;

    /// Descending iterator over `[start, end)` in `store_name` as of `version`.
    fn reverse_iterator(
        &self,
        store_name: &str,
        version: i64,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<KvIter, StoreError>;

    /// The highest version the engine has applied (0 when empty).
    fn latest_version(&self) -> i64;

    /// The lowest version still readable (1 when nothing was pruned).
    fn earliest_version(&self) -> i64;

    /// Record one sub-store's change set at `version`. The data becomes
    /// visible to reads at versions `>= version`.
    fn apply_changeset(&self, version: i64, changeset: &NamedChangeSet) -> Result<(), StoreError>;

    /// Drop all versions `<= version`, keeping the newest entry per key as
    /// the base for later versions. Safe against concurrent reads; a view
    /// pinned at a pruned version fails on its next read.
    fn prune(&self, version: i64) -> Result<(), StoreError>;

    /// Bulk-import leaves at `version`, draining the channel until all
    /// senders are dropped. Replaces any existing contents.
    fn import(&self, version: i64, leaves: Receiver<SnapshotLeaf>) -> Result<(), StoreError>;

    /// Release the engine's resources.
    fn close(&self) -> Result<(), StoreError>;
}
