//! State-commitment engine contract.
//!
//! The commitment engine is an external collaborator: a persistent,
//! versioned, authenticated tree keyed by sub-store name. It owns the
//! canonical version counter and is the source of truth for the app hash.
//! This module defines the surface the root multi-store drives; a concrete
//! implementation lives behind these traits (see `strata-store-memory` for
//! the in-memory reference engine).
//!
//! All [`Committer`] methods take `&self`; implementations use interior
//! mutability. The root serializes the commit pipeline externally, queries
//! may read concurrently.

use crate::kv::KvIter;
use strata_types::{CommitId, CommitInfo, Hash, KvProof, NamedChangeSet, StoreError};
use std::sync::Arc;

/// One tree node streamed during snapshot export/import.
///
/// Leaf nodes have `height == 0`; only leaves carry application data, inner
/// nodes are accepted for wire compatibility and may be recomputed by the
/// importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    /// Node key (leaf: the application key).
    pub key: Vec<u8>,
    /// Node value (leaf: the application value).
    pub value: Vec<u8>,
    /// Height within the tree; bounded to `i8::MAX` on the wire.
    pub height: i8,
    /// Version the node was created at.
    pub version: i64,
}

impl SnapshotNode {
    /// Whether this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }
}

/// One item yielded by a [`TreeExporter`].
///
/// A `Store` header opens a sub-store; the `Node` items that follow belong to
/// it until the next header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportItem {
    /// Start of a new sub-store.
    Store(String),
    /// One node of the current sub-store.
    Node(SnapshotNode),
}

/// One tree-name schema change, translated from a store upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNameUpgrade {
    /// The tree the upgrade targets.
    pub name: String,
    /// Copy contents from this tree, which is then retired.
    pub rename_from: Option<String>,
    /// Delete the tree outright.
    pub delete: bool,
}

/// Read surface of one sub-store's authenticated tree.
pub trait Tree: Send + Sync {
    /// Get the value for `key`, if present.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Whether `key` is present.
    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Ascending iterator over `[start, end)`.
    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter;

    /// Descending iterator over `[start, end)`.
    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter;

    /// The tree's current root hash.
    fn root_hash(&self) -> Hash;

    /// The version this handle is pinned to.
    fn version(&self) -> i64;

    /// Get `key`'s value together with a membership or absence proof against
    /// [`root_hash`](Tree::root_hash).
    fn get_with_proof(&self, key: &[u8]) -> Result<(Option<Vec<u8>>, KvProof), StoreError>;
}

/// Streaming consumer rebuilding the engine's state from a snapshot.
pub trait TreeImporter: Send {
    /// Open a new (empty) tree; subsequent nodes belong to it.
    fn add_tree(&mut self, name: &str) -> Result<(), StoreError>;

    /// Add one node to the current tree.
    fn add_node(&mut self, node: SnapshotNode) -> Result<(), StoreError>;

    /// Finish the import, replacing the engine's state with the imported
    /// trees at the import height.
    fn finalize(self: Box<Self>) -> Result<(), StoreError>;
}

/// Streaming producer walking the engine's state at a fixed height.
pub trait TreeExporter: Send {
    /// The next item, or `None` when the export is complete.
    fn next_item(&mut self) -> Result<Option<ExportItem>, StoreError>;
}

/// The state-commitment engine.
pub trait Committer: Send + Sync {
    /// Hand the engine the canonical, name-sorted list of commitment
    /// sub-stores. Called once per version load, before upgrades.
    fn initialize(&self, store_names: &[String]) -> Result<(), StoreError>;

    /// Apply tree-name schema changes atomically.
    fn apply_upgrades(&self, upgrades: &[TreeNameUpgrade]) -> Result<(), StoreError>;

    /// Apply one version's change sets (sorted by store name) to the working
    /// state. Does not advance the committed version.
    fn apply_change_sets(&self, changesets: &[NamedChangeSet]) -> Result<(), StoreError>;

    /// Commit the working state, producing the next version's commit id.
    fn commit(&self) -> Result<CommitId, StoreError>;

    /// The latest committed version (0 when empty).
    fn version(&self) -> i64;

    /// The version the next commit will produce.
    fn working_version(&self) -> i64;

    /// Commit info at the latest committed version.
    fn last_commit_info(&self) -> CommitInfo;

    /// Commit info over the working (applied but uncommitted) state.
    fn working_commit_info(&self) -> CommitInfo;

    /// Tree handle for `name` at the latest committed version.
    ///
    /// Handles are snapshots: the engine may swap its internal trees on
    /// commit, so callers re-fetch handles after every commit.
    fn get_tree(&self, name: &str) -> Option<Arc<dyn Tree>>;

    /// Load a read-only view of a historical version. The returned engine is
    /// released by dropping it.
    fn load_version(&self, version: i64) -> Result<Box<dyn Committer>, StoreError>;

    /// Set the version the first commit of a fresh store will produce.
    fn set_initial_version(&self, version: i64) -> Result<(), StoreError>;

    /// Delete all versions strictly greater than `target`. Offline tooling
    /// only; must not run while the commit pipeline is active.
    fn rollback(&self, target: i64) -> Result<(), StoreError>;

    /// Open a streaming importer that will replace the engine's state at
    /// `height`. The engine must already be closed.
    fn importer(&self, height: i64) -> Result<Box<dyn TreeImporter>, StoreError>;

    /// Open a streaming exporter over the state at `height`.
    fn exporter(&self, height: i64) -> Result<Box<dyn TreeExporter>, StoreError>;

    /// Release the engine's resources.
    fn close(&self) -> Result<(), StoreError>;
}
