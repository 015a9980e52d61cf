//! The root multi-store.
//!
//! Composes named sub-stores under one version counter: mounting, version
//! loads with schema upgrades, the commit pipeline, the query router, cache
//! layers, snapshots, and the background state-storage plumbing.
//!
//! # Fatality
//!
//! Query-path failures come back as typed errors. Commit-path failures
//! (flush, engine commit, handle reload) panic: advancing with partial state
//! would diverge this node from the network, so the process halts instead.

use crate::cache::CacheMultiStore;
use crate::commitment::CommitmentStore;
use crate::config::StoreOptions;
use crate::kv::{prefix_end, KVStore};
use crate::mem::{MemoryStore, TransientStore};
use crate::pruning::PruningManager;
use crate::sc::{Committer, SnapshotNode, Tree, TreeNameUpgrade};
use crate::snapshot::{snapshot_item, SnapshotItem, SnapshotReader, SnapshotWriter};
use crate::ss::{SnapshotLeaf, StateStore};
use crate::state::StateView;
use crossbeam::channel::{bounded, Sender};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use strata_types::{
    merge_store_infos, CommitId, CommitInfo, Hash, KvProof, NamedChangeSet, ProofOp, ProofOps,
    StoreError, StoreInfo, StoreKey, StoreKind, StoreUpgrades, VersionedChangeSets,
};

/// Capacity of the pending change-set channel. When the state-storage apply
/// loop falls this many versions behind, commits block on the enqueue.
pub const PENDING_CHANGES_CAPACITY: usize = 1000;

/// Capacity of the snapshot-leaf channel feeding the state-storage importer.
/// Sized to absorb bursts without blocking the commitment-side import.
pub const IMPORT_LEAF_CAPACITY: usize = 10_000;

/// An ABCI-compatible query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// `/<storeName>[/<subPath>]`.
    pub path: String,
    /// Sub-path payload: the key for `/key`, the prefix for `/subspace`.
    pub data: Vec<u8>,
    /// Version to read at; zero or negative resolves to the latest.
    pub height: i64,
    /// Whether to attach merkle proofs.
    pub prove: bool,
}

/// A query result.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    /// The value (empty when absent), or the encoded pair list for
    /// `/subspace`.
    pub value: Vec<u8>,
    /// Proof ops chaining the value to the app hash, when requested.
    pub proof_ops: Option<ProofOps>,
    /// The version the query was actually served at.
    pub height: i64,
}

/// One mounted sub-store.
enum SubStore {
    Commitment(Arc<CommitmentStore>),
    Transient(Arc<TransientStore>),
    Memory(Arc<MemoryStore>),
}

impl SubStore {
    fn as_kv(&self) -> Arc<dyn KVStore> {
        match self {
            SubStore::Commitment(store) => store.clone(),
            SubStore::Transient(store) => store.clone(),
            SubStore::Memory(store) => store.clone(),
        }
    }
}

/// Mount table and published commit state, guarded by the root lock.
struct Mounts {
    params: HashMap<StoreKey, StoreKind>,
    by_name: HashMap<String, StoreKey>,
    stores: HashMap<StoreKey, SubStore>,
    last_commit_info: CommitInfo,
    loaded: bool,
}

/// The root multi-store.
pub struct RootStore {
    sc: Arc<dyn Committer>,
    ss: Option<Arc<dyn StateStore>>,
    inner: RwLock<Mounts>,
    pending: Mutex<Option<Sender<VersionedChangeSets>>>,
    apply_handle: Mutex<Option<JoinHandle<()>>>,
    pruning: Mutex<Option<PruningManager>>,
}

impl RootStore {
    /// Create a root store over the given engines.
    ///
    /// When the state-storage engine is present this spawns the apply loop
    /// and, if retention is configured, the pruning manager.
    pub fn new(
        sc: Arc<dyn Committer>,
        ss: Option<Arc<dyn StateStore>>,
        options: StoreOptions,
    ) -> Self {
        let (pending, apply_handle, pruning) = match &ss {
            Some(ss) => {
                let (tx, rx) = bounded::<VersionedChangeSets>(PENDING_CHANGES_CAPACITY);
                let apply_ss = ss.clone();
                let handle = std::thread::Builder::new()
                    .name("strata-ss-apply".to_string())
                    .spawn(move || {
                        for batch in rx {
                            for changeset in &batch.changesets {
                                if let Err(e) = apply_ss.apply_changeset(batch.version, changeset) {
                                    tracing::error!(
                                        version = batch.version,
                                        store = %changeset.name,
                                        error = %e,
                                        "state storage apply failed"
                                    );
                                    panic!(
                                        "state storage apply failed at version {}: {e}",
                                        batch.version
                                    );
                                }
                            }
                            tracing::trace!(
                                version = batch.version,
                                changesets = batch.changesets.len(),
                                "applied change sets to state storage"
                            );
                        }
                    })
                    .expect("failed to spawn state storage apply thread");

                let pruning = options.pruning.enabled().then(|| {
                    PruningManager::start(
                        ss.clone(),
                        options.pruning.keep_recent,
                        Duration::from_secs(options.pruning.prune_interval_seconds),
                    )
                });

                (Some(tx), Some(handle), pruning)
            }
            None => (None, None, None),
        };

        Self {
            sc,
            ss,
            inner: RwLock::new(Mounts {
                params: HashMap::new(),
                by_name: HashMap::new(),
                stores: HashMap::new(),
                last_commit_info: CommitInfo::default(),
                loaded: false,
            }),
            pending: Mutex::new(pending),
            apply_handle: Mutex::new(apply_handle),
            pruning: Mutex::new(pruning),
        }
    }

    /// Register a sub-store under `key` with the given kind.
    ///
    /// Fails with [`StoreError::DuplicateMount`] when the key identity or its
    /// name is already present.
    ///
    /// # Panics
    ///
    /// Panics when called after a version load; the mount table is static
    /// from then on.
    pub fn mount(&self, key: &StoreKey, kind: StoreKind) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        assert!(!inner.loaded, "mount must precede load_version");

        if inner.params.contains_key(key) || inner.by_name.contains_key(key.name()) {
            return Err(StoreError::DuplicateMount {
                name: key.name().to_string(),
            });
        }
        inner.params.insert(key.clone(), kind);
        inner.by_name.insert(key.name().to_string(), key.clone());
        Ok(())
    }

    /// Load the latest version. Normal node startup.
    pub fn load_latest_version(&self) -> Result<(), StoreError> {
        self.load_version_and_upgrade(0, None)
    }

    /// Load a version without upgrades. `0` means latest.
    pub fn load_version(&self, version: i64) -> Result<(), StoreError> {
        self.load_version_and_upgrade(version, None)
    }

    /// Load a version, applying schema upgrades at the boundary.
    pub fn load_version_and_upgrade(
        &self,
        version: i64,
        upgrades: Option<&StoreUpgrades>,
    ) -> Result<(), StoreError> {
        if version > u32::MAX as i64 {
            return Err(StoreError::VersionOverflow { version });
        }

        let mut inner = self.inner.write().unwrap();

        // Deterministic iteration order for initialization and upgrades.
        let mut keys: Vec<StoreKey> = inner.params.keys().cloned().collect();
        keys.sort_by(|a, b| a.name().cmp(b.name()));

        let initial_stores: Vec<String> = keys
            .iter()
            .filter(|key| inner.params[*key] == StoreKind::Commitment)
            .map(|key| key.name().to_string())
            .collect();
        self.sc.initialize(&initial_stores)?;

        if let Some(upgrades) = upgrades {
            let mut tree_upgrades = Vec::new();
            for name in &upgrades.deleted {
                tree_upgrades.push(TreeNameUpgrade {
                    name: name.clone(),
                    rename_from: None,
                    delete: true,
                });
            }
            for key in &keys {
                let name = key.name();
                if upgrades.is_added(name) || upgrades.renamed_from(name).is_some() {
                    tree_upgrades.push(TreeNameUpgrade {
                        name: name.to_string(),
                        rename_from: upgrades.renamed_from(name).map(str::to_string),
                        delete: false,
                    });
                }
            }
            if !tree_upgrades.is_empty() {
                self.sc.apply_upgrades(&tree_upgrades)?;
            }
        }

        let mut stores = HashMap::with_capacity(keys.len());
        for key in &keys {
            stores.insert(key.clone(), self.build_sub_store(key, inner.params[key])?);
        }
        inner.stores = stores;
        inner.loaded = true;

        // Reconstruct the published commit identity from the engine's state.
        let last_commit_info = if self.sc.version() != 0 {
            amend_commit_info(self.sc.last_commit_info(), &inner.params)
        } else {
            CommitInfo::default()
        };
        inner.last_commit_info = last_commit_info;

        tracing::info!(
            version = inner.last_commit_info.version,
            stores = keys.len(),
            "loaded multi-store"
        );
        Ok(())
    }

    fn build_sub_store(&self, key: &StoreKey, mounted: StoreKind) -> Result<SubStore, StoreError> {
        if key.kind() != mounted {
            return Err(StoreError::WrongKeyType {
                name: key.name().to_string(),
                mounted,
                actual: key.kind(),
            });
        }
        match mounted {
            StoreKind::Commitment => {
                let tree = self
                    .sc
                    .get_tree(key.name())
                    .ok_or_else(|| StoreError::MissingTree {
                        name: key.name().to_string(),
                    })?;
                Ok(SubStore::Commitment(Arc::new(CommitmentStore::new(
                    key.name(),
                    tree,
                ))))
            }
            StoreKind::Transient => Ok(SubStore::Transient(Arc::new(TransientStore::new()))),
            StoreKind::Memory => Ok(SubStore::Memory(Arc::new(MemoryStore::new()))),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Commit pipeline
    // ═══════════════════════════════════════════════════════════════════════

    /// Commit the current writes, producing the next version's commit id.
    ///
    /// `commit(false)` returns the current commit id without side effects.
    ///
    /// # Panics
    ///
    /// Any pipeline failure panics: the store must not advance with partial
    /// state.
    pub fn commit(&self, bump_version: bool) -> CommitId {
        if !bump_version {
            return self.inner.read().unwrap().last_commit_info.commit_id();
        }

        if let Err(e) = self.flush() {
            panic!("flush failed - cannot commit partial state: {e}");
        }

        let mut inner = self.inner.write().unwrap();

        // Non-commitment sub-stores first: transient contents do not outlive
        // the block.
        for store in inner.stores.values() {
            if let SubStore::Transient(transient) = store {
                transient.commit();
            }
        }

        let sc_commit = self
            .sc
            .commit()
            .unwrap_or_else(|e| panic!("state commitment commit failed: {e}"));

        // The engine may have swapped its internal trees; re-fetch every
        // commitment handle.
        for (key, store) in &inner.stores {
            if let SubStore::Commitment(commitment) = store {
                let tree = self.sc.get_tree(key.name()).unwrap_or_else(|| {
                    panic!("inconsistent store map, store {} not found", key.name())
                });
                commitment.reset_tree(tree);
            }
        }

        let last_commit_info = amend_commit_info(self.sc.last_commit_info(), &inner.params);
        inner.last_commit_info = last_commit_info;
        let commit_id = inner.last_commit_info.commit_id();
        tracing::debug!(
            version = commit_id.version,
            app_hash = %commit_id.hash,
            engine_version = sc_commit.version,
            "committed multi-store"
        );
        commit_id
    }

    /// Drain pending change sets into the engines.
    ///
    /// Change sets are sorted by store name for a deterministic apply order,
    /// enqueued to the state-storage loop (blocking when it is
    /// [`PENDING_CHANGES_CAPACITY`] versions behind), then applied to the
    /// commitment engine's working state.
    fn flush(&self) -> Result<(), StoreError> {
        let inner = self.inner.read().unwrap();
        let working_version = self.sc.working_version();

        let mut changesets: Vec<NamedChangeSet> = Vec::new();
        for (key, store) in &inner.stores {
            if let SubStore::Commitment(commitment) = store {
                let changeset = commitment.pop_change_set();
                if !changeset.is_empty() {
                    changesets.push(NamedChangeSet {
                        name: key.name().to_string(),
                        changeset,
                    });
                }
            }
        }
        drop(inner);

        if changesets.is_empty() {
            return Ok(());
        }
        changesets.sort_by(|a, b| a.name.cmp(&b.name));

        if self.ss.is_some() {
            let pending = self.pending.lock().unwrap();
            let sender = pending
                .as_ref()
                .ok_or_else(|| StoreError::Internal("store is closed".to_string()))?;
            sender
                .send(VersionedChangeSets {
                    version: working_version,
                    changesets: changesets.clone(),
                })
                .map_err(|_| {
                    StoreError::Internal("state storage apply loop terminated".to_string())
                })?;
        }

        self.sc.apply_change_sets(&changesets)
    }

    /// Flush pending writes and return the working (pre-commit) app hash.
    ///
    /// Idempotent when no new writes occurred since the last call.
    pub fn working_hash(&self) -> Result<Hash, StoreError> {
        self.flush()?;
        let inner = self.inner.read().unwrap();
        let commit_info = amend_commit_info(self.sc.working_commit_info(), &inner.params);
        Ok(commit_info.app_hash())
    }

    /// The last published commit id.
    pub fn last_commit_id(&self) -> CommitId {
        self.inner.read().unwrap().last_commit_info.commit_id()
    }

    /// The last published commit info (amended with memory placeholders).
    pub fn last_commit_info(&self) -> CommitInfo {
        self.inner.read().unwrap().last_commit_info.clone()
    }

    /// Set the version the first commit of a fresh store will produce.
    pub fn set_initial_version(&self, version: i64) -> Result<(), StoreError> {
        self.sc.set_initial_version(version)
    }

    /// Delete commitment versions strictly greater than `target`.
    ///
    /// Offline tooling only; must not run while the commit pipeline is
    /// active.
    pub fn rollback(&self, target: i64) -> Result<(), StoreError> {
        if target <= 0 {
            return Err(StoreError::InvalidRollbackTarget { target });
        }
        if target > u32::MAX as i64 {
            return Err(StoreError::VersionOverflow { version: target });
        }
        self.sc.rollback(target)
    }

    /// Close the engines and join the background tasks, aggregating errors.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut errors = Vec::new();
        if let Err(e) = self.sc.close() {
            errors.push(e);
        }
        self.shutdown_background();
        if let Some(ss) = &self.ss {
            if let Err(e) = ss.close() {
                errors.push(e);
            }
        }
        match StoreError::join(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drop the pending sender (terminating the apply loop), join it, and
    /// stop the pruning manager.
    fn shutdown_background(&self) {
        drop(self.pending.lock().unwrap().take());
        if let Some(handle) = self.apply_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(mut pruning) = self.pruning.lock().unwrap().take() {
            pruning.stop();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Store access
    // ═══════════════════════════════════════════════════════════════════════

    /// The sub-store mounted under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not mounted or no version is loaded.
    pub fn kv_store(&self, key: &StoreKey) -> Arc<dyn KVStore> {
        self.inner
            .read()
            .unwrap()
            .stores
            .get(key)
            .map(SubStore::as_kv)
            .unwrap_or_else(|| panic!("store {} is not mounted", key.name()))
    }

    /// The sub-store with the given name, if mounted.
    pub fn get_store_by_name(&self, name: &str) -> Option<Arc<dyn KVStore>> {
        let inner = self.inner.read().unwrap();
        let key = inner.by_name.get(name)?;
        inner.stores.get(key).map(SubStore::as_kv)
    }

    /// All mounted keys, sorted by name.
    pub fn store_keys(&self) -> Vec<StoreKey> {
        let inner = self.inner.read().unwrap();
        let mut keys: Vec<StoreKey> = inner.params.keys().cloned().collect();
        keys.sort_by(|a, b| a.name().cmp(b.name()));
        keys
    }

    /// A cache layer over the current sub-store set.
    pub fn cache_multi_store(&self) -> CacheMultiStore {
        let inner = self.inner.read().unwrap();
        CacheMultiStore::new(
            inner
                .stores
                .iter()
                .map(|(key, store)| (key.name().to_string(), store.as_kv()))
                .collect::<Vec<_>>(),
        )
    }

    /// A cache layer pinned to `version`.
    ///
    /// At the latest version (or `version <= 0`) this is the plain cache
    /// layer. Historically, non-commitment sub-stores are included live and
    /// commitment sub-stores are substituted with state-storage views at that
    /// version when the engine is enabled.
    pub fn cache_multi_store_with_version(
        &self,
        version: i64,
    ) -> Result<CacheMultiStore, StoreError> {
        {
            let inner = self.inner.read().unwrap();
            if version <= 0 || version == inner.last_commit_info.version {
                drop(inner);
                return Ok(self.cache_multi_store());
            }
        }

        let inner = self.inner.read().unwrap();
        let mut parents: Vec<(String, Arc<dyn KVStore>)> = Vec::new();
        for (key, store) in &inner.stores {
            match store {
                SubStore::Commitment(_) => {
                    if let Some(ss) = &self.ss {
                        parents.push((
                            key.name().to_string(),
                            Arc::new(StateView::new(ss.clone(), key.name(), version)),
                        ));
                    }
                }
                other => parents.push((key.name().to_string(), other.as_kv())),
            }
        }
        Ok(CacheMultiStore::new(parents))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Query router
    // ═══════════════════════════════════════════════════════════════════════

    /// Route a query to the right backing layer and attach proofs on demand.
    ///
    /// - historical height, no proof, state storage enabled: storage view;
    /// - historical height otherwise: read-only historical commitment engine;
    /// - latest height: the live commitment tree.
    pub fn query(&self, req: &QueryRequest) -> Result<QueryResponse, StoreError> {
        let (store_name, sub_path) = parse_path(&req.path)?;

        let inner = self.inner.read().unwrap();
        let key = inner
            .by_name
            .get(store_name)
            .ok_or_else(|| StoreError::UnknownStore {
                name: store_name.to_string(),
            })?;
        if inner.params[key] != StoreKind::Commitment {
            return Err(StoreError::UnknownStore {
                name: store_name.to_string(),
            });
        }

        let mut height = req.height;
        if height <= 0 {
            height = self.sc.version();
        }
        let last_version = inner.last_commit_info.version;
        let want_proof = req.prove && require_proof(sub_path);

        if height < last_version && !req.prove {
            if let Some(ss) = &self.ss {
                // Fast path: serve from state storage when no proof is needed.
                let value = query_state_storage(ss.as_ref(), store_name, height, sub_path, &req.data)?;
                return Ok(QueryResponse {
                    value,
                    proof_ops: None,
                    height,
                });
            }
        }

        if height < last_version {
            // Historical commitment engine, read-only, released on drop.
            let historical = self.sc.load_version(height)?;
            let tree = historical
                .get_tree(store_name)
                .ok_or_else(|| StoreError::UnknownStore {
                    name: store_name.to_string(),
                })?;
            let (value, kv_proof) = query_tree(tree.as_ref(), sub_path, &req.data, want_proof)?;

            let proof_ops = match kv_proof {
                Some(kv_proof) => {
                    // Prove against the commit info of the queried version,
                    // not the latest one.
                    let commit_info =
                        amend_commit_info(historical.last_commit_info(), &inner.params);
                    Some(assemble_proof(
                        &req.data,
                        kv_proof,
                        commit_info.proof_op(store_name)?,
                    )?)
                }
                None => None,
            };
            return Ok(QueryResponse {
                value,
                proof_ops,
                height,
            });
        }

        let tree = self
            .sc
            .get_tree(store_name)
            .ok_or_else(|| StoreError::UnknownStore {
                name: store_name.to_string(),
            })?;
        let (value, kv_proof) = query_tree(tree.as_ref(), sub_path, &req.data, want_proof)?;
        let proof_ops = match kv_proof {
            Some(kv_proof) => Some(assemble_proof(
                &req.data,
                kv_proof,
                inner.last_commit_info.proof_op(store_name)?,
            )?),
            None => None,
        };
        Ok(QueryResponse {
            value,
            proof_ops,
            height,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Snapshots
    // ═══════════════════════════════════════════════════════════════════════

    /// Stream the state at `height` into `writer`.
    pub fn snapshot<W: Write>(
        &self,
        height: u64,
        writer: &mut SnapshotWriter<W>,
    ) -> Result<(), StoreError> {
        if height > u32::MAX as u64 {
            return Err(StoreError::VersionOverflow {
                version: height as i64,
            });
        }

        let mut exporter = self.sc.exporter(height as i64)?;
        while let Some(item) = exporter.next_item()? {
            let framed = match item {
                crate::sc::ExportItem::Store(name) => SnapshotItem::store(name),
                crate::sc::ExportItem::Node(node) => SnapshotItem::node(&node),
            };
            writer.write_item(&framed)?;
        }
        Ok(())
    }

    /// Replace the store's state with a snapshot stream at `height`.
    ///
    /// The commitment and state-storage importers are fed in lock-step from
    /// the single stream. A failed restore leaves the store unreadable until
    /// a successful retry; there is no in-place rollback.
    pub fn restore<R: Read>(
        &self,
        height: u64,
        reader: &mut SnapshotReader<R>,
    ) -> Result<(), StoreError> {
        // The importer replaces the engine's on-disk state wholesale.
        self.sc.close()?;
        let mut importer = self.sc.importer(height as i64)?;

        let (leaf_tx, consumer) = match &self.ss {
            Some(ss) => {
                let (tx, rx) = bounded::<SnapshotLeaf>(IMPORT_LEAF_CAPACITY);
                let import_ss = ss.clone();
                let import_height = height as i64;
                let handle = std::thread::Builder::new()
                    .name("strata-ss-import".to_string())
                    .spawn(move || import_ss.import(import_height, rx))
                    .expect("failed to spawn state storage import thread");
                (Some(tx), Some(handle))
            }
            None => (None, None),
        };

        let mut current_store: Option<String> = None;
        let mut result: Result<(), StoreError> = Ok(());

        loop {
            let item = match reader.read_item() {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };

            match item.item {
                Some(snapshot_item::Item::Store(store)) => {
                    if let Err(e) = importer.add_tree(&store.name) {
                        result = Err(e);
                        break;
                    }
                    current_store = Some(store.name);
                }
                Some(snapshot_item::Item::Iavl(node)) => {
                    if node.height > i8::MAX as i32 {
                        result = Err(StoreError::NodeHeightOverflow {
                            height: node.height,
                        });
                        break;
                    }
                    let store_name = match &current_store {
                        Some(name) => name.clone(),
                        None => {
                            result = Err(StoreError::InvalidSnapshot(
                                "node before store header".to_string(),
                            ));
                            break;
                        }
                    };

                    let node = SnapshotNode {
                        key: node.key,
                        value: node.value,
                        height: node.height as i8,
                        version: node.version,
                    };
                    let leaf = (node.is_leaf() && leaf_tx.is_some()).then(|| SnapshotLeaf {
                        store_name,
                        key: node.key.clone(),
                        value: node.value.clone(),
                    });

                    if let Err(e) = importer.add_node(node) {
                        result = Err(e);
                        break;
                    }
                    if let (Some(tx), Some(leaf)) = (&leaf_tx, leaf) {
                        if tx.send(leaf).is_err() {
                            result = Err(StoreError::Internal(
                                "state storage import consumer terminated".to_string(),
                            ));
                            break;
                        }
                    }
                }
                // Unknown item kind, possibly an extension: stop here.
                None => break,
            }
        }

        if result.is_ok() {
            // Finalize only a fully streamed import, surfacing its error.
            if let Err(e) = importer.finalize() {
                result = Err(e);
            }
        } else {
            // A partial restore leaves the engine closed, so the store stays
            // unreadable until a successful retry.
            drop(importer);
        }

        drop(leaf_tx);
        if let Some(handle) = consumer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(_) => {
                    if result.is_ok() {
                        result = Err(StoreError::Internal(
                            "state storage import thread panicked".to_string(),
                        ));
                    }
                }
            }
        }

        result?;
        tracing::info!(height, "restored snapshot");
        self.load_latest_version()
    }
}

impl Drop for RootStore {
    fn drop(&mut self) {
        self.shutdown_background();
    }
}

/// Amend an engine commit info with placeholder infos for memory sub-stores.
///
/// Memory stores carry a zero commit id; transient stores contribute nothing.
/// The placeholders keep the app hash compatible with the inherited layout.
fn amend_commit_info(
    commit_info: CommitInfo,
    params: &HashMap<StoreKey, StoreKind>,
) -> CommitInfo {
    let extra: Vec<StoreInfo> = params
        .iter()
        .filter(|(_, kind)| **kind == StoreKind::Memory)
        .map(|(key, _)| StoreInfo {
            name: key.name().to_string(),
            commit_id: CommitId::default(),
        })
        .collect();
    merge_store_infos(commit_info, extra)
}

/// Whether queries under this sub-path must return a proof when asked to.
pub fn require_proof(sub_path: &str) -> bool {
    sub_path == "/key"
}

/// Parse `/<storeName>[/<subPath>]`.
///
/// The sub-path keeps its leading `/` and is empty when absent.
pub fn parse_path(path: &str) -> Result<(&str, &str), StoreError> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| StoreError::UnknownRequest(format!("invalid path: {path}")))?;

    let (store_name, sub_path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if store_name.is_empty() {
        return Err(StoreError::UnknownRequest(format!("invalid path: {path}")));
    }
    Ok((store_name, sub_path))
}

/// Serve one sub-path against a commitment tree.
fn query_tree(
    tree: &dyn Tree,
    sub_path: &str,
    data: &[u8],
    prove: bool,
) -> Result<(Vec<u8>, Option<KvProof>), StoreError> {
    match sub_path {
        "/key" => {
            if data.is_empty() {
                return Err(StoreError::UnknownRequest("empty query key".to_string()));
            }
            if prove {
                let (value, proof) = tree.get_with_proof(data)?;
                Ok((value.unwrap_or_default(), Some(proof)))
            } else {
                Ok((tree.get(data).unwrap_or_default(), None))
            }
        }
        "/subspace" => {
            let end = prefix_end(data);
            let pairs: Vec<(Vec<u8>, Vec<u8>)> =
                tree.iterator(Some(data), end.as_deref()).collect();
            let value = bincode::serialize(&pairs)
                .map_err(|e| StoreError::Internal(format!("subspace encoding failed: {e}")))?;
            Ok((value, None))
        }
        other => Err(StoreError::UnknownRequest(format!(
            "unexpected query path: {other}"
        ))),
    }
}

/// Serve one sub-path against the state-storage engine.
fn query_state_storage(
    ss: &dyn StateStore,
    store_name: &str,
    version: i64,
    sub_path: &str,
    data: &[u8],
) -> Result<Vec<u8>, StoreError> {
    match sub_path {
        "/key" => {
            if data.is_empty() {
                return Err(StoreError::UnknownRequest("empty query key".to_string()));
            }
            Ok(ss.get(store_name, version, data)?.unwrap_or_default())
        }
        "/subspace" => {
            let end = prefix_end(data);
            let pairs: Vec<(Vec<u8>, Vec<u8>)> = ss
                .iterator(store_name, version, Some(data), end.as_deref())?
                .collect();
            bincode::serialize(&pairs)
                .map_err(|e| StoreError::Internal(format!("subspace encoding failed: {e}")))
        }
        other => Err(StoreError::UnknownRequest(format!(
            "unexpected query path: {other}"
        ))),
    }
}

/// Chain the tree-level proof with the commit-info op.
fn assemble_proof(
    key: &[u8],
    kv_proof: KvProof,
    commit_info_op: ProofOp,
) -> Result<ProofOps, StoreError> {
    let mut ops = ProofOps::default();
    ops.push(ProofOp::kv(key, &kv_proof));
    ops.push(commit_info_op);
    Ok(ops)
}
