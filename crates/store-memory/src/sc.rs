//! In-memory state-commitment engine.

use im::OrdMap;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use strata_store::sc::{
    Committer, ExportItem, SnapshotNode, Tree, TreeExporter, TreeImporter, TreeNameUpgrade,
};
use strata_store::KvIter;
use strata_types::{
    merkle_root, leaf_hash, AbsenceLeaf, CommitId, CommitInfo, Hash, KvProof, MerkleProof,
    NamedChangeSet, StoreError, StoreInfo,
};

type TreeData = OrdMap<Vec<u8>, Vec<u8>>;

fn tree_root(data: &TreeData) -> Hash {
    let leaves: Vec<Hash> = data.iter().map(|(k, v)| leaf_hash(k, v)).collect();
    merkle_root(&leaves)
}

/// One named tree: the working state plus the last committed state.
struct TreeState {
    working: TreeData,
    committed: TreeData,
    committed_root: Hash,
}

impl TreeState {
    fn empty() -> Self {
        Self {
            working: TreeData::new(),
            committed: TreeData::new(),
            committed_root: Hash::ZERO,
        }
    }

    fn from_data(data: TreeData) -> Self {
        let committed_root = tree_root(&data);
        Self {
            working: data.clone(),
            committed: data,
            committed_root,
        }
    }
}

struct ScInner {
    trees: BTreeMap<String, TreeState>,
    version: i64,
    initial_version: i64,
    /// Commit info per committed version; drives historical loads and export.
    commit_infos: BTreeMap<i64, CommitInfo>,
    /// Per committed version, every tree's data (structurally shared).
    history: BTreeMap<i64, BTreeMap<String, TreeData>>,
    closed: bool,
}

impl ScInner {
    fn working_version(&self) -> i64 {
        if self.version == 0 {
            self.initial_version.max(1)
        } else {
            self.version + 1
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Internal(
                "commitment engine is closed".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory state-commitment engine.
///
/// Keeps every committed version as a structurally shared snapshot, so
/// historical loads, exports, and rollback work without a retention limit.
pub struct MemCommitter {
    inner: Arc<RwLock<ScInner>>,
}

impl MemCommitter {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ScInner {
                trees: BTreeMap::new(),
                version: 0,
                initial_version: 0,
                commit_infos: BTreeMap::new(),
                history: BTreeMap::new(),
                closed: false,
            })),
        }
    }
}

impl Default for MemCommitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Committer for MemCommitter {
    fn initialize(&self, store_names: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        // The initial store list only seeds an empty engine; a populated one
        // changes shape through upgrades.
        if inner.version == 0 {
            for name in store_names {
                inner
                    .trees
                    .entry(name.clone())
                    .or_insert_with(TreeState::empty);
            }
        }
        Ok(())
    }

    fn apply_upgrades(&self, upgrades: &[TreeNameUpgrade]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.ensure_open()?;

        for upgrade in upgrades {
            if upgrade.delete {
                if inner.trees.remove(&upgrade.name).is_none() {
                    tracing::warn!(name = %upgrade.name, "delete upgrade for absent tree");
                }
                continue;
            }
            match &upgrade.rename_from {
                Some(old_name) => {
                    let old = inner.trees.remove(old_name).ok_or_else(|| {
                        StoreError::MissingTree {
                            name: old_name.clone(),
                        }
                    })?;
                    if inner.trees.insert(upgrade.name.clone(), old).is_some() {
                        return Err(StoreError::Internal(format!(
                            "rename target {} already exists",
                            upgrade.name
                        )));
                    }
                }
                None => {
                    if inner
                        .trees
                        .insert(upgrade.name.clone(), TreeState::empty())
                        .is_some()
                    {
                        return Err(StoreError::Internal(format!(
                            "added tree {} already exists",
                            upgrade.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_change_sets(&self, changesets: &[NamedChangeSet]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.ensure_open()?;

        for named in changesets {
            let tree = inner
                .trees
                .get_mut(&named.name)
                .ok_or_else(|| StoreError::MissingTree {
                    name: named.name.clone(),
                })?;
            for pair in &named.changeset.pairs {
                match &pair.value {
                    Some(value) => {
                        tree.working.insert(pair.key.clone(), value.clone());
                    }
                    None => {
                        tree.working.remove(&pair.key);
                    }
                }
            }
        }
        Ok(())
    }

    fn commit(&self) -> Result<CommitId, StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.ensure_open()?;

        let new_version = inner.working_version();
        let mut store_infos = Vec::with_capacity(inner.trees.len());
        let mut snapshot = BTreeMap::new();
        for (name, tree) in inner.trees.iter_mut() {
            tree.committed = tree.working.clone();
            tree.committed_root = tree_root(&tree.committed);
            store_infos.push(StoreInfo {
                name: name.clone(),
                commit_id: CommitId::new(new_version, tree.committed_root),
            });
            snapshot.insert(name.clone(), tree.committed.clone());
        }

        let commit_info = CommitInfo {
            version: new_version,
            store_infos,
        };
        let commit_id = commit_info.commit_id();
        inner.commit_infos.insert(new_version, commit_info);
        inner.history.insert(new_version, snapshot);
        inner.version = new_version;
        Ok(commit_id)
    }

    fn version(&self) -> i64 {
        self.inner.read().unwrap().version
    }

    fn working_version(&self) -> i64 {
        self.inner.read().unwrap().working_version()
    }

    fn last_commit_info(&self) -> CommitInfo {
        let inner = self.inner.read().unwrap();
        inner
            .commit_infos
            .get(&inner.version)
            .cloned()
            .unwrap_or_default()
    }

    fn working_commit_info(&self) -> CommitInfo {
        let inner = self.inner.read().unwrap();
        CommitInfo {
            version: inner.working_version(),
            store_infos: inner
                .trees
                .iter()
                .map(|(name, tree)| StoreInfo {
                    name: name.clone(),
                    commit_id: CommitId::new(inner.working_version(), tree_root(&tree.working)),
                })
                .collect(),
        }
    }

    fn get_tree(&self, name: &str) -> Option<Arc<dyn Tree>> {
        let inner = self.inner.read().unwrap();
        let tree = inner.trees.get(name)?;
        Some(Arc::new(MemTree {
            data: tree.committed.clone(),
            root: tree.committed_root,
            version: inner.version,
        }))
    }

    fn load_version(&self, version: i64) -> Result<Box<dyn Committer>, StoreError> {
        let inner = self.inner.read().unwrap();
        let commit_info = inner
            .commit_infos
            .get(&version)
            .cloned()
            .ok_or(StoreError::MissingVersion { version })?;
        let trees = inner
            .history
            .get(&version)
            .cloned()
            .ok_or(StoreError::MissingVersion { version })?;
        Ok(Box::new(HistoricalCommitter {
            version,
            commit_info,
            trees,
        }))
    }

    fn set_initial_version(&self, version: i64) -> Result<(), StoreError> {
        self.inner.write().unwrap().initial_version = version;
        Ok(())
    }

    fn rollback(&self, target: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.ensure_open()?;
        if target >= inner.version {
            return Ok(());
        }

        let snapshot = inner
            .history
            .get(&target)
            .cloned()
            .ok_or(StoreError::MissingVersion { version: target })?;

        inner.history.split_off(&(target + 1));
        inner.commit_infos.split_off(&(target + 1));
        inner.trees = snapshot
            .into_iter()
            .map(|(name, data)| (name, TreeState::from_data(data)))
            .collect();
        inner.version = target;
        Ok(())
    }

    fn importer(&self, height: i64) -> Result<Box<dyn TreeImporter>, StoreError> {
        Ok(Box::new(MemImporter {
            target: self.inner.clone(),
            height,
            trees: BTreeMap::new(),
            current: None,
        }))
    }

    fn exporter(&self, height: i64) -> Result<Box<dyn TreeExporter>, StoreError> {
        let inner = self.inner.read().unwrap();
        let snapshot = inner
            .history
            .get(&height)
            .ok_or(StoreError::MissingVersion { version: height })?;

        // Leaves only, per store in name order: the importer rebuilds the
        // tree shape and roots from them.
        let mut items = Vec::new();
        for (name, data) in snapshot {
            items.push(ExportItem::Store(name.clone()));
            for (key, value) in data {
                items.push(ExportItem::Node(SnapshotNode {
                    key: key.clone(),
                    value: value.clone(),
                    height: 0,
                    version: height,
                }));
            }
        }
        items.reverse();
        Ok(Box::new(MemExporter { items }))
    }

    fn close(&self) -> Result<(), StoreError> {
        self.inner.write().unwrap().closed = true;
        Ok(())
    }
}

/// Read-only view over one committed version.
struct HistoricalCommitter {
    version: i64,
    commit_info: CommitInfo,
    trees: BTreeMap<String, TreeData>,
}

impl HistoricalCommitter {
    fn read_only<T>(&self) -> Result<T, StoreError> {
        Err(StoreError::Internal(format!(
            "commitment engine view at version {} is read-only",
            self.version
        )))
    }
}

impl Committer for HistoricalCommitter {
    fn initialize(&self, _store_names: &[String]) -> Result<(), StoreError> {
        self.read_only()
    }

    fn apply_upgrades(&self, _upgrades: &[TreeNameUpgrade]) -> Result<(), StoreError> {
        self.read_only()
    }

    fn apply_change_sets(&self, _changesets: &[NamedChangeSet]) -> Result<(), StoreError> {
        self.read_only()
    }

    fn commit(&self) -> Result<CommitId, StoreError> {
        self.read_only()
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn working_version(&self) -> i64 {
        self.version + 1
    }

    fn last_commit_info(&self) -> CommitInfo {
        self.commit_info.clone()
    }

    fn working_commit_info(&self) -> CommitInfo {
        self.commit_info.clone()
    }

    fn get_tree(&self, name: &str) -> Option<Arc<dyn Tree>> {
        let data = self.trees.get(name)?;
        let root = self
            .commit_info
            .get(name)
            .map(|info| info.commit_id.hash)
            .unwrap_or(Hash::ZERO);
        Some(Arc::new(MemTree {
            data: data.clone(),
            root,
            version: self.version,
        }))
    }

    fn load_version(&self, version: i64) -> Result<Box<dyn Committer>, StoreError> {
        if version == self.version {
            Ok(Box::new(HistoricalCommitter {
                version: self.version,
                commit_info: self.commit_info.clone(),
                trees: self.trees.clone(),
            }))
        } else {
            Err(StoreError::MissingVersion { version })
        }
    }

    fn set_initial_version(&self, _version: i64) -> Result<(), StoreError> {
        self.read_only()
    }

    fn rollback(&self, _target: i64) -> Result<(), StoreError> {
        self.read_only()
    }

    fn importer(&self, _height: i64) -> Result<Box<dyn TreeImporter>, StoreError> {
        self.read_only()
    }

    fn exporter(&self, _height: i64) -> Result<Box<dyn TreeExporter>, StoreError> {
        self.read_only()
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Immutable tree handle over one version's data.
struct MemTree {
    data: TreeData,
    root: Hash,
    version: i64,
}

impl Tree for MemTree {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        let start = start.map(<[u8]>::to_vec);
        let end = end.map(<[u8]>::to_vec);
        // O(1) clone; the consuming iterator yields in key order.
        Box::new(
            self.data
                .clone()
                .into_iter()
                .skip_while(move |(k, _)| start.as_ref().is_some_and(|s| k < s))
                .take_while(move |(k, _)| end.as_ref().map_or(true, |e| k < e)),
        )
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> KvIter {
        let mut items: Vec<(Vec<u8>, Vec<u8>)> = self
            .iterator(start, end)
            .collect();
        items.reverse();
        Box::new(items.into_iter())
    }

    fn root_hash(&self) -> Hash {
        self.root
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn get_with_proof(&self, key: &[u8]) -> Result<(Option<Vec<u8>>, KvProof), StoreError> {
        let pairs: Vec<(&Vec<u8>, &Vec<u8>)> = self.data.iter().collect();
        let leaves: Vec<Hash> = pairs.iter().map(|(k, v)| leaf_hash(k, v)).collect();

        match pairs.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
            Ok(index) => {
                let value = pairs[index].1.clone();
                let proof = KvProof::Membership {
                    value: value.clone(),
                    proof: MerkleProof::prove(&leaves, index),
                };
                Ok((Some(value), proof))
            }
            Err(insertion) => {
                let neighbor = |index: usize| AbsenceLeaf {
                    key: pairs[index].0.clone(),
                    value: pairs[index].1.clone(),
                    proof: MerkleProof::prove(&leaves, index),
                };
                let proof = KvProof::Absence {
                    left: insertion.checked_sub(1).map(neighbor),
                    right: (insertion < pairs.len()).then(|| neighbor(insertion)),
                    total: pairs.len() as u64,
                };
                Ok((None, proof))
            }
        }
    }
}

/// Streaming importer; replaces the engine's state on finalize.
struct MemImporter {
    target: Arc<RwLock<ScInner>>,
    height: i64,
    trees: BTreeMap<String, TreeData>,
    current: Option<String>,
}

impl TreeImporter for MemImporter {
    fn add_tree(&mut self, name: &str) -> Result<(), StoreError> {
        if self.trees.contains_key(name) {
            return Err(StoreError::InvalidSnapshot(format!(
                "duplicate store {name} in snapshot"
            )));
        }
        self.trees.insert(name.to_string(), TreeData::new());
        self.current = Some(name.to_string());
        Ok(())
    }

    fn add_node(&mut self, node: SnapshotNode) -> Result<(), StoreError> {
        let current = self.current.as_ref().ok_or_else(|| {
            StoreError::InvalidSnapshot("node before store header".to_string())
        })?;
        // Inner nodes carry no application data; the roots are recomputed.
        if node.is_leaf() {
            self.trees
                .get_mut(current)
                .expect("current tree exists")
                .insert(node.key, node.value);
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<(), StoreError> {
        let mut inner = self.target.write().unwrap();

        let mut store_infos = Vec::with_capacity(self.trees.len());
        let mut trees = BTreeMap::new();
        for (name, data) in &self.trees {
            let state = TreeState::from_data(data.clone());
            store_infos.push(StoreInfo {
                name: name.clone(),
                commit_id: CommitId::new(self.height, state.committed_root),
            });
            trees.insert(name.clone(), state);
        }

        inner.trees = trees;
        inner.version = self.height;
        inner.initial_version = 0;
        inner.commit_infos = BTreeMap::from([(
            self.height,
            CommitInfo {
                version: self.height,
                store_infos,
            },
        )]);
        inner.history = BTreeMap::from([(self.height, self.trees)]);
        inner.closed = false;
        Ok(())
    }
}

/// Streaming exporter over a captured snapshot (items in reverse, popped).
struct MemExporter {
    items: Vec<ExportItem>,
}

impl TreeExporter for MemExporter {
    fn next_item(&mut self) -> Result<Option<ExportItem>, StoreError> {
        Ok(self.items.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::{ChangeSet, KvPair};

    fn changeset(name: &str, pairs: &[(&str, Option<&str>)]) -> NamedChangeSet {
        NamedChangeSet {
            name: name.to_string(),
            changeset: ChangeSet {
                pairs: pairs
                    .iter()
                    .map(|(k, v)| KvPair {
                        key: k.as_bytes().to_vec(),
                        value: v.map(|v| v.as_bytes().to_vec()),
                    })
                    .collect(),
            },
        }
    }

    fn engine(stores: &[&str]) -> MemCommitter {
        let sc = MemCommitter::new();
        let names: Vec<String> = stores.iter().map(|s| s.to_string()).collect();
        sc.initialize(&names).unwrap();
        sc
    }

    #[test]
    fn test_commit_advances_version_and_root() {
        let sc = engine(&["bank"]);
        assert_eq!(sc.version(), 0);
        assert_eq!(sc.working_version(), 1);

        sc.apply_change_sets(&[changeset("bank", &[("k", Some("v"))])])
            .unwrap();
        let commit = sc.commit().unwrap();
        assert_eq!(commit.version, 1);
        assert!(!commit.hash.is_zero());
        assert_eq!(sc.version(), 1);

        let tree = sc.get_tree("bank").unwrap();
        assert_eq!(tree.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_tree_handle_is_a_snapshot() {
        let sc = engine(&["bank"]);
        sc.apply_change_sets(&[changeset("bank", &[("k", Some("v1"))])])
            .unwrap();
        sc.commit().unwrap();

        let handle = sc.get_tree("bank").unwrap();
        sc.apply_change_sets(&[changeset("bank", &[("k", Some("v2"))])])
            .unwrap();
        sc.commit().unwrap();

        // The old handle still reads version 1.
        assert_eq!(handle.get(b"k"), Some(b"v1".to_vec()));
        assert_eq!(
            sc.get_tree("bank").unwrap().get(b"k"),
            Some(b"v2".to_vec())
        );
    }

    #[test]
    fn test_proofs_verify_against_root() {
        let sc = engine(&["bank"]);
        sc.apply_change_sets(&[changeset(
            "bank",
            &[("a", Some("1")), ("b", Some("2")), ("c", Some("3"))],
        )])
        .unwrap();
        sc.commit().unwrap();

        let tree = sc.get_tree("bank").unwrap();
        let root = tree.root_hash();

        let (value, proof) = tree.get_with_proof(b"b").unwrap();
        assert_eq!(value, Some(b"2".to_vec()));
        assert_eq!(proof.verify(b"b", Some(b"2")).unwrap(), root);

        let (missing, absence) = tree.get_with_proof(b"bb").unwrap();
        assert_eq!(missing, None);
        assert_eq!(absence.verify(b"bb", None).unwrap(), root);
    }

    #[test]
    fn test_historical_load() {
        let sc = engine(&["bank"]);
        sc.apply_change_sets(&[changeset("bank", &[("k", Some("v1"))])])
            .unwrap();
        sc.commit().unwrap();
        sc.apply_change_sets(&[changeset("bank", &[("k", Some("v2"))])])
            .unwrap();
        sc.commit().unwrap();

        let historical = sc.load_version(1).unwrap();
        assert_eq!(historical.version(), 1);
        assert_eq!(
            historical.get_tree("bank").unwrap().get(b"k"),
            Some(b"v1".to_vec())
        );
        assert!(matches!(
            sc.load_version(9),
            Err(StoreError::MissingVersion { version: 9 })
        ));
    }

    #[test]
    fn test_upgrades_rename_and_delete() {
        let sc = engine(&["old", "gone"]);
        sc.apply_change_sets(&[
            changeset("gone", &[("g", Some("x"))]),
            changeset("old", &[("k", Some("v"))]),
        ])
        .unwrap();
        sc.commit().unwrap();

        sc.apply_upgrades(&[
            TreeNameUpgrade {
                name: "gone".to_string(),
                rename_from: None,
                delete: true,
            },
            TreeNameUpgrade {
                name: "new".to_string(),
                rename_from: Some("old".to_string()),
                delete: false,
            },
            TreeNameUpgrade {
                name: "fresh".to_string(),
                rename_from: None,
                delete: false,
            },
        ])
        .unwrap();

        assert!(sc.get_tree("gone").is_none());
        assert!(sc.get_tree("old").is_none());
        assert_eq!(sc.get_tree("new").unwrap().get(b"k"), Some(b"v".to_vec()));
        assert!(sc.get_tree("fresh").unwrap().get(b"k").is_none());
    }

    #[test]
    fn test_rollback_truncates_history() {
        let sc = engine(&["bank"]);
        for v in 1..=3 {
            let value = format!("v{v}");
            sc.apply_change_sets(&[changeset("bank", &[("k", Some(value.as_str()))])])
                .unwrap();
            sc.commit().unwrap();
        }

        sc.rollback(1).unwrap();
        assert_eq!(sc.version(), 1);
        assert_eq!(sc.get_tree("bank").unwrap().get(b"k"), Some(b"v1".to_vec()));
        assert!(sc.load_version(2).is_err());

        // The next commit continues from the rollback target.
        sc.apply_change_sets(&[changeset("bank", &[("k", Some("again"))])])
            .unwrap();
        assert_eq!(sc.commit().unwrap().version, 2);
    }

    #[test]
    fn test_initial_version() {
        let sc = engine(&["bank"]);
        sc.set_initial_version(10).unwrap();
        assert_eq!(sc.working_version(), 10);
        sc.apply_change_sets(&[changeset("bank", &[("k", Some("v"))])])
            .unwrap();
        assert_eq!(sc.commit().unwrap().version, 10);
        assert_eq!(sc.commit().unwrap().version, 11);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let sc = engine(&["a", "b"]);
        sc.apply_change_sets(&[
            changeset("a", &[("k1", Some("v1"))]),
            changeset("b", &[("k2", Some("v2")), ("k3", Some(""))]),
        ])
        .unwrap();
        sc.commit().unwrap();
        let source_info = sc.last_commit_info();

        let mut exporter = sc.exporter(1).unwrap();
        let mut items = Vec::new();
        while let Some(item) = exporter.next_item().unwrap() {
            items.push(item);
        }

        let restored = MemCommitter::new();
        restored.close().unwrap();
        let mut importer = restored.importer(1).unwrap();
        for item in items {
            match item {
                ExportItem::Store(name) => importer.add_tree(&name).unwrap(),
                ExportItem::Node(node) => importer.add_node(node).unwrap(),
            }
        }
        importer.finalize().unwrap();

        assert_eq!(restored.version(), 1);
        assert_eq!(restored.last_commit_info(), source_info);
        assert_eq!(
            restored.get_tree("b").unwrap().get(b"k3"),
            Some(Vec::new())
        );
    }
}
