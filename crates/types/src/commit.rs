//! Commit identities and per-version commitment info.

use crate::merkle::{leaf_hash, merkle_root, MerkleProof};
use crate::proof::{CommitInfoProof, ProofOp};
use crate::{Hash, StoreError};
use serde::{Deserialize, Serialize};

/// A committed version paired with its hash.
///
/// The zero value (`version == 0`, zero hash) identifies the empty store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitId {
    /// The committed version.
    pub version: i64,
    /// The commitment hash at that version. `Hash::ZERO` means "empty".
    pub hash: Hash,
}

impl CommitId {
    /// Create a commit id.
    pub fn new(version: i64, hash: Hash) -> Self {
        Self { version, hash }
    }
}

/// One sub-store's contribution to a commit info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Sub-store name.
    pub name: String,
    /// The sub-store's commit id. Memory placeholders carry the zero value.
    pub commit_id: CommitId,
}

impl StoreInfo {
    /// Hash of this store info as an app-hash merkle leaf.
    ///
    /// A zero commitment hash serializes as empty bytes, so placeholder
    /// entries hash identically across implementations.
    pub fn leaf_hash(&self) -> Hash {
        let root: &[u8] = if self.commit_id.hash.is_zero() {
            &[]
        } else {
            self.commit_id.hash.as_bytes()
        };
        leaf_hash(self.name.as_bytes(), root)
    }
}

/// The version plus per-store roots a commit publishes.
///
/// `store_infos` is kept sorted by name; the app hash is the merkle root over
/// the store-info leaves in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// The committed version.
    pub version: i64,
    /// Per-store commit ids, ordered lexicographically by name.
    pub store_infos: Vec<StoreInfo>,
}

impl CommitInfo {
    /// Deterministic app hash over the sorted store infos.
    pub fn app_hash(&self) -> Hash {
        debug_assert!(
            self.store_infos.windows(2).all(|w| w[0].name <= w[1].name),
            "store infos must be sorted by name"
        );
        let leaves: Vec<Hash> = self.store_infos.iter().map(StoreInfo::leaf_hash).collect();
        merkle_root(&leaves)
    }

    /// The commit id this info publishes: `(version, app_hash)`.
    pub fn commit_id(&self) -> CommitId {
        CommitId::new(self.version, self.app_hash())
    }

    /// Look up one store's info by name.
    pub fn get(&self, name: &str) -> Option<&StoreInfo> {
        self.store_infos.iter().find(|info| info.name == name)
    }

    /// Proof op linking `store_name`'s root to the app hash.
    ///
    /// Fails with [`StoreError::UnknownStore`] if no store info carries that
    /// name.
    pub fn proof_op(&self, store_name: &str) -> Result<ProofOp, StoreError> {
        let index = self
            .store_infos
            .iter()
            .position(|info| info.name == store_name)
            .ok_or_else(|| StoreError::UnknownStore {
                name: store_name.to_string(),
            })?;

        let leaves: Vec<Hash> = self.store_infos.iter().map(StoreInfo::leaf_hash).collect();
        let proof = CommitInfoProof {
            name: store_name.to_string(),
            commit_id: self.store_infos[index].commit_id,
            proof: MerkleProof::prove(&leaves, index),
        };
        Ok(ProofOp::commit_info(&proof))
    }
}

/// Merge extra store infos into a commit info, re-sorting by name.
///
/// Used to amend engine-produced commit infos with Memory placeholders. The
/// sort is stable so equal names (which the mount table forbids anyway)
/// preserve their relative order.
pub fn merge_store_infos(commit_info: CommitInfo, extra: Vec<StoreInfo>) -> CommitInfo {
    let mut infos = commit_info.store_infos;
    infos.extend(extra);
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    CommitInfo {
        version: commit_info.version,
        store_infos: infos,
    }
}
