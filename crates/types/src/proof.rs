//! Query proof envelopes.
//!
//! A proof-bearing query response carries two chained ops:
//!
//! 1. a [`KvProof`] from the key to the sub-store's root, and
//! 2. a [`CommitInfoProof`] from that root to the app hash.
//!
//! Ops are transported as opaque `(op_type, key, data)` triples with
//! bincode-encoded payloads; [`ProofOps::verify`] decodes and chains them.

use crate::merkle::{leaf_hash, MerkleProof};
use crate::{CommitId, Hash};
use serde::{Deserialize, Serialize};

/// Op type tag for key-to-store-root proofs.
pub const OP_KV: &str = "strata:kv";
/// Op type tag for store-root-to-app-hash proofs.
pub const OP_COMMIT_INFO: &str = "strata:commitinfo";

/// Errors from proof construction or verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    /// The proof structure is internally inconsistent.
    #[error("malformed proof: {0}")]
    Malformed(&'static str),

    /// A recomputed root does not match the expected one.
    #[error("root mismatch: computed {computed}, expected {expected}")]
    RootMismatch {
        /// Root recomputed from the proof.
        computed: Hash,
        /// Root the verifier expected.
        expected: Hash,
    },

    /// The proven value differs from the claimed one.
    #[error("value mismatch")]
    ValueMismatch,

    /// A proof op payload failed to decode.
    #[error("proof op decode failed: {0}")]
    Decode(String),

    /// An op of a different type was found where `expected` was required.
    #[error("unexpected proof op: expected {expected}, got {actual}")]
    UnexpectedOp {
        /// The required op type tag.
        expected: &'static str,
        /// The op type tag found.
        actual: String,
    },

    /// The proof op list was empty where a proof was required.
    #[error("proof is unexpectedly empty")]
    Empty,
}

/// A neighbor leaf witnessing a gap in an absence proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceLeaf {
    /// Neighbor key.
    pub key: Vec<u8>,
    /// Neighbor value.
    pub value: Vec<u8>,
    /// Membership path for the neighbor.
    pub proof: MerkleProof,
}

/// Proof of a key's presence or absence in one sub-store tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvProof {
    /// The key is present with the given value.
    Membership {
        /// The proven value.
        value: Vec<u8>,
        /// Audit path for the `(key, value)` leaf.
        proof: MerkleProof,
    },
    /// The key is absent; the adjacent leaves (if any) bracket it.
    Absence {
        /// Greatest leaf below the key, if one exists.
        left: Option<AbsenceLeaf>,
        /// Smallest leaf above the key, if one exists.
        right: Option<AbsenceLeaf>,
        /// Total leaves in the tree; zero proves absence in an empty tree.
        total: u64,
    },
}

impl KvProof {
    /// Verify this proof for `key` and return the sub-store root it commits to.
    ///
    /// `expected_value` is the value the response claimed (`None` for an
    /// absence response); a proof of the opposite polarity fails.
    pub fn verify(&self, key: &[u8], expected_value: Option<&[u8]>) -> Result<Hash, ProofError> {
        match self {
            KvProof::Membership { value, proof } => {
                match expected_value {
                    Some(expected) if expected == value.as_slice() => {}
                    _ => return Err(ProofError::ValueMismatch),
                }
                proof.compute_root(leaf_hash(key, value))
            }
            KvProof::Absence { left, right, total } => {
                if expected_value.is_some() {
                    return Err(ProofError::ValueMismatch);
                }
                verify_absence(key, left.as_ref(), right.as_ref(), *total)
            }
        }
    }
}

fn verify_absence(
    key: &[u8],
    left: Option<&AbsenceLeaf>,
    right: Option<&AbsenceLeaf>,
    total: u64,
) -> Result<Hash, ProofError> {
    if total == 0 {
        if left.is_some() || right.is_some() {
            return Err(ProofError::Malformed("neighbors in empty tree"));
        }
        return Ok(Hash::ZERO);
    }

    let mut root: Option<Hash> = None;
    let mut check = |leaf: &AbsenceLeaf| -> Result<(), ProofError> {
        if leaf.proof.total() != total {
            return Err(ProofError::Malformed("neighbor total mismatch"));
        }
        let computed = leaf
            .proof
            .compute_root(leaf_hash(&leaf.key, &leaf.value))?;
        match root {
            None => root = Some(computed),
            Some(existing) if existing == computed => {}
            Some(existing) => {
                return Err(ProofError::RootMismatch {
                    computed,
                    expected: existing,
                })
            }
        }
        Ok(())
    };

    match (left, right) {
        (Some(l), Some(r)) => {
            if !(l.key.as_slice() < key && key < r.key.as_slice()) {
                return Err(ProofError::Malformed("neighbors do not bracket key"));
            }
            if r.proof.index() != l.proof.index() + 1 {
                return Err(ProofError::Malformed("neighbors are not adjacent"));
            }
            check(l)?;
            check(r)?;
        }
        (Some(l), None) => {
            if l.key.as_slice() >= key {
                return Err(ProofError::Malformed("left neighbor not below key"));
            }
            if l.proof.index() != total - 1 {
                return Err(ProofError::Malformed("left neighbor is not the last leaf"));
            }
            check(l)?;
        }
        (None, Some(r)) => {
            if r.key.as_slice() <= key {
                return Err(ProofError::Malformed("right neighbor not above key"));
            }
            if r.proof.index() != 0 {
                return Err(ProofError::Malformed("right neighbor is not the first leaf"));
            }
            check(r)?;
        }
        (None, None) => return Err(ProofError::Malformed("no neighbors in non-empty tree")),
    }

    root.ok_or(ProofError::Malformed("absence proof without root"))
}

/// Proof linking one store's root to the app hash at a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfoProof {
    /// Sub-store name.
    pub name: String,
    /// The sub-store's commit id at the proven version.
    pub commit_id: CommitId,
    /// Audit path for the store-info leaf within the commit info.
    pub proof: MerkleProof,
}

impl CommitInfoProof {
    /// Verify against the store root produced by the preceding op and return
    /// the app hash this proof commits to.
    pub fn verify(&self, store_root: Hash) -> Result<Hash, ProofError> {
        if self.commit_id.hash != store_root {
            return Err(ProofError::RootMismatch {
                computed: store_root,
                expected: self.commit_id.hash,
            });
        }
        let root_bytes: &[u8] = if self.commit_id.hash.is_zero() {
            &[]
        } else {
            self.commit_id.hash.as_bytes()
        };
        self.proof
            .compute_root(leaf_hash(self.name.as_bytes(), root_bytes))
    }
}

/// One opaque proof op: a type tag, the proven key, and an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOp {
    /// Op type tag ([`OP_KV`] or [`OP_COMMIT_INFO`]).
    pub op_type: String,
    /// The key this op proves (the queried key, or the store name).
    pub key: Vec<u8>,
    /// Bincode-encoded payload.
    pub data: Vec<u8>,
}

impl ProofOp {
    /// Wrap a [`KvProof`] for `key`.
    pub fn kv(key: &[u8], proof: &KvProof) -> Self {
        Self {
            op_type: OP_KV.to_string(),
            key: key.to_vec(),
            data: bincode::serialize(proof).expect("kv proof encoding cannot fail"),
        }
    }

    /// Wrap a [`CommitInfoProof`].
    pub fn commit_info(proof: &CommitInfoProof) -> Self {
        Self {
            op_type: OP_COMMIT_INFO.to_string(),
            key: proof.name.as_bytes().to_vec(),
            data: bincode::serialize(proof).expect("commit info proof encoding cannot fail"),
        }
    }

    /// Decode the payload as a [`KvProof`].
    pub fn as_kv(&self) -> Result<KvProof, ProofError> {
        if self.op_type != OP_KV {
            return Err(ProofError::UnexpectedOp {
                expected: OP_KV,
                actual: self.op_type.clone(),
            });
        }
        bincode::deserialize(&self.data).map_err(|e| ProofError::Decode(e.to_string()))
    }

    /// Decode the payload as a [`CommitInfoProof`].
    pub fn as_commit_info(&self) -> Result<CommitInfoProof, ProofError> {
        if self.op_type != OP_COMMIT_INFO {
            return Err(ProofError::UnexpectedOp {
                expected: OP_COMMIT_INFO,
                actual: self.op_type.clone(),
            });
        }
        bincode::deserialize(&self.data).map_err(|e| ProofError::Decode(e.to_string()))
    }
}

/// The ordered proof ops attached to a query response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOps(pub Vec<ProofOp>);

impl ProofOps {
    /// Whether no ops are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append an op.
    pub fn push(&mut self, op: ProofOp) {
        self.0.push(op);
    }

    /// Verify the full chain: key/value against the store root, store root
    /// against `app_hash` for `store_name`.
    pub fn verify(
        &self,
        store_name: &str,
        key: &[u8],
        expected_value: Option<&[u8]>,
        app_hash: Hash,
    ) -> Result<(), ProofError> {
        let mut ops = self.0.iter();
        let kv_op = ops.next().ok_or(ProofError::Empty)?;
        let ci_op = ops.next().ok_or(ProofError::Empty)?;
        if ops.next().is_some() {
            return Err(ProofError::Malformed("trailing proof ops"));
        }
        if kv_op.key != key {
            return Err(ProofError::Malformed("kv op key mismatch"));
        }

        let store_root = kv_op.as_kv()?.verify(key, expected_value)?;

        let ci_proof = ci_op.as_commit_info()?;
        if ci_proof.name != store_name {
            return Err(ProofError::Malformed("commit info op store mismatch"));
        }
        let computed_app_hash = ci_proof.verify(store_root)?;
        if computed_app_hash != app_hash {
            return Err(ProofError::RootMismatch {
                computed: computed_app_hash,
                expected: app_hash,
            });
        }
        Ok(())
    }
}
