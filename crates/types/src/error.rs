//! The error taxonomy shared across the workspace.

use crate::proof::ProofError;
use crate::StoreKind;

/// Errors surfaced by the multi-store and the engine contracts.
///
/// Recoverable conditions (queries, rollback validation) travel as values of
/// this type; fatal commit-path conditions halt the process instead of
/// returning.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key identity or name was mounted twice.
    #[error("duplicate mount for store {name}")]
    DuplicateMount {
        /// The colliding store name.
        name: String,
    },

    /// A key's kind does not match the kind it was mounted as.
    #[error("store {name} mounted as {mounted} but key is {actual}")]
    WrongKeyType {
        /// The store name.
        name: String,
        /// Kind requested at mount time.
        mounted: StoreKind,
        /// Kind the key was constructed with.
        actual: StoreKind,
    },

    /// A version exceeds `u32::MAX`.
    #[error("version {version} overflows u32")]
    VersionOverflow {
        /// The offending version.
        version: i64,
    },

    /// A mounted commitment store has no tree after upgrades were applied.
    #[error("store {name} is not present in committed state; add it through a store upgrade")]
    MissingTree {
        /// The missing store name.
        name: String,
    },

    /// The queried height is outside the retention window.
    #[error("height {height} is not available; it may have been pruned")]
    PrunedHeight {
        /// The requested height.
        height: i64,
    },

    /// A malformed query (e.g. a path not starting with `/`).
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// No sub-store is mounted under the requested name.
    #[error("no store mounted under name {name}")]
    UnknownStore {
        /// The requested store name.
        name: String,
    },

    /// A historical version that was never committed (or already rolled back).
    #[error("version {version} does not exist")]
    MissingVersion {
        /// The requested version.
        version: i64,
    },

    /// A rollback target outside `1..=u32::MAX`.
    #[error("invalid rollback target: {target}")]
    InvalidRollbackTarget {
        /// The rejected target.
        target: i64,
    },

    /// A snapshot node's tree height exceeds `i8::MAX`.
    #[error("snapshot node height {height} exceeds 127")]
    NodeHeightOverflow {
        /// The rejected height.
        height: i32,
    },

    /// The snapshot stream is structurally invalid.
    #[error("invalid snapshot stream: {0}")]
    InvalidSnapshot(String),

    /// Proof construction or verification failed.
    #[error(transparent)]
    Proof(#[from] ProofError),

    /// An engine-internal failure. Fatal on the commit path.
    #[error("{0}")]
    Internal(String),

    /// Several errors collected on the close path.
    #[error("{}", join_messages(.0))]
    Aggregate(Vec<StoreError>),
}

impl StoreError {
    /// Collapse a list of errors: `None` when empty, the error itself when
    /// singular, [`StoreError::Aggregate`] otherwise.
    pub fn join(mut errors: Vec<StoreError>) -> Option<StoreError> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => Some(StoreError::Aggregate(errors)),
        }
    }
}

fn join_messages(errors: &[StoreError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
