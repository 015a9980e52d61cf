//! Shared types for the strata versioned multi-store.
//!
//! This crate defines the data model shared by the root multi-store, its
//! sub-stores, and the state-commitment / state-storage engine contracts:
//!
//! - [`Hash`] - 32-byte blake3 hash
//! - [`CommitId`] / [`StoreInfo`] / [`CommitInfo`] - per-version commitment data
//! - [`StoreKey`] / [`StoreKind`] - sub-store identity and typing
//! - [`ChangeSet`] / [`NamedChangeSet`] / [`VersionedChangeSets`] - batched writes
//! - [`StoreUpgrades`] - add/delete/rename schema changes
//! - [`ProofOp`] / [`ProofOps`] - query proof envelopes
//! - [`StoreError`] - the error taxonomy shared across the workspace

#![warn(missing_docs)]

mod changeset;
mod commit;
mod error;
mod hash;
mod key;
mod merkle;
mod proof;
mod upgrades;

pub use changeset::{ChangeSet, KvPair, NamedChangeSet, VersionedChangeSets};
pub use commit::{merge_store_infos, CommitId, CommitInfo, StoreInfo};
pub use error::StoreError;
pub use hash::{Hash, ParseHashError};
pub use key::{StoreKey, StoreKind};
pub use merkle::{leaf_hash, merkle_root, MerkleProof};
pub use proof::{AbsenceLeaf, CommitInfoProof, KvProof, ProofError, ProofOp, ProofOps};
pub use upgrades::StoreUpgrades;
