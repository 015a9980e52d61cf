//! Root multi-store for the strata state layer.
//!
//! A [`RootStore`](root::RootStore) composes named sub-stores under a single
//! monotonically advancing version, produces a deterministic app hash per
//! version, serves historical queries with merkle proofs, and supports
//! snapshot-based state transfer.
//!
//! Two engines sit beneath the root, both defined here as contracts and
//! implemented elsewhere (see `strata-store-memory` for the in-memory
//! reference engines):
//!
//! - the state-commitment engine ([`sc::Committer`]) - an authenticated,
//!   versioned tree per sub-store; source of truth for the app hash;
//! - the state-storage engine ([`ss::StateStore`]) - an unauthenticated,
//!   versioned key/value store serving fast historical reads, fed
//!   asynchronously from the commit pipeline and pruned in the background.
//!
//! # Commit data flow
//!
//! Application writes buffer in commitment sub-stores; `commit` drains them,
//! sorts the change sets by store name, applies them to the commitment engine,
//! enqueues them onto a bounded channel for the state-storage apply loop,
//! reloads the tree handles the engine may have swapped, and publishes the new
//! commit info (amended with memory-store placeholders).

mod cache;
mod commitment;
mod config;
mod iter;
mod kv;
mod mem;
mod pruning;
pub mod root;
pub mod sc;
pub mod snapshot;
pub mod ss;
mod state;

pub use cache::{CacheMultiStore, CacheStore};
pub use commitment::CommitmentStore;
pub use config::{PruningOptions, StoreOptions};
pub use iter::merge_iter;
pub use kv::{prefix_end, KVStore, KvIter};
pub use mem::{MemoryStore, TransientStore};
pub use pruning::PruningManager;
pub use root::{parse_path, require_proof, QueryRequest, QueryResponse, RootStore};
pub use state::StateView;
