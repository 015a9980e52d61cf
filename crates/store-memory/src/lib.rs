//! In-memory reference engines for the strata multi-store.
//!
//! Implements the two engine contracts of `strata-store` without touching
//! disk, for tests and deterministic simulation:
//!
//! - [`MemCommitter`] - the state-commitment engine: one merkle-hashed
//!   `im::OrdMap` tree per sub-store, with structurally shared per-version
//!   snapshots for historical loads, exports, and rollback;
//! - [`MemStateStore`] - the state-storage engine: a versioned key/value map
//!   with retention pruning and bulk import.
//!
//! `im::OrdMap` keeps snapshots O(1): cloning a map shares structure instead
//! of copying, so retaining every committed version stays cheap regardless of
//! data size.

mod sc;
mod ss;

pub use sc::MemCommitter;
pub use ss::MemStateStore;
