//! Test fixtures for root multi-store integration tests.
//!
//! Builds stores over the in-memory engines with a fixed mount set, plus
//! helpers for the asynchronous state-storage plumbing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_store::ss::StateStore;
use strata_store::{PruningOptions, RootStore, StoreOptions};
use strata_store_memory::{MemCommitter, MemStateStore};
use strata_types::{StoreKey, StoreKind};

/// A root store wired to in-memory engines, with its mount keys.
pub struct TestStore {
    pub root: RootStore,
    pub sc: Arc<MemCommitter>,
    pub ss: Option<Arc<MemStateStore>>,
    pub keys: HashMap<String, StoreKey>,
}

impl TestStore {
    /// The mount key for `name`.
    pub fn key(&self, name: &str) -> &StoreKey {
        &self.keys[name]
    }

    /// Write one pair into the commitment store `name`.
    pub fn write(&self, name: &str, key: &[u8], value: &[u8]) {
        self.root.kv_store(self.key(name)).set(key, value);
    }

    /// Block until the state-storage engine has applied `version`.
    pub fn wait_for_ss(&self, version: i64) {
        let ss = self.ss.as_ref().expect("state storage not enabled");
        wait_until(
            || ss.latest_version() >= version,
            &format!("state storage never reached version {version}"),
        );
    }
}

/// Build a store mounting one commitment sub-store per name, loaded at
/// latest. `with_ss` enables the state-storage engine (without pruning).
pub fn commitment_store(names: &[&str], with_ss: bool) -> TestStore {
    store_with_options(names, with_ss, StoreOptions::default())
}

/// Build a store with explicit options.
pub fn store_with_options(names: &[&str], with_ss: bool, options: StoreOptions) -> TestStore {
    let sc = Arc::new(MemCommitter::new());
    let ss = with_ss.then(|| Arc::new(MemStateStore::new()));

    let root = RootStore::new(
        sc.clone(),
        ss.clone().map(|ss| ss as Arc<dyn strata_store::ss::StateStore>),
        options,
    );

    let mut keys = HashMap::new();
    for name in names {
        let key = StoreKey::commitment(*name);
        root.mount(&key, StoreKind::Commitment).unwrap();
        keys.insert(name.to_string(), key);
    }
    root.load_latest_version().unwrap();

    TestStore { root, sc, ss, keys }
}

/// Options with a fast pruning loop for retention tests.
pub fn pruning_options(keep_recent: i64) -> StoreOptions {
    StoreOptions {
        pruning: PruningOptions {
            keep_recent,
            prune_interval_seconds: 1,
        },
    }
}

/// Poll `condition` until it holds, panicking with `message` after 5s.
pub fn wait_until(mut condition: impl FnMut() -> bool, message: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "{message}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// A proof-bearing point query.
pub fn key_query(store: &str, key: &[u8], height: i64, prove: bool) -> strata_store::QueryRequest {
    strata_store::QueryRequest {
        path: format!("/{store}/key"),
        data: key.to_vec(),
        height,
        prove,
    }
}
