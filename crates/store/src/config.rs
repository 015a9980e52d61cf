//! Root store configuration.

use serde::Deserialize;

/// Configuration for [`RootStore`](crate::root::RootStore).
///
/// Bundles the sub-component options so runners can pass a single value.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Background pruning of the state-storage engine.
    pub pruning: PruningOptions,
}

/// Retention settings for the state-storage pruning loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PruningOptions {
    /// Number of recent versions retained. Zero disables pruning entirely.
    pub keep_recent: i64,

    /// Seconds between pruning passes.
    pub prune_interval_seconds: u64,
}

impl Default for PruningOptions {
    fn default() -> Self {
        Self {
            keep_recent: 0,
            prune_interval_seconds: 60,
        }
    }
}

impl PruningOptions {
    /// Whether a pruning loop should run at all.
    pub fn enabled(&self) -> bool {
        self.keep_recent > 0
    }
}
