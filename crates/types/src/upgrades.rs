//! Schema upgrade descriptor consumed at version-load time.

use std::collections::{BTreeMap, BTreeSet};

/// Add / delete / rename operations applied to the mount set at a version
/// boundary.
///
/// Renames map *new* name to *old* name: `renames = {new: old}` moves the
/// contents of `old` under `new`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreUpgrades {
    /// Store names created empty.
    pub added: BTreeSet<String>,
    /// Store names deleted outright.
    pub deleted: BTreeSet<String>,
    /// New name -> old name.
    pub renames: BTreeMap<String, String>,
}

impl StoreUpgrades {
    /// Whether `name` is scheduled for creation.
    pub fn is_added(&self, name: &str) -> bool {
        self.added.contains(name)
    }

    /// Whether `name` is scheduled for deletion.
    pub fn is_deleted(&self, name: &str) -> bool {
        self.deleted.contains(name)
    }

    /// The old name `name` is renamed from, if any.
    pub fn renamed_from(&self, name: &str) -> Option<&str> {
        self.renames.get(name).map(String::as_str)
    }

    /// Whether the descriptor carries no operations.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.renames.is_empty()
    }
}
