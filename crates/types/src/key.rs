//! Sub-store identity keys.

use std::fmt;
use std::hash::{Hash as StdHash, Hasher};
use std::sync::Arc;

/// The closed set of sub-store types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Committed into the state-commitment engine; proof-bearing.
    Commitment,
    /// In-memory, cleared on every commit, never part of the app hash.
    Transient,
    /// In-memory, survives commits, contributes a placeholder store info.
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Commitment => write!(f, "commitment"),
            StoreKind::Transient => write!(f, "transient"),
            StoreKind::Memory => write!(f, "memory"),
        }
    }
}

struct StoreKeyInner {
    name: String,
    kind: StoreKind,
}

/// Identity handle for one mounted sub-store.
///
/// Equality and hashing are by *identity*, not by name: two keys constructed
/// with the same name are distinct, and the mount table rejects mounting both.
/// Cloning a `StoreKey` clones the handle, not the identity.
#[derive(Clone)]
pub struct StoreKey(Arc<StoreKeyInner>);

impl StoreKey {
    /// Create a key with an explicit kind.
    pub fn new(name: impl Into<String>, kind: StoreKind) -> Self {
        Self(Arc::new(StoreKeyInner {
            name: name.into(),
            kind,
        }))
    }

    /// Key for a commitment (proof-bearing) sub-store.
    pub fn commitment(name: impl Into<String>) -> Self {
        Self::new(name, StoreKind::Commitment)
    }

    /// Key for a transient sub-store.
    pub fn transient(name: impl Into<String>) -> Self {
        Self::new(name, StoreKind::Transient)
    }

    /// Key for a memory sub-store.
    pub fn memory(name: impl Into<String>) -> Self {
        Self::new(name, StoreKind::Memory)
    }

    /// The sub-store name this key identifies.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The kind this key was constructed for.
    pub fn kind(&self) -> StoreKind {
        self.0.kind
    }
}

impl PartialEq for StoreKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for StoreKey {}

impl StdHash for StoreKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({}, {})", self.0.name, self.0.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_equality_is_by_identity() {
        let a = StoreKey::commitment("bank");
        let b = StoreKey::commitment("bank");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_usable_as_map_key() {
        let a = StoreKey::commitment("bank");
        let b = StoreKey::memory("bank");
        let mut map = HashMap::new();
        map.insert(a.clone(), 1);
        map.insert(b.clone(), 2);
        assert_eq!(map[&a], 1);
        assert_eq!(map[&b], 2);
    }
}
