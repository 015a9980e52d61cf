//! Batched writes flowing from sub-stores into the engines.

/// One buffered write or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    /// The key written or deleted.
    pub key: Vec<u8>,
    /// `Some(value)` for a write, `None` for a delete.
    pub value: Option<Vec<u8>>,
}

impl KvPair {
    /// A write.
    pub fn set(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value: Some(value),
        }
    }

    /// A delete.
    pub fn delete(key: Vec<u8>) -> Self {
        Self { key, value: None }
    }

    /// Whether this pair is a delete.
    pub fn is_delete(&self) -> bool {
        self.value.is_none()
    }
}

/// The batched writes for one sub-store in one version, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// The pairs, in ascending key order.
    pub pairs: Vec<KvPair>,
}

impl ChangeSet {
    /// Whether the change set carries no writes.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

/// A change set tagged with its sub-store name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedChangeSet {
    /// Sub-store name.
    pub name: String,
    /// The change set.
    pub changeset: ChangeSet,
}

/// The change sets for one version, sorted by sub-store name.
///
/// `version` is the working version the change sets commit as; the
/// state-storage engine records them under this version so storage heights
/// line up with commitment heights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedChangeSets {
    /// The version the change sets commit as.
    pub version: i64,
    /// Non-empty change sets, sorted by name.
    pub changesets: Vec<NamedChangeSet>,
}
