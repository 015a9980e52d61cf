//! Blake3 digests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A blake3 digest identifying a value, a tree root, or an app hash.
///
/// Ordered and hashable so it can key maps and sort into merkle leaves.
/// `Hash::ZERO` doubles as the "no commitment" sentinel throughout the
/// store.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest width in bytes.
    pub const BYTES: usize = 32;

    /// The all-zero digest, standing in for "nothing committed".
    pub const ZERO: Self = Self([0; Self::BYTES]);

    /// Digest a single byte string.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest the concatenation of several byte strings without allocating
    /// the joined buffer.
    pub fn digest_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is [`Hash::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0; Self::BYTES]
    }

    /// Render as 64 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the form produced by [`to_hex`](Hash::to_hex).
    pub fn from_hex(s: &str) -> Result<Self, ParseHashError> {
        if s.len() != 2 * Self::BYTES {
            return Err(ParseHashError::BadLength(s.len()));
        }
        let mut out = [0; Self::BYTES];
        hex::decode_to_slice(s, &mut out).map_err(|_| ParseHashError::BadDigit)?;
        Ok(Self(out))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight leading nibbles are plenty to tell digests apart in logs.
        write!(f, "#{}", &self.to_hex()[..8])
    }
}

/// Error parsing a hash from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHashError {
    /// The literal does not contain exactly 64 hex digits.
    #[error("hash literal must be 64 hex digits, got {0}")]
    BadLength(usize),

    /// The literal contains a character outside `[0-9a-fA-F]`.
    #[error("hash literal contains a non-hex digit")]
    BadDigit,
}
