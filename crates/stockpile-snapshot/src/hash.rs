//! Content addressing for snapshots.
//!
//! A snapshot's identity is the lowercase hex SHA-256 of its canonical
//! serialization. The timestamp is part of that payload, so the hash names one
//! historical commit rather than an item state.

use crate::{Snapshot, SnapshotResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_LEN: usize = 64;

/// Digest naming a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionHash(String);

impl VersionHash {
    /// Wrap an existing digest string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the digest as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Whether this looks like a digest produced by [`hash_snapshot`].
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == HASH_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl std::fmt::Display for VersionHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VersionHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash arbitrary canonical text.
pub fn digest_text(text: &str) -> VersionHash {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    VersionHash(hex::encode(hasher.finalize()))
}

/// Compute the content hash of a snapshot.
pub fn hash_snapshot(snapshot: &Snapshot) -> SnapshotResult<VersionHash> {
    Ok(digest_text(&snapshot.to_canonical_json()?))
}

/// Check that `hash` is the content hash of `snapshot`.
pub fn verify(hash: &VersionHash, snapshot: &Snapshot) -> SnapshotResult<bool> {
    Ok(&hash_snapshot(snapshot)? == hash)
}
