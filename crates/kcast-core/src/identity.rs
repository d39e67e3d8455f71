// Identity normalization and content-addressed cache keys.

use std::fmt;

/// Normalize a player, pitcher or team identity: trims, lowercases and
/// collapses runs of whitespace to a single space.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Opaque cache key: the BLAKE3 hex digest of `namespace:normalized_identity`.
///
/// Keys are one-way; the identity cannot be recovered from them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(namespace: &str, identity: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.as_bytes());
        hasher.update(b":");
        hasher.update(normalize(identity).as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
