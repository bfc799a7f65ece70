//! Semantic alias index
//!
//! Maps source query hashes to canonical query hashes so semantically
//! equivalent queries (as judged by an external classifier) collapse onto one
//! cache entry. This component only rewrites identity; deciding when an alias
//! is trustworthy enough to write belongs to the classifier.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct AliasEntry {
    canonical_hash: u64,
    confidence: f32,
    // None = never expires
    expires_at: Option<Instant>,
}

/// Concurrent source-hash to canonical-hash mapping with per-key atomic
/// updates and lazy periodic cleanup
#[derive(Debug, Default)]
pub struct SemanticAliasIndex {
    aliases: DashMap<u64, AliasEntry>,
}

impl SemanticAliasIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure lookup; never mutates. Expired entries remain visible until
    /// `cleanup_expired` removes them.
    pub fn try_get_canonical(&self, source_hash: u64) -> Option<(u64, f32)> {
        self.aliases
            .get(&source_hash)
            .map(|entry| (entry.canonical_hash, entry.confidence))
    }

    /// Upserts an alias. Without a TTL the entry never expires.
    pub fn set_alias(
        &self,
        source_hash: u64,
        canonical_hash: u64,
        confidence: f32,
        ttl: Option<Duration>,
    ) {
        let entry = AliasEntry {
            canonical_hash,
            confidence,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.aliases.insert(source_hash, entry);
    }

    /// Returns whether an alias was present
    pub fn remove_alias(&self, source_hash: u64) -> bool {
        self.aliases.remove(&source_hash).is_some()
    }

    /// Removes entries whose expiry has passed and returns how many were
    /// removed. Intended to run from a periodic task, not self-scheduled.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.aliases.retain(|_, entry| match entry.expires_at {
            Some(expires_at) if expires_at < now => {
                removed += 1;
                false
            }
            _ => true,
        });

        removed
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn clear(&self) {
        self.aliases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_round_trip() {
        let index = SemanticAliasIndex::new();

        index.set_alias(1, 2, 0.9, None);

        assert_eq!(index.try_get_canonical(1), Some((2, 0.9)));
        assert_eq!(index.try_get_canonical(2), None);
    }

    #[test]
    fn test_set_alias_overwrites() {
        let index = SemanticAliasIndex::new();

        index.set_alias(1, 2, 0.5, None);
        index.set_alias(1, 3, 1.0, None);

        assert_eq!(index.try_get_canonical(1), Some((3, 1.0)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_alias() {
        let index = SemanticAliasIndex::new();

        index.set_alias(1, 2, 1.0, None);

        assert!(index.remove_alias(1));
        assert!(!index.remove_alias(1));
        assert_eq!(index.try_get_canonical(1), None);
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let index = SemanticAliasIndex::new();

        index.set_alias(1, 2, 1.0, Some(Duration::from_millis(10)));
        index.set_alias(3, 4, 1.0, None);

        assert_eq!(index.cleanup_expired(), 0);

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(index.cleanup_expired(), 1);
        assert_eq!(index.try_get_canonical(1), None);
        assert_eq!(index.try_get_canonical(3), Some((4, 1.0)));
    }

    #[test]
    fn test_entries_without_ttl_never_expire() {
        let index = SemanticAliasIndex::new();

        index.set_alias(1, 2, 1.0, None);

        assert_eq!(index.cleanup_expired(), 0);
        assert_eq!(index.try_get_canonical(1), Some((2, 1.0)));
    }

    #[test]
    fn test_len_and_clear() {
        let index = SemanticAliasIndex::new();

        index.set_alias(1, 10, 1.0, None);
        index.set_alias(2, 20, 1.0, None);
        assert_eq!(index.len(), 2);

        index.clear();
        assert!(index.is_empty());
    }
}
