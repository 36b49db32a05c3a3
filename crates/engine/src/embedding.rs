//! Embedding capability boundary and the TTL cache in front of it.
//!
//! The cache memoizes text-to-vector conversions keyed by a content hash, so
//! any edit to the source text is a cache miss rather than a stale hit.
//! Entries expire after a fixed TTL and are evicted lazily on the next
//! lookup of that key.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use crate::types::{Clock, SystemClock};

/// Default time-to-live for cached vectors.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Text-to-vector capability supplied by an external model-serving
/// component. Deterministic for identical text, potentially slow, and
/// without built-in timeout or retry; callers impose their own.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: DateTime<Utc>,
}

/// Concurrent TTL cache for embeddings.
///
/// Concurrent writers to the same key are last-write-wins, which is safe
/// because embedding is deterministic per text.
pub struct EmbeddingCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl EmbeddingCache {
    pub fn new(ttl_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
            clock,
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL_SECS, Arc::new(SystemClock))
    }

    /// Cache key: `{identity}:{sha256(text)}`. Hashing the exact source text
    /// makes any title/synopsis/tag edit an implicit invalidation.
    pub fn generate_key(identity: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = hex::encode(hasher.finalize());
        format!("{}:{}", identity, hash)
    }

    /// Return the cached vector for `(identity, text)` if present and fresh,
    /// otherwise invoke the embedder once, store the result, and return it.
    /// The embedder's own failure is the only error path, propagated
    /// unmodified.
    pub fn get_vector(
        &self,
        identity: &str,
        text: &str,
        embedder: &dyn TextEmbedder,
    ) -> Result<Vec<f32>> {
        let key = Self::generate_key(identity, text);
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(&key) {
            if now - entry.inserted_at < self.ttl {
                debug!(key = %key, "embedding cache hit");
                return Ok(entry.vector.clone());
            }
        }

        // Expired or missing; lazy eviction happens here, never proactively.
        self.entries.remove(&key);

        let vector = embedder.embed(text)?;
        debug!(key = %key, dim = vector.len(), "embedding cache fill");
        self.entries.insert(
            key,
            CacheEntry {
                vector: vector.clone(),
                inserted_at: now,
            },
        );

        Ok(vector)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextEmbedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    struct FailingEmbedder;

    impl TextEmbedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("model backend unavailable")
        }
    }

    fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new("2024-06-01T12:00:00Z".parse().unwrap()))
    }

    #[test]
    fn test_hit_skips_embedder() {
        let clock = test_clock();
        let cache = EmbeddingCache::new(300, clock);
        let embedder = CountingEmbedder::new();

        let first = cache.get_vector("item-1", "quantum physics", &embedder).unwrap();
        let second = cache.get_vector("item-1", "quantum physics", &embedder).unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_text_change_is_a_miss() {
        let clock = test_clock();
        let cache = EmbeddingCache::new(300, clock);
        let embedder = CountingEmbedder::new();

        cache.get_vector("item-1", "original synopsis", &embedder).unwrap();
        cache.get_vector("item-1", "edited synopsis", &embedder).unwrap();

        assert_eq!(embedder.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_expired_entry_reembeds() {
        let clock = test_clock();
        let cache = EmbeddingCache::new(300, Arc::clone(&clock) as Arc<dyn Clock>);
        let embedder = CountingEmbedder::new();

        cache.get_vector("q", "some query", &embedder).unwrap();
        clock.advance(Duration::seconds(299));
        cache.get_vector("q", "some query", &embedder).unwrap();
        assert_eq!(embedder.calls(), 1);

        clock.advance(Duration::seconds(1));
        cache.get_vector("q", "some query", &embedder).unwrap();
        assert_eq!(embedder.calls(), 2);
    }

    #[test]
    fn test_embedder_failure_propagates() {
        let cache = EmbeddingCache::new(300, test_clock());

        let err = cache.get_vector("q", "anything", &FailingEmbedder).unwrap_err();
        assert!(err.to_string().contains("model backend unavailable"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_separates_identities() {
        let a = EmbeddingCache::generate_key("item-1", "same text");
        let b = EmbeddingCache::generate_key("item-2", "same text");
        assert_ne!(a, b);
        assert!(a.ends_with(&b[b.find(':').unwrap()..]));
    }

    #[test]
    fn test_clear() {
        let cache = EmbeddingCache::new(300, test_clock());
        let embedder = CountingEmbedder::new();
        cache.get_vector("a", "one", &embedder).unwrap();
        cache.get_vector("b", "two", &embedder).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
