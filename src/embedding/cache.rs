//! Query-embedding cache.
//!
//! Keys are SHA-256 content hashes of the input text, values are vectors.
//! Eviction is moka's TinyLFU policy bounded by `[embedding] cache_capacity`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use moka::sync::Cache;
use sha2::{Digest, Sha256};

use ragfuse_core::embedding::Embedder;

/// Hex SHA-256 of a text, used as the cache key.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Wraps an [`Embedder`] with a bounded content-hash keyed cache.
pub struct CachingEmbedder<E> {
    inner: E,
    cache: Cache<String, Vec<f32>>,
}

impl<E: Embedder> CachingEmbedder<E> {
    pub fn new(inner: E, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Approximate entry count; moka applies evictions lazily.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachingEmbedder<E> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = content_hash(text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let vector = self.inner.embed(text).await?;
        if vector.len() != self.inner.dims() {
            bail!(
                "embedder {} returned {} dimensions, expected {}",
                self.inner.model_name(),
                vector.len(),
                self.inner.dims()
            );
        }
        self.cache.insert(key, vector.clone());
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        dims: usize,
    }

    impl CountingEmbedder {
        fn new(dims: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                dims,
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[tokio::test]
    async fn test_cache_hits_skip_inner() {
        let cached = CachingEmbedder::new(CountingEmbedder::new(2), 8);
        let a = cached.embed("hello").await.unwrap();
        let b = cached.embed("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_stays_bounded() {
        let cached = CachingEmbedder::new(CountingEmbedder::new(2), 2);
        for text in ["a", "bb", "ccc", "dddd", "eeeee"] {
            cached.embed(text).await.unwrap();
        }
        assert!(cached.len() <= 2);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_not_cached() {
        let cached = CachingEmbedder::new(CountingEmbedder::new(3), 8);
        assert!(cached.embed("hello").await.is_err());
        assert!(cached.embed("hello").await.is_err());
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
        assert!(cached.is_empty());
    }
}
