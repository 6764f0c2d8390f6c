//! C1 — Token Counter (spec §4.1).
//!
//! Deterministic token counting backed by `tiktoken-rs`'s `cl100k_base`
//! encoding, with a bounded, TTL'd result cache in front of it: the same
//! strings get counted many times per request (input, output, cached form,
//! compressed form) and re-tokenizing is the single hottest path in the
//! admission pipeline.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tiktoken_rs::CoreBPE;

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub tokens: usize,
    pub characters: usize,
}

struct CacheEntry {
    value: TokenCount,
    inserted_at: Instant,
}

/// LRU+TTL result cache over token counts, keyed by input bytes.
struct ResultCache {
    capacity: usize,
    ttl: Duration,
    entries: DashMap<Vec<u8>, CacheEntry>,
    recency: parking_lot::Mutex<VecDeque<Vec<u8>>>,
}

impl ResultCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: DashMap::new(),
            recency: parking_lot::Mutex::new(VecDeque::new()),
        }
    }

    fn get(&self, key: &[u8]) -> Option<TokenCount> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value)
    }

    fn put(&self, key: Vec<u8>, value: TokenCount) {
        self.entries.insert(
            key.clone(),
            CacheEntry { value, inserted_at: Instant::now() },
        );
        let mut recency = self.recency.lock();
        recency.push_back(key);
        while self.entries.len() > self.capacity {
            // Pop the oldest insertion; skip entries already evicted/refreshed.
            match recency.pop_front() {
                Some(stale_key) => {
                    self.entries.remove(&stale_key);
                }
                None => break,
            }
        }
    }
}

/// Process-wide token counter. Cheap to clone (internally `Arc`-free because
/// the encoder and cache are only ever constructed once via `TokenCounter::new`
/// and shared behind an `Arc<TokenCounter>` by callers).
pub struct TokenCounter {
    bpe: CoreBPE,
    cache: ResultCache,
}

impl TokenCounter {
    /// `cache_capacity` and `ttl` follow spec defaults (1000 entries, 5 minutes)
    /// unless the caller overrides them.
    pub fn new(cache_capacity: usize, ttl: Duration) -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| {
            CacheError::unavailable("token-counter", format!("tokenizer init failed: {e}"))
        })?;
        Ok(Self { bpe, cache: ResultCache::new(cache_capacity, ttl) })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(1000, Duration::from_secs(5 * 60))
    }

    /// Deterministic token count for `text`. Same input always yields the
    /// same output regardless of prior calls (the cache is a pure
    /// optimization, never an observable part of the contract).
    pub fn count(&self, text: &str) -> TokenCount {
        let key = text.as_bytes().to_vec();
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }
        let tokens = self.bpe.encode_with_special_tokens(text).len();
        let result = TokenCount { tokens, characters: text.chars().count() };
        self.cache.put(key, result);
        result
    }
}
