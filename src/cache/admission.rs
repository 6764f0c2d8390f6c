//! C5 — Optimization Admission (spec §4.5).
//!
//! The only place in the crate that decides whether to store content
//! compressed. The admission invariant: never cache a representation whose
//! token count exceeds the plaintext's. Three-way branch per call —
//! below the minimum size, store raw; compression exists but costs more
//! tokens than it saves, store raw; otherwise store compressed.

use std::sync::Arc;

use crate::cache::engine::CacheEngine;
use crate::compression::CompressionCodec;
use crate::error::Result;
use crate::token_counter::TokenCounter;

fn hash_key(namespace: &str, content: &[u8]) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"token-cache-core:v1");
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(content);
    hasher.finalize().as_bytes().to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    StoredRaw,
    StoredCompressed,
}

#[derive(Debug, Clone)]
pub struct OptimizeResult {
    pub key: Vec<u8>,
    pub decision: AdmissionDecision,
    pub original_tokens: usize,
    pub stored_tokens: usize,
    pub original_size: u64,
    pub stored_size: u64,
}

/// C5: admits content into the `CacheEngine` under the token-count invariant,
/// and reconstitutes plaintext back out of it on read.
pub struct OptimizationAdmission {
    engine: Arc<CacheEngine>,
    codec: Arc<CompressionCodec>,
    tokens: Arc<TokenCounter>,
    min_compress_bytes: usize,
    quality: u32,
}

impl OptimizationAdmission {
    pub fn new(
        engine: Arc<CacheEngine>,
        codec: Arc<CompressionCodec>,
        tokens: Arc<TokenCounter>,
        min_compress_bytes: usize,
        quality: u32,
    ) -> Self {
        Self { engine, codec, tokens, min_compress_bytes, quality }
    }

    pub fn key_for(&self, namespace: &str, content: &str) -> Vec<u8> {
        hash_key(namespace, content.as_bytes())
    }

    /// Admit `content` into the cache under `namespace`, choosing raw or
    /// compressed storage per the token-count invariant (spec §4.5).
    pub fn optimize(&self, namespace: &str, content: &str) -> Result<OptimizeResult> {
        let key = self.key_for(namespace, content);
        self.optimize_with_key(key, content)
    }

    /// Same admission policy as [`optimize`](Self::optimize), but under a
    /// caller-supplied key instead of one derived from `content`. Used by
    /// per-handler result caching (spec §4.11), where the cache key is
    /// derived from the *request* (tool name + canonicalized args), not
    /// the result body being admitted.
    pub fn optimize_with_key(&self, key: Vec<u8>, content: &str) -> Result<OptimizeResult> {
        self.optimize_with_key_and_quality(key, content, None)
    }

    /// Same as [`optimize_with_key`](Self::optimize_with_key), with an
    /// optional per-call quality override (spec §4.2's `quality?`
    /// parameter, surfaced at the handler level by `optimize_text`).
    pub fn optimize_with_key_and_quality(&self, key: Vec<u8>, content: &str, quality: Option<u32>) -> Result<OptimizeResult> {
        let plaintext = content.as_bytes();
        let original_tokens = self.tokens.count(content).tokens;

        if plaintext.len() < self.min_compress_bytes {
            return self.store_raw(key, plaintext, original_tokens);
        }

        let compressed = self.codec.compress(plaintext, Some(quality.unwrap_or(self.quality)))?;
        // tiktoken operates on text, not arbitrary bytes; base64 is the
        // representation a cache reader would actually re-tokenize if it
        // peeked at the stored payload, so that's what gets counted here.
        let compressed_base64 = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            &compressed.compressed,
        );
        let compressed_tokens = self.tokens.count(&compressed_base64).tokens;

        if compressed_tokens >= original_tokens {
            return self.store_raw(key, plaintext, original_tokens);
        }

        let stored_size = compressed.compressed_size as u64;
        self.engine.set(
            key.clone(),
            compressed.compressed,
            plaintext.len() as u64,
            stored_size,
        )?;
        Ok(OptimizeResult {
            key,
            decision: AdmissionDecision::StoredCompressed,
            original_tokens,
            stored_tokens: compressed_tokens,
            original_size: plaintext.len() as u64,
            stored_size,
        })
    }

    fn store_raw(&self, key: Vec<u8>, plaintext: &[u8], original_tokens: usize) -> Result<OptimizeResult> {
        self.engine.set(key.clone(), plaintext.to_vec(), plaintext.len() as u64, 0)?;
        Ok(OptimizeResult {
            key,
            decision: AdmissionDecision::StoredRaw,
            original_tokens,
            stored_tokens: original_tokens,
            original_size: plaintext.len() as u64,
            stored_size: plaintext.len() as u64,
        })
    }

    /// Look up `key`, decompressing transparently when the stored entry is
    /// compressed. Returns `None` on a cache miss.
    pub fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.engine.get_with_metadata(key)? else { return Ok(None) };
        if entry.is_uncompressed() {
            Ok(Some(entry.content))
        } else {
            Ok(Some(self.codec.decompress(&entry.content)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn admission() -> OptimizationAdmission {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let codec = Arc::new(CompressionCodec::new());
        let tokens = Arc::new(TokenCounter::new(100, Duration::from_secs(60)).unwrap());
        OptimizationAdmission::new(engine, codec, tokens, 500, 11)
    }

    #[test]
    fn small_content_is_stored_raw() {
        let admission = admission();
        let result = admission.optimize("ns", "tiny").unwrap();
        assert_eq!(result.decision, AdmissionDecision::StoredRaw);
        let fetched = admission.fetch(&result.key).unwrap().unwrap();
        assert_eq!(fetched, b"tiny");
    }

    #[test]
    fn highly_compressible_content_is_stored_compressed() {
        let admission = admission();
        let content = "the quick brown fox jumps over the lazy dog ".repeat(200);
        let result = admission.optimize("ns", &content).unwrap();
        assert_eq!(result.decision, AdmissionDecision::StoredCompressed);
        assert!(result.stored_tokens < result.original_tokens);
        let fetched = admission.fetch(&result.key).unwrap().unwrap();
        assert_eq!(fetched, content.as_bytes());
    }

    #[test]
    fn incompressible_content_falls_back_to_raw() {
        let admission = admission();
        // Pseudo-random bytes rendered as text: brotli can't shrink this
        // below its own base64 token overhead.
        let mut content = String::new();
        let mut x: u32 = 0x1234_5678;
        for _ in 0..600 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            content.push(char::from(b'a' + (x % 26) as u8));
        }
        let result = admission.optimize("ns", &content).unwrap();
        let fetched = admission.fetch(&result.key).unwrap().unwrap();
        assert_eq!(fetched, content.as_bytes());
    }

    #[test]
    fn optimize_with_key_honors_the_caller_supplied_key() {
        let admission = admission();
        let key = b"request-derived-key".to_vec();
        let result = admission.optimize_with_key(key.clone(), "tiny").unwrap();
        assert_eq!(result.key, key);
        assert_eq!(admission.fetch(&key).unwrap().unwrap(), b"tiny");
    }

    #[test]
    fn same_content_same_namespace_yields_same_key() {
        let admission = admission();
        let a = admission.key_for("ns", "hello");
        let b = admission.key_for("ns", "hello");
        let c = admission.key_for("other", "hello");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
