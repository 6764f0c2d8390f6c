//! Core data types for the Cache Engine (spec §3, §4.4).

use serde::{Deserialize, Serialize};

/// The fundamental persistent record (spec §3).
///
/// Invariant: `compressed_size == 0` means `content` is stored as plaintext
/// (the admission layer chose not to compress it); `last_accessed_at >=
/// created_at` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: Vec<u8>,
    pub content: Vec<u8>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub hit_count: u64,
    pub created_at: u64,
    pub last_accessed_at: u64,
}

impl CacheEntry {
    pub fn is_uncompressed(&self) -> bool {
        self.compressed_size == 0
    }

    /// The size accounted against LRU-by-size eviction: the compressed
    /// representation's size, or the plaintext size when stored uncompressed.
    pub fn accounted_size(&self) -> u64 {
        if self.is_uncompressed() {
            self.original_size
        } else {
            self.compressed_size
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_compressed_size: u64,
    pub total_original_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_compression_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLevel {
    Hot,
    Persistent,
}

/// Maximum key length the data model permits (spec §3: "≤ 512 bytes").
pub const MAX_KEY_BYTES: usize = 512;
