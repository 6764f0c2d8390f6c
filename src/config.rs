//! Process-start configuration (spec §6).
//!
//! CLI parsing and config-file discovery are out of scope; this struct is
//! the object every component is constructed from. `from_toml_file` exists
//! for local operators but nothing in the crate requires it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the persistent cache tier is opened in.
    pub cache_dir: PathBuf,
    /// Ceiling on the in-memory hot tier, in bytes of `compressedSize`.
    pub in_memory_max_bytes: u64,
    /// Ceiling the persistent tier is evicted down to when it's breached.
    pub persistent_max_bytes: u64,
    /// Admission threshold below which content is always stored uncompressed.
    pub min_compress_bytes: usize,
    /// Default brotli quality, 0..=11.
    pub default_compression_quality: u32,
    /// Capacity of the metrics ring buffer.
    pub metrics_ring_size: usize,
    /// Whether the predictive cache (C8) runs at all.
    pub predictive_cache_enabled: bool,
    /// Tick interval for the scheduled-invalidation processor.
    pub scheduled_invalidation_tick: Duration,
    /// Tick interval for the lazy-invalidation flush queue.
    pub lazy_invalidation_tick: Duration,
    /// Base directory all sandboxed file reads must resolve under.
    pub sandbox_base_dir: PathBuf,
    /// Directory session CSV/JSONL logs and the session pointer file live in.
    pub hooks_data_dir: PathBuf,
    /// Default TTL applied to per-handler result cache entries.
    pub handler_cache_ttl: Duration,
    /// Default per-call deadline for dispatched tool invocations.
    pub call_deadline: Duration,
    /// Grace period the lifecycle manager waits for background tasks on shutdown.
    pub shutdown_grace_period: Duration,
    /// Virtual nodes per partition on the consistent-hash ring.
    pub virtual_nodes_per_partition: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_dir: home.join(".token-cache-core").join("cache"),
            in_memory_max_bytes: 64 * 1024 * 1024,
            persistent_max_bytes: 512 * 1024 * 1024,
            min_compress_bytes: 500,
            default_compression_quality: 11,
            metrics_ring_size: 100_000,
            predictive_cache_enabled: true,
            scheduled_invalidation_tick: Duration::from_secs(10),
            lazy_invalidation_tick: Duration::from_secs(5),
            sandbox_base_dir: home.clone(),
            hooks_data_dir: home.join(".token-cache-core").join("sessions"),
            handler_cache_ttl: Duration::from_secs(5 * 60),
            call_deadline: Duration::from_secs(30),
            shutdown_grace_period: Duration::from_secs(10),
            virtual_nodes_per_partition: 150,
        }
    }
}

impl Config {
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CacheError::unavailable("config", format!("cannot read {:?}: {e}", path.as_ref()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| CacheError::invalid_argument(format!("invalid config toml: {e}")))
    }

    /// Clamp a caller-supplied brotli quality to the valid range (spec §4.2).
    pub fn clamp_quality(quality: Option<u32>) -> u32 {
        quality.unwrap_or(11).min(11)
    }
}
