//! C4 — Cache Engine (spec §4.4).
//!
//! Two tiers: a `DashMap`-backed hot tier shadowing a `sled` persistent
//! tier. Writes go to persistence first, then memory, so a reader arriving
//! after the persistence commit either sees the new value via memory or
//! falls through to persistence and gets the same new value. Reads check
//! memory first; on a persistence-only hit, the entry is promoted into the
//! hot tier.
//!
//! `evictLRU` takes a dedicated mutex so it's never observed mid-flight by
//! a concurrent eviction; ordinary `get`/`set` don't take that lock and
//! proceed concurrently across keys via `DashMap`'s per-shard locking and
//! sled's own internal locking (spec §5's no-global-lock-across-I/O rule).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cache::types::{CacheEntry, CacheLevel, CacheStats};
use crate::error::{CacheError, Result};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Default)]
struct EngineMetrics {
    hot_hits: AtomicU64,
    hot_misses: AtomicU64,
    persistent_hits: AtomicU64,
    persistent_misses: AtomicU64,
    evictions: AtomicU64,
}

impl EngineMetrics {
    fn record_hit(&self, level: CacheLevel) {
        match level {
            CacheLevel::Hot => self.hot_hits.fetch_add(1, Ordering::Relaxed),
            CacheLevel::Persistent => self.persistent_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn record_miss(&self, level: CacheLevel) {
        match level {
            CacheLevel::Hot => self.hot_misses.fetch_add(1, Ordering::Relaxed),
            CacheLevel::Persistent => self.persistent_misses.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// Persistent tier over `sled`. Keys and values are stored as raw bytes;
/// values are `bincode`-encoded `CacheEntry`s. This tier is the engine's
/// single source of truth — the hot tier only ever mirrors a subset of it.
struct PersistentTier {
    db: sled::Db,
}

impl PersistentTier {
    fn open(dir: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(dir.as_ref())
            .map_err(|e| CacheError::unavailable("persistent-tier", format!("sled open failed: {e}")))?;
        Ok(Self { db })
    }

    fn get(&self, key: &[u8]) -> Result<Option<CacheEntry>> {
        match self.db.get(key)? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    fn insert(&self, entry: &CacheEntry) -> Result<()> {
        let raw = bincode::serialize(entry)?;
        self.db.insert(&entry.key, raw)?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.db.remove(key)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.db.clear()?;
        Ok(())
    }

    fn iter_entries(&self) -> Result<Vec<CacheEntry>> {
        let mut out = Vec::with_capacity(self.db.len());
        for kv in self.db.iter() {
            let (_, raw) = kv?;
            out.push(bincode::deserialize(&raw)?);
        }
        Ok(out)
    }

    /// Fsync, for the Lifecycle Manager's shutdown sequence (spec §4.14).
    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Bounded hot-tier mirror. Capacity is advisory bookkeeping only — the
/// source of truth for eviction correctness is always the persistent tier,
/// walked fresh on every `evict_lru` call.
struct HotTier {
    entries: DashMap<Vec<u8>, CacheEntry>,
    max_bytes: u64,
    used_bytes: AtomicU64,
}

impl HotTier {
    fn new(max_bytes: u64) -> Self {
        Self { entries: DashMap::new(), max_bytes, used_bytes: AtomicU64::new(0) }
    }

    fn insert(&self, entry: CacheEntry) {
        let size = entry.accounted_size();
        if let Some(old) = self.entries.insert(entry.key.clone(), entry) {
            self.used_bytes.fetch_sub(old.accounted_size(), Ordering::Relaxed);
        }
        self.used_bytes.fetch_add(size, Ordering::Relaxed);
    }

    fn remove(&self, key: &[u8]) {
        if let Some((_, old)) = self.entries.remove(key) {
            self.used_bytes.fetch_sub(old.accounted_size(), Ordering::Relaxed);
        }
    }

    fn clear(&self) {
        self.entries.clear();
        self.used_bytes.store(0, Ordering::Relaxed);
    }

    /// Drop the coldest entries (lowest `last_accessed_at`, ties by key
    /// ascending) until the tracked byte total is back at or under the
    /// ceiling. Approximate by design: the hot tier is a cache over the
    /// persistent tier, so dropping an entry here never loses data.
    fn shed_to_capacity(&self) {
        if self.used_bytes.load(Ordering::Relaxed) <= self.max_bytes {
            return;
        }
        let mut candidates: Vec<(Vec<u8>, u64, u64)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.last_accessed_at, e.accounted_size()))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        for (key, _, size) in candidates {
            if self.used_bytes.load(Ordering::Relaxed) <= self.max_bytes {
                break;
            }
            self.entries.remove(&key);
            self.used_bytes.fetch_sub(size, Ordering::Relaxed);
        }
    }
}

/// The C4 Cache Engine: hot tier + persistent tier, with write-through and
/// read-through between them (spec §4.4).
pub struct CacheEngine {
    hot: HotTier,
    persistent: PersistentTier,
    metrics: EngineMetrics,
    eviction_lock: Mutex<()>,
}

impl CacheEngine {
    pub fn open(
        persistent_dir: impl AsRef<std::path::Path>,
        in_memory_max_bytes: u64,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            hot: HotTier::new(in_memory_max_bytes),
            persistent: PersistentTier::open(persistent_dir)?,
            metrics: EngineMetrics::default(),
            eviction_lock: Mutex::new(()),
        }))
    }

    /// Insert-or-update. Preserves `hit_count` and `created_at` of an
    /// existing entry with the same key; always bumps `last_accessed_at` to
    /// now. A single atomic operation per key (spec §4.4).
    pub fn set(&self, key: Vec<u8>, content: Vec<u8>, original_size: u64, compressed_size: u64) -> Result<CacheEntry> {
        let existing = self.persistent.get(&key)?;
        let now = now_ms();
        let entry = CacheEntry {
            key: key.clone(),
            content,
            original_size,
            compressed_size,
            hit_count: existing.as_ref().map_or(0, |e| e.hit_count),
            created_at: existing.as_ref().map_or(now, |e| e.created_at),
            last_accessed_at: now,
        };
        self.persistent.insert(&entry)?;
        self.hot.insert(entry.clone());
        self.hot.shed_to_capacity();
        Ok(entry)
    }

    /// Insert a fully-formed entry as-is, bypassing metadata preservation —
    /// used by the persistent-tier promotion path and by tests that need to
    /// seed specific timestamps.
    fn put_raw(&self, entry: CacheEntry) -> Result<()> {
        self.persistent.insert(&entry)?;
        self.hot.insert(entry);
        self.hot.shed_to_capacity();
        Ok(())
    }

    /// Read content, bumping `hit_count`/`last_accessed_at` on a hit.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get_with_metadata(key)?.map(|e| e.content))
    }

    /// Read the full record, bumping `hit_count`/`last_accessed_at` on a hit.
    pub fn get_with_metadata(&self, key: &[u8]) -> Result<Option<CacheEntry>> {
        if let Some(entry) = self.hot.entries.get(key) {
            self.metrics.record_hit(CacheLevel::Hot);
            let mut bumped = entry.clone();
            drop(entry);
            bumped.hit_count += 1;
            bumped.last_accessed_at = now_ms();
            self.put_raw(bumped.clone())?;
            return Ok(Some(bumped));
        }
        self.metrics.record_miss(CacheLevel::Hot);

        match self.persistent.get(key)? {
            Some(mut entry) => {
                self.metrics.record_hit(CacheLevel::Persistent);
                entry.hit_count += 1;
                entry.last_accessed_at = now_ms();
                self.put_raw(entry.clone())?;
                Ok(Some(entry))
            }
            None => {
                self.metrics.record_miss(CacheLevel::Persistent);
                Ok(None)
            }
        }
    }

    /// Read without mutating hit-count/access metadata, for diagnostics.
    pub fn peek(&self, key: &[u8]) -> Result<Option<CacheEntry>> {
        if let Some(entry) = self.hot.entries.get(key) {
            return Ok(Some(entry.clone()));
        }
        self.persistent.get(key)
    }

    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let existed = self.persistent.get(key)?.is_some();
        self.hot.remove(key);
        self.persistent.remove(key)?;
        Ok(existed)
    }

    pub fn clear(&self) -> Result<()> {
        self.hot.clear();
        self.persistent.clear()
    }

    pub fn get_all_entries(&self) -> Result<Vec<CacheEntry>> {
        self.persistent.iter_entries()
    }

    pub fn get_stats(&self) -> Result<CacheStats> {
        let entries = self.persistent.iter_entries()?;
        let total_entries = entries.len() as u64;
        let total_original_size: u64 = entries.iter().map(|e| e.original_size).sum();
        let total_compressed_size: u64 = entries.iter().map(|e| e.accounted_size()).sum();
        let hits = self.metrics.hot_hits.load(Ordering::Relaxed)
            + self.metrics.persistent_hits.load(Ordering::Relaxed);
        let misses = self.metrics.persistent_misses.load(Ordering::Relaxed);
        let total_lookups = hits + misses;
        let hit_rate = if total_lookups == 0 { 0.0 } else { hits as f64 / total_lookups as f64 };
        let avg_compression_ratio = if total_original_size == 0 {
            1.0
        } else {
            total_compressed_size as f64 / total_original_size as f64
        };
        Ok(CacheStats {
            total_entries,
            total_compressed_size,
            total_original_size,
            hits,
            misses,
            hit_rate,
            avg_compression_ratio,
        })
    }

    /// Retain the most-recently-accessed prefix (by `last_accessed_at`
    /// DESC, ties broken by key ASC) whose cumulative `accounted_size`
    /// fits within `max_bytes`; delete the rest. Atomic with respect to
    /// other evictions via `eviction_lock`; ordinary reads/writes are not
    /// blocked by it (spec §4.4, Testable Property 4, Scenario D).
    pub fn evict_lru(&self, max_bytes: u64) -> Result<u64> {
        let _guard = self.eviction_lock.lock();
        let mut entries = self.persistent.iter_entries()?;
        entries.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then_with(|| a.key.cmp(&b.key))
        });

        let mut kept_bytes: u64 = 0;
        let mut to_evict = Vec::new();
        let mut overflowed = false;
        for entry in entries {
            if overflowed {
                to_evict.push(entry.key);
                continue;
            }
            let size = entry.accounted_size();
            if kept_bytes + size <= max_bytes {
                kept_bytes += size;
            } else {
                overflowed = true;
                to_evict.push(entry.key);
            }
        }

        let evicted = to_evict.len() as u64;
        for key in to_evict {
            self.hot.remove(&key);
            self.persistent.remove(&key)?;
        }
        if evicted > 0 {
            self.metrics.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
        Ok(evicted)
    }

    /// Fsync the persistent tier, for the Lifecycle Manager (spec §4.14).
    pub fn flush(&self) -> Result<()> {
        self.persistent.flush()
    }
}
