//! C10 — Cache Partition Router (spec §4.10).
//!
//! A consistent-hash ring over SHA-256-truncated-to-`u32` hashes, with
//! `virtualNodesPerPartition` (default 150) virtual node hashes per
//! partition. The ring itself is a sorted `Vec<(u32, PartitionId)>` behind
//! an `ArcSwap`: every structural change (create/delete/migrate/rebalance)
//! builds a fresh ring and swaps the whole thing in atomically, so readers
//! never observe a half-updated ring — a new use of the teacher's existing
//! `arc-swap` dependency, not exercised elsewhere in this crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};
use crate::partition::types::{
    MigrationPlan, PartitionInfo, PartitionStats, PartitionStatus, TargetDistribution,
};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// SHA-256 truncated to the first 4 bytes, big-endian, per spec §4.10.
fn hash_key(bytes: &[u8]) -> u32 {
    let digest = Sha256::digest(bytes);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

struct PartitionState {
    id: String,
    strategy: String,
    status: PartitionStatus,
    keys: HashSet<Vec<u8>>,
    memory_usage: AtomicU64,
    created_at: u64,
    last_accessed: AtomicU64,
}

impl PartitionState {
    fn snapshot(&self, virtual_node_hashes: Vec<u32>) -> PartitionInfo {
        PartitionInfo {
            id: self.id.clone(),
            strategy: self.strategy.clone(),
            status: self.status,
            key_count: self.keys.len() as u64,
            memory_usage: self.memory_usage.load(Ordering::Relaxed),
            virtual_node_hashes,
            created_at: self.created_at,
            last_accessed: self.last_accessed.load(Ordering::Relaxed),
        }
    }
}

/// Ring: sorted by hash ascending. Lookup walks forward from the first
/// entry whose hash is `>=` the key's hash, wrapping to index 0 at the end.
type Ring = Vec<(u32, String)>;

/// C10: maps keys to partitions via consistent hashing, and tracks which
/// keys each partition currently owns for migration/rebalance accounting.
pub struct PartitionRouter {
    partitions: DashMap<String, PartitionState>,
    ring: ArcSwap<Ring>,
    virtual_nodes_per_partition: usize,
}

impl PartitionRouter {
    pub fn new(virtual_nodes_per_partition: usize) -> Self {
        Self {
            partitions: DashMap::new(),
            ring: ArcSwap::from_pointee(Vec::new()),
            virtual_nodes_per_partition: virtual_nodes_per_partition.max(1),
        }
    }

    fn virtual_node_hashes(&self, partition_id: &str) -> Vec<u32> {
        (0..self.virtual_nodes_per_partition)
            .map(|i| hash_key(format!("{partition_id}:vnode:{i}").as_bytes()))
            .collect()
    }

    fn rebuild_ring(&self) {
        let mut ring: Ring = Vec::new();
        for entry in self.partitions.iter() {
            if entry.value().status == PartitionStatus::Inactive {
                continue;
            }
            for hash in self.virtual_node_hashes(entry.key()) {
                ring.push((hash, entry.key().clone()));
            }
        }
        ring.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        self.ring.store(Arc::new(ring));
    }

    pub fn create_partition(&self, id: &str, strategy: &str) -> Result<()> {
        if self.partitions.contains_key(id) {
            return Err(CacheError::invalid_argument(format!("partition already exists: {id}")));
        }
        self.partitions.insert(
            id.to_string(),
            PartitionState {
                id: id.to_string(),
                strategy: strategy.to_string(),
                status: PartitionStatus::Active,
                keys: HashSet::new(),
                memory_usage: AtomicU64::new(0),
                created_at: now_ms(),
                last_accessed: AtomicU64::new(now_ms()),
            },
        );
        self.rebuild_ring();
        Ok(())
    }

    /// Drains virtual nodes from the ring first (by marking the partition
    /// `Draining` and rebuilding), then removes the partition's state.
    pub fn delete_partition(&self, id: &str) -> Result<()> {
        {
            let mut entry = self
                .partitions
                .get_mut(id)
                .ok_or_else(|| CacheError::not_found(format!("partition {id}")))?;
            entry.status = PartitionStatus::Draining;
        }
        self.rebuild_ring();
        self.partitions.remove(id);
        Ok(())
    }

    pub fn list_partitions(&self) -> Vec<PartitionInfo> {
        self.partitions
            .iter()
            .map(|e| e.value().snapshot(self.virtual_node_hashes(e.key())))
            .collect()
    }

    /// Which partition currently owns `key`, walking the ring clockwise
    /// from the key's hash (binary search for the first `>=` entry,
    /// wrapping to the start).
    pub fn locate(&self, key: &[u8]) -> Option<String> {
        let ring = self.ring.load();
        if ring.is_empty() {
            return None;
        }
        let key_hash = hash_key(key);
        let idx = ring.partition_point(|(hash, _)| *hash < key_hash);
        let idx = if idx == ring.len() { 0 } else { idx };
        Some(ring[idx].1.clone())
    }

    /// Primary partition for `key` plus the next `replication_factor - 1`
    /// *distinct* partitions walking the ring onward (spec §4.10).
    pub fn route_query(&self, key: &[u8], replication_factor: usize) -> Vec<String> {
        let ring = self.ring.load();
        if ring.is_empty() || replication_factor == 0 {
            return Vec::new();
        }
        let key_hash = hash_key(key);
        let start = {
            let idx = ring.partition_point(|(hash, _)| *hash < key_hash);
            if idx == ring.len() { 0 } else { idx }
        };

        let mut out = Vec::new();
        let mut i = start;
        for _ in 0..ring.len() {
            let candidate = &ring[i].1;
            if !out.contains(candidate) {
                out.push(candidate.clone());
            }
            if out.len() >= replication_factor {
                break;
            }
            i = (i + 1) % ring.len();
        }
        out
    }

    /// Record that `key` now belongs to `partition_id`, updating key/memory
    /// accounting. Idempotent no-op if the partition doesn't exist.
    pub fn assign_key(&self, partition_id: &str, key: Vec<u8>, size_bytes: u64) {
        if let Some(mut partition) = self.partitions.get_mut(partition_id) {
            if partition.keys.insert(key) {
                partition.memory_usage.fetch_add(size_bytes, Ordering::Relaxed);
            }
            partition.last_accessed.store(now_ms(), Ordering::Relaxed);
        }
    }

    /// Move every key in `source` matching `key_pattern` (glob `*`/`?`,
    /// `None` = all keys) into `target`, updating both partitions' key and
    /// memory accounting atomically per key.
    pub fn migrate(&self, source: &str, target: &str, key_pattern: Option<&str>) -> Result<u64> {
        if !self.partitions.contains_key(target) {
            return Err(CacheError::not_found(format!("partition {target}")));
        }
        let regex = key_pattern.map(compile_glob).transpose()?;

        let candidates: Vec<Vec<u8>> = {
            let source_partition = self
                .partitions
                .get(source)
                .ok_or_else(|| CacheError::not_found(format!("partition {source}")))?;
            source_partition
                .keys
                .iter()
                .filter(|k| regex.as_ref().map_or(true, |re| re.is_match(&String::from_utf8_lossy(k))))
                .cloned()
                .collect()
        };

        let mut migrated = 0u64;
        for key in candidates {
            let size = {
                let mut source_partition = self.partitions.get_mut(source).unwrap();
                if !source_partition.keys.remove(&key) {
                    continue;
                }
                // Per-key size accounting isn't tracked separately from the
                // partition total, so move a proportional share back out.
                let remaining = source_partition.keys.len() as u64 + 1;
                let total = source_partition.memory_usage.load(Ordering::Relaxed);
                let share = if remaining == 0 { 0 } else { total / remaining };
                source_partition.memory_usage.fetch_sub(share.min(total), Ordering::Relaxed);
                share
            };
            self.assign_key(target, key, size);
            migrated += 1;
        }
        Ok(migrated)
    }

    /// Greedily plan migrations from the most-overloaded to the
    /// most-underloaded partition, by key count, until `target_distribution`
    /// is approximated or `max_migrations` partition-pairs have been
    /// touched. Returns the plan; callers invoke `migrate` per plan entry.
    pub fn plan_rebalance(&self, target_distribution: TargetDistribution, max_migrations: usize) -> Vec<MigrationPlan> {
        let mut loads: Vec<(String, u64)> = self
            .partitions
            .iter()
            .map(|e| (e.key().clone(), e.value().keys.len() as u64))
            .collect();
        if loads.len() < 2 {
            return Vec::new();
        }
        loads.sort_by(|a, b| b.1.cmp(&a.1));

        let total: u64 = loads.iter().map(|(_, c)| *c).sum();
        let even_share = total / loads.len() as u64;

        let mut plans = Vec::new();
        let mut low = loads.len() - 1;
        let mut high = 0usize;
        while high < low && plans.len() < max_migrations {
            let (hot_id, hot_count) = &loads[high];
            let (cold_id, cold_count) = &loads[low];
            let target_hot = match target_distribution {
                TargetDistribution::Even => even_share,
                TargetDistribution::Weighted | TargetDistribution::CapacityBased => even_share,
            };
            if *hot_count <= target_hot || hot_count <= cold_count {
                high += 1;
                continue;
            }
            let move_count = (*hot_count - target_hot).min(hot_count - cold_count);
            if move_count == 0 {
                low -= 1;
                continue;
            }
            plans.push(MigrationPlan { source: hot_id.clone(), target: cold_id.clone(), key_count: move_count });
            loads[high].1 -= move_count;
            loads[low].1 += move_count;
            low -= 1;
        }
        plans
    }

    /// Execute a previously planned rebalance, migrating `key_count`
    /// arbitrary keys per plan entry (no pattern filtering — rebalance
    /// moves whichever keys happen to be resident).
    pub fn rebalance(&self, target_distribution: TargetDistribution, max_migrations: usize) -> Result<u64> {
        let plans = self.plan_rebalance(target_distribution, max_migrations);
        let mut total_migrated = 0u64;
        for plan in plans {
            let keys: Vec<Vec<u8>> = {
                let source = self.partitions.get(&plan.source).unwrap();
                source.keys.iter().take(plan.key_count as usize).cloned().collect()
            };
            for key in keys {
                let size = {
                    let mut source = self.partitions.get_mut(&plan.source).unwrap();
                    source.keys.remove(&key);
                    let remaining = source.keys.len() as u64 + 1;
                    let total = source.memory_usage.load(Ordering::Relaxed);
                    let share = if remaining == 0 { 0 } else { total / remaining };
                    source.memory_usage.fetch_sub(share.min(total), Ordering::Relaxed);
                    share
                };
                self.assign_key(&plan.target, key, size);
                total_migrated += 1;
            }
        }
        Ok(total_migrated)
    }

    /// `splitPartition`: create `target_count` fresh partitions and migrate
    /// an even share of `hot_id`'s keys into each (spec §4.10 — expressible
    /// as a sequence of create/migrate/delete).
    pub fn split_partition(&self, hot_id: &str, target_count: usize) -> Result<Vec<String>> {
        if target_count == 0 {
            return Err(CacheError::invalid_argument("split target_count must be > 0"));
        }
        let strategy = self
            .partitions
            .get(hot_id)
            .ok_or_else(|| CacheError::not_found(format!("partition {hot_id}")))?
            .strategy
            .clone();

        let mut new_ids = Vec::with_capacity(target_count);
        for i in 0..target_count {
            let new_id = format!("{hot_id}-split-{i}");
            self.create_partition(&new_id, &strategy)?;
            new_ids.push(new_id);
        }

        let hot_key_count = self.partitions.get(hot_id).unwrap().keys.len() as u64;
        let per_split = hot_key_count / (target_count as u64 + 1);
        for new_id in &new_ids {
            if per_split > 0 {
                let keys: Vec<Vec<u8>> = {
                    let source = self.partitions.get(hot_id).unwrap();
                    source.keys.iter().take(per_split as usize).cloned().collect()
                };
                for key in keys {
                    let mut source = self.partitions.get_mut(hot_id).unwrap();
                    source.keys.remove(&key);
                    drop(source);
                    self.assign_key(new_id, key, 0);
                }
            }
        }
        Ok(new_ids)
    }

    /// `mergePartitions`: migrate every key from each source into
    /// `target_id`, then delete the (now-empty) sources.
    pub fn merge_partitions(&self, ids: &[String], target_id: &str) -> Result<u64> {
        if !self.partitions.contains_key(target_id) {
            return Err(CacheError::not_found(format!("partition {target_id}")));
        }
        let mut total = 0u64;
        for id in ids {
            if id == target_id {
                continue;
            }
            total += self.migrate(id, target_id, None)?;
            self.delete_partition(id)?;
        }
        Ok(total)
    }

    pub fn stats(&self) -> PartitionStats {
        let counts: Vec<u64> = self.partitions.iter().map(|e| e.value().keys.len() as u64).collect();
        if counts.is_empty() {
            return PartitionStats::default();
        }
        let mean = counts.iter().sum::<u64>() as f64 / counts.len() as f64;
        let variance = counts.iter().map(|c| (*c as f64 - mean).powi(2)).sum::<f64>() / counts.len() as f64;
        let stddev = variance.sqrt();
        let cv = if mean > 0.0 { stddev / mean } else { 0.0 };

        let hot_partitions: Vec<String> = self
            .partitions
            .iter()
            .filter(|e| mean > 0.0 && e.value().keys.len() as f64 > 2.0 * mean)
            .map(|e| e.key().clone())
            .collect();

        PartitionStats {
            partition_count: counts.len() as u64,
            total_keys: counts.iter().sum(),
            load_coefficient_of_variation: cv,
            hot_partitions,
        }
    }
}

fn compile_glob(pattern: &str) -> Result<Regex> {
    let mut anchored = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => anchored.push_str(".*"),
            '?' => anchored.push('.'),
            _ => anchored.push_str(&regex::escape(&ch.to_string())),
        }
    }
    anchored.push('$');
    Regex::new(&anchored).map_err(|e| CacheError::invalid_argument(format!("bad key pattern: {e}")))
}
