//! C9 — Cache Invalidation Engine (spec §4.9).
//!
//! Owns three pieces of state: a symbolic dependency DAG (`DashMap<Key,
//! DependencyNode>`, edges stored on both the parent and the child per
//! spec §9's "Cyclic structures" note — no shared ownership, no object
//! references), a ring-buffered audit log, and a table of scheduled jobs.
//! Lazy-mode invalidations are enqueued and drained by a 5-second timer;
//! scheduled jobs are polled by a 10-second timer. Both timers are plain
//! `tokio::time::interval` loops stopped by a `CancellationToken`, started
//! and stopped by the Lifecycle Manager (spec §4.14, §9 "Background timers").

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::cache::CacheEngine;
use crate::error::{CacheError, Result};
use crate::invalidation::types::{
    DependencyNode, InvalidationMode, InvalidationRecord, InvalidationStats, InvalidationStrategy,
    ScheduledInvalidation, ValidationReport,
};

/// Cascades through the dependency graph never walk deeper than this many
/// edges; it doubles as the cycle guard (spec §4.9, §8 Testable Property 6).
pub const DEFAULT_MAX_CASCADE_DEPTH: u32 = 10;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Compile a glob with `*` (any run) and `?` (exactly one char) into an
/// anchored regex — spec §4.9 / §8's boundary behaviors ("`*` matches
/// every key; `?` matches exactly one character").
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
    Regex::new(&anchored).map_err(|e| CacheError::invalid_argument(format!("bad invalidation pattern: {e}")))
}

struct EngineConfig {
    strategy: InvalidationStrategy,
    mode: InvalidationMode,
    enable_audit: bool,
    max_audit_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: InvalidationStrategy::Immediate,
            mode: InvalidationMode::Eager,
            enable_audit: true,
            max_audit_entries: 10_000,
        }
    }
}

/// C9: key/pattern/tag/dependency-cascade invalidation, scheduled jobs, and
/// an append-only audit log, all layered over the C4 `CacheEngine`.
pub struct InvalidationEngine {
    cache: Arc<CacheEngine>,
    config: RwLock<EngineConfig>,
    dependencies: DashMap<Vec<u8>, DependencyNode>,
    tag_index: DashMap<String, HashSet<Vec<u8>>>,
    audit: RwLock<VecDeque<InvalidationRecord>>,
    audit_next_id: AtomicU64,
    lazy_queue: Mutex<VecDeque<Vec<u8>>>,
    scheduled: DashMap<u64, ScheduledInvalidation>,
    schedule_next_id: AtomicU64,
    failures: AtomicU64,
}

impl InvalidationEngine {
    pub fn new(cache: Arc<CacheEngine>) -> Self {
        Self {
            cache,
            config: RwLock::new(EngineConfig::default()),
            dependencies: DashMap::new(),
            tag_index: DashMap::new(),
            audit: RwLock::new(VecDeque::new()),
            audit_next_id: AtomicU64::new(1),
            lazy_queue: Mutex::new(VecDeque::new()),
            scheduled: DashMap::new(),
            schedule_next_id: AtomicU64::new(1),
            failures: AtomicU64::new(0),
        }
    }

    pub fn configure(
        &self,
        strategy: InvalidationStrategy,
        mode: InvalidationMode,
        enable_audit: bool,
        max_audit_entries: usize,
    ) {
        let mut config = self.config.write();
        config.strategy = strategy;
        config.mode = mode;
        config.enable_audit = enable_audit;
        config.max_audit_entries = max_audit_entries.max(1);
    }

    fn record_audit(&self, strategy: InvalidationStrategy, affected_keys: Vec<Vec<u8>>, reason: impl Into<String>, execution_time_ms: u64) {
        if !self.config.read().enable_audit {
            return;
        }
        let record = InvalidationRecord {
            id: self.audit_next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: now_ms(),
            strategy,
            affected_keys,
            reason: reason.into(),
            metadata: serde_json::Map::new(),
            execution_time_ms,
        };
        let cap = self.config.read().max_audit_entries;
        let mut audit = self.audit.write();
        audit.push_back(record);
        while audit.len() > cap {
            audit.pop_front();
        }
    }

    /// Delete a single key from the underlying cache. A miss is a no-op,
    /// not an error (spec §4.9 failure semantics).
    fn invalidate_one(&self, key: &[u8]) -> Result<bool> {
        match self.config.read().mode {
            InvalidationMode::Lazy => {
                self.lazy_queue.lock().push_back(key.to_vec());
                Ok(true)
            }
            _ => self.cache.delete(key),
        }
    }

    pub fn invalidate(&self, keys: &[Vec<u8>]) -> Result<u64> {
        let start = std::time::Instant::now();
        let strategy = self.config.read().strategy;
        let mut affected = Vec::new();
        for key in keys {
            if self.invalidate_one(key)? {
                affected.push(key.clone());
            }
        }
        let count = affected.len() as u64;
        self.record_audit(strategy, affected, "invalidate", start.elapsed().as_millis() as u64);
        Ok(count)
    }

    /// `pattern` uses `*`/`?` glob syntax over the raw key bytes rendered
    /// as UTF-8 (lossy for non-UTF-8 keys, which simply won't match).
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let start = std::time::Instant::now();
        let regex = compile_glob(pattern)?;
        let matching: Vec<Vec<u8>> = self
            .cache
            .get_all_entries()?
            .into_iter()
            .map(|e| e.key)
            .filter(|key| regex.is_match(&String::from_utf8_lossy(key)))
            .collect();
        let strategy = self.config.read().strategy;
        let mut affected = Vec::new();
        for key in &matching {
            if self.invalidate_one(key)? {
                affected.push(key.clone());
            }
        }
        let count = affected.len() as u64;
        self.record_audit(strategy, affected, format!("pattern:{pattern}"), start.elapsed().as_millis() as u64);
        Ok(count)
    }

    pub fn invalidate_tag(&self, tags: &[String]) -> Result<u64> {
        let start = std::time::Instant::now();
        let mut keys: HashSet<Vec<u8>> = HashSet::new();
        for tag in tags {
            if let Some(tagged) = self.tag_index.get(tag) {
                keys.extend(tagged.iter().cloned());
            }
        }
        let strategy = self.config.read().strategy;
        let mut affected = Vec::new();
        for key in &keys {
            if self.invalidate_one(key)? {
                affected.push(key.clone());
            }
        }
        let count = affected.len() as u64;
        self.record_audit(
            strategy,
            affected,
            format!("tags:{}", tags.join(",")),
            start.elapsed().as_millis() as u64,
        );
        Ok(count)
    }

    /// BFS through the `children` relation from `root_key`, bounded by
    /// `cascade_depth` (clamped to `DEFAULT_MAX_CASCADE_DEPTH`) and guarded
    /// by a visited set so cycles terminate (spec §8 Testable Property 6,
    /// Scenario E).
    pub fn invalidate_dependency(&self, root_key: &[u8], cascade_depth: u32) -> Result<u64> {
        let start = std::time::Instant::now();
        let max_depth = cascade_depth.min(DEFAULT_MAX_CASCADE_DEPTH);
        let mut visited: HashSet<Vec<u8>> = HashSet::new();
        let mut frontier: VecDeque<(Vec<u8>, u32)> = VecDeque::new();
        frontier.push_back((root_key.to_vec(), 0));
        visited.insert(root_key.to_vec());

        while let Some((key, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            if let Some(node) = self.dependencies.get(&key) {
                for child in node.children.iter() {
                    if visited.insert(child.clone()) {
                        frontier.push_back((child.clone(), depth + 1));
                    }
                }
            }
        }

        let strategy = self.config.read().strategy;
        let mut affected = Vec::new();
        for key in &visited {
            if self.invalidate_one(key)? {
                affected.push(key.clone());
            }
            if let Some(mut node) = self.dependencies.get_mut(key) {
                node.last_invalidated = Some(now_ms());
            }
        }
        let count = affected.len() as u64;
        self.record_audit(
            InvalidationStrategy::DependencyCascade,
            affected,
            format!("cascade-from:{}", String::from_utf8_lossy(root_key)),
            start.elapsed().as_millis() as u64,
        );
        let _ = strategy;
        Ok(count)
    }

    fn node_mut(&self, key: &[u8]) -> dashmap::mapref::one::RefMut<'_, Vec<u8>, DependencyNode> {
        self.dependencies
            .entry(key.to_vec())
            .or_insert_with(|| DependencyNode::new(key.to_vec(), now_ms()))
    }

    pub fn set_dependency(&self, parent: &[u8], children: &[Vec<u8>], tag: Option<&str>) {
        {
            let mut parent_node = self.node_mut(parent);
            for child in children {
                parent_node.children.insert(child.clone());
            }
            if let Some(tag) = tag {
                parent_node.tags.insert(tag.to_string());
            }
        }
        for child in children {
            let mut child_node = self.node_mut(child);
            child_node.parents.insert(parent.to_vec());
        }
        if let Some(tag) = tag {
            let mut tagged = self.tag_index.entry(tag.to_string()).or_insert_with(HashSet::new);
            tagged.insert(parent.to_vec());
            for child in children {
                tagged.insert(child.clone());
            }
        }
    }

    pub fn remove_dependency(&self, parent: &[u8], child: &[u8]) {
        if let Some(mut parent_node) = self.dependencies.get_mut(parent) {
            parent_node.children.remove(child);
        }
        if let Some(mut child_node) = self.dependencies.get_mut(child) {
            child_node.parents.remove(parent);
        }
    }

    /// `execute_at`/`repeat_interval` are caller-supplied Unix ms; the
    /// scheduled-tick timer (spec §9 "Background timers") is what actually
    /// fires these, via `run_due_scheduled`.
    pub fn schedule_invalidation(
        &self,
        keys: Vec<Vec<u8>>,
        pattern: Option<String>,
        tags: Option<Vec<String>>,
        execute_at: u64,
        repeat_interval: Option<u64>,
    ) -> u64 {
        let id = self.schedule_next_id.fetch_add(1, Ordering::Relaxed);
        self.scheduled.insert(
            id,
            ScheduledInvalidation {
                id,
                keys,
                pattern,
                tags,
                execute_at,
                repeat_interval,
                execution_count: 0,
                last_executed: None,
            },
        );
        id
    }

    pub fn cancel_scheduled(&self, id: u64) -> bool {
        self.scheduled.remove(&id).is_some()
    }

    /// Run every scheduled job whose `execute_at` has passed. Re-arms jobs
    /// with a `repeat_interval`; removes one-shot jobs after they fire.
    /// Called by the 10-second tick (spec §4.9).
    pub fn run_due_scheduled(&self) -> Result<u64> {
        let now = now_ms();
        let due: Vec<u64> = self
            .scheduled
            .iter()
            .filter(|e| e.execute_at <= now)
            .map(|e| *e.key())
            .collect();

        let mut total_affected = 0u64;
        for id in due {
            let Some(mut job) = self.scheduled.get_mut(&id) else { continue };
            let mut affected = 0u64;
            if !job.keys.is_empty() {
                affected += self.invalidate(&job.keys)?;
            }
            if let Some(pattern) = job.pattern.clone() {
                affected += self.invalidate_pattern(&pattern)?;
            }
            if let Some(tags) = job.tags.clone() {
                affected += self.invalidate_tag(&tags)?;
            }
            job.execution_count += 1;
            job.last_executed = Some(now);
            total_affected += affected;

            match job.repeat_interval {
                Some(interval) => job.execute_at = now + interval,
                None => {
                    drop(job);
                    self.scheduled.remove(&id);
                }
            }
        }
        Ok(total_affected)
    }

    /// Drain the lazy-invalidation queue, actually deleting each enqueued
    /// key. Called by the 5-second lazy-flush tick (spec §4.9).
    pub fn flush_lazy_queue(&self) -> Result<u64> {
        let pending: Vec<Vec<u8>> = {
            let mut queue = self.lazy_queue.lock();
            queue.drain(..).collect()
        };
        let mut flushed = 0u64;
        for key in pending {
            if self.cache.delete(&key)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    pub fn validate(&self, keys: Option<&[Vec<u8>]>) -> Result<Vec<ValidationReport>> {
        let targets: Vec<Vec<u8>> = match keys {
            Some(keys) => keys.to_vec(),
            None => self.cache.get_all_entries()?.into_iter().map(|e| e.key).collect(),
        };
        let mut reports = Vec::with_capacity(targets.len());
        for key in targets {
            let valid = self.cache.peek(&key)?.is_some();
            reports.push(ValidationReport {
                key: key.clone(),
                valid,
                reason: if valid { None } else { Some("not present in cache".to_string()) },
            });
        }
        Ok(reports)
    }

    pub fn clear_audit(&self) {
        self.audit.write().clear();
    }

    pub fn audit_log(&self) -> Vec<InvalidationRecord> {
        self.audit.read().iter().cloned().collect()
    }

    pub fn stats(&self) -> InvalidationStats {
        InvalidationStats {
            total_invalidations: self.audit.read().len() as u64,
            total_keys_invalidated: self.audit.read().iter().map(|r| r.affected_keys.len() as u64).sum(),
            scheduled_jobs_active: self.scheduled.len() as u64,
            dependency_nodes: self.dependencies.len() as u64,
            audit_entries: self.audit.read().len() as u64,
        }
    }

    /// Spawn the lazy-flush and scheduled-tick background loops. Returns
    /// handles the Lifecycle Manager joins (bounded by its shutdown grace
    /// period) after signalling `cancel`.
    pub fn spawn_timers(
        self: &Arc<Self>,
        lazy_tick: Duration,
        scheduled_tick: Duration,
        cancel: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let lazy_engine = Arc::clone(self);
        let lazy_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(lazy_tick);
            loop {
                tokio::select! {
                    _ = lazy_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = lazy_engine.flush_lazy_queue() {
                            lazy_engine.failures.fetch_add(1, Ordering::Relaxed);
                            error!(error = %e, "lazy invalidation flush failed");
                        }
                    }
                }
            }
        }));

        let scheduled_engine = Arc::clone(self);
        let scheduled_cancel = cancel;
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduled_tick);
            loop {
                tokio::select! {
                    _ = scheduled_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = scheduled_engine.run_due_scheduled() {
                            scheduled_engine.failures.fetch_add(1, Ordering::Relaxed);
                            warn!(error = %e, "scheduled-invalidation-failed");
                        }
                    }
                }
            }
        }));

        handles
    }
}
