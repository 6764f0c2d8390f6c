//! C3 — Metrics Collector (spec §4.3).
//!
//! An append-only ring buffer of `OperationRecord`s plus cheap aggregate
//! views over it. Percentiles are computed by sorting a cloned snapshot of
//! the window rather than maintained incrementally — snapshots may elide
//! writes landing mid-read, which is an accepted looseness per spec §3/§4.3.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: u64,
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    pub cache_hit: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub saved_tokens: u64,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStatsSnapshot {
    pub total_operations: u64,
    pub cache_hit_rate: f64,
    pub average_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformancePercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Process-wide, bounded ring buffer of operation records.
pub struct MetricsCollector {
    capacity: usize,
    records: RwLock<VecDeque<OperationRecord>>,
}

impl MetricsCollector {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, records: RwLock::new(VecDeque::with_capacity(capacity.min(1024))) }
    }

    pub fn record(&self, record: OperationRecord) {
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    fn snapshot_since(&self, since_timestamp: Option<u64>) -> Vec<OperationRecord> {
        let records = self.records.read();
        records
            .iter()
            .filter(|r| since_timestamp.map_or(true, |since| r.timestamp >= since))
            .cloned()
            .collect()
    }

    pub fn get_operations(&self, since_timestamp: Option<u64>) -> Vec<OperationRecord> {
        self.snapshot_since(since_timestamp)
    }

    pub fn get_cache_stats(&self, since_timestamp: Option<u64>) -> CacheStatsSnapshot {
        let window = self.snapshot_since(since_timestamp);
        if window.is_empty() {
            return CacheStatsSnapshot::default();
        }
        let hits = window.iter().filter(|r| r.cache_hit).count() as f64;
        let total_duration: u64 = window.iter().map(|r| r.duration_ms).sum();
        CacheStatsSnapshot {
            total_operations: window.len() as u64,
            cache_hit_rate: hits / window.len() as f64,
            average_duration_ms: total_duration as f64 / window.len() as f64,
        }
    }

    pub fn get_performance_percentiles(&self, since_timestamp: Option<u64>) -> PerformancePercentiles {
        let mut durations: Vec<u64> =
            self.snapshot_since(since_timestamp).iter().map(|r| r.duration_ms).collect();
        if durations.is_empty() {
            return PerformancePercentiles::default();
        }
        durations.sort_unstable();
        let pick = |p: f64| -> f64 {
            let idx = ((durations.len() as f64 - 1.0) * p).round() as usize;
            durations[idx.min(durations.len() - 1)] as f64
        };
        PerformancePercentiles { p50: pick(0.50), p95: pick(0.95), p99: pick(0.99) }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush hook for `Lifecycle Manager` shutdown; the ring buffer is
    /// already durable in memory, so this is a no-op placeholder for any
    /// batched writer a deployment layers on top (spec §4.14).
    pub fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(op: &str, duration_ms: u64, cache_hit: bool) -> OperationRecord {
        OperationRecord {
            timestamp: now_ms(),
            operation: op.to_string(),
            duration_ms,
            success: true,
            cache_hit,
            input_tokens: 10,
            output_tokens: 5,
            cached_tokens: 0,
            saved_tokens: 0,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let collector = MetricsCollector::new(2);
        collector.record(sample("a", 1, false));
        collector.record(sample("b", 2, false));
        collector.record(sample("c", 3, false));
        let ops = collector.get_operations(None);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operation, "b");
        assert_eq!(ops[1].operation, "c");
    }

    #[test]
    fn cache_stats_computes_hit_rate() {
        let collector = MetricsCollector::new(100);
        collector.record(sample("x", 10, true));
        collector.record(sample("x", 20, false));
        let stats = collector.get_cache_stats(None);
        assert_eq!(stats.total_operations, 2);
        assert!((stats.cache_hit_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.average_duration_ms - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percentiles_over_empty_window_are_zero() {
        let collector = MetricsCollector::new(10);
        let p = collector.get_performance_percentiles(None);
        assert_eq!(p.p50, 0.0);
    }

    #[test]
    fn percentiles_sort_the_window() {
        let collector = MetricsCollector::new(10);
        for ms in [100, 10, 50, 20, 90] {
            collector.record(sample("op", ms, false));
        }
        let p = collector.get_performance_percentiles(None);
        assert!(p.p50 >= 20.0 && p.p50 <= 90.0);
        assert!(p.p99 >= p.p95);
    }
}
