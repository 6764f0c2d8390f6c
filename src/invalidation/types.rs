//! Data types for the Cache Invalidation Engine (spec §3, §4.9).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidationStrategy {
    Immediate,
    Lazy,
    WriteThrough,
    TtlBased,
    EventDriven,
    DependencyCascade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationMode {
    Eager,
    Lazy,
    Scheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyNode {
    pub key: Vec<u8>,
    pub parents: HashSet<Vec<u8>>,
    pub children: HashSet<Vec<u8>>,
    pub tags: HashSet<String>,
    pub created_at: u64,
    pub last_invalidated: Option<u64>,
}

impl DependencyNode {
    pub fn new(key: Vec<u8>, created_at: u64) -> Self {
        Self { key, parents: HashSet::new(), children: HashSet::new(), tags: HashSet::new(), created_at, last_invalidated: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationRecord {
    pub id: u64,
    pub timestamp: u64,
    pub strategy: InvalidationStrategy,
    pub affected_keys: Vec<Vec<u8>>,
    pub reason: String,
    pub metadata: serde_json::Map<String, Value>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledInvalidation {
    pub id: u64,
    pub keys: Vec<Vec<u8>>,
    pub pattern: Option<String>,
    pub tags: Option<Vec<String>>,
    pub execute_at: u64,
    pub repeat_interval: Option<u64>,
    pub execution_count: u64,
    pub last_executed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InvalidationStats {
    pub total_invalidations: u64,
    pub total_keys_invalidated: u64,
    pub scheduled_jobs_active: u64,
    pub dependency_nodes: u64,
    pub audit_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub key: Vec<u8>,
    pub valid: bool,
    pub reason: Option<String>,
}
