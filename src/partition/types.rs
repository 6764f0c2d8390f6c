//! Data types for the Cache Partition Router (spec §3, §4.10).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionStatus {
    Active,
    Migrating,
    Draining,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub id: String,
    pub strategy: String,
    pub status: PartitionStatus,
    pub key_count: u64,
    pub memory_usage: u64,
    pub virtual_node_hashes: Vec<u32>,
    pub created_at: u64,
    pub last_accessed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetDistribution {
    Even,
    Weighted,
    CapacityBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub source: String,
    pub target: String,
    pub key_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartitionStats {
    pub partition_count: u64,
    pub total_keys: u64,
    pub load_coefficient_of_variation: f64,
    pub hot_partitions: Vec<String>,
}
