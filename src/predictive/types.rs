//! Shared data types for the Predictive Cache (spec §3, §4.8).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPattern {
    pub key: Vec<u8>,
    pub timestamp: u64,
    pub hit_count: u64,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub key: Vec<u8>,
    pub probability: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrainMetrics {
    pub keys_trained: u64,
    pub keys_skipped_insufficient_data: u64,
    pub epochs: u32,
}
