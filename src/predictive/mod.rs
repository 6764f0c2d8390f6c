//! C8 — Predictive Cache (spec §4.8).
//!
//! A pure advisory layer that never blocks a read: it records accesses,
//! fits small per-key forecasters, and predicts which keys are likely to
//! be touched again within a horizon. The forecasting math itself is
//! intentionally loosely specified by the reference; this module fixes
//! only the interface and the ensemble-averaging rule.

pub mod cache;
pub mod forecaster;
pub mod types;

pub use cache::PredictiveCache;
pub use forecaster::ModelType;
pub use types::{AccessPattern, Prediction, TrainMetrics};
