//! C8 orchestrator: wires `AccessPattern` bookkeeping to the forecasters in
//! `forecaster.rs` and exposes the `record_access` / `train` / `predict` /
//! `auto_warm` / `export_model` / `import_model` contract from spec §4.8.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::compression::CompressionCodec;
use crate::error::{CacheError, Result};
use crate::predictive::forecaster::{KeyModel, ModelType, MIN_TRAINING_SAMPLES};
use crate::predictive::types::{AccessPattern, Prediction, TrainMetrics};

/// Global access log cap; halved (oldest half dropped) once exceeded
/// rather than evicted one at a time, matching spec §4.8's "halve when
/// exceeded" rule.
const GLOBAL_LOG_CAP: usize = 100_000;
/// Per-key timestamp series cap; older entries are dropped once exceeded.
const PER_KEY_SERIES_CAP: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmStrategy {
    Aggressive,
    Conservative,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Binary,
}

#[derive(Serialize, Deserialize)]
struct ExportedState {
    series: HashMap<Vec<u8>, Vec<u64>>,
    models: HashMap<Vec<u8>, KeyModel>,
}

pub struct PredictiveCache {
    series: DashMap<Vec<u8>, VecDeque<u64>>,
    models: DashMap<Vec<u8>, KeyModel>,
    global_log: Mutex<VecDeque<AccessPattern>>,
    codec: Arc<CompressionCodec>,
    seed: u64,
}

impl PredictiveCache {
    pub fn new(seed: u64) -> Self {
        Self {
            series: DashMap::new(),
            models: DashMap::new(),
            global_log: Mutex::new(VecDeque::new()),
            codec: Arc::new(CompressionCodec::new()),
            seed,
        }
    }

    pub fn record_access(&self, key: Vec<u8>, timestamp: u64) {
        {
            let mut series = self.series.entry(key.clone()).or_insert_with(VecDeque::new);
            series.push_back(timestamp);
            while series.len() > PER_KEY_SERIES_CAP {
                series.pop_front();
            }
        }
        let mut log = self.global_log.lock();
        log.push_back(AccessPattern { key, timestamp, hit_count: 1, metadata: HashMap::new() });
        if log.len() > GLOBAL_LOG_CAP {
            let half = log.len() / 2;
            for _ in 0..half {
                log.pop_front();
            }
        }
    }

    fn intervals_for(&self, key: &[u8]) -> Option<Vec<f64>> {
        let series = self.series.get(key)?;
        if series.len() < 2 {
            return None;
        }
        Some(series.iter().collect::<Vec<_>>().windows(2).map(|w| (*w[1] as f64 - *w[0] as f64).max(0.0)).collect())
    }

    /// Fit per-key forecasters. `train_data` overrides the recorded access
    /// series for specific keys (useful for seeding known-good histories in
    /// tests or cold-start imports); keys with fewer than
    /// `MIN_TRAINING_SAMPLES` intervals are skipped, not errored — the
    /// overall call only fails with `InsufficientData` if *no* key
    /// qualifies at all.
    pub fn train(
        &self,
        train_data: Option<HashMap<Vec<u8>, Vec<f64>>>,
        model_type: ModelType,
        epochs: u32,
        learning_rate: f64,
    ) -> Result<TrainMetrics> {
        let mut metrics = TrainMetrics { epochs, ..Default::default() };

        let keys: Vec<Vec<u8>> = match &train_data {
            Some(data) => data.keys().cloned().collect(),
            None => self.series.iter().map(|e| e.key().clone()).collect(),
        };

        for key in keys {
            let series = match &train_data {
                Some(data) => data.get(&key).cloned(),
                None => self.intervals_for(&key),
            };
            let Some(series) = series else {
                metrics.keys_skipped_insufficient_data += 1;
                continue;
            };
            if series.len() < MIN_TRAINING_SAMPLES {
                metrics.keys_skipped_insufficient_data += 1;
                continue;
            }
            match KeyModel::fit(&series, model_type, epochs, learning_rate, self.seed) {
                Ok(model) => {
                    self.models.insert(key, model);
                    metrics.keys_trained += 1;
                }
                Err(_) => metrics.keys_skipped_insufficient_data += 1,
            }
        }

        if metrics.keys_trained == 0 {
            return Err(CacheError::InsufficientData { required: MIN_TRAINING_SAMPLES, got: 0 });
        }
        Ok(metrics)
    }

    /// Predict keys likely to be accessed again within `horizon_seconds`.
    pub fn predict(&self, horizon_seconds: f64, min_confidence: f64, max_predictions: usize) -> Vec<Prediction> {
        let mut predictions: Vec<Prediction> = self
            .models
            .iter()
            .filter_map(|entry| {
                let key = entry.key().clone();
                let series = self.intervals_for(&key)?;
                let forecast = entry.value().forecast(&series, horizon_seconds);
                if forecast.confidence >= min_confidence {
                    Some(Prediction { key, probability: forecast.probability, confidence: forecast.confidence })
                } else {
                    None
                }
            })
            .collect();

        predictions.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap_or(std::cmp::Ordering::Equal));
        predictions.truncate(max_predictions);
        predictions
    }

    /// Run `predict`, then return the subset of predicted keys not already
    /// present in the cache, per `is_cached`. Actually triggering a warm
    /// read is handler-specific and out of this component's scope — this
    /// is the advisory list a caller acts on.
    pub fn auto_warm(
        &self,
        strategy: WarmStrategy,
        batch_size: usize,
        horizon_seconds: f64,
        min_confidence: f64,
        is_cached: impl Fn(&[u8]) -> bool,
    ) -> Vec<Prediction> {
        let effective_confidence = match strategy {
            WarmStrategy::Aggressive => min_confidence * 0.7,
            WarmStrategy::Conservative => (min_confidence * 1.3).min(1.0),
            WarmStrategy::Adaptive => min_confidence,
        };
        self.predict(horizon_seconds, effective_confidence, batch_size)
            .into_iter()
            .filter(|p| !is_cached(&p.key))
            .collect()
    }

    pub fn export_model(&self, format: ExportFormat, compress: bool) -> Result<Vec<u8>> {
        let state = ExportedState {
            series: self.series.iter().map(|e| (e.key().clone(), e.value().iter().cloned().collect())).collect(),
            models: self.models.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
        };
        let raw = match format {
            ExportFormat::Json => serde_json::to_vec(&state)
                .map_err(|e| CacheError::internal(format!("export serialize failed: {e}")))?,
            ExportFormat::Binary => bincode::serialize(&state)?,
        };
        if compress {
            Ok(self.codec.compress(&raw, None)?.compressed)
        } else {
            Ok(raw)
        }
    }

    pub fn import_model(&self, bytes: &[u8], format: ExportFormat, compressed: bool) -> Result<()> {
        let raw = if compressed { self.codec.decompress(bytes)? } else { bytes.to_vec() };
        let state: ExportedState = match format {
            ExportFormat::Json => serde_json::from_slice(&raw)
                .map_err(|e| CacheError::internal(format!("import parse failed: {e}")))?,
            ExportFormat::Binary => bincode::deserialize(&raw)?,
        };
        self.series.clear();
        for (key, timestamps) in state.series {
            self.series.insert(key, timestamps.into_iter().collect());
        }
        self.models.clear();
        for (key, model) in state.models {
            self.models.insert(key, model);
        }
        Ok(())
    }

    pub fn global_log_len(&self) -> usize {
        self.global_log.lock().len()
    }

    /// `exportModel(path, format, compress?)` (spec §4.8): serialize the
    /// full model state (including access history) to a file on disk.
    pub fn export_model_to_file(&self, path: impl AsRef<std::path::Path>, format: ExportFormat, compress: bool) -> Result<()> {
        let bytes = self.export_model(format, compress)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// `importModel(path, format)` (spec §4.8): the counterpart round-trip.
    /// Compression is auto-detected the same way it was written: callers
    /// pass the same `compress` flag they exported with via `compressed`.
    pub fn import_model_from_file(&self, path: impl AsRef<std::path::Path>, format: ExportFormat, compressed: bool) -> Result<()> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| CacheError::unavailable("predictive-cache", format!("cannot read {:?}: {e}", path.as_ref())))?;
        self.import_model(&bytes, format, compressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_series(key: &[u8], cache: &PredictiveCache, count: usize, interval: u64) {
        for i in 0..count {
            cache.record_access(key.to_vec(), (i as u64) * interval);
        }
    }

    #[test]
    fn record_access_accumulates_per_key_series() {
        let cache = PredictiveCache::new(1);
        seeded_series(b"k1", &cache, 15, 10);
        assert!(cache.intervals_for(b"k1").is_some());
        assert_eq!(cache.global_log_len(), 15);
    }

    #[test]
    fn train_with_insufficient_samples_everywhere_fails() {
        let cache = PredictiveCache::new(1);
        seeded_series(b"k1", &cache, 3, 10);
        let err = cache.train(None, ModelType::Hybrid, 5, 0.05).unwrap_err();
        assert!(matches!(err, CacheError::InsufficientData { .. }));
    }

    #[test]
    fn train_and_predict_round_trip() {
        let cache = PredictiveCache::new(7);
        seeded_series(b"k1", &cache, 20, 30);
        let metrics = cache.train(None, ModelType::Hybrid, 10, 0.05).unwrap();
        assert_eq!(metrics.keys_trained, 1);

        let predictions = cache.predict(60.0, 0.0, 10);
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].key, b"k1");
    }

    #[test]
    fn predict_filters_by_min_confidence() {
        let cache = PredictiveCache::new(7);
        seeded_series(b"k1", &cache, 20, 30);
        cache.train(None, ModelType::Hybrid, 10, 0.05).unwrap();
        let predictions = cache.predict(60.0, 1.1, 10);
        assert!(predictions.is_empty());
    }

    #[test]
    fn auto_warm_excludes_already_cached_keys() {
        let cache = PredictiveCache::new(7);
        seeded_series(b"k1", &cache, 20, 30);
        cache.train(None, ModelType::Hybrid, 10, 0.05).unwrap();
        let warmed = cache.auto_warm(WarmStrategy::Adaptive, 10, 60.0, 0.0, |_| true);
        assert!(warmed.is_empty());
    }

    #[test]
    fn export_then_import_restores_models_and_series() {
        let cache = PredictiveCache::new(7);
        seeded_series(b"k1", &cache, 20, 30);
        cache.train(None, ModelType::Hybrid, 10, 0.05).unwrap();
        let exported = cache.export_model(ExportFormat::Json, false).unwrap();

        let restored = PredictiveCache::new(7);
        restored.import_model(&exported, ExportFormat::Json, false).unwrap();
        let predictions = restored.predict(60.0, 0.0, 10);
        assert_eq!(predictions.len(), 1);
    }

    #[test]
    fn export_then_import_round_trips_when_compressed() {
        let cache = PredictiveCache::new(3);
        seeded_series(b"k1", &cache, 20, 30);
        cache.train(None, ModelType::Arima, 5, 0.05).unwrap();
        let exported = cache.export_model(ExportFormat::Binary, true).unwrap();

        let restored = PredictiveCache::new(3);
        restored.import_model(&exported, ExportFormat::Binary, true).unwrap();
        assert_eq!(restored.predict(60.0, 0.0, 10).len(), 1);
    }

    #[test]
    fn export_to_file_then_import_from_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let cache = PredictiveCache::new(9);
        seeded_series(b"k1", &cache, 20, 30);
        cache.train(None, ModelType::Hybrid, 10, 0.05).unwrap();
        cache.export_model_to_file(&path, ExportFormat::Binary, true).unwrap();

        let restored = PredictiveCache::new(9);
        restored.import_model_from_file(&path, ExportFormat::Binary, true).unwrap();
        assert_eq!(restored.predict(60.0, 0.0, 10).len(), 1);
    }
}
