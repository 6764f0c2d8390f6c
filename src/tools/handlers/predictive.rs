//! Predictive cache handlers — thin wrappers over C8, surfacing
//! `predict_access`, `train_predictive`, `auto_warm`, and the model
//! export/import round-trip as tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::OptimizationAdmission;
use crate::error::{CacheError, Result};
use crate::predictive::cache::{ExportFormat, PredictiveCache, WarmStrategy};
use crate::predictive::forecaster::ModelType;
use crate::tools::core::{Tool, ToolContext, ToolResult};

fn prediction_to_json(p: &crate::predictive::types::Prediction) -> Value {
    json!({
        "key": String::from_utf8_lossy(&p.key),
        "probability": p.probability,
        "confidence": p.confidence,
    })
}

pub struct PredictAccessTool {
    predictive: Arc<PredictiveCache>,
}

impl PredictAccessTool {
    pub fn new(predictive: Arc<PredictiveCache>) -> Self {
        Self { predictive }
    }
}

#[async_trait]
impl Tool for PredictAccessTool {
    fn name(&self) -> &str {
        "predict_access"
    }

    fn description(&self) -> &str {
        "Lists keys the predictive cache expects to be re-accessed within a time horizon"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "horizonSeconds": {"type": "number", "default": 60.0},
                "minConfidence": {"type": "number", "minimum": 0, "maximum": 1, "default": 0.0},
                "maxPredictions": {"type": "integer", "minimum": 1, "default": 10},
            },
            "required": [],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let horizon = args.get("horizonSeconds").and_then(Value::as_f64).unwrap_or(60.0);
        let min_confidence = args.get("minConfidence").and_then(Value::as_f64).unwrap_or(0.0);
        let max_predictions = args.get("maxPredictions").and_then(Value::as_u64).unwrap_or(10) as usize;

        let predictions = self.predictive.predict(horizon, min_confidence, max_predictions);
        Ok(ToolResult::success(json!({
            "predictions": predictions.iter().map(prediction_to_json).collect::<Vec<_>>(),
        })))
    }
}

pub struct AutoWarmTool {
    predictive: Arc<PredictiveCache>,
    admission: Arc<OptimizationAdmission>,
}

impl AutoWarmTool {
    pub fn new(predictive: Arc<PredictiveCache>, admission: Arc<OptimizationAdmission>) -> Self {
        Self { predictive, admission }
    }
}

#[async_trait]
impl Tool for AutoWarmTool {
    fn name(&self) -> &str {
        "auto_warm"
    }

    fn description(&self) -> &str {
        "Returns predicted-hot keys that are not yet cache-resident, for a caller to proactively warm"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "strategy": {"type": "string", "enum": ["aggressive", "conservative", "adaptive"], "default": "adaptive"},
                "batchSize": {"type": "integer", "minimum": 1, "default": 10},
                "horizonSeconds": {"type": "number", "default": 60.0},
                "minConfidence": {"type": "number", "minimum": 0, "maximum": 1, "default": 0.0},
            },
            "required": [],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let strategy = match args.get("strategy").and_then(Value::as_str).unwrap_or("adaptive") {
            "aggressive" => WarmStrategy::Aggressive,
            "conservative" => WarmStrategy::Conservative,
            _ => WarmStrategy::Adaptive,
        };
        let batch_size = args.get("batchSize").and_then(Value::as_u64).unwrap_or(10) as usize;
        let horizon = args.get("horizonSeconds").and_then(Value::as_f64).unwrap_or(60.0);
        let min_confidence = args.get("minConfidence").and_then(Value::as_f64).unwrap_or(0.0);

        let admission = self.admission.clone();
        let warmed = self.predictive.auto_warm(strategy, batch_size, horizon, min_confidence, |key| {
            admission.fetch(key).ok().flatten().is_some()
        });

        Ok(ToolResult::success(json!({
            "candidates": warmed.iter().map(prediction_to_json).collect::<Vec<_>>(),
        })))
    }
}

pub struct TrainPredictiveTool {
    predictive: Arc<PredictiveCache>,
}

impl TrainPredictiveTool {
    pub fn new(predictive: Arc<PredictiveCache>) -> Self {
        Self { predictive }
    }
}

#[async_trait]
impl Tool for TrainPredictiveTool {
    fn name(&self) -> &str {
        "train_predictive"
    }

    fn description(&self) -> &str {
        "Fits per-key forecasters over recorded access history (spec §4.8 minimum 10 samples per key)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "modelType": {"type": "string", "enum": ["arima", "exponential", "lstm", "hybrid"], "default": "hybrid"},
                "epochs": {"type": "integer", "minimum": 1, "default": 10},
                "learningRate": {"type": "number", "minimum": 0, "default": 0.05},
            },
            "required": [],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let model_type = match args.get("modelType").and_then(Value::as_str).unwrap_or("hybrid") {
            "arima" => ModelType::Arima,
            "exponential" => ModelType::Exponential,
            "lstm" => ModelType::Lstm,
            _ => ModelType::Hybrid,
        };
        let epochs = args.get("epochs").and_then(Value::as_u64).unwrap_or(10) as u32;
        let learning_rate = args.get("learningRate").and_then(Value::as_f64).unwrap_or(0.05);

        let metrics = self.predictive.train(None, model_type, epochs, learning_rate)?;
        Ok(ToolResult::success(json!({
            "keysTrained": metrics.keys_trained,
            "keysSkippedInsufficientData": metrics.keys_skipped_insufficient_data,
            "epochs": metrics.epochs,
        })))
    }
}

pub struct ExportPredictiveModelTool {
    predictive: Arc<PredictiveCache>,
}

impl ExportPredictiveModelTool {
    pub fn new(predictive: Arc<PredictiveCache>) -> Self {
        Self { predictive }
    }
}

#[async_trait]
impl Tool for ExportPredictiveModelTool {
    fn name(&self) -> &str {
        "export_predictive_model"
    }

    fn description(&self) -> &str {
        "Serializes the predictive cache's full model state and access history to a file (spec §4.8 exportModel)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "format": {"type": "string", "enum": ["json", "binary"], "default": "json"},
                "compress": {"type": "boolean", "default": false},
            },
            "required": ["path"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let path = args.get("path").and_then(Value::as_str).ok_or_else(|| CacheError::invalid_argument("path is required"))?;
        let format = match args.get("format").and_then(Value::as_str).unwrap_or("json") {
            "binary" => ExportFormat::Binary,
            _ => ExportFormat::Json,
        };
        let compress = args.get("compress").and_then(Value::as_bool).unwrap_or(false);
        self.predictive.export_model_to_file(path, format, compress)?;
        Ok(ToolResult::success(json!({"path": path})))
    }
}

pub struct ImportPredictiveModelTool {
    predictive: Arc<PredictiveCache>,
}

impl ImportPredictiveModelTool {
    pub fn new(predictive: Arc<PredictiveCache>) -> Self {
        Self { predictive }
    }
}

#[async_trait]
impl Tool for ImportPredictiveModelTool {
    fn name(&self) -> &str {
        "import_predictive_model"
    }

    fn description(&self) -> &str {
        "Restores predictive cache model state and access history from a previously exported file (spec §4.8 importModel)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "format": {"type": "string", "enum": ["json", "binary"], "default": "json"},
                "compressed": {"type": "boolean", "default": false},
            },
            "required": ["path"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let path = args.get("path").and_then(Value::as_str).ok_or_else(|| CacheError::invalid_argument("path is required"))?;
        let format = match args.get("format").and_then(Value::as_str).unwrap_or("json") {
            "binary" => ExportFormat::Binary,
            _ => ExportFormat::Json,
        };
        let compressed = args.get("compressed").and_then(Value::as_bool).unwrap_or(false);
        self.predictive.import_model_from_file(path, format, compressed)?;
        Ok(ToolResult::success(json!({"imported": true})))
    }
}
