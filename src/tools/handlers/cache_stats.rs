//! `cache_stats` handler — surfaces C4's `CacheStats` and C3's aggregate
//! views in one call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::CacheEngine;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::tools::core::{Tool, ToolContext, ToolResult};

pub struct CacheStatsTool {
    engine: Arc<CacheEngine>,
    metrics: Arc<MetricsCollector>,
}

impl CacheStatsTool {
    pub fn new(engine: Arc<CacheEngine>, metrics: Arc<MetricsCollector>) -> Self {
        Self { engine, metrics }
    }
}

#[async_trait]
impl Tool for CacheStatsTool {
    fn name(&self) -> &str {
        "cache_stats"
    }

    fn description(&self) -> &str {
        "Reports cache engine stats plus recent-operation aggregates"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sinceTimestamp": {"type": "integer", "minimum": 0},
            },
            "required": [],
        })
    }

    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let since = args.get("sinceTimestamp").and_then(Value::as_u64);
        let stats = self.engine.get_stats()?;
        let cache_stats = self.metrics.get_cache_stats(since);
        let percentiles = self.metrics.get_performance_percentiles(since);

        Ok(ToolResult::success(json!({
            "engine": stats,
            "operations": cache_stats,
            "percentiles": percentiles,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_zeroed_stats_on_an_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let metrics = Arc::new(MetricsCollector::new(1000));
        let tool = CacheStatsTool::new(engine, metrics);
        let ctx = ToolContext::new(None);
        let result = tool.execute(json!({}), &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["engine"]["total_entries"], 0);
    }
}
