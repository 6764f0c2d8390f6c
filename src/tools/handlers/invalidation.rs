//! Invalidation handlers — thin wrappers over C9's `InvalidationEngine`
//! exposing `invalidateKeys`, `invalidatePattern`, `invalidateTag`, and
//! `invalidateDependency` as separately schema'd tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CacheError, Result};
use crate::invalidation::engine::{InvalidationEngine, DEFAULT_MAX_CASCADE_DEPTH};
use crate::tools::core::{Tool, ToolContext, ToolResult};

pub struct InvalidateKeysTool {
    engine: Arc<InvalidationEngine>,
}

impl InvalidateKeysTool {
    pub fn new(engine: Arc<InvalidationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for InvalidateKeysTool {
    fn name(&self) -> &str {
        "invalidate_keys"
    }

    fn description(&self) -> &str {
        "Invalidates an explicit list of cache keys"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"keys": {"type": "array"}},
            "required": ["keys"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let keys: Vec<Vec<u8>> = args["keys"]
            .as_array()
            .ok_or_else(|| CacheError::invalid_argument("keys must be an array of strings"))?
            .iter()
            .map(|v| v.as_str().map(|s| s.as_bytes().to_vec()).ok_or_else(|| CacheError::invalid_argument("each key must be a string")))
            .collect::<Result<_>>()?;
        let count = self.engine.invalidate(&keys)?;
        Ok(ToolResult::success(json!({"invalidated": count})))
    }
}

pub struct InvalidatePatternTool {
    engine: Arc<InvalidationEngine>,
}

impl InvalidatePatternTool {
    pub fn new(engine: Arc<InvalidationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for InvalidatePatternTool {
    fn name(&self) -> &str {
        "invalidate_pattern"
    }

    fn description(&self) -> &str {
        "Invalidates every key matching a glob pattern ('*' any run, '?' one char)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"pattern": {"type": "string"}},
            "required": ["pattern"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let pattern = args["pattern"].as_str().ok_or_else(|| CacheError::invalid_argument("pattern must be a string"))?;
        let count = self.engine.invalidate_pattern(pattern)?;
        Ok(ToolResult::success(json!({"invalidated": count})))
    }
}

pub struct InvalidateTagTool {
    engine: Arc<InvalidationEngine>,
}

impl InvalidateTagTool {
    pub fn new(engine: Arc<InvalidationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for InvalidateTagTool {
    fn name(&self) -> &str {
        "invalidate_tag"
    }

    fn description(&self) -> &str {
        "Invalidates every key carrying any of the given tags"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"tags": {"type": "array"}},
            "required": ["tags"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let tags: Vec<String> = args["tags"]
            .as_array()
            .ok_or_else(|| CacheError::invalid_argument("tags must be an array of strings"))?
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| CacheError::invalid_argument("each tag must be a string")))
            .collect::<Result<_>>()?;
        let count = self.engine.invalidate_tag(&tags)?;
        Ok(ToolResult::success(json!({"invalidated": count})))
    }
}

pub struct InvalidateDependencyTool {
    engine: Arc<InvalidationEngine>,
}

impl InvalidateDependencyTool {
    pub fn new(engine: Arc<InvalidationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for InvalidateDependencyTool {
    fn name(&self) -> &str {
        "invalidate_dependency"
    }

    fn description(&self) -> &str {
        "Cascades invalidation from a root key through its dependency graph, bounded by cascadeDepth"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "rootKey": {"type": "string"},
                "cascadeDepth": {"type": "integer", "minimum": 0, "maximum": 64, "default": DEFAULT_MAX_CASCADE_DEPTH},
            },
            "required": ["rootKey"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let root_key = args["rootKey"].as_str().ok_or_else(|| CacheError::invalid_argument("rootKey must be a string"))?;
        let depth = args.get("cascadeDepth").and_then(Value::as_u64).map(|d| d as u32).unwrap_or(DEFAULT_MAX_CASCADE_DEPTH);
        let count = self.engine.invalidate_dependency(root_key.as_bytes(), depth)?;
        Ok(ToolResult::success(json!({"invalidated": count})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEngine;

    fn engine() -> Arc<InvalidationEngine> {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheEngine::open(dir.path(), 16 * 1024 * 1024).unwrap();
        Arc::new(InvalidationEngine::new(cache))
    }

    #[tokio::test]
    async fn invalidate_keys_reports_the_count() {
        let engine = engine();
        engine.set_dependency(b"a", &[], None);
        let tool = InvalidateKeysTool::new(engine);
        let ctx = ToolContext::new(None);
        let result = tool.execute(json!({"keys": ["a"]}), &ctx).await.unwrap();
        assert_eq!(result.data["invalidated"], 1);
    }

    #[tokio::test]
    async fn invalidate_pattern_star_matches_everything() {
        let engine = engine();
        let tool = InvalidatePatternTool::new(engine);
        let ctx = ToolContext::new(None);
        let result = tool.execute(json!({"pattern": "*"}), &ctx).await.unwrap();
        assert!(result.success);
    }
}
