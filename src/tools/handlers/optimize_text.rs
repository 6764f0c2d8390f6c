//! `optimize_text` handler — the front door to Optimization Admission (C5),
//! grounded on the teacher's `simple_read_file.rs` shape but wrapping C5
//! instead of raw filesystem reads.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::{AdmissionDecision, OptimizationAdmission, MAX_KEY_BYTES};
use crate::error::{CacheError, Result};
use crate::tools::core::{Tool, ToolContext, ToolResult};

pub struct OptimizeTextTool {
    admission: Arc<OptimizationAdmission>,
}

impl OptimizeTextTool {
    pub fn new(admission: Arc<OptimizationAdmission>) -> Self {
        Self { admission }
    }
}

#[async_trait]
impl Tool for OptimizeTextTool {
    fn name(&self) -> &str {
        "optimize_text"
    }

    fn description(&self) -> &str {
        "Admits text into the cache under a caller-chosen key, compressing it only when doing so saves tokens"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "Plaintext to admit"},
                "key": {"type": "string", "description": "Cache key to store under"},
                "quality": {"type": "integer", "minimum": 0, "maximum": 11, "description": "Brotli quality override"},
            },
            "required": ["text", "key"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let text = args["text"].as_str().ok_or_else(|| CacheError::invalid_argument("text must be a string"))?;
        let key = args["key"].as_str().ok_or_else(|| CacheError::invalid_argument("key must be a string"))?;
        if key.len() > MAX_KEY_BYTES {
            return Err(CacheError::invalid_argument(format!("key exceeds {MAX_KEY_BYTES} bytes")));
        }
        let quality = args.get("quality").and_then(Value::as_u64).map(|q| q as u32);

        let result = self.admission.optimize_with_key_and_quality(key.as_bytes().to_vec(), text, quality)?;

        let (compression_skipped, compression_used, reason) = match result.decision {
            AdmissionDecision::StoredRaw if (text.len() as u64) < 500 => (true, false, "input too small to benefit from compression"),
            AdmissionDecision::StoredRaw => (false, false, "compression would increase tokens, stored uncompressed"),
            AdmissionDecision::StoredCompressed => (false, true, "compression reduced token count"),
        };
        let tokens_saved = result.original_tokens.saturating_sub(result.stored_tokens);

        Ok(ToolResult::success(json!({
            "key": key,
            "compressionSkipped": compression_skipped,
            "compressionUsed": compression_used,
            "reason": reason,
            "tokensSaved": tokens_saved,
            "originalTokens": result.original_tokens,
            "storedTokens": result.stored_tokens,
            "originalSize": result.original_size,
            "storedSize": result.stored_size,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::engine::CacheEngine;
    use crate::compression::CompressionCodec;
    use crate::token_counter::TokenCounter;
    use std::time::Duration;

    fn tool() -> OptimizeTextTool {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let codec = Arc::new(CompressionCodec::new());
        let tokens = Arc::new(TokenCounter::new(100, Duration::from_secs(60)).unwrap());
        OptimizeTextTool::new(Arc::new(OptimizationAdmission::new(engine, codec, tokens, 500, 11)))
    }

    #[tokio::test]
    async fn small_input_reports_compression_skipped() {
        let tool = tool();
        let ctx = ToolContext::new(None);
        let result = tool.execute(json!({"text": "foo", "key": "k1"}), &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["compressionSkipped"], true);
        assert_eq!(result.data["tokensSaved"], 0);
    }

    #[tokio::test]
    async fn compressible_input_reports_tokens_saved() {
        let tool = tool();
        let ctx = ToolContext::new(None);
        let big = "a".repeat(10_000);
        let result = tool.execute(json!({"text": big, "key": "k2"}), &ctx).await.unwrap();
        assert_eq!(result.data["compressionUsed"], true);
        assert!(result.data["tokensSaved"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn oversized_key_is_rejected() {
        let tool = tool();
        let ctx = ToolContext::new(None);
        let key = "k".repeat(600);
        let err = tool.execute(json!({"text": "foo", "key": key}), &ctx).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
    }
}
