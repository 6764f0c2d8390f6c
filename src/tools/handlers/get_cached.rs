//! `get_cached` handler — reconstitutes plaintext previously admitted by
//! `optimize_text`, transparently decompressing through C5.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::OptimizationAdmission;
use crate::error::{CacheError, Result};
use crate::tools::core::{Tool, ToolContext, ToolResult};

pub struct GetCachedTool {
    admission: Arc<OptimizationAdmission>,
}

impl GetCachedTool {
    pub fn new(admission: Arc<OptimizationAdmission>) -> Self {
        Self { admission }
    }
}

#[async_trait]
impl Tool for GetCachedTool {
    fn name(&self) -> &str {
        "get_cached"
    }

    fn description(&self) -> &str {
        "Fetches plaintext previously admitted under a key via optimize_text"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"key": {"type": "string"}},
            "required": ["key"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let key = args["key"].as_str().ok_or_else(|| CacheError::invalid_argument("key must be a string"))?;
        match self.admission.fetch(key.as_bytes())? {
            Some(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                Ok(ToolResult::success(json!({"key": key, "text": text, "hit": true})))
            }
            None => Ok(ToolResult::success(json!({"key": key, "hit": false}))),
        }
    }
}
