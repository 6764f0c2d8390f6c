//! `optimize_session` handler — thin wrapper around C7's
//! `SessionOptimizer`, which is itself "a handler in its own right" per
//! spec §4.7/§3's data-flow note.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::session::optimizer::SessionOptimizer;
use crate::tools::core::{Tool, ToolContext, ToolResult};

pub struct SessionOptimizeTool {
    optimizer: Arc<SessionOptimizer>,
}

impl SessionOptimizeTool {
    pub fn new(optimizer: Arc<SessionOptimizer>) -> Self {
        Self { optimizer }
    }
}

#[async_trait]
impl Tool for SessionOptimizeTool {
    fn name(&self) -> &str {
        "optimize_session"
    }

    fn description(&self) -> &str {
        "Replays a session's file-touching operations through the cache, reporting tokens saved and rejected paths"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sessionId": {"type": "string", "description": "Defaults to the current-session pointer when omitted"},
                "minTokenThreshold": {"type": "integer", "minimum": 0, "default": 30},
            },
            "required": [],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let session_id = args.get("sessionId").and_then(Value::as_str);
        let min_token_threshold = args.get("minTokenThreshold").and_then(Value::as_u64);
        let summary = self.optimizer.optimize_session(session_id, min_token_threshold)?;
        Ok(ToolResult::success(serde_json::to_value(summary).unwrap_or(Value::Null)))
    }
}
