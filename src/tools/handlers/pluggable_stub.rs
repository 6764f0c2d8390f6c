//! Demonstrates the pluggable-handler contract for "smart tool" bodies
//! spec §1 explicitly excludes (SQL analyzer, HTTP fetcher, Git log
//! reader, etc.) — this crate fixes only the `Tool` contract they obey,
//! not their implementations. Registered lazily so an unimplemented
//! handler never blocks startup; invoking one surfaces `Unavailable`
//! rather than crashing the dispatcher (spec §4.11, §7).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CacheError, Result};
use crate::tools::core::{Tool, ToolContext, ToolResult};

pub struct UnimplementedSmartTool {
    tool_name: String,
}

impl UnimplementedSmartTool {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self { tool_name: tool_name.into() }
    }
}

#[async_trait]
impl Tool for UnimplementedSmartTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        "Pluggable handler body not provided by this deployment"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _args: Value, _context: &ToolContext) -> Result<ToolResult> {
        Err(CacheError::unavailable(&self.tool_name, "handler body not implemented by this deployment"))
    }
}
