//! Tool trait and call-time context (spec §4.11, §4.12), carried forward
//! essentially unchanged from the teacher's `mcp_tools/core.rs` /
//! `mcp_tools/tools/simple_read_file.rs` (`async fn execute`, `async fn
//! validate`), adapted to this crate's `CacheError`/`Result` rather than
//! `anyhow`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::tools::schema;

/// Per-call context threaded through every handler invocation. Handlers
/// performing network I/O must poll `cancellation` cooperatively (spec §5).
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: Option<String>,
    pub call_started_at: Instant,
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(session_id: Option<String>) -> Self {
        Self { session_id, call_started_at: Instant::now(), cancellation: CancellationToken::new() }
    }
}

/// A handler's outcome. `isError` in the wire envelope (spec §4.12, §6) is
/// derived from `success` by the dispatcher; handlers never construct the
/// envelope themselves.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
    /// Tokens saved purely by the per-handler result cache (distinct from
    /// C5's compression savings); 0 unless this call was a cache hit.
    pub cached_tokens: usize,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self { success: true, data, error: None, cached_tokens: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, data: Value::Null, error: Some(message.into()), cached_tokens: 0 }
    }

    pub fn with_cached_tokens(mut self, cached_tokens: usize) -> Self {
        self.cached_tokens = cached_tokens;
        self
    }
}

/// A single registered capability (spec §4.11: name, schema, operation
/// function). Implementors get schema validation for free via the default
/// `validate` body; override only to add cross-field checks the restricted
/// schema subset can't express.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    /// Whether this handler's results are eligible for per-handler result
    /// caching through C5 (spec §4.11). Default: not cacheable.
    fn cacheable(&self) -> bool {
        false
    }

    /// Time-to-live override for this handler's cached results. `None`
    /// defers to the registry's configured default.
    fn cache_ttl(&self) -> Option<std::time::Duration> {
        None
    }

    async fn validate(&self, args: &Value) -> Result<()> {
        schema::validate(&self.input_schema(), args)
    }

    async fn execute(&self, args: Value, context: &ToolContext) -> Result<ToolResult>;
}

pub type SharedTool = Arc<dyn Tool>;
