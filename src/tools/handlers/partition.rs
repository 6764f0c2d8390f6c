//! Partition router handlers — C10 surfaced as `partition_stats` and
//! `route_query`. Partition lifecycle management (create/split/merge) is
//! an operational concern exercised directly against `PartitionRouter`
//! rather than through the tool surface, matching spec §4.10's framing of
//! the router as something that "optionally wraps C4 for sharded
//! deployments" rather than a caller-facing handler family in its own right.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CacheError, Result};
use crate::partition::PartitionRouter;
use crate::tools::core::{Tool, ToolContext, ToolResult};

pub struct PartitionStatsTool {
    router: Arc<PartitionRouter>,
}

impl PartitionStatsTool {
    pub fn new(router: Arc<PartitionRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Tool for PartitionStatsTool {
    fn name(&self) -> &str {
        "partition_stats"
    }

    fn description(&self) -> &str {
        "Reports per-partition key counts, load imbalance, and hot partitions"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _args: Value, _context: &ToolContext) -> Result<ToolResult> {
        Ok(ToolResult::success(json!({
            "partitions": self.router.list_partitions(),
            "stats": self.router.stats(),
        })))
    }
}

pub struct RouteQueryTool {
    router: Arc<PartitionRouter>,
}

impl RouteQueryTool {
    pub fn new(router: Arc<PartitionRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Tool for RouteQueryTool {
    fn name(&self) -> &str {
        "route_query"
    }

    fn description(&self) -> &str {
        "Returns the primary partition (and replicas) a key routes to"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "replicationFactor": {"type": "integer", "minimum": 1, "default": 1},
            },
            "required": ["key"],
        })
    }

    async fn execute(&self, args: Value, _context: &ToolContext) -> Result<ToolResult> {
        let key = args["key"].as_str().ok_or_else(|| CacheError::invalid_argument("key must be a string"))?;
        let replication_factor = args.get("replicationFactor").and_then(Value::as_u64).unwrap_or(1) as usize;
        let replicas = self.router.route_query(key.as_bytes(), replication_factor);
        Ok(ToolResult::success(json!({"partitions": replicas})))
    }
}
