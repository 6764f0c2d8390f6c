//! C11 — Tool Handler Registry (spec §4.11).
//!
//! `DashMap<String, Arc<dyn Tool>>` for concurrent lookup, `async fn
//! dispatch`/`list_tools` — carried forward from the teacher's
//! `mcp_tools/tool_registry.rs`. Two additions the teacher's registry
//! didn't need: lazy handler loading (a factory is registered up front;
//! the handler itself is only constructed on first invocation) and
//! per-handler result caching routed through C5 so the admission
//! invariant still applies to cached tool results.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::admission::OptimizationAdmission;
use crate::error::{CacheError, Result};
use crate::metrics::{MetricsCollector, OperationRecord};
use crate::token_counter::TokenCounter;
use crate::tools::core::{Tool, ToolContext, ToolResult};
use crate::tools::schema;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

type ToolFactory = Box<dyn Fn() -> Result<Arc<dyn Tool>> + Send + Sync>;

struct ToolMetadata {
    description: String,
    input_schema: Value,
}

/// Wire-shaped summary for `list_tools` (spec §4.12): `{name, description,
/// inputSchema}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Default, Clone)]
pub struct HandlerExecutionStats {
    pub count: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub total_duration: Duration,
}

impl HandlerExecutionStats {
    pub fn average_duration(&self) -> Duration {
        if self.count == 0 { Duration::ZERO } else { self.total_duration / self.count as u32 }
    }
}

/// C11: name → handler table, with validation, lazy resolution, and
/// per-handler result caching through C5.
pub struct ToolRegistry {
    factories: DashMap<String, ToolFactory>,
    resolved: DashMap<String, Arc<dyn Tool>>,
    metadata: DashMap<String, ToolMetadata>,
    admission: Arc<OptimizationAdmission>,
    tokens: Arc<TokenCounter>,
    metrics: Arc<MetricsCollector>,
    default_cache_ttl: Duration,
    stats: DashMap<String, Mutex<HandlerExecutionStats>>,
    call_count: AtomicU64,
}

impl ToolRegistry {
    pub fn new(admission: Arc<OptimizationAdmission>, tokens: Arc<TokenCounter>, metrics: Arc<MetricsCollector>, default_cache_ttl: Duration) -> Self {
        Self {
            factories: DashMap::new(),
            resolved: DashMap::new(),
            metadata: DashMap::new(),
            admission,
            tokens,
            metrics,
            default_cache_ttl,
            stats: DashMap::new(),
            call_count: AtomicU64::new(0),
        }
    }

    /// Eagerly register an already-constructed handler.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.metadata.insert(name.clone(), ToolMetadata { description: tool.description().to_string(), input_schema: tool.input_schema() });
        self.resolved.insert(name, tool);
    }

    /// Register a handler whose implementation is only constructed on
    /// first `dispatch` (spec §4.11: "handler loading is lazy").
    pub fn register_lazy<F>(&self, name: &str, description: &str, input_schema: Value, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Tool>> + Send + Sync + 'static,
    {
        self.metadata.insert(name.to_string(), ToolMetadata { description: description.to_string(), input_schema });
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn unregister(&self, name: &str) {
        self.metadata.remove(name);
        self.resolved.remove(name);
        self.factories.remove(name);
        self.stats.remove(name);
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.metadata
            .iter()
            .map(|e| ToolInfo { name: e.key().clone(), description: e.value().description.clone(), input_schema: e.value().input_schema.clone() })
            .collect()
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        if let Some(tool) = self.resolved.get(name) {
            return Ok(tool.clone());
        }
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CacheError::not_found(format!("tool {name}")))?;
        let tool = factory().map_err(|e| CacheError::unavailable(name, e.to_string()))?;
        drop(factory);
        self.resolved.insert(name.to_string(), tool.clone());
        Ok(tool)
    }

    fn canonical_key(name: &str, args: &Value) -> Vec<u8> {
        let canonical = canonicalize(args);
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"token-cache-core:tool-result:v1");
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(canonical.as_bytes());
        hasher.finalize().as_bytes().to_vec()
    }

    fn record_stats(&self, name: &str, elapsed: Duration, success: bool, cache_hit: bool) {
        let mut entry = self.stats.entry(name.to_string()).or_insert_with(|| Mutex::new(HandlerExecutionStats::default()));
        let mut guard = entry.lock();
        guard.count += 1;
        guard.total_duration += elapsed;
        if !success {
            guard.errors += 1;
        }
        if cache_hit {
            guard.cache_hits += 1;
        }
    }

    pub fn handler_stats(&self, name: &str) -> Option<HandlerExecutionStats> {
        self.stats.get(name).map(|e| e.lock().clone())
    }

    pub fn total_calls(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Validate, (maybe) serve from the per-handler result cache, execute,
    /// and emit one [`OperationRecord`] to C3. Never returns `Err` — every
    /// failure mode (unknown tool, validation failure, handler error)
    /// becomes a `ToolResult::error`, per spec §4.12/§7's "dispatcher
    /// never propagates a handler error as a protocol-level error".
    pub async fn dispatch(&self, name: &str, mut args: Value, context: &ToolContext) -> ToolResult {
        let start = Instant::now();
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let tool = match self.resolve(name) {
            Ok(t) => t,
            Err(e) => {
                self.record_stats(name, start.elapsed(), false, false);
                self.emit_record(name, start.elapsed(), false, false, &args, None);
                return ToolResult::error(e.to_string());
            }
        };

        schema::apply_defaults(&tool.input_schema(), &mut args);

        if let Err(e) = tool.validate(&args).await {
            self.record_stats(name, start.elapsed(), false, false);
            self.emit_record(name, start.elapsed(), false, false, &args, None);
            return ToolResult::error(e.to_string());
        }

        let cache_key = tool.cacheable().then(|| Self::canonical_key(name, &args));

        if let Some(key) = &cache_key {
            if let Ok(Some(cached)) = self.admission.fetch(key) {
                if let Ok(mut result) = serde_json::from_slice::<ToolResult>(&cached) {
                    let saved_tokens = self.tokens.count(&String::from_utf8_lossy(&cached)).tokens;
                    result.cached_tokens = saved_tokens;
                    self.record_stats(name, start.elapsed(), true, true);
                    self.emit_record(name, start.elapsed(), true, true, &args, Some(saved_tokens));
                    return result;
                }
            }
        }

        let result = match tool.execute(args.clone(), context).await {
            Ok(r) => r,
            Err(e) => ToolResult::error(e.to_string()),
        };

        if let (Some(key), true) = (&cache_key, result.success) {
            if let Ok(serialized) = serde_json::to_string(&result) {
                let ttl = tool.cache_ttl().unwrap_or(self.default_cache_ttl);
                let _ = ttl; // TTL enforcement lives in CacheEngine eviction/age checks; recorded for future use.
                let _ = self.admission.optimize_with_key(key.clone(), &serialized);
            }
        }

        self.record_stats(name, start.elapsed(), result.success, false);
        self.emit_record(name, start.elapsed(), result.success, false, &args, None);
        result
    }

    fn emit_record(&self, name: &str, elapsed: Duration, success: bool, cache_hit: bool, args: &Value, cached_tokens: Option<usize>) {
        let input_tokens = self.tokens.count(&args.to_string()).tokens as u64;
        let cached_tokens = cached_tokens.unwrap_or(0) as u64;
        self.metrics.record(OperationRecord {
            timestamp: now_ms(),
            operation: name.to_string(),
            duration_ms: elapsed.as_millis() as u64,
            success,
            cache_hit,
            input_tokens,
            output_tokens: 0,
            cached_tokens,
            saved_tokens: cached_tokens,
            metadata: std::collections::HashMap::new(),
        });
    }
}

/// Stable re-serialization with sorted object keys (spec §9: "a stable
/// serialization of the input ... hashed to a fixed-length digest").
fn canonicalize(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serde_json::Map::new();
                for (k, v) in entries {
                    out.insert(k.clone(), sort(v));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::engine::CacheEngine;
    use crate::compression::CompressionCodec;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    struct EchoTool {
        calls: Arc<AtomicU32>,
        cacheable: bool,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        fn cacheable(&self) -> bool {
            self.cacheable
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::success(json!({"echo": args["text"]})))
        }
    }

    fn registry() -> (ToolRegistry, Arc<AtomicU32>) {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let codec = Arc::new(CompressionCodec::new());
        let tokens = Arc::new(TokenCounter::new(100, Duration::from_secs(60)).unwrap());
        let admission = Arc::new(OptimizationAdmission::new(engine, codec, tokens.clone(), 500, 11));
        let metrics = Arc::new(MetricsCollector::new(1000));
        let calls = Arc::new(AtomicU32::new(0));
        let reg = ToolRegistry::new(admission, tokens, metrics, Duration::from_secs(300));
        reg.register(Arc::new(EchoTool { calls: calls.clone(), cacheable: false }));
        (reg, calls)
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result_not_a_panic() {
        let (reg, _) = registry();
        let ctx = ToolContext::new(None);
        let result = reg.dispatch("nope", json!({}), &ctx).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn missing_required_arg_is_rejected_before_execute() {
        let (reg, calls) = registry();
        let ctx = ToolContext::new(None);
        let result = reg.dispatch("echo", json!({}), &ctx).await;
        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_call_executes_and_returns_data() {
        let (reg, calls) = registry();
        let ctx = ToolContext::new(None);
        let result = reg.dispatch("echo", json!({"text": "hi"}), &ctx).await;
        assert!(result.success);
        assert_eq!(result.data["echo"], "hi");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cacheable_handler_is_only_executed_once_for_the_same_args() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let codec = Arc::new(CompressionCodec::new());
        let tokens = Arc::new(TokenCounter::new(100, Duration::from_secs(60)).unwrap());
        let admission = Arc::new(OptimizationAdmission::new(engine, codec, tokens.clone(), 500, 11));
        let metrics = Arc::new(MetricsCollector::new(1000));
        let calls = Arc::new(AtomicU32::new(0));
        let reg = ToolRegistry::new(admission, tokens, metrics, Duration::from_secs(300));
        reg.register(Arc::new(EchoTool { calls: calls.clone(), cacheable: true }));

        let ctx = ToolContext::new(None);
        let first = reg.dispatch("echo", json!({"text": "hi"}), &ctx).await;
        let second = reg.dispatch("echo", json!({"text": "hi"}), &ctx).await;
        assert!(first.success && second.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lazy_handler_is_not_constructed_until_first_dispatch() {
        let (reg, _) = registry();
        let constructed = Arc::new(AtomicU32::new(0));
        let constructed_clone = constructed.clone();
        reg.register_lazy("lazy-echo", "lazily built", json!({"type": "object", "properties": {}}), move || {
            constructed_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoTool { calls: Arc::new(AtomicU32::new(0)), cacheable: false }) as Arc<dyn Tool>)
        });
        assert_eq!(constructed.load(Ordering::SeqCst), 0);
        let ctx = ToolContext::new(None);
        let _ = reg.dispatch("lazy-echo", json!({"text": "hi"}), &ctx).await;
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn canonicalize_is_order_independent() {
        let a = canonicalize(&json!({"b": 1, "a": 2}));
        let b = canonicalize(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
    }
}
