//! C12 — Request Dispatcher (spec §4.12, §6).
//!
//! Reads newline-delimited JSON-RPC 2.0 requests from an async reader and
//! writes replies to an async writer, using
//! `tokio::io::{BufReader, AsyncBufReadExt, AsyncWriteExt}` — the stdio
//! loop the teacher's `bin/ipc_server_main.rs` sets up for its Unix-socket
//! `IpcServer`, adapted here to a framing-agnostic stream (spec.md's
//! Non-goals fix only the transport framing, not this loop's shape).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::tools::{ToolContext, ToolRegistry, ToolResult};

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Serialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(JsonRpcErrorBody { code, message: message.into() }) }
    }
}

/// Uniform `call_tool` reply envelope (spec §4.12, §6):
/// `{content: [{type: "text", text}], isError?: bool}`.
fn envelope(result: &ToolResult) -> Value {
    let text = serde_json::to_string(&result.data).unwrap_or_else(|_| "null".to_string());
    let mut payload = serde_json::json!({
        "content": [{"type": "text", "text": if result.success { text } else { result.error.clone().unwrap_or_default() }}],
    });
    if !result.success {
        payload["isError"] = Value::Bool(true);
    }
    payload
}

/// C12: owns the registry, enforces per-call deadlines, and frames
/// JSON-RPC over whatever reader/writer the caller supplies.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    call_deadline: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, call_deadline: Duration) -> Self {
        Self { registry, call_deadline }
    }

    /// Handle one already-parsed request; exposed separately from
    /// `run` so tests and alternative transports (e.g. a future Unix
    /// socket framing) don't have to round-trip through line framing.
    pub async fn handle(&self, request_json: &str) -> String {
        let parsed: Result<JsonRpcRequest, _> = serde_json::from_str(request_json);
        let response = match parsed {
            Err(e) => JsonRpcResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {e}")),
            Ok(request) => self.handle_request(request).await,
        };
        serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal serialization failure"}}"#.to_string()
        })
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "list_tools" => {
                let tools = self.registry.list_tools();
                JsonRpcResponse::ok(request.id, serde_json::json!({"tools": tools}))
            }
            "call_tool" => self.handle_call_tool(request).await,
            other => JsonRpcResponse::err(request.id, METHOD_NOT_FOUND, format!("unknown method: {other}")),
        }
    }

    async fn handle_call_tool(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let Some(name) = request.params.get("name").and_then(Value::as_str).map(str::to_string) else {
            return JsonRpcResponse::err(request.id, INVALID_PARAMS, "call_tool requires a string 'name'");
        };
        let arguments = request.params.get("arguments").cloned().unwrap_or(Value::Object(Default::default()));

        let context = ToolContext::new(None);
        let outcome = tokio::time::timeout(self.call_deadline, self.registry.dispatch(&name, arguments, &context)).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %name, deadline_ms = self.call_deadline.as_millis(), "call_tool exceeded its deadline");
                ToolResult::error(format!("deadline of {}ms exceeded for tool {name}", self.call_deadline.as_millis()))
            }
        };

        JsonRpcResponse::ok(request.id, envelope(&result))
    }

    /// Runs the newline-delimited read/dispatch/write loop until EOF.
    /// Never returns `Err` for a malformed individual request — only a
    /// broken pipe on the writer side propagates.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            debug!(request = %line, "dispatcher received request");
            let response = self.handle(&line).await;
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::admission::OptimizationAdmission;
    use crate::cache::engine::CacheEngine;
    use crate::compression::CompressionCodec;
    use crate::metrics::MetricsCollector;
    use crate::token_counter::TokenCounter;
    use crate::tools::handlers::get_cached::GetCachedTool;
    use crate::tools::handlers::optimize_text::OptimizeTextTool;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let codec = Arc::new(CompressionCodec::new());
        let tokens = Arc::new(TokenCounter::new(100, Duration::from_secs(60)).unwrap());
        let admission = Arc::new(OptimizationAdmission::new(engine, codec, tokens.clone(), 500, 11));
        let metrics = Arc::new(MetricsCollector::new(1000));
        let registry = Arc::new(ToolRegistry::new(admission.clone(), tokens, metrics, Duration::from_secs(300)));
        registry.register(Arc::new(OptimizeTextTool::new(admission.clone())));
        registry.register(Arc::new(GetCachedTool::new(admission)));
        Dispatcher::new(registry, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn list_tools_enumerates_registered_handlers() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle(r#"{"jsonrpc":"2.0","id":1,"method":"list_tools","params":{}}"#).await;
        let parsed: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["result"]["tools"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn call_tool_round_trips_through_the_envelope() {
        let dispatcher = dispatcher();
        let request = json!({
            "jsonrpc": "2.0", "id": 1, "method": "call_tool",
            "params": {"name": "optimize_text", "arguments": {"text": "foo", "key": "k1"}},
        });
        let response = dispatcher.handle(&request.to_string()).await;
        let parsed: Value = serde_json::from_str(&response).unwrap();
        assert!(parsed["result"]["content"][0]["text"].as_str().unwrap().contains("tokensSaved"));
        assert!(parsed["result"].get("isError").is_none());
    }

    #[tokio::test]
    async fn call_tool_with_unknown_name_sets_is_error() {
        let dispatcher = dispatcher();
        let request = json!({
            "jsonrpc": "2.0", "id": 1, "method": "call_tool",
            "params": {"name": "does_not_exist", "arguments": {}},
        });
        let response = dispatcher.handle(&request.to_string()).await;
        let parsed: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["result"]["isError"], true);
    }

    #[tokio::test]
    async fn malformed_json_is_a_protocol_level_parse_error() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle("not json").await;
        let parsed: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle(r#"{"jsonrpc":"2.0","id":1,"method":"frobnicate","params":{}}"#).await;
        let parsed: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn run_processes_newline_delimited_requests_end_to_end() {
        let dispatcher = Arc::new(dispatcher());
        let (mut requests_tx, requests_rx) = tokio::io::duplex(4096);
        let (responses_tx, mut responses_rx) = tokio::io::duplex(4096);

        let run_dispatcher = dispatcher.clone();
        let run_handle = tokio::spawn(async move { run_dispatcher.run(requests_rx, responses_tx).await });

        let input = format!(
            "{}\n{}\n",
            json!({"jsonrpc":"2.0","id":1,"method":"list_tools","params":{}}),
            json!({"jsonrpc":"2.0","id":2,"method":"call_tool","params":{"name":"get_cached","arguments":{"key":"missing"}}}),
        );
        requests_tx.write_all(input.as_bytes()).await.unwrap();
        drop(requests_tx);

        let mut output = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut responses_rx, &mut output).await.unwrap();
        run_handle.await.unwrap().unwrap();

        assert_eq!(output.lines().count(), 2);
    }
}
