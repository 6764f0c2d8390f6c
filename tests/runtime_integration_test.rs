//! End-to-end tests driving a full `Runtime` the way a real caller would:
//! through `Dispatcher::handle`, not by poking individual components.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use token_cache_core::{Config, Runtime};

fn test_config(base: &Path) -> Config {
    Config {
        cache_dir: base.join("cache"),
        sandbox_base_dir: base.to_path_buf(),
        hooks_data_dir: base.join("sessions"),
        lazy_invalidation_tick: Duration::from_millis(50),
        scheduled_invalidation_tick: Duration::from_millis(50),
        ..Config::default()
    }
}

async fn call(runtime: &Runtime, name: &str, arguments: Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "call_tool",
        "params": {"name": name, "arguments": arguments},
    });
    let response = runtime.dispatcher.handle(&request.to_string()).await;
    let parsed: Value = serde_json::from_str(&response).unwrap();
    let text = parsed["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap_or(Value::Null)
}

#[tokio::test]
async fn list_tools_reports_the_full_builtin_surface() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::init(test_config(dir.path())).unwrap();
    let request = json!({"jsonrpc": "2.0", "id": 1, "method": "list_tools", "params": {}});
    let response = runtime.dispatcher.handle(&request.to_string()).await;
    let parsed: Value = serde_json::from_str(&response).unwrap();
    let names: Vec<String> = parsed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();

    for expected in [
        "optimize_text",
        "get_cached",
        "cache_stats",
        "optimize_session",
        "invalidate_keys",
        "invalidate_pattern",
        "invalidate_tag",
        "invalidate_dependency",
        "predict_access",
        "auto_warm",
        "train_predictive",
        "export_predictive_model",
        "import_predictive_model",
        "partition_stats",
        "route_query",
        "sql_analyzer",
    ] {
        assert!(names.contains(&expected.to_string()), "missing tool {expected}");
    }
}

#[tokio::test]
async fn optimize_then_get_cached_round_trips_through_the_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::init(test_config(dir.path())).unwrap();

    let text = "the quick brown fox jumps over the lazy dog ".repeat(200);
    let optimize_out = call(&runtime, "optimize_text", json!({"text": text, "key": "doc-1"})).await;
    assert_eq!(optimize_out["compressionUsed"], true);

    let fetched = call(&runtime, "get_cached", json!({"key": "doc-1"})).await;
    assert_eq!(fetched["text"], text);
    assert_eq!(fetched["hit"], true);
}

#[tokio::test]
async fn get_cached_miss_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::init(test_config(dir.path())).unwrap();
    let request = json!({
        "jsonrpc": "2.0", "id": 1, "method": "call_tool",
        "params": {"name": "get_cached", "arguments": {"key": "nope"}},
    });
    let response = runtime.dispatcher.handle(&request.to_string()).await;
    let parsed: Value = serde_json::from_str(&response).unwrap();
    assert!(parsed["result"].get("isError").is_none());
    assert_eq!(parsed["result"]["content"][0]["text"].as_str().unwrap().contains("\"hit\":false"), true);
}

#[tokio::test]
async fn unimplemented_smart_tool_fails_gracefully_without_crashing_the_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::init(test_config(dir.path())).unwrap();
    let request = json!({
        "jsonrpc": "2.0", "id": 1, "method": "call_tool",
        "params": {"name": "sql_analyzer", "arguments": {"query": "select 1"}},
    });
    let response = runtime.dispatcher.handle(&request.to_string()).await;
    let parsed: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["result"]["isError"], true);

    // the dispatcher itself must still be usable afterward
    let followup = call(&runtime, "optimize_text", json!({"text": "still alive", "key": "k"})).await;
    assert_eq!(followup["key"], "k");
}

#[tokio::test]
async fn invalidate_keys_clears_a_previously_cached_entry() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::init(test_config(dir.path())).unwrap();
    let big = "z".repeat(5000);
    call(&runtime, "optimize_text", json!({"text": big, "key": "to-invalidate"})).await;
    assert_eq!(call(&runtime, "get_cached", json!({"key": "to-invalidate"})).await["hit"], true);

    call(&runtime, "invalidate_keys", json!({"keys": ["to-invalidate"]})).await;
    assert_eq!(call(&runtime, "get_cached", json!({"key": "to-invalidate"})).await["hit"], false);
}

#[tokio::test]
async fn session_optimize_tool_replays_a_session_log_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.hooks_data_dir).unwrap();
    std::fs::create_dir_all(&config.sandbox_base_dir).unwrap();

    let touched_file = config.sandbox_base_dir.join("notes.txt");
    std::fs::write(&touched_file, "word ".repeat(1000)).unwrap();
    std::fs::write(
        config.hooks_data_dir.join("operations-session-a.csv"),
        format!("1,file-read,999,\"{}\"\n", touched_file.display()),
    )
    .unwrap();

    let runtime = Runtime::init(config).unwrap();
    let summary = call(&runtime, "optimize_session", json!({"sessionId": "session-a"})).await;
    assert_eq!(summary["operations_analyzed"], 1);
}

#[tokio::test]
async fn partition_tools_route_and_report_stats_after_creation() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::init(test_config(dir.path())).unwrap();
    runtime.partitions.create_partition("p1", "consistent-hash").unwrap();
    runtime.partitions.create_partition("p2", "consistent-hash").unwrap();

    let routed = call(&runtime, "route_query", json!({"key": "some-cache-key"})).await;
    assert!(routed["partitions"].as_array().unwrap().len() >= 1);

    let stats = call(&runtime, "partition_stats", json!({})).await;
    assert_eq!(stats["partitions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn predictive_train_then_predict_round_trips_through_tools() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::init(test_config(dir.path())).unwrap();
    for i in 0..20u64 {
        runtime.predictive.record_access(b"hot-key".to_vec(), i * 30);
    }

    let trained = call(&runtime, "train_predictive", json!({"modelType": "hybrid"})).await;
    assert_eq!(trained["keysTrained"], 1);

    let predicted = call(&runtime, "predict_access", json!({"horizonSeconds": 60.0})).await;
    assert!(!predicted["predictions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_after_background_tasks_started_is_clean_and_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::init(test_config(dir.path())).unwrap();
    runtime.start_background_tasks();
    tokio::time::sleep(Duration::from_millis(120)).await;
    runtime.shutdown().await.unwrap();
    runtime.shutdown().await.unwrap();
}
