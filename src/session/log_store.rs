//! C6 — Session Log Store (spec §4.6, §6).
//!
//! Three artifacts live under the configured hooks data directory:
//! `operations-<sessionId>.csv` (one row per tool call), the richer
//! `session-log-<sessionId>.jsonl`, and a single `current-session.txt`
//! pointer. `parse` streams the JSONL file line-by-line — sessions can run
//! to hundreds of MB and must never be loaded whole into memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{CacheError, Result};

const SYSTEM_REMINDER_TOOL: &str = "system-reminder";
/// Yield to the runtime after this many JSONL lines, so a very large
/// session log never monopolizes the executor for more than a few ms
/// (spec §5: "must stream, not block the event loop for >10ms chunks").
const YIELD_EVERY_LINES: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlRecord {
    pub timestamp: u64,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub tokens: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionParseResult {
    pub operations: Vec<JsonlRecord>,
    pub tool_tokens: HashMap<String, u64>,
    pub system_reminder_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvOperationRow {
    pub timestamp: u64,
    pub tool_name: String,
    pub tokens: u64,
    pub metadata: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSessionPointer {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "startTime")]
    pub start_time: u64,
    #[serde(rename = "lastActivity")]
    pub last_activity: u64,
    #[serde(rename = "totalOperations")]
    pub total_operations: u64,
}

fn strip_bom(raw: &str) -> &str {
    raw.strip_prefix('\u{feff}').unwrap_or(raw)
}

/// C6: opens and parses per-session operation logs under a configured
/// hooks data directory. Every read is read-only; files are released as
/// soon as parsing finishes (spec §3 Ownership).
pub struct SessionLogStore {
    hooks_data_dir: PathBuf,
}

impl SessionLogStore {
    pub fn new(hooks_data_dir: impl Into<PathBuf>) -> Self {
        Self { hooks_data_dir: hooks_data_dir.into() }
    }

    fn csv_path(&self, session_id: &str) -> PathBuf {
        self.hooks_data_dir.join(format!("operations-{session_id}.csv"))
    }

    fn jsonl_path(&self, session_id: &str) -> PathBuf {
        self.hooks_data_dir.join(format!("session-log-{session_id}.jsonl"))
    }

    fn pointer_path(&self) -> PathBuf {
        self.hooks_data_dir.join("current-session.txt")
    }

    /// Stream-parse the JSONL structured log for `session_id`. Unknown
    /// fields in each line are tolerated and preserved under `extra`;
    /// malformed lines are skipped rather than aborting the whole parse.
    pub async fn parse(&self, session_id: &str) -> Result<SessionParseResult> {
        let path = self.jsonl_path(session_id);
        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            CacheError::not_found(format!("session log {:?}: {e}", path))
        })?;
        let mut lines = BufReader::new(file).lines();

        let mut result = SessionParseResult::default();
        let mut seen = 0usize;
        while let Some(raw_line) = lines.next_line().await? {
            let line = strip_bom(raw_line.trim());
            if line.is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<JsonlRecord>(line) {
                *result.tool_tokens.entry(record.tool_name.clone()).or_insert(0) += record.tokens;
                if record.tool_name == SYSTEM_REMINDER_TOOL {
                    result.system_reminder_tokens += record.tokens;
                }
                result.operations.push(record);
            }
            seen += 1;
            if seen % YIELD_EVERY_LINES == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(result)
    }

    /// Read the CSV operation log for `session_id`. Metadata fields are
    /// unquoted per spec §6 ("rows may contain quoted metadata; consumers
    /// must strip surrounding quotes").
    pub fn read_csv(&self, session_id: &str) -> Result<Vec<CsvOperationRow>> {
        let path = self.csv_path(session_id);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| CacheError::not_found(format!("operation log {:?}: {e}", path)))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| CacheError::internal(format!("malformed csv row: {e}")))?;
            if record.len() < 4 {
                continue;
            }
            let timestamp: u64 = record[0].trim().parse().unwrap_or(0);
            let tokens: u64 = record[2].trim().parse().unwrap_or(0);
            let metadata = record[3].trim().trim_matches('"').to_string();
            rows.push(CsvOperationRow {
                timestamp,
                tool_name: record[1].trim().to_string(),
                tokens,
                metadata,
            });
        }
        Ok(rows)
    }

    pub fn append_csv_row(&self, session_id: &str, row: &CsvOperationRow) -> Result<()> {
        std::fs::create_dir_all(&self.hooks_data_dir)?;
        let path = self.csv_path(session_id);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)?,
            );
        writer
            .write_record([
                row.timestamp.to_string(),
                row.tool_name.clone(),
                row.tokens.to_string(),
                format!("\"{}\"", row.metadata),
            ])
            .map_err(|e| CacheError::internal(format!("csv append failed: {e}")))?;
        writer.flush()?;
        Ok(())
    }

    /// Every session with an operation CSV under the hooks data directory.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions = Vec::new();
        let read_dir = match std::fs::read_dir(&self.hooks_data_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_prefix("operations-").and_then(|s| s.strip_suffix(".csv")) {
                sessions.push(id.to_string());
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    pub fn current_session(&self) -> Result<Option<CurrentSessionPointer>> {
        let path = self.pointer_path();
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let cleaned = strip_bom(&raw);
                let pointer = serde_json::from_str(cleaned)
                    .map_err(|e| CacheError::internal(format!("malformed session pointer: {e}")))?;
                Ok(Some(pointer))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_current_session(&self, pointer: &CurrentSessionPointer) -> Result<()> {
        std::fs::create_dir_all(&self.hooks_data_dir)?;
        let raw = serde_json::to_string(pointer)
            .map_err(|e| CacheError::internal(format!("serializing session pointer: {e}")))?;
        std::fs::write(self.pointer_path(), raw)?;
        Ok(())
    }

    pub fn hooks_data_dir(&self) -> &Path {
        &self.hooks_data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn parse_streams_jsonl_and_aggregates_tool_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLogStore::new(dir.path());
        let path = dir.path().join("session-log-s1.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"timestamp\":1,\"toolName\":\"file-read\",\"tokens\":10}\n",
                "{\"timestamp\":2,\"toolName\":\"system-reminder\",\"tokens\":5}\n",
                "{\"timestamp\":3,\"toolName\":\"file-read\",\"tokens\":20}\n",
            ),
        )
        .unwrap();

        let result = store.parse("s1").await.unwrap();
        assert_eq!(result.operations.len(), 3);
        assert_eq!(result.tool_tokens["file-read"], 30);
        assert_eq!(result.system_reminder_tokens, 5);
    }

    #[tokio::test]
    async fn parse_tolerates_bom_and_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLogStore::new(dir.path());
        let path = dir.path().join("session-log-s2.jsonl");
        let mut content = String::from('\u{feff}');
        content.push_str("{\"timestamp\":1,\"toolName\":\"x\",\"tokens\":1,\"extraField\":true}\n");
        fs::write(&path, content).unwrap();

        let result = store.parse("s2").await.unwrap();
        assert_eq!(result.operations.len(), 1);
        assert!(result.operations[0].extra.contains_key("extraField"));
    }

    #[tokio::test]
    async fn parse_missing_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLogStore::new(dir.path());
        let err = store.parse("nope").await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[test]
    fn read_csv_strips_quoted_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLogStore::new(dir.path());
        fs::write(
            dir.path().join("operations-s1.csv"),
            "100,file-read,42,\"path=/tmp/a.txt\"\n",
        )
        .unwrap();
        let rows = store.read_csv("s1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].metadata, "path=/tmp/a.txt");
        assert_eq!(rows[0].tokens, 42);
    }

    #[test]
    fn list_sessions_reads_csv_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLogStore::new(dir.path());
        fs::write(dir.path().join("operations-alpha.csv"), "").unwrap();
        fs::write(dir.path().join("operations-beta.csv"), "").unwrap();
        fs::write(dir.path().join("not-a-session.csv"), "").unwrap();
        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn current_session_pointer_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionLogStore::new(dir.path());
        assert!(store.current_session().unwrap().is_none());
        let pointer = CurrentSessionPointer {
            session_id: "s1".into(),
            start_time: 1,
            last_activity: 2,
            total_operations: 3,
        };
        store.write_current_session(&pointer).unwrap();
        let read_back = store.current_session().unwrap().unwrap();
        assert_eq!(read_back.session_id, "s1");
    }
}
