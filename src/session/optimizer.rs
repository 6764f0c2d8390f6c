//! C7 — Session Optimizer (spec §4.7).
//!
//! A handler in its own right: reads the target session's CSV operation
//! log via C6, resolves each candidate file path through the Path Sandbox
//! (C13), and pushes file contents through Optimization Admission (C5).
//!
//! Diverges from the reference in one documented way: file paths are
//! deduplicated within a session before reading, so a file touched by ten
//! `file-read` rows is only read and compressed once (behavior-preserving
//! per spec §9's open question — the reference re-reads on every row).

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::OptimizationAdmission;
use crate::error::Result;
use crate::sandbox::PathSandbox;
use crate::session::log_store::SessionLogStore;
use crate::token_counter::TokenCounter;

const ELIGIBLE_TOOLS: [&str; 3] = ["file-read", "file-write", "file-edit"];
const DEFAULT_MIN_TOKEN_THRESHOLD: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OptimizeSessionSummary {
    pub operations_analyzed: u64,
    pub operations_compressed: u64,
    pub before_tokens: u64,
    pub after_tokens: u64,
    pub percent_saved: f64,
    pub paths_rejected: u64,
    pub secure_base_dir: String,
}

pub struct SessionOptimizer {
    log_store: Arc<SessionLogStore>,
    admission: Arc<OptimizationAdmission>,
    tokens: Arc<TokenCounter>,
    sandbox: Arc<PathSandbox>,
}

impl SessionOptimizer {
    pub fn new(
        log_store: Arc<SessionLogStore>,
        admission: Arc<OptimizationAdmission>,
        tokens: Arc<TokenCounter>,
        sandbox: Arc<PathSandbox>,
    ) -> Self {
        Self { log_store, admission, tokens, sandbox }
    }

    /// Resolve the target session: the given id, or the current-session
    /// pointer file if none is given.
    fn resolve_session_id(&self, session_id: Option<&str>) -> Result<String> {
        if let Some(id) = session_id {
            return Ok(id.to_string());
        }
        match self.log_store.current_session()? {
            Some(pointer) => Ok(pointer.session_id),
            None => Err(crate::error::CacheError::not_found("no current session pointer")),
        }
    }

    pub fn optimize_session(
        &self,
        session_id: Option<&str>,
        min_token_threshold: Option<u64>,
    ) -> Result<OptimizeSessionSummary> {
        let min_token_threshold = min_token_threshold.unwrap_or(DEFAULT_MIN_TOKEN_THRESHOLD);
        let session_id = self.resolve_session_id(session_id)?;
        let rows = self.log_store.read_csv(&session_id)?;

        let mut summary = OptimizeSessionSummary {
            secure_base_dir: self.sandbox.base_dir().to_string_lossy().to_string(),
            ..Default::default()
        };

        let mut seen_paths = HashSet::new();
        for row in rows {
            if !ELIGIBLE_TOOLS.contains(&row.tool_name.as_str()) || row.tokens <= min_token_threshold {
                continue;
            }
            let candidate_path = row.metadata.trim();
            if candidate_path.is_empty() {
                continue;
            }

            let resolved = match self.sandbox.resolve(candidate_path) {
                Ok(path) => path,
                Err(err) => {
                    warn!(path = candidate_path, error = %err, "session optimizer rejected path");
                    summary.paths_rejected += 1;
                    continue;
                }
            };

            if !seen_paths.insert(resolved.clone()) {
                continue;
            }

            let content = match std::fs::read_to_string(&resolved) {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %resolved.display(), error = %err, "session optimizer skipped unreadable file");
                    continue;
                }
            };

            let before = self.tokens.count(&content).tokens as u64;
            let result = self.admission.optimize(&resolved.to_string_lossy(), &content)?;
            summary.operations_analyzed += 1;
            summary.before_tokens += before;
            summary.after_tokens += result.stored_tokens as u64;
            if result.decision == crate::cache::AdmissionDecision::StoredCompressed {
                summary.operations_compressed += 1;
            }
        }

        summary.percent_saved = if summary.before_tokens == 0 {
            0.0
        } else {
            (1.0 - summary.after_tokens as f64 / summary.before_tokens as f64) * 100.0
        };
        Ok(summary)
    }
}
