//! Crate-wide error taxonomy.
//!
//! Mirrors the reference's documented error classes (see spec §7): callers
//! match on variant to decide whether to retry, surface to the user, or
//! just log and move on. Every handler-facing error eventually becomes an
//! `isError: true` envelope (see `dispatcher`); it never escapes as a raw
//! panic.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("security error: {reason} ({path:?})")]
    SecurityError { reason: String, path: PathBuf },

    #[error("unavailable: {component}: {reason}")]
    Unavailable { component: String, reason: String },

    #[error("timeout after {elapsed_ms}ms in {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("insufficient data: need at least {required} samples, have {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("circuit open for {component}")]
    CircuitOpen { component: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        CacheError::InvalidArgument { message: message.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CacheError::NotFound { what: what.into() }
    }

    pub fn security(reason: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        CacheError::SecurityError { reason: reason.into(), path: path.into() }
    }

    pub fn unavailable(component: impl Into<String>, reason: impl Into<String>) -> Self {
        CacheError::Unavailable { component: component.into(), reason: reason.into() }
    }

    pub fn internal(reason: impl std::fmt::Display) -> Self {
        CacheError::Internal(reason.to_string())
    }

    /// Classification used to decide logging level and whether the dispatcher
    /// should keep running a background job after this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CacheError::InvalidArgument { .. } => ErrorSeverity::Warn,
            CacheError::NotFound { .. } => ErrorSeverity::Info,
            CacheError::SecurityError { .. } => ErrorSeverity::Warn,
            CacheError::Unavailable { .. } => ErrorSeverity::Error,
            CacheError::Timeout { .. } => ErrorSeverity::Warn,
            CacheError::InsufficientData { .. } => ErrorSeverity::Info,
            CacheError::CircuitOpen { .. } => ErrorSeverity::Warn,
            CacheError::Internal(_) => ErrorSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warn,
    Error,
}

impl From<sled::Error> for CacheError {
    fn from(err: sled::Error) -> Self {
        CacheError::unavailable("persistent-store", err.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::internal(format!("serialization failure: {err}"))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::internal(format!("io error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_is_warn_severity() {
        let err = CacheError::invalid_argument("bad key");
        assert_eq!(err.severity(), ErrorSeverity::Warn);
    }

    #[test]
    fn security_error_carries_path() {
        let err = CacheError::security("path traversal", "/etc/passwd");
        match err {
            CacheError::SecurityError { path, .. } => {
                assert_eq!(path, PathBuf::from("/etc/passwd"))
            }
            _ => panic!("wrong variant"),
        }
    }
}
