//! Error types for fragpatch

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::backup::BackupError;
use crate::lock::LockError;
use crate::strategy::StrategyError;

/// Errors surfaced by the mutation engine.
///
/// "Not found" is deliberately absent: a reference that no longer resolves is
/// a normal outcome (`changed = false`), not an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("path not allowed by policy: {path}")]
    PathNotAllowed { path: PathBuf },

    #[error("extension not allowed by policy: {path}")]
    ExtensionNotAllowed { path: PathBuf },

    #[error("document not found: {path}")]
    DocumentMissing { path: PathBuf },

    #[error("document not writable: {path}")]
    NotWritable { path: PathBuf },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("line {line} out of range (document has {total} lines)")]
    OutOfRange { line: usize, total: usize },

    #[error("could not acquire lock on {path} within {timeout:?}")]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("edited content failed validation: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("storage error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl EngineError {
    /// True for rejections made by the policy gate, before any lock or backup.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::PathNotAllowed { .. } | EngineError::ExtensionNotAllowed { .. }
        )
    }

    /// True if the caller may reasonably retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::LockTimeout { .. })
    }
}

impl From<LockError> for EngineError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { path, timeout } => EngineError::LockTimeout { path, timeout },
        }
    }
}

impl From<StrategyError> for EngineError {
    fn from(err: StrategyError) -> Self {
        match err {
            StrategyError::EmptyPattern => EngineError::InvalidInput {
                message: "replacement pattern is empty".into(),
            },
            StrategyError::InvalidPattern(msg) => EngineError::InvalidInput {
                message: format!("invalid pattern: {}", msg),
            },
            StrategyError::InvalidSelector(msg) => EngineError::InvalidInput {
                message: format!("invalid selector: {}", msg),
            },
            StrategyError::LineOutOfRange { line, total } => {
                EngineError::OutOfRange { line, total }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_rejection_classification() {
        let err = EngineError::PathNotAllowed {
            path: PathBuf::from("/etc/passwd"),
        };
        assert!(err.is_policy_rejection());
        assert!(!err.is_retryable());

        let err = EngineError::LockTimeout {
            path: PathBuf::from("a.html"),
            timeout: Duration::from_secs(5),
        };
        assert!(!err.is_policy_rejection());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_strategy_error_conversion() {
        let err: EngineError = StrategyError::LineOutOfRange { line: 10, total: 3 }.into();
        assert!(matches!(
            err,
            EngineError::OutOfRange { line: 10, total: 3 }
        ));

        let err: EngineError = StrategyError::EmptyPattern.into();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn test_display_messages() {
        let err = EngineError::ValidationFailed {
            errors: vec!["unclosed tag <div>".into(), "stray closing tag </p>".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("unclosed tag <div>"));
        assert!(msg.contains("stray closing tag </p>"));
    }
}
