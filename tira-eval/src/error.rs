//! Error types for the evaluation engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for evaluation operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors raised by the evaluator dispatch engine
#[derive(Debug, Error)]
pub enum EvalError {
    /// The evaluator configuration is absent, untrusted or malformed
    #[error("{0}")]
    Config(String),

    /// The submitted artifacts do not match the declared formats
    #[error("{0}")]
    Validation(String),

    /// Reading an artifact failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EvalError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
