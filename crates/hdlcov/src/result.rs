//! Result and error types for hdlcov.

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for hdlcov operations
pub type HdlcovResult<T> = Result<T, HdlcovError>;

/// Errors that can occur in hdlcov
#[derive(Debug, Error)]
pub enum HdlcovError {
    /// Dataset integrity violation
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A dataset line or document could not be decoded
    #[error("Malformed dataset {path} at line {line}: {message}")]
    MalformedDataset {
        /// Dataset path
        path: PathBuf,
        /// 1-based line number (1 for whole-document formats)
        line: usize,
        /// Decoder message
        message: String,
    },

    /// Sandbox configuration could not be loaded or is invalid
    #[error("Invalid sandbox configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Serialization of a report failed
    #[error("Serialization failed: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// I/O error with the path that caused it
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl HdlcovError {
    /// Wrap an I/O error together with the path it happened on
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for HdlcovError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dataset::ModuleId;

    #[test]
    fn test_store_error_is_transparent() {
        let err: HdlcovError = StoreError::NotFound(ModuleId::from("top")).into();
        assert_eq!(err.to_string(), "Module not found: top");
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = HdlcovError::io(
            "data/modules.jsonl",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        let text = err.to_string();
        assert!(text.contains("data/modules.jsonl"));
        assert!(text.contains("no such file"));
    }

    #[test]
    fn test_invalid_config() {
        let err = HdlcovError::invalid_config("timeout_seconds must be positive");
        assert!(err.to_string().contains("sandbox configuration"));
    }
}
