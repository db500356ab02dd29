//! Error types for the engine and its store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`Store`](crate::Store).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be read at open time.
    #[error("Failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not hold a valid store document.
    #[error("Corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the backing file failed.
    #[error("Store write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the store document failed.
    #[error("Store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The store cannot serve requests.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by [`TopologyService`](crate::TopologyService) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller sent a request that violates the operation's contract.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A configured placement pattern is not a valid regular expression.
    #[error("Invalid placement pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The store failed underneath the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }

    /// Whether the error is the caller's fault rather than the server's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::InvalidArgument(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_is_client_error() {
        let err = EngineError::invalid("empty device list");
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Invalid argument: empty device list");
    }

    #[test]
    fn store_error_converts_and_is_server_error() {
        let err: EngineError = StoreError::Unavailable("closed".to_string()).into();
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "Store unavailable: closed");
    }
}
