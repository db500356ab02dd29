//! Error types for pollers.

use automap_engine::StoreError;
use thiserror::Error;

/// Errors that can occur while polling a device or storing its results.
#[derive(Debug, Error)]
pub enum PollError {
    /// The request could not be carried to the device.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device did not answer.
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    /// Timeout waiting for the device.
    #[error("Request timed out")]
    Timeout,

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Failed to parse a response or fixture.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Reading a fixture file failed.
    #[error("Failed to read fixture {path}: {source}")]
    Fixture {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing results to the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PollError::Timeout
        } else if err.is_connect() {
            PollError::Unreachable(err.to_string())
        } else {
            PollError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_passes_through() {
        let err: PollError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.to_string(), "Store unavailable: down");
    }

    #[test]
    fn timeout_message() {
        assert_eq!(PollError::Timeout.to_string(), "Request timed out");
    }
}
