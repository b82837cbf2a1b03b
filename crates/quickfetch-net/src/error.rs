// crates/quickfetch-net/src/error.rs
//! Error types for fetch operations

use thiserror::Error;

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while issuing requests or transferring files
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file writes, stream reads)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Download failed
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// The task was cancelled before it completed
    #[error("Task was cancelled")]
    Cancelled,

    /// JSON decode error
    #[error("Decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}

impl FetchError {
    /// Returns true if the error is a connection-establishment failure.
    ///
    /// This is the classification handed to failure callbacks as
    /// `is_connect`; read timeouts and protocol errors do not count.
    pub fn is_connect(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_connect(),
            FetchError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Returns true if the error came from the network or local IO rather
    /// than from decoding or misuse
    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::Http(_) | FetchError::Io(_))
    }
}
