//! Error types for file transfers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while transferring a single file.
///
/// Cancellation is modelled as [`DownloadError::Canceled`] so that it can flow
/// through `?`, but it is never reported as a failure.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The remote request failed or returned an unexpected status.
    #[error("Transfer of {url} failed: {reason}")]
    Transfer { url: String, reason: String },

    /// The request timed out.
    #[error("Transfer of {url} timed out")]
    Timeout { url: String },

    /// Downloaded bytes do not hash to the expected value.
    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// Failed to read a local file.
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// Failed to write a local file.
    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// The transfer was canceled by the caller.
    #[error("Transfer canceled")]
    Canceled,
}

impl DownloadError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, DownloadError::Canceled)
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
            }
        } else {
            DownloadError::Transfer {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}
