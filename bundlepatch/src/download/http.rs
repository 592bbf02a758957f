//! HTTP file transfer with resume support.
//!
//! This module provides the network side of a downloader:
//! - Resumable transfers via HTTP Range requests
//! - Chunk-level pause and cancel checkpoints
//! - SHA-256 verification of the finished file

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, trace};

use super::checksum::{calculate_file_checksum, verify_checksum};
use super::error::{DownloadError, DownloadResult};
use super::transfer::{
    BoxFuture, FileTransfer, TransferControl, TransferProgress, TransferRequest,
};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// HTTP-based [`FileTransfer`].
///
/// A partially written destination is resumed with a `Range` request. If the
/// server ignores the range and answers `200 OK`, the file is rewritten from
/// the start.
#[derive(Debug, Clone)]
pub struct HttpFileTransfer {
    client: Client,
    timeout: Duration,
}

impl HttpFileTransfer {
    /// Create a transfer with the default timeout.
    pub fn new() -> DownloadResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transfer with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Transfer {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client, timeout })
    }

    /// Reuse an existing client.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_with_resume(
        &self,
        request: &TransferRequest,
        progress: TransferProgress<'_>,
        control: &TransferControl,
    ) -> DownloadResult<u64> {
        let dest = request.dest.as_path();
        let mut existing = match fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        if let Some(size) = self.check_existing(request, existing).await? {
            progress(size);
            return Ok(size);
        }
        if request.expected_size > 0 && existing >= request.expected_size {
            // Complete-looking but failed verification, or oversized.
            remove_quietly(dest).await;
            existing = 0;
        }

        control.checkpoint().await?;

        let mut builder = self.client.get(&request.url);
        if existing > 0 {
            builder = builder.header(RANGE, format!("bytes={}-", existing));
        }

        let response = tokio::select! {
            r = builder.send() => r.map_err(|e| DownloadError::from_reqwest(&request.url, e))?,
            _ = control.cancel_token().cancelled() => return Err(DownloadError::Canceled),
        };

        let status = response.status();
        let start_byte = match status {
            StatusCode::PARTIAL_CONTENT if existing > 0 => existing,
            s if s.is_success() => 0,
            s => {
                return Err(DownloadError::Transfer {
                    url: request.url.clone(),
                    reason: format!("GET request failed with status {}", s),
                })
            }
        };

        let file = prepare_destination(dest, start_byte).await?;
        let mut writer = BufWriter::new(file);
        let mut written = start_byte;
        let mut stream = response.bytes_stream();

        progress(written);
        loop {
            control.checkpoint().await?;
            let chunk = tokio::select! {
                c = stream.next() => c,
                _ = control.cancel_token().cancelled() => return Err(DownloadError::Canceled),
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| DownloadError::from_reqwest(&request.url, e))?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::Write {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
            written += chunk.len() as u64;
            trace!(file = %request.file_name, written, "Chunk written");
            progress(written);
        }

        writer.flush().await.map_err(|e| DownloadError::Write {
            path: dest.to_path_buf(),
            source: e,
        })?;

        if let Some(expected) = request.sha256.clone() {
            let path = dest.to_path_buf();
            let verified = tokio::task::spawn_blocking(move || verify_checksum(&path, &expected))
                .await
                .map_err(|e| DownloadError::Transfer {
                    url: request.url.clone(),
                    reason: format!("Checksum task failed: {}", e),
                })?;
            if let Err(e) = verified {
                remove_quietly(dest).await;
                return Err(e);
            }
        }

        debug!(file = %request.file_name, bytes = written, "Transfer complete");
        Ok(written)
    }

    /// Return the size of an already complete and verified destination.
    async fn check_existing(
        &self,
        request: &TransferRequest,
        existing: u64,
    ) -> DownloadResult<Option<u64>> {
        if request.expected_size == 0 || existing != request.expected_size {
            return Ok(None);
        }

        let Some(expected) = request.sha256.clone() else {
            return Ok(Some(existing));
        };

        let path = request.dest.clone();
        let actual = tokio::task::spawn_blocking(move || calculate_file_checksum(&path))
            .await
            .map_err(|e| DownloadError::Transfer {
                url: request.url.clone(),
                reason: format!("Checksum task failed: {}", e),
            })??;

        if actual.eq_ignore_ascii_case(&expected) {
            Ok(Some(existing))
        } else {
            Ok(None)
        }
    }
}

impl FileTransfer for HttpFileTransfer {
    fn fetch<'a>(
        &'a self,
        request: &'a TransferRequest,
        progress: TransferProgress<'a>,
        control: &'a TransferControl,
    ) -> BoxFuture<'a, DownloadResult<u64>> {
        Box::pin(self.fetch_with_resume(request, progress, control))
    }
}

/// Open the destination for appending at `start_byte`, or truncate it.
async fn prepare_destination(dest: &Path, start_byte: u64) -> DownloadResult<fs::File> {
    if start_byte > 0 {
        return OpenOptions::new()
            .append(true)
            .open(dest)
            .await
            .map_err(|e| DownloadError::Write {
                path: dest.to_path_buf(),
                source: e,
            });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    fs::File::create(dest)
        .await
        .map_err(|e| DownloadError::Write {
            path: dest.to_path_buf(),
            source: e,
        })
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Could not remove stale file");
    }
}
