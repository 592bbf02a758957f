//! Single-file transfer capability.
//!
//! A [`Downloader`](super::Downloader) drives many transfers in parallel but
//! never touches the network itself: each file goes through a
//! [`FileTransfer`]. The HTTP implementation lives in `http`; tests inject
//! in-memory transfers.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::error::{DownloadError, DownloadResult};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback receiving the bytes written so far for the current file.
pub type TransferProgress<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// One file that a downloader plans to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Name of the file on the host, relative to the package host root.
    pub file_name: String,
    /// Expected size in bytes.
    pub size: u64,
    /// Expected lowercase hex SHA-256, if known.
    pub sha256: Option<String>,
    /// Local destination path.
    pub dest: PathBuf,
}

/// A resolved request for one attempt at one file.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub file_name: String,
    pub url: String,
    pub dest: PathBuf,
    pub expected_size: u64,
    pub sha256: Option<String>,
}

/// Pause and cancel signals shared by the transfers of one downloader.
///
/// Transfers call [`checkpoint`](Self::checkpoint) between chunks. Pausing
/// parks them there; cancelling makes the checkpoint fail with
/// [`DownloadError::Canceled`].
#[derive(Debug, Clone)]
pub struct TransferControl {
    paused: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl TransferControl {
    pub fn new(paused: watch::Receiver<bool>, cancel: CancellationToken) -> Self {
        Self { paused, cancel }
    }

    /// Control that is never paused and only cancelled through `cancel`.
    pub fn detached(cancel: CancellationToken) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx, cancel)
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that fires when the transfer must stop.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait while paused; fail if cancelled.
    pub async fn checkpoint(&self) -> DownloadResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Canceled);
        }
        if !*self.paused.borrow() {
            return Ok(());
        }

        let mut paused = self.paused.clone();
        let resumed = async move { paused.wait_for(|p| !*p).await.is_ok() };
        tokio::select! {
            ok = resumed => {
                // Sender gone while paused: nobody can resume us.
                if !ok {
                    return Err(DownloadError::Canceled);
                }
            }
            _ = self.cancel.cancelled() => return Err(DownloadError::Canceled),
        }

        if self.cancel.is_cancelled() {
            Err(DownloadError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Transfers one file to disk.
///
/// Implementations report cumulative bytes for the current attempt through
/// `progress`, call `control.checkpoint()` between chunks, and return the
/// final size on success.
pub trait FileTransfer: Send + Sync {
    fn fetch<'a>(
        &'a self,
        request: &'a TransferRequest,
        progress: TransferProgress<'a>,
        control: &'a TransferControl,
    ) -> BoxFuture<'a, DownloadResult<u64>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_checkpoint_passes_when_running() {
        let control = TransferControl::detached(CancellationToken::new());
        assert!(control.checkpoint().await.is_ok());
    }

    #[tokio::test]
    async fn test_checkpoint_fails_when_canceled() {
        let token = CancellationToken::new();
        let control = TransferControl::detached(token.clone());
        token.cancel();
        assert!(matches!(
            control.checkpoint().await,
            Err(DownloadError::Canceled)
        ));
    }

    #[tokio::test]
    async fn test_checkpoint_waits_for_resume() {
        let (tx, rx) = watch::channel(true);
        let control = TransferControl::new(rx, CancellationToken::new());

        let waiter = tokio::spawn(async move { control.checkpoint().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        tx.send(false).unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_releases_paused_checkpoint() {
        let (_tx, rx) = watch::channel(true);
        let token = CancellationToken::new();
        let control = TransferControl::new(rx, token.clone());

        let waiter = tokio::spawn(async move { control.checkpoint().await });
        token.cancel();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(DownloadError::Canceled)
        ));
    }
}
