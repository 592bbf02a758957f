//! Concurrent, retrying batch transfer for one package.
//!
//! A [`Downloader`] is an executable plan: the file list and its totals are
//! fixed when it is created, and `begin_download` runs it once.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──begin_download──► Running ──┬──► Succeeded
//!    │                                  ├──► Failed    (a file exhausted its retries)
//!    └──────────cancel_download─────────┴──► Canceled
//! ```
//!
//! Up to `concurrency` files transfer in parallel. Each file is attempted at
//! most `1 + retry_budget` times, alternating between the primary and the
//! fallback host. The first file that runs out of attempts fires the error
//! callback and fails the whole downloader; the remaining transfers are
//! abandoned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::progress::{DownloadProgress, ProgressCallback, ProgressCounters, ProgressReporter};
use super::transfer::{DownloadTask, FileTransfer, TransferControl, TransferRequest};
use crate::package::{file_url, HostEndpoints};

/// Callback receiving the name of a failed file and the error description.
pub type ErrorCallback = Arc<dyn Fn(&str, &DownloadError) + Send + Sync>;

/// Execution status of a downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Succeeded | DownloadStatus::Failed | DownloadStatus::Canceled
        )
    }
}

/// Tuning for one downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloaderOptions {
    /// Maximum parallel transfers. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Extra attempts per file after the first. 0 disables retries.
    pub retry_budget: u32,
    /// How often progress is reported.
    pub progress_interval: Duration,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry_budget: 3,
            progress_interval: Duration::from_millis(100),
        }
    }
}

impl DownloaderOptions {
    pub fn new(concurrency: usize, retry_budget: u32) -> Self {
        Self {
            concurrency,
            retry_budget,
            ..Default::default()
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Executes the transfer plan of one package.
pub struct Downloader {
    package: String,
    tasks: Vec<DownloadTask>,
    endpoints: HostEndpoints,
    transfer: Arc<dyn FileTransfer>,
    options: DownloaderOptions,
    total_count: usize,
    total_bytes: u64,
    counters: Arc<ProgressCounters>,
    started: AtomicBool,
    user_canceled: AtomicBool,
    abort: CancellationToken,
    paused: watch::Sender<bool>,
    status: watch::Sender<DownloadStatus>,
    on_progress: Mutex<Option<ProgressCallback>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("package", &self.package)
            .field("total_count", &self.total_count)
            .field("total_bytes", &self.total_bytes)
            .field("status", &self.status())
            .finish()
    }
}

impl Downloader {
    pub fn new(
        package: impl Into<String>,
        tasks: Vec<DownloadTask>,
        endpoints: HostEndpoints,
        transfer: Arc<dyn FileTransfer>,
        options: DownloaderOptions,
    ) -> Self {
        let sizes: Vec<u64> = tasks.iter().map(|t| t.size).collect();
        let (paused, _) = watch::channel(false);
        let (status, _) = watch::channel(DownloadStatus::Pending);

        Self {
            package: package.into(),
            total_count: tasks.len(),
            total_bytes: sizes.iter().sum(),
            counters: Arc::new(ProgressCounters::new(&sizes)),
            tasks,
            endpoints,
            transfer,
            options,
            started: AtomicBool::new(false),
            user_canceled: AtomicBool::new(false),
            abort: CancellationToken::new(),
            paused,
            status,
            on_progress: Mutex::new(None),
            on_error: Mutex::new(None),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Number of files in the plan, fixed at creation.
    pub fn total_download_count(&self) -> usize {
        self.total_count
    }

    /// Bytes in the plan, fixed at creation.
    pub fn total_download_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    pub fn progress(&self) -> DownloadProgress {
        self.counters.snapshot()
    }

    pub fn status(&self) -> DownloadStatus {
        *self.status.borrow()
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Register the progress callback. Must be set before `begin_download`.
    pub fn set_update_callback(&self, callback: ProgressCallback) {
        *self.on_progress.lock() = Some(callback);
    }

    /// Register the per-file error callback. Must be set before `begin_download`.
    pub fn set_error_callback(&self, callback: ErrorCallback) {
        *self.on_error.lock() = Some(callback);
    }

    /// Start the transfer on the current tokio runtime.
    ///
    /// Only the first call has an effect. A downloader cancelled before it
    /// started stays cancelled.
    pub fn begin_download(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(package = %self.package, "Downloader already started");
            return;
        }
        if self.status().is_terminal() {
            return;
        }

        self.status.send_replace(DownloadStatus::Running);
        if self.tasks.is_empty() {
            self.status.send_replace(DownloadStatus::Succeeded);
            return;
        }

        info!(
            package = %self.package,
            files = self.total_count,
            bytes = self.total_bytes,
            concurrency = self.options.concurrency.max(1),
            "Starting download"
        );
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await });
    }

    /// Hold transfers at their next chunk boundary.
    pub fn pause_download(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_download(&self) {
        self.paused.send_replace(false);
    }

    /// Stop all transfers. Awaiters observe [`DownloadStatus::Canceled`].
    ///
    /// Partially written files are left on disk.
    pub fn cancel_download(&self) {
        if self.status().is_terminal() {
            return;
        }
        self.user_canceled.store(true, Ordering::SeqCst);
        self.abort.cancel();
        if !self.started.load(Ordering::SeqCst) {
            self.status.send_replace(DownloadStatus::Canceled);
        }
    }

    /// Wait for a terminal status.
    ///
    /// Never returns for a downloader that was neither started nor cancelled.
    pub async fn wait(&self) -> DownloadStatus {
        let mut rx = self.status.subscribe();
        let result = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        result.unwrap_or(DownloadStatus::Failed)
    }

    async fn run(self: Arc<Self>) {
        let reporter = self.on_progress.lock().clone().map(|callback| {
            ProgressReporter::start(
                Arc::clone(&self.counters),
                callback,
                self.options.progress_interval,
            )
        });

        let control = TransferControl::new(self.paused.subscribe(), self.abort.clone());
        // Each transfer future owns its inputs so the stream is 'static.
        let mut results = stream::iter(self.tasks.clone().into_iter().enumerate())
            .map(|(index, task)| {
                let this = Arc::clone(&self);
                let control = control.clone();
                async move { this.fetch_with_retry(index, &task, &control).await }
            })
            .buffer_unordered(self.options.concurrency.max(1));

        let mut failed = false;
        while let Some(result) = results.next().await {
            match result {
                Ok(()) => {}
                Err(DownloadError::Canceled) => {
                    if !self.user_canceled.load(Ordering::SeqCst) {
                        continue;
                    }
                    break;
                }
                Err(_) => {
                    failed = true;
                    self.abort.cancel();
                    break;
                }
            }
        }
        drop(results);

        if let Some(reporter) = reporter {
            reporter.stop().await;
        }

        let status = if failed {
            DownloadStatus::Failed
        } else if self.user_canceled.load(Ordering::SeqCst) {
            DownloadStatus::Canceled
        } else {
            DownloadStatus::Succeeded
        };

        let progress = self.counters.snapshot();
        info!(
            package = %self.package,
            status = ?status,
            files = progress.current_count,
            bytes = progress.current_bytes,
            "Download finished"
        );
        self.status.send_replace(status);
    }

    async fn fetch_with_retry(
        &self,
        index: usize,
        task: &DownloadTask,
        control: &TransferControl,
    ) -> Result<(), DownloadError> {
        let attempts = 1 + self.options.retry_budget;
        let counters = Arc::clone(&self.counters);
        let progress = move |bytes: u64| counters.update_file(index, bytes);
        let mut last_error = None;

        for attempt in 0..attempts {
            control.checkpoint().await?;

            let request = TransferRequest {
                file_name: task.file_name.clone(),
                url: file_url(self.endpoints.for_attempt(attempt), &task.file_name),
                dest: task.dest.clone(),
                expected_size: task.size,
                sha256: task.sha256.clone(),
            };

            match self.transfer.fetch(&request, &progress, control).await {
                Ok(_) => {
                    self.counters.mark_completed(index);
                    debug!(package = %self.package, file = %task.file_name, attempt, "File downloaded");
                    return Ok(());
                }
                Err(DownloadError::Canceled) => return Err(DownloadError::Canceled),
                Err(e) => {
                    warn!(
                        package = %self.package,
                        file = %task.file_name,
                        url = %request.url,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "File transfer attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or(DownloadError::Canceled);
        let callback = self.on_error.lock().clone();
        if let Some(callback) = callback {
            callback(&task.file_name, &error);
        }
        Err(error)
    }
}
