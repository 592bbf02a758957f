//! Progress aggregation for parallel file transfers.
//!
//! Transfers update per-file atomic counters; a reporter task polls them on a
//! fixed interval and hands snapshots to a callback. Every per-file counter
//! only moves forward, so the aggregated totals never decrease even when a
//! file is retried from the beginning.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cumulative progress of one downloader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub total_count: usize,
    pub current_count: usize,
    pub total_bytes: u64,
    pub current_bytes: u64,
}

impl DownloadProgress {
    pub fn is_complete(&self) -> bool {
        self.current_count >= self.total_count && self.current_bytes >= self.total_bytes
    }
}

/// Callback receiving progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Shared progress counters for the files of one downloader.
#[derive(Debug)]
pub struct ProgressCounters {
    file_bytes: Vec<AtomicU64>,
    file_caps: Vec<u64>,
    files_completed: AtomicUsize,
    total_bytes: u64,
}

impl ProgressCounters {
    /// Counters for files of the given expected sizes.
    pub fn new(file_sizes: &[u64]) -> Self {
        Self {
            file_bytes: file_sizes.iter().map(|_| AtomicU64::new(0)).collect(),
            file_caps: file_sizes.to_vec(),
            files_completed: AtomicUsize::new(0),
            total_bytes: file_sizes.iter().sum(),
        }
    }

    /// Record that file `index` has `bytes` on disk.
    ///
    /// Lower values than previously recorded are ignored, and values are
    /// capped at the file's expected size.
    pub fn update_file(&self, index: usize, bytes: u64) {
        if let (Some(counter), Some(cap)) = (self.file_bytes.get(index), self.file_caps.get(index))
        {
            let bytes = if *cap > 0 { bytes.min(*cap) } else { bytes };
            counter.fetch_max(bytes, Ordering::SeqCst);
        }
    }

    /// Mark file `index` as fully transferred.
    pub fn mark_completed(&self, index: usize) {
        if let Some(cap) = self.file_caps.get(index) {
            self.file_bytes[index].fetch_max(*cap, Ordering::SeqCst);
            self.files_completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn current_bytes(&self) -> u64 {
        self.file_bytes
            .iter()
            .map(|b| b.load(Ordering::SeqCst))
            .sum()
    }

    pub fn completed_files(&self) -> usize {
        self.files_completed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> DownloadProgress {
        DownloadProgress {
            total_count: self.file_caps.len(),
            current_count: self.completed_files(),
            total_bytes: self.total_bytes,
            current_bytes: self.current_bytes(),
        }
    }
}

/// Periodic progress reporter.
///
/// Spawns a tokio task that polls the counters every `poll_interval` and
/// invokes the callback whenever the snapshot changed. Stopping the reporter
/// always delivers one final snapshot.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    stop: CancellationToken,
}

impl ProgressReporter {
    pub fn start(
        counters: Arc<ProgressCounters>,
        callback: ProgressCallback,
        poll_interval: Duration,
    ) -> Self {
        let stop = CancellationToken::new();
        let stop_signal = stop.clone();
        let poll_interval = poll_interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last = DownloadProgress::default();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = counters.snapshot();
                        if snapshot != last {
                            callback(snapshot);
                            last = snapshot;
                        }
                    }
                    _ = stop_signal.cancelled() => break,
                }
            }

            // Final report
            callback(counters.snapshot());
        });

        Self {
            handle: Some(handle),
            stop,
        }
    }

    /// Stop the reporter and wait for the final report.
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
