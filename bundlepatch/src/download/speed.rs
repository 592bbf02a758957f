//! Throughput sampling across the downloaders of one run.
//!
//! Downloaders report cumulative counters of their own. The sampler folds
//! their deltas into run-wide totals and, at most once per interval, emits a
//! [`SpeedSample`] carrying the bytes transferred during that interval and
//! how long the interval actually lasted. A window only closes when a report
//! arrives, so after a stall it spans several configured intervals; rates
//! must be derived from [`SpeedSample::window`], not from the configured
//! interval. The per-interval byte count restarts at zero for every
//! interval; callers that want smoothing combine several samples themselves.

use std::time::{Duration, Instant};

use super::progress::DownloadProgress;

/// Run-wide progress with the bytes moved in the last interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeedSample {
    pub total_count: usize,
    pub current_count: usize,
    pub total_bytes: u64,
    pub current_bytes: u64,
    pub bytes_per_interval: u64,
    /// Elapsed time covered by `bytes_per_interval`.
    pub window: Duration,
}

impl SpeedSample {
    /// Throughput over the sampled window, if the window has a length.
    pub fn bytes_per_second(&self) -> Option<u64> {
        let secs = self.window.as_secs_f64();
        if secs > 0.0 {
            Some((self.bytes_per_interval as f64 / secs) as u64)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct SpeedSampler {
    interval: Duration,
    total_count: usize,
    total_bytes: u64,
    current_count: usize,
    current_bytes: u64,
    last_count: usize,
    last_bytes: u64,
    window_start: Option<Instant>,
    window_bytes: u64,
    pending: bool,
}

impl SpeedSampler {
    pub fn new(interval: Duration, total_count: usize, total_bytes: u64) -> Self {
        Self {
            interval,
            total_count,
            total_bytes,
            current_count: 0,
            current_bytes: 0,
            last_count: 0,
            last_bytes: 0,
            window_start: None,
            window_bytes: 0,
            pending: false,
        }
    }

    /// Reset the per-downloader baseline before the next downloader reports.
    pub fn start_downloader(&mut self) {
        self.last_count = 0;
        self.last_bytes = 0;
    }

    /// Fold one downloader report in, using the current time.
    pub fn record(&mut self, progress: &DownloadProgress) -> Option<SpeedSample> {
        self.record_at(Instant::now(), progress)
    }

    /// Fold one downloader report in at `now`.
    ///
    /// Returns a sample when the interval that started with the first report
    /// (or the previous sample) has elapsed.
    pub fn record_at(&mut self, now: Instant, progress: &DownloadProgress) -> Option<SpeedSample> {
        let count_delta = progress.current_count.saturating_sub(self.last_count);
        let bytes_delta = progress.current_bytes.saturating_sub(self.last_bytes);
        self.last_count = self.last_count.max(progress.current_count);
        self.last_bytes = self.last_bytes.max(progress.current_bytes);

        self.current_count += count_delta;
        self.current_bytes += bytes_delta;
        self.window_bytes += bytes_delta;
        self.pending = true;

        let start = *self.window_start.get_or_insert(now);
        if now.saturating_duration_since(start) >= self.interval {
            Some(self.take_sample(now))
        } else {
            None
        }
    }

    /// Emit the partial interval accumulated since the last sample, if any.
    pub fn flush(&mut self) -> Option<SpeedSample> {
        if self.pending {
            Some(self.take_sample(Instant::now()))
        } else {
            None
        }
    }

    /// Run-wide totals without closing the interval. `window` is zero.
    pub fn current(&self) -> SpeedSample {
        SpeedSample {
            total_count: self.total_count,
            current_count: self.current_count,
            total_bytes: self.total_bytes,
            current_bytes: self.current_bytes,
            bytes_per_interval: self.window_bytes,
            window: Duration::ZERO,
        }
    }

    fn take_sample(&mut self, now: Instant) -> SpeedSample {
        let mut sample = self.current();
        sample.window = self
            .window_start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        self.window_bytes = 0;
        self.window_start = Some(now);
        self.pending = false;
        sample
    }
}
