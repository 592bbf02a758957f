//! Package file downloads.
//!
//! This module provides everything needed to move a package's files from a
//! host to the local cache:
//! - Single file transfers with resume support (`http`)
//! - SHA-256 checksum verification (`checksum`)
//! - Concurrent, retrying per-package plans (`downloader`)
//! - Real-time progress aggregation (`progress`)
//! - Run-wide throughput sampling (`speed`)
//! - Named file selections (`group`)
//!
//! # Architecture
//!
//! ```text
//! Downloader (one package, fixed plan)
//!         │
//!         ├── FileTransfer (trait)
//!         │       └── HttpFileTransfer
//!         │
//!         ├── ProgressCounters ──► ProgressReporter ──► update callback
//!         │                                                  │
//!         └── error callback                                 ▼
//!                                                       SpeedSampler
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bundlepatch::download::{Downloader, DownloaderOptions, HttpFileTransfer};
//! use bundlepatch::package::HostEndpoints;
//!
//! let transfer = Arc::new(HttpFileTransfer::new()?);
//! let downloader = Arc::new(Downloader::new(
//!     "core",
//!     tasks,
//!     HostEndpoints::new("https://cdn/game/core", "https://backup/game/core"),
//!     transfer,
//!     DownloaderOptions::new(8, 3),
//! ));
//!
//! downloader.set_update_callback(Arc::new(|p| println!("{}/{} bytes", p.current_bytes, p.total_bytes)));
//! downloader.begin_download();
//! let status = downloader.wait().await;
//! ```

mod checksum;
mod downloader;
mod error;
mod group;
mod http;
mod progress;
mod speed;
mod transfer;

pub use checksum::{calculate_bytes_checksum, calculate_file_checksum, verify_checksum};
pub use downloader::{DownloadStatus, Downloader, DownloaderOptions, ErrorCallback};
pub use error::{DownloadError, DownloadResult};
pub use group::DownloadGroup;
pub use http::{HttpFileTransfer, DEFAULT_TIMEOUT_SECS};
pub use progress::{DownloadProgress, ProgressCallback, ProgressCounters, ProgressReporter};
pub use speed::{SpeedSample, SpeedSampler};
pub use transfer::{
    BoxFuture, DownloadTask, FileTransfer, TransferControl, TransferProgress, TransferRequest,
};
