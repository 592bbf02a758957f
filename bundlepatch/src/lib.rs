//! Bundlepatch - patching of remotely hosted resource packages
//!
//! This library keeps a local cache of resource packages in sync with a
//! content host: it resolves the latest version of every package, applies
//! its manifest, downloads missing files and removes files no longer used.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use bundlepatch::config::PatchConfig;
//! use bundlepatch::package::{PackageInfo, PlayMode};
//! use bundlepatch::patch::{PatchOrchestrator, RunOutcome};
//! use bundlepatch::store::HttpPackageStore;
//!
//! let config = PatchConfig::new(PlayMode::Host)
//!     .with_hosts("https://cdn.example.com", "https://backup.example.com");
//! let store = Arc::new(HttpPackageStore::new(config.store_config())?);
//! let packages = vec![PackageInfo::app("core", PlayMode::Host)];
//!
//! let orchestrator = PatchOrchestrator::builder(config, packages, store).build();
//! if orchestrator.check()?.finished().await? == RunOutcome::AwaitingBegin {
//!     orchestrator.begin_download().unwrap().finished().await?;
//! }
//! ```

pub mod config;
pub mod download;
pub mod events;
pub mod kv;
pub mod logging;
pub mod package;
pub mod patch;
pub mod store;

/// Version of the bundlepatch library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
