//! Package storage capability.
//!
//! The patch pipeline never talks to a host or the filesystem directly. It
//! drives a [`PackageStore`], which knows how to resolve versions, apply
//! manifests, plan downloads and clean up its cache.
//!
//! # Design Principles
//!
//! - **Package-scoped**: every operation names the package it acts on
//! - **Dyn-compatible**: async methods return [`BoxFuture`] so the
//!   orchestrator can hold an `Arc<dyn PackageStore>`
//! - **Snapshot plans**: `create_downloader` diffs the active manifest
//!   against the local cache once; later changes are not reflected
//!
//! [`HttpPackageStore`] is the bundled implementation.

mod cache;
mod decrypt;
mod http;
mod manifest;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use crate::download::BoxFuture;
use crate::download::{Downloader, DownloaderOptions};
use crate::package::{HostEndpoints, PlayMode};

pub use cache::{dir_size_bytes, ClearReport, LocalCache};
pub use decrypt::{Decryptor, NoDecryption, XorDecryptor};
pub use http::{HttpPackageStore, HttpStoreConfig};
pub use manifest::{Manifest, ManifestEntry};

/// Errors reported by a [`PackageStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The package was never registered, or was destroyed.
    #[error("Package '{0}' is not registered")]
    NotRegistered(String),

    /// The package has not been initialized.
    #[error("Package '{0}' is not initialized")]
    NotInitialized(String),

    /// No manifest has been applied yet.
    #[error("Package '{0}' has no active manifest")]
    NoActiveManifest(String),

    /// A remote request failed.
    #[error("Request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// Local filesystem access failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A manifest could not be parsed or is inconsistent.
    #[error("Invalid manifest for '{package}': {reason}")]
    ManifestParse { package: String, reason: String },

    /// Decrypting fetched bytes failed.
    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

impl StoreError {
    /// True when the package has nothing left to clean.
    ///
    /// Repair treats these as success.
    pub fn is_already_clean(&self) -> bool {
        matches!(self, StoreError::NotRegistered(_))
    }
}

/// Which cached files [`PackageStore::clear_cache_files`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Every downloaded bundle file.
    AllBundleFiles,
    /// Bundle files not referenced by the active manifest.
    UnusedBundleFiles,
    /// Every cached manifest.
    AllManifestFiles,
    /// Cached manifests other than the active version's.
    UnusedManifestFiles,
}

/// Which files of the active manifest a downloader should cover.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DownloadSelector {
    #[default]
    All,
    ByTags(Vec<String>),
    ByAssetNames(Vec<String>),
}

impl DownloadSelector {
    /// Tag selector; an empty list selects everything.
    pub fn by_tags(tags: Vec<String>) -> Self {
        if tags.is_empty() {
            DownloadSelector::All
        } else {
            DownloadSelector::ByTags(tags)
        }
    }

    /// Asset-name selector; an empty list selects everything.
    pub fn by_asset_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            DownloadSelector::All
        } else {
            DownloadSelector::ByAssetNames(names)
        }
    }

    pub fn matches(&self, entry: &ManifestEntry) -> bool {
        match self {
            DownloadSelector::All => true,
            DownloadSelector::ByTags(tags) => entry.tags.iter().any(|t| tags.contains(t)),
            DownloadSelector::ByAssetNames(names) => {
                entry.assets.iter().any(|a| names.contains(a))
            }
        }
    }
}

/// Parameters for [`PackageStore::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    pub play_mode: PlayMode,
    pub endpoints: HostEndpoints,
}

/// Per-package storage operations consumed by the patch pipeline.
pub trait PackageStore: Send + Sync {
    /// Register a package by name. Registering twice is a no-op.
    fn register_package(&self, package: &str) -> Result<(), StoreError>;

    /// Prepare a registered package for the given mode and endpoints.
    fn initialize<'a>(
        &'a self,
        package: &'a str,
        params: InitParams,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Query the latest version published for the package.
    fn request_version<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<String, StoreError>>;

    /// Make `version`'s manifest the active one. Failure leaves the
    /// previously active manifest in place.
    fn update_manifest<'a>(
        &'a self,
        package: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Plan the transfer of every selected file missing from the cache or
    /// failing its recorded checksum.
    fn create_downloader<'a>(
        &'a self,
        package: &'a str,
        selector: &'a DownloadSelector,
        options: DownloaderOptions,
    ) -> BoxFuture<'a, Result<Arc<Downloader>, StoreError>>;

    fn clear_cache_files<'a>(
        &'a self,
        package: &'a str,
        mode: ClearMode,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Bytes the package currently occupies on disk.
    fn local_size_bytes(&self, package: &str) -> u64;

    /// Deregister the package and free its in-memory state. Cached files stay.
    fn destroy<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}
