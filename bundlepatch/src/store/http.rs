//! HTTP-backed package store.
//!
//! Remote layout below each package's host root:
//!
//! ```text
//! {host_root}/
//! ├── {package}.version          plain text, current version
//! ├── {package}_{version}.json   manifest (optionally encrypted)
//! └── <file names from the manifest>
//! ```
//!
//! The bundled layout used in `Offline` mode mirrors it under
//! `{builtin_root}/{package}/`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::cache::LocalCache;
use super::decrypt::{Decryptor, NoDecryption};
use super::manifest::{Manifest, ManifestEntry};
use super::{BoxFuture, ClearMode, DownloadSelector, InitParams, PackageStore, StoreError};
use crate::download::{
    DownloadTask, Downloader, DownloaderOptions, FileTransfer, HttpFileTransfer,
    DEFAULT_TIMEOUT_SECS,
};
use crate::package::{file_url, manifest_file_name, version_file_name, HostEndpoints, PlayMode};

/// Version reported for every package in `EditorSimulate` mode.
pub const SIMULATED_VERSION: &str = "simulate";

/// Configuration for [`HttpPackageStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Root of the download cache.
    pub cache_root: PathBuf,
    /// Root of the bundled packages used in `Offline` mode.
    pub builtin_root: PathBuf,
    /// Timeout for version and manifest requests.
    pub timeout: Duration,
}

impl HttpStoreConfig {
    pub fn new(cache_root: impl Into<PathBuf>, builtin_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            builtin_root: builtin_root.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Default, Clone)]
struct PackageSlot {
    params: Option<InitParams>,
    manifest: Option<Manifest>,
}

/// [`PackageStore`] that resolves versions and manifests over HTTP and keeps
/// files in a [`LocalCache`].
pub struct HttpPackageStore {
    config: HttpStoreConfig,
    client: Client,
    transfer: Arc<dyn FileTransfer>,
    decryptor: Arc<dyn Decryptor>,
    cache: LocalCache,
    packages: DashMap<String, PackageSlot>,
}

impl HttpPackageStore {
    /// Create a store with HTTP transfers and no manifest decryption.
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Network {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        let transfer = Arc::new(HttpFileTransfer::with_client(client.clone(), config.timeout));
        Ok(Self::with_parts(config, client, transfer, Arc::new(NoDecryption)))
    }

    /// Create a store from explicit parts.
    pub fn with_parts(
        config: HttpStoreConfig,
        client: Client,
        transfer: Arc<dyn FileTransfer>,
        decryptor: Arc<dyn Decryptor>,
    ) -> Self {
        let cache = LocalCache::new(config.cache_root.clone());
        Self {
            config,
            client,
            transfer,
            decryptor,
            cache,
            packages: DashMap::new(),
        }
    }

    /// Replace the manifest decryptor.
    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Version of the active manifest, if any.
    pub fn active_version(&self, package: &str) -> Option<String> {
        self.packages
            .get(package)
            .and_then(|slot| slot.manifest.as_ref().map(|m| m.version.clone()))
    }

    fn params(&self, package: &str) -> Result<InitParams, StoreError> {
        let slot = self
            .packages
            .get(package)
            .ok_or_else(|| StoreError::NotRegistered(package.to_string()))?;
        slot.params
            .clone()
            .ok_or_else(|| StoreError::NotInitialized(package.to_string()))
    }

    fn active_manifest(&self, package: &str) -> Result<Option<Manifest>, StoreError> {
        self.packages
            .get(package)
            .map(|slot| slot.manifest.clone())
            .ok_or_else(|| StoreError::NotRegistered(package.to_string()))
    }

    fn builtin_path(&self, package: &str, file_name: &str) -> PathBuf {
        self.config.builtin_root.join(package).join(file_name)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        let network = |reason: String| StoreError::Network {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(network(format!("GET request failed with status {}", status)));
        }
        let bytes = response.bytes().await.map_err(|e| network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// GET `file_name` from each endpoint in order until one answers.
    async fn get_from_endpoints(
        &self,
        endpoints: &HostEndpoints,
        file_name: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let mut last_err = None;
        for root in endpoints.ordered() {
            let url = file_url(root, file_name);
            match self.get_bytes(&url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    debug!(url = %url, error = %e, "Endpoint request failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Network {
            url: file_name.to_string(),
            reason: "no endpoints configured".to_string(),
        }))
    }

    async fn read_builtin(&self, package: &str, file_name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.builtin_path(package, file_name);
        tokio::fs::read(&path)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }

    async fn load_manifest(
        &self,
        package: &str,
        version: &str,
        params: &InitParams,
    ) -> Result<Manifest, StoreError> {
        if params.play_mode == PlayMode::EditorSimulate {
            return Ok(Manifest::empty(package, version));
        }

        let cache = self.cache.clone();
        let (pkg, ver) = (package.to_string(), version.to_string());
        let cached = run_blocking(move || cache.read_manifest(&pkg, &ver)).await?;
        if let Some(bytes) = cached {
            match Manifest::parse(&bytes, package, version) {
                Ok(manifest) => {
                    debug!(package, version, "Using cached manifest");
                    return Ok(manifest);
                }
                Err(e) => warn!(package, version, error = %e, "Discarding unreadable cached manifest"),
            }
        }

        let name = manifest_file_name(package, version);
        let raw = if params.play_mode.is_remote() {
            self.get_from_endpoints(&params.endpoints, &name).await?
        } else {
            self.read_builtin(package, &name).await?
        };
        let plain = self.decryptor.decrypt(raw)?;
        let manifest = Manifest::parse(&plain, package, version)?;

        let cache = self.cache.clone();
        let to_save = manifest.clone();
        run_blocking(move || cache.write_manifest(&to_save)).await?;
        Ok(manifest)
    }
}

impl PackageStore for HttpPackageStore {
    fn register_package(&self, package: &str) -> Result<(), StoreError> {
        self.packages.entry(package.to_string()).or_default();
        Ok(())
    }

    fn initialize<'a>(
        &'a self,
        package: &'a str,
        params: InitParams,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if !self.packages.contains_key(package) {
                return Err(StoreError::NotRegistered(package.to_string()));
            }
            if params.play_mode != PlayMode::EditorSimulate {
                let cache = self.cache.clone();
                let pkg = package.to_string();
                run_blocking(move || cache.ensure_package_dirs(&pkg)).await?;
            }
            info!(
                package,
                mode = %params.play_mode,
                host = %params.endpoints.primary,
                "Package initialized"
            );
            if let Some(mut slot) = self.packages.get_mut(package) {
                slot.params = Some(params);
            }
            Ok(())
        })
    }

    fn request_version<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<String, StoreError>> {
        Box::pin(async move {
            let params = self.params(package)?;
            let name = version_file_name(package);
            let raw = match params.play_mode {
                PlayMode::EditorSimulate => return Ok(SIMULATED_VERSION.to_string()),
                PlayMode::Offline => self.read_builtin(package, &name).await?,
                PlayMode::Host | PlayMode::WebRemote => {
                    self.get_from_endpoints(&params.endpoints, &name).await?
                }
            };
            let version = String::from_utf8_lossy(&raw).trim().to_string();
            if version.is_empty() {
                return Err(StoreError::ManifestParse {
                    package: package.to_string(),
                    reason: "empty version file".to_string(),
                });
            }
            debug!(package, version = %version, "Resolved package version");
            Ok(version)
        })
    }

    fn update_manifest<'a>(
        &'a self,
        package: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let params = self.params(package)?;
            let manifest = self.load_manifest(package, version, &params).await?;
            info!(
                package,
                version,
                files = manifest.files.len(),
                bytes = manifest.total_bytes(),
                "Manifest activated"
            );
            if let Some(mut slot) = self.packages.get_mut(package) {
                slot.manifest = Some(manifest);
            }
            Ok(())
        })
    }

    fn create_downloader<'a>(
        &'a self,
        package: &'a str,
        selector: &'a DownloadSelector,
        options: DownloaderOptions,
    ) -> BoxFuture<'a, Result<Arc<Downloader>, StoreError>> {
        Box::pin(async move {
            let params = self.params(package)?;
            let manifest = self
                .active_manifest(package)?
                .ok_or_else(|| StoreError::NoActiveManifest(package.to_string()))?;

            // Bundled packages never download.
            let tasks: Vec<DownloadTask> = if params.play_mode.is_remote() {
                let selected: Vec<ManifestEntry> = manifest
                    .files
                    .into_iter()
                    .filter(|entry| selector.matches(entry))
                    .collect();
                let cache = self.cache.clone();
                let owner = package.to_string();
                run_blocking(move || {
                    Ok(selected
                        .into_iter()
                        .filter(|entry| cache.needs_download(&owner, entry))
                        .map(|entry| DownloadTask {
                            dest: cache.file_path(&owner, &entry.name),
                            file_name: entry.name,
                            size: entry.size,
                            sha256: entry.sha256,
                        })
                        .collect::<Vec<_>>())
                })
                .await?
            } else {
                Vec::new()
            };

            debug!(
                package,
                files = tasks.len(),
                bytes = tasks.iter().map(|t| t.size).sum::<u64>(),
                "Download plan created"
            );
            Ok(Arc::new(Downloader::new(
                package,
                tasks,
                params.endpoints,
                Arc::clone(&self.transfer),
                options,
            )))
        })
    }

    fn clear_cache_files<'a>(
        &'a self,
        package: &'a str,
        mode: ClearMode,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let active = self.active_manifest(package)?;
            let cache = self.cache.clone();
            let pkg = package.to_string();
            run_blocking(move || cache.clear(&pkg, mode, active.as_ref())).await?;
            Ok(())
        })
    }

    fn local_size_bytes(&self, package: &str) -> u64 {
        match self.params(package) {
            // Simulated packages report a token size so groups are never empty.
            Ok(params) if params.play_mode == PlayMode::EditorSimulate => 1,
            Ok(_) => self.cache.package_size(package),
            Err(_) => 0,
        }
    }

    fn destroy<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            match self.packages.remove(package) {
                Some(_) => {
                    debug!(package, "Package destroyed");
                    Ok(())
                }
                None => Err(StoreError::NotRegistered(package.to_string())),
            }
        })
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io {
            path: PathBuf::new(),
            source: std::io::Error::other(e.to_string()),
        })?
}
