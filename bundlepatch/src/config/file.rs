//! Configuration file handling for ~/.bundlepatch/config.ini.
//!
//! Settings structs live here, parsing in [`super::parser`] and
//! serialization in [`super::writer`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::defaults::*;
use super::patch::PatchConfig;
use crate::package::{PackageInfo, PackageKind, PlayMode};

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

/// `[patch]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchSettings {
    pub play_mode: PlayMode,
    pub weak_network_fallback: bool,
    pub auto_configure_endpoints: bool,
    pub check_disk_space: bool,
    pub skip_download: bool,
    pub auto_begin_download: bool,
    pub transition_delay_ms: u64,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub max_concurrency: usize,
    pub failed_retry_count: u32,
    pub progress_interval_ms: u64,
    pub speed_sample_interval_ms: u64,
    pub request_timeout_secs: u64,
}

/// `[hosts]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSettings {
    pub host_server: String,
    pub fallback_host_server: String,
    pub product_name: String,
    pub platform: String,
    pub app_version: String,
}

/// `[packages]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSettings {
    pub kind: PackageKind,
    pub names: Vec<String>,
    /// Only used for DLC packages.
    pub dlc_version: String,
    pub without_platform: bool,
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub cache_dir: PathBuf,
    pub builtin_dir: PathBuf,
    pub kv_file: PathBuf,
    pub log_dir: PathBuf,
}

/// Contents of config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub patch: PatchSettings,
    pub download: DownloadSettings,
    pub hosts: HostSettings,
    pub packages: PackageSettings,
    pub storage: StorageSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            patch: PatchSettings {
                play_mode: PlayMode::default(),
                weak_network_fallback: DEFAULT_WEAK_NETWORK_FALLBACK,
                auto_configure_endpoints: DEFAULT_AUTO_CONFIGURE_ENDPOINTS,
                check_disk_space: DEFAULT_CHECK_DISK_SPACE,
                skip_download: DEFAULT_SKIP_DOWNLOAD,
                auto_begin_download: DEFAULT_AUTO_BEGIN_DOWNLOAD,
                transition_delay_ms: DEFAULT_TRANSITION_DELAY_MS,
            },
            download: DownloadSettings {
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                failed_retry_count: DEFAULT_FAILED_RETRY_COUNT,
                progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
                speed_sample_interval_ms: DEFAULT_SPEED_SAMPLE_INTERVAL_MS,
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            hosts: HostSettings {
                host_server: String::new(),
                fallback_host_server: String::new(),
                product_name: DEFAULT_PRODUCT_NAME.to_string(),
                platform: default_platform(),
                app_version: DEFAULT_APP_VERSION.to_string(),
            },
            packages: PackageSettings {
                kind: PackageKind::App,
                names: vec![DEFAULT_PACKAGE_NAME.to_string()],
                dlc_version: String::new(),
                without_platform: false,
            },
            storage: StorageSettings {
                cache_dir: default_cache_dir(),
                builtin_dir: default_builtin_dir(),
                kv_file: default_kv_file(),
                log_dir: crate::logging::default_log_dir(),
            },
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.bundlepatch/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        let path = config_file_path();
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    /// Orchestrator configuration described by this file.
    pub fn to_patch_config(&self) -> PatchConfig {
        PatchConfig::new(self.patch.play_mode)
            .with_hosts(&self.hosts.host_server, &self.hosts.fallback_host_server)
            .with_product(
                &self.hosts.product_name,
                &self.hosts.platform,
                &self.hosts.app_version,
            )
            .with_weak_network_fallback(self.patch.weak_network_fallback)
            .with_auto_configure_endpoints(self.patch.auto_configure_endpoints)
            .with_check_disk_space(self.patch.check_disk_space)
            .with_skip_download(self.patch.skip_download)
            .with_auto_begin_download(self.patch.auto_begin_download)
            .with_transition_delay(Duration::from_millis(self.patch.transition_delay_ms))
            .with_max_concurrency(self.download.max_concurrency)
            .with_failed_retry_count(self.download.failed_retry_count)
            .with_progress_interval(Duration::from_millis(self.download.progress_interval_ms))
            .with_speed_sample_interval(Duration::from_millis(
                self.download.speed_sample_interval_ms,
            ))
            .with_request_timeout(Duration::from_secs(self.download.request_timeout_secs))
            .with_storage(
                &self.storage.cache_dir,
                &self.storage.builtin_dir,
                &self.storage.kv_file,
            )
    }

    /// Package descriptors for the configured packages.
    pub fn package_infos(&self) -> Vec<PackageInfo> {
        let mode = self.patch.play_mode;
        self.packages
            .names
            .iter()
            .map(|name| match self.packages.kind {
                PackageKind::App => PackageInfo::app(name, mode),
                PackageKind::Dlc => {
                    let mut info = PackageInfo::dlc(name, mode, &self.packages.dlc_version);
                    if let PackageInfo::Dlc(ref mut dlc) = info {
                        dlc.without_platform = self.packages.without_platform;
                    }
                    info
                }
            })
            .collect()
    }
}

/// Get the path to the config directory (~/.bundlepatch).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bundlepatch")
}

/// Get the path to the config file (~/.bundlepatch/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
