//! Default values for every configuration setting.

use std::path::PathBuf;

use super::file::config_directory;

// =============================================================================
// Patch pipeline
// =============================================================================

/// Pause between state transitions.
pub const DEFAULT_TRANSITION_DELAY_MS: u64 = 100;

/// Fall back to the last good versions when version lookup fails.
pub const DEFAULT_WEAK_NETWORK_FALLBACK: bool = true;

/// Derive host roots from the naming convention.
pub const DEFAULT_AUTO_CONFIGURE_ENDPOINTS: bool = true;

pub const DEFAULT_CHECK_DISK_SPACE: bool = true;
pub const DEFAULT_SKIP_DOWNLOAD: bool = false;
pub const DEFAULT_AUTO_BEGIN_DOWNLOAD: bool = false;

// =============================================================================
// Downloads
// =============================================================================

/// Concurrent file transfers per downloader.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Extra attempts per file after the first one fails.
pub const DEFAULT_FAILED_RETRY_COUNT: u32 = 3;

/// How often downloader progress is polled.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 100;

/// How often a throughput sample is emitted.
pub const DEFAULT_SPEED_SAMPLE_INTERVAL_MS: u64 = 1000;

/// Timeout for version and manifest requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Hosts and packages
// =============================================================================

pub const DEFAULT_PRODUCT_NAME: &str = "game";
pub const DEFAULT_APP_VERSION: &str = "1.0.0";
pub const DEFAULT_PACKAGE_NAME: &str = "DefaultPackage";

/// Platform segment used in host URLs for the current target.
pub fn default_platform() -> String {
    match std::env::consts::OS {
        "macos" => "mac".to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// Storage
// =============================================================================

pub const KV_FILE_NAME: &str = "state.json";

/// Default download cache root (`~/.cache/bundlepatch` on Linux).
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| config_directory().join("cache"))
        .join("bundlepatch")
}

/// Default root of the bundled packages used offline.
pub fn default_builtin_dir() -> PathBuf {
    config_directory().join("builtin")
}

/// Default key-value store file.
pub fn default_kv_file() -> PathBuf {
    config_directory().join(KV_FILE_NAME)
}
