//! Configuration for the patch orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;
use crate::download::DownloaderOptions;
use crate::package::PlayMode;
use crate::store::HttpStoreConfig;

/// Runtime configuration of a [`PatchOrchestrator`](crate::patch::PatchOrchestrator).
#[derive(Debug, Clone, PartialEq)]
pub struct PatchConfig {
    /// Where package content comes from.
    pub play_mode: PlayMode,

    /// Use the last good versions when version lookup fails.
    pub weak_network_fallback: bool,

    /// Derive host roots from the naming convention instead of using
    /// `host_server` verbatim.
    pub auto_configure_endpoints: bool,

    /// Primary host server.
    pub host_server: String,

    /// Fallback host server. Empty disables fallback attempts.
    pub fallback_host_server: String,

    pub product_name: String,
    pub platform: String,
    pub app_version: String,

    /// Concurrent transfers per downloader.
    pub max_concurrency: usize,

    /// Extra attempts per file.
    pub failed_retry_count: u32,

    /// Refuse to download when the plan exceeds free disk space.
    pub check_disk_space: bool,

    /// Stop after planning unless running on fallback versions.
    pub skip_download: bool,

    /// Begin downloading without waiting for `begin_download()`.
    pub auto_begin_download: bool,

    /// Cancellable pause between state transitions.
    pub transition_delay: Duration,

    pub progress_interval: Duration,
    pub speed_sample_interval: Duration,

    /// Timeout for version and manifest requests.
    pub request_timeout: Duration,

    pub cache_root: PathBuf,
    pub builtin_root: PathBuf,
    pub kv_path: PathBuf,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            play_mode: PlayMode::default(),
            weak_network_fallback: DEFAULT_WEAK_NETWORK_FALLBACK,
            auto_configure_endpoints: DEFAULT_AUTO_CONFIGURE_ENDPOINTS,
            host_server: String::new(),
            fallback_host_server: String::new(),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            platform: default_platform(),
            app_version: DEFAULT_APP_VERSION.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            failed_retry_count: DEFAULT_FAILED_RETRY_COUNT,
            check_disk_space: DEFAULT_CHECK_DISK_SPACE,
            skip_download: DEFAULT_SKIP_DOWNLOAD,
            auto_begin_download: DEFAULT_AUTO_BEGIN_DOWNLOAD,
            transition_delay: Duration::from_millis(DEFAULT_TRANSITION_DELAY_MS),
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
            speed_sample_interval: Duration::from_millis(DEFAULT_SPEED_SAMPLE_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            cache_root: default_cache_dir(),
            builtin_root: default_builtin_dir(),
            kv_path: default_kv_file(),
        }
    }
}

impl PatchConfig {
    /// Create a configuration for the given mode with defaults elsewhere.
    pub fn new(play_mode: PlayMode) -> Self {
        Self {
            play_mode,
            ..Default::default()
        }
    }

    /// Set primary and fallback host servers.
    pub fn with_hosts(mut self, host: impl Into<String>, fallback: impl Into<String>) -> Self {
        self.host_server = host.into();
        self.fallback_host_server = fallback.into();
        self
    }

    /// Set the naming-convention inputs used when auto-configuring hosts.
    pub fn with_product(
        mut self,
        product_name: impl Into<String>,
        platform: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        self.product_name = product_name.into();
        self.platform = platform.into();
        self.app_version = app_version.into();
        self
    }

    pub fn with_auto_configure_endpoints(mut self, enabled: bool) -> Self {
        self.auto_configure_endpoints = enabled;
        self
    }

    pub fn with_weak_network_fallback(mut self, enabled: bool) -> Self {
        self.weak_network_fallback = enabled;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_failed_retry_count(mut self, retries: u32) -> Self {
        self.failed_retry_count = retries;
        self
    }

    pub fn with_check_disk_space(mut self, enabled: bool) -> Self {
        self.check_disk_space = enabled;
        self
    }

    pub fn with_skip_download(mut self, skip: bool) -> Self {
        self.skip_download = skip;
        self
    }

    pub fn with_auto_begin_download(mut self, auto: bool) -> Self {
        self.auto_begin_download = auto;
        self
    }

    pub fn with_transition_delay(mut self, delay: Duration) -> Self {
        self.transition_delay = delay;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_speed_sample_interval(mut self, interval: Duration) -> Self {
        self.speed_sample_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set cache, bundled-package and key-value store locations.
    pub fn with_storage(
        mut self,
        cache_root: impl Into<PathBuf>,
        builtin_root: impl Into<PathBuf>,
        kv_path: impl Into<PathBuf>,
    ) -> Self {
        self.cache_root = cache_root.into();
        self.builtin_root = builtin_root.into();
        self.kv_path = kv_path.into();
        self
    }

    /// Downloader options, with optional per-run overrides.
    pub fn downloader_options(
        &self,
        concurrency: Option<usize>,
        retry_budget: Option<u32>,
    ) -> DownloaderOptions {
        DownloaderOptions::new(
            concurrency.unwrap_or(self.max_concurrency),
            retry_budget.unwrap_or(self.failed_retry_count),
        )
        .with_progress_interval(self.progress_interval)
    }

    /// Configuration for the bundled HTTP store.
    pub fn store_config(&self) -> HttpStoreConfig {
        HttpStoreConfig::new(self.cache_root.clone(), self.builtin_root.clone())
            .with_timeout(self.request_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PatchConfig::default();
        assert_eq!(config.play_mode, PlayMode::Host);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.failed_retry_count, 3);
        assert_eq!(config.transition_delay, Duration::from_millis(100));
        assert!(config.weak_network_fallback);
        assert!(!config.auto_begin_download);
    }

    #[test]
    fn test_builder_pattern() {
        let config = PatchConfig::new(PlayMode::WebRemote)
            .with_hosts("https://cdn.example.com", "https://backup.example.com")
            .with_product("game", "android", "2.1.0")
            .with_max_concurrency(4)
            .with_failed_retry_count(1)
            .with_transition_delay(Duration::ZERO)
            .with_storage("/tmp/cache", "/tmp/builtin", "/tmp/kv.json");

        assert_eq!(config.play_mode, PlayMode::WebRemote);
        assert_eq!(config.fallback_host_server, "https://backup.example.com");
        assert_eq!(config.platform, "android");
        assert_eq!(config.transition_delay, Duration::ZERO);
        assert_eq!(config.kv_path, PathBuf::from("/tmp/kv.json"));
    }

    #[test]
    fn test_downloader_options_overrides() {
        let config = PatchConfig::default()
            .with_max_concurrency(6)
            .with_progress_interval(Duration::from_millis(20));

        let defaults = config.downloader_options(None, None);
        assert_eq!(defaults.concurrency, 6);
        assert_eq!(defaults.retry_budget, 3);
        assert_eq!(defaults.progress_interval, Duration::from_millis(20));

        let overridden = config.downloader_options(Some(2), Some(0));
        assert_eq!(overridden.concurrency, 2);
        assert_eq!(overridden.retry_budget, 0);
    }

    #[test]
    fn test_store_config_carries_storage() {
        let config = PatchConfig::default()
            .with_storage("/c", "/b", "/k.json")
            .with_request_timeout(Duration::from_secs(5));
        let store = config.store_config();
        assert_eq!(store.cache_root, PathBuf::from("/c"));
        assert_eq!(store.builtin_root, PathBuf::from("/b"));
        assert_eq!(store.timeout, Duration::from_secs(5));
    }
}
