//! INI serialization: `ConfigFile` → commented INI string.

use std::path::Path;

use super::file::ConfigFile;
use crate::package::PackageKind;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let kind = match config.packages.kind {
        PackageKind::App => "app",
        PackageKind::Dlc => "dlc",
    };

    format!(
        r#"[patch]
; Where package content comes from:
;   editor_simulate - simulate locally, no network and no cache
;   offline         - use packages bundled with the application
;   host            - download from the configured host (default)
;   web_remote      - web hosted, free disk space is not checked
play_mode = {}
; Use the last successfully applied versions when the host is unreachable
weak_network_fallback = {}
; Derive host URLs from product, platform and version (see [hosts])
auto_configure_endpoints = {}
; Refuse to download when free disk space is below the download size
check_disk_space = {}
; Stop after computing the download size (fallback runs still download)
skip_download = {}
; Start downloading without asking for confirmation
auto_begin_download = {}
; Pause between pipeline steps in milliseconds
transition_delay_ms = {}

[download]
; Concurrent file transfers per package
max_concurrency = {}
; Extra attempts per file; attempts alternate primary and fallback host
failed_retry_count = {}
; Progress polling interval in milliseconds
progress_interval_ms = {}
; Download speed sampling interval in milliseconds
speed_sample_interval_ms = {}
; Timeout for version and manifest requests in seconds
request_timeout_secs = {}

[hosts]
; Primary and fallback host servers
host_server = {}
fallback_host_server = {}
; Naming convention inputs:
;   app: {{host}}/{{product}}/{{platform}}/{{app_version}}/{{package}}
;   dlc: {{host}}/{{product}}/{{platform}}/DLC/{{package}}/{{dlc_version}}
product_name = {}
platform = {}
app_version = {}

[packages]
; Package kind for every listed package: app or dlc
kind = {}
; Comma-separated package names
names = {}
; DLC version (dlc packages only)
dlc_version = {}
; Omit the platform segment from DLC host URLs
without_platform = {}

[storage]
cache_dir = {}
builtin_dir = {}
kv_file = {}
log_dir = {}
"#,
        config.patch.play_mode,
        config.patch.weak_network_fallback,
        config.patch.auto_configure_endpoints,
        config.patch.check_disk_space,
        config.patch.skip_download,
        config.patch.auto_begin_download,
        config.patch.transition_delay_ms,
        config.download.max_concurrency,
        config.download.failed_retry_count,
        config.download.progress_interval_ms,
        config.download.speed_sample_interval_ms,
        config.download.request_timeout_secs,
        config.hosts.host_server,
        config.hosts.fallback_host_server,
        config.hosts.product_name,
        config.hosts.platform,
        config.hosts.app_version,
        kind,
        config.packages.names.join(", "),
        config.packages.dlc_version,
        config.packages.without_platform,
        path_to_string(&config.storage.cache_dir),
        path_to_string(&config.storage.builtin_dir),
        path_to_string(&config.storage.kv_file),
        path_to_string(&config.storage.log_dir),
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
