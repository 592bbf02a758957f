//! INI parsing: `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::{ConfigFile, ConfigFileError};
use crate::package::{PackageKind, PlayMode};

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [patch] section
    if let Some(section) = ini.section(Some("patch")) {
        if let Some(v) = section.get("play_mode") {
            config.patch.play_mode =
                v.parse::<PlayMode>()
                    .map_err(|_| ConfigFileError::InvalidValue {
                        section: "patch".to_string(),
                        key: "play_mode".to_string(),
                        value: v.to_string(),
                        reason: "must be one of: editor_simulate, offline, host, web_remote"
                            .to_string(),
                    })?;
        }
        if let Some(v) = section.get("weak_network_fallback") {
            config.patch.weak_network_fallback = parse_bool(v);
        }
        if let Some(v) = section.get("auto_configure_endpoints") {
            config.patch.auto_configure_endpoints = parse_bool(v);
        }
        if let Some(v) = section.get("check_disk_space") {
            config.patch.check_disk_space = parse_bool(v);
        }
        if let Some(v) = section.get("skip_download") {
            config.patch.skip_download = parse_bool(v);
        }
        if let Some(v) = section.get("auto_begin_download") {
            config.patch.auto_begin_download = parse_bool(v);
        }
        if let Some(v) = parse_number(section, "patch", "transition_delay_ms")? {
            config.patch.transition_delay_ms = v;
        }
    }

    // [download] section
    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = parse_number::<usize>(section, "download", "max_concurrency")? {
            if v == 0 {
                return Err(ConfigFileError::InvalidValue {
                    section: "download".to_string(),
                    key: "max_concurrency".to_string(),
                    value: v.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.download.max_concurrency = v;
        }
        if let Some(v) = parse_number(section, "download", "failed_retry_count")? {
            config.download.failed_retry_count = v;
        }
        if let Some(v) = parse_number(section, "download", "progress_interval_ms")? {
            config.download.progress_interval_ms = v;
        }
        if let Some(v) = parse_number(section, "download", "speed_sample_interval_ms")? {
            config.download.speed_sample_interval_ms = v;
        }
        if let Some(v) = parse_number(section, "download", "request_timeout_secs")? {
            config.download.request_timeout_secs = v;
        }
    }

    // [hosts] section
    if let Some(section) = ini.section(Some("hosts")) {
        if let Some(v) = section.get("host_server") {
            config.hosts.host_server = v.trim().to_string();
        }
        if let Some(v) = section.get("fallback_host_server") {
            config.hosts.fallback_host_server = v.trim().to_string();
        }
        if let Some(v) = non_empty(section.get("product_name")) {
            config.hosts.product_name = v;
        }
        if let Some(v) = non_empty(section.get("platform")) {
            config.hosts.platform = v;
        }
        if let Some(v) = non_empty(section.get("app_version")) {
            config.hosts.app_version = v;
        }
    }

    // [packages] section
    if let Some(section) = ini.section(Some("packages")) {
        if let Some(v) = section.get("kind") {
            config.packages.kind = match v.trim().to_lowercase().as_str() {
                "app" => PackageKind::App,
                "dlc" => PackageKind::Dlc,
                _ => {
                    return Err(ConfigFileError::InvalidValue {
                        section: "packages".to_string(),
                        key: "kind".to_string(),
                        value: v.to_string(),
                        reason: "must be 'app' or 'dlc'".to_string(),
                    });
                }
            };
        }
        if let Some(v) = section.get("names") {
            let names: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
            if names.is_empty() {
                return Err(ConfigFileError::InvalidValue {
                    section: "packages".to_string(),
                    key: "names".to_string(),
                    value: v.to_string(),
                    reason: "at least one package name is required".to_string(),
                });
            }
            config.packages.names = names;
        }
        if let Some(v) = section.get("dlc_version") {
            config.packages.dlc_version = v.trim().to_string();
        }
        if let Some(v) = section.get("without_platform") {
            config.packages.without_platform = parse_bool(v);
        }
    }

    // [storage] section
    if let Some(section) = ini.section(Some("storage")) {
        if let Some(v) = non_empty(section.get("cache_dir")) {
            config.storage.cache_dir = expand_tilde(&v);
        }
        if let Some(v) = non_empty(section.get("builtin_dir")) {
            config.storage.builtin_dir = expand_tilde(&v);
        }
        if let Some(v) = non_empty(section.get("kv_file")) {
            config.storage.kv_file = expand_tilde(&v);
        }
        if let Some(v) = non_empty(section.get("log_dir")) {
            config.storage.log_dir = expand_tilde(&v);
        }
    }

    Ok(config)
}

fn parse_number<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, ConfigFileError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigFileError::InvalidValue {
                section: section_name.to_string(),
                key: key.to_string(),
                value: v.to_string(),
                reason: "must be a non-negative integer".to_string(),
            }),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Parse a boolean setting. Anything but a true-ish word is false.
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_partial_config() {
        let config = parse("[download]\nfailed_retry_count = 7\n").unwrap();
        assert_eq!(config.download.failed_retry_count, 7);
        assert_eq!(config.download.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.patch.play_mode, PlayMode::Host);
    }

    #[test]
    fn test_invalid_play_mode() {
        let err = parse("[patch]\nplay_mode = cloud\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "patch");
                assert_eq!(key, "play_mode");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_number() {
        let err = parse("[download]\nmax_concurrency = many\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(parse("[download]\nmax_concurrency = 0\n").is_err());
    }

    #[test]
    fn test_packages_config() {
        let config = parse(
            "[packages]\nkind = DLC\nnames = maps, voices ,\ndlc_version = v4\nwithout_platform = yes\n",
        )
        .unwrap();
        assert_eq!(config.packages.kind, PackageKind::Dlc);
        assert_eq!(config.packages.names, vec!["maps", "voices"]);
        assert_eq!(config.packages.dlc_version, "v4");
        assert!(config.packages.without_platform);
    }

    #[test]
    fn test_empty_package_names_rejected() {
        assert!(parse("[packages]\nnames = ,\n").is_err());
    }

    #[test]
    fn test_empty_storage_values_keep_defaults() {
        let config = parse("[storage]\ncache_dir =\n").unwrap();
        assert_eq!(config.storage.cache_dir, default_cache_dir());
    }

    #[test]
    fn test_parse_bool_values() {
        for v in ["true", "1", "yes", "on", " TRUE "] {
            assert!(parse_bool(v), "{} should be true", v);
        }
        for v in ["false", "0", "no", "off", ""] {
            assert!(!parse_bool(v), "{} should be false", v);
        }
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/cache");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("cache"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }
}
