//! Typed records layered over [`KeyValueStore`].

use tracing::warn;

use super::{KeyValueStore, KvError};
use crate::download::DownloadGroup;

/// Namespace of the per-package last-good-version records.
pub const LAST_PACKAGE_VERSIONS_KEY: &str = "LAST_PACKAGE_VERSIONS";

/// Key of the last selected download group.
pub const LAST_GROUP_INFO_KEY: &str = "LAST_GROUP_INFO";

/// Key holding the last good version of `package`.
pub fn last_version_key(package: &str) -> String {
    format!("{}:{}", LAST_PACKAGE_VERSIONS_KEY, package)
}

/// Last successfully applied version of `package`, if one was recorded.
pub fn last_version(kv: &dyn KeyValueStore, package: &str) -> Option<String> {
    let value = kv.get_string(&last_version_key(package), "");
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Record `version` as the last good version of `package`.
pub fn save_last_version(
    kv: &dyn KeyValueStore,
    package: &str,
    version: &str,
) -> Result<(), KvError> {
    kv.save_string(&last_version_key(package), version)
}

/// Forget the last good version of `package`.
pub fn delete_last_version(kv: &dyn KeyValueStore, package: &str) -> Result<(), KvError> {
    kv.delete_key(&last_version_key(package))
}

/// Last download group the caller ran, if any.
///
/// A stored value that no longer parses is logged and treated as absent.
pub fn last_group(kv: &dyn KeyValueStore) -> Option<DownloadGroup> {
    let raw = kv.get_string(LAST_GROUP_INFO_KEY, "");
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(&raw) {
        Ok(group) => Some(group),
        Err(e) => {
            warn!(error = %e, "Discarding unreadable last group record");
            None
        }
    }
}

pub fn save_last_group(kv: &dyn KeyValueStore, group: &DownloadGroup) -> Result<(), KvError> {
    let json = serde_json::to_string(group)?;
    kv.save_string(LAST_GROUP_INFO_KEY, &json)
}

pub fn delete_last_group(kv: &dyn KeyValueStore) -> Result<(), KvError> {
    kv.delete_key(LAST_GROUP_INFO_KEY)
}
