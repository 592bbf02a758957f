//! Persisted string-keyed storage.
//!
//! The patch pipeline records the last successfully applied version of each
//! package here, so that a later run can fall back to it when the network is
//! unavailable. The last download group the caller selected is kept here too.
//!
//! # Key Layout
//!
//! ```text
//! LAST_PACKAGE_VERSIONS:<package>  ->  "<version>"
//! LAST_GROUP_INFO                  ->  {"name": ..., "tags": [...], ...}
//! ```
//!
//! Values are flat strings. Implementations must be safe for interleaved
//! single-writer access from multiple threads.

mod file;
mod memory;
mod records;

use std::path::PathBuf;

use thiserror::Error;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;
pub use records::{
    delete_last_group, delete_last_version, last_group, last_version, last_version_key,
    save_last_group, save_last_version, LAST_GROUP_INFO_KEY, LAST_PACKAGE_VERSIONS_KEY,
};

/// Errors raised when persisting key-value data.
#[derive(Debug, Error)]
pub enum KvError {
    /// Reading or writing the backing file failed.
    #[error("Key-value store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The backing file or a stored value is not valid JSON.
    #[error("Key-value store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// String-keyed storage capability.
///
/// `get_string` never fails: a missing key yields `default`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, or `default` if the key is absent.
    fn get_string(&self, key: &str, default: &str) -> String;

    /// Insert or overwrite a value.
    fn save_string(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Remove a key. Removing an absent key succeeds.
    fn delete_key(&self, key: &str) -> Result<(), KvError>;

    /// Whether the key is present.
    fn has_key(&self, key: &str) -> bool;
}
