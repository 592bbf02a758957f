//! Package manifest documents.
//!
//! A manifest lists every file of one package version:
//!
//! ```text
//! {
//!   "package": "core",
//!   "version": "42",
//!   "files": [
//!     { "name": "ui_main.bundle", "size": 10240, "sha256": "ab..",
//!       "tags": ["ui"], "assets": ["MainMenu.prefab"] }
//!   ]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::StoreError;

/// One file listed in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub assets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub package: String,
    pub version: String,
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Empty manifest, used in simulate mode.
    pub fn empty(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            files: Vec::new(),
        }
    }

    /// Parse and validate a manifest for `package` at `version`.
    pub fn parse(bytes: &[u8], package: &str, version: &str) -> Result<Self, StoreError> {
        let manifest: Manifest =
            serde_json::from_slice(bytes).map_err(|e| StoreError::ManifestParse {
                package: package.to_string(),
                reason: e.to_string(),
            })?;
        manifest.validate(package, version)?;
        Ok(manifest)
    }

    fn validate(&self, package: &str, version: &str) -> Result<(), StoreError> {
        let fail = |reason: String| StoreError::ManifestParse {
            package: package.to_string(),
            reason,
        };

        if self.package != package {
            return Err(fail(format!("manifest belongs to '{}'", self.package)));
        }
        if self.version != version {
            return Err(fail(format!(
                "expected version '{}', found '{}'",
                version, self.version
            )));
        }

        let mut seen = HashSet::new();
        for entry in &self.files {
            if !is_safe_file_name(&entry.name) {
                return Err(fail(format!("unsafe file name '{}'", entry.name)));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(fail(format!("duplicate file '{}'", entry.name)));
            }
        }
        Ok(())
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Names of all files, for cache reconciliation.
    pub fn file_names(&self) -> HashSet<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(self).map_err(|e| StoreError::ManifestParse {
            package: self.package.clone(),
            reason: e.to_string(),
        })
    }
}

/// Relative, non-empty and free of parent or absolute components.
fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && !name.contains('\\')
        && name.split('/').all(|part| !part.is_empty() && part != "..")
}
