//! Named subsets of a package's files.

use serde::{Deserialize, Serialize};

use crate::store::DownloadSelector;

/// A named selection of files targeted by one download pass.
///
/// Empty `tags` and `asset_names` select every file. `total_count` and
/// `total_bytes` describe the most recent plan and are overwritten, never
/// accumulated, each time downloaders are created for the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadGroup {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub asset_names: Vec<String>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub total_bytes: u64,
}

impl Default for DownloadGroup {
    fn default() -> Self {
        Self::new("default")
    }
}

impl DownloadGroup {
    /// Group selecting every file.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            asset_names: Vec::new(),
            total_count: 0,
            total_bytes: 0,
        }
    }

    pub fn with_tags(name: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            tags,
            ..Self::new(name)
        }
    }

    pub fn with_asset_names(name: impl Into<String>, asset_names: Vec<String>) -> Self {
        Self {
            asset_names,
            ..Self::new(name)
        }
    }

    /// Selector used when creating downloaders for this group.
    ///
    /// Asset names take precedence over tags.
    pub fn selector(&self) -> DownloadSelector {
        if !self.asset_names.is_empty() {
            DownloadSelector::by_asset_names(self.asset_names.clone())
        } else {
            DownloadSelector::by_tags(self.tags.clone())
        }
    }

    /// Zero the plan totals before a new plan is summed.
    pub fn reset_totals(&mut self) {
        self.total_count = 0;
        self.total_bytes = 0;
    }

    pub fn add_plan(&mut self, count: usize, bytes: u64) {
        self.total_count += count;
        self.total_bytes += bytes;
    }
}
