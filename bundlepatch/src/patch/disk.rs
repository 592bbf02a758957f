//! Free disk space queries.

use std::path::Path;

use tracing::debug;

/// Reports free space on the volume holding a path.
pub trait DiskSpaceProbe: Send + Sync {
    /// Available megabytes, or `None` if the platform cannot tell.
    fn available_mb(&self, path: &Path) -> Option<u64>;
}

/// Queries the filesystem through `fs2`.
///
/// When `path` does not exist yet, its nearest existing ancestor is queried.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fs2DiskProbe;

impl DiskSpaceProbe for Fs2DiskProbe {
    fn available_mb(&self, path: &Path) -> Option<u64> {
        let existing = path.ancestors().find(|p| p.exists())?;
        match fs2::available_space(existing) {
            Ok(bytes) => Some(bytes / (1 << 20)),
            Err(e) => {
                debug!(path = %existing.display(), error = %e, "Disk space query failed");
                None
            }
        }
    }
}

/// Fixed answer, for tests and sandboxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDiskSpace(pub Option<u64>);

impl DiskSpaceProbe for FixedDiskSpace {
    fn available_mb(&self, _path: &Path) -> Option<u64> {
        self.0
    }
}

/// True when `required_bytes` fits into `available_mb`.
///
/// Required bytes are truncated to whole megabytes before comparing.
pub fn fits(required_bytes: u64, available_mb: u64) -> bool {
    required_bytes / (1 << 20) <= available_mb
}
