//! On-disk cache layout for downloaded packages.
//!
//! ```text
//! {root}/
//! └── {package}/
//!     ├── files/                 bundle files, paths as named in the manifest
//!     └── manifests/
//!         └── {package}_{version}.json
//! ```
//!
//! All functions here are blocking; async callers wrap them in
//! `spawn_blocking`.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::manifest::{Manifest, ManifestEntry};
use super::{ClearMode, StoreError};
use crate::download::verify_checksum;
use crate::package::manifest_file_name;

/// Result of a cache clearing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub files_deleted: usize,
    pub bytes_freed: u64,
}

/// Local cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.root.join(package)
    }

    pub fn files_dir(&self, package: &str) -> PathBuf {
        self.package_dir(package).join("files")
    }

    pub fn manifests_dir(&self, package: &str) -> PathBuf {
        self.package_dir(package).join("manifests")
    }

    pub fn file_path(&self, package: &str, file_name: &str) -> PathBuf {
        self.files_dir(package).join(file_name)
    }

    pub fn manifest_path(&self, package: &str, version: &str) -> PathBuf {
        self.manifests_dir(package)
            .join(manifest_file_name(package, version))
    }

    /// Create the package's directories.
    pub fn ensure_package_dirs(&self, package: &str) -> Result<(), StoreError> {
        for dir in [self.files_dir(package), self.manifests_dir(package)] {
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Cached manifest bytes for `version`, if present.
    pub fn read_manifest(&self, package: &str, version: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.manifest_path(package, version);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let path = self.manifest_path(&manifest.package, &manifest.version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, manifest.to_json()?).map_err(|source| StoreError::Io { path, source })
    }

    /// Whether `entry` is missing from the cache, has the wrong size or
    /// fails its recorded checksum.
    pub fn needs_download(&self, package: &str, entry: &ManifestEntry) -> bool {
        let path = self.file_path(package, &entry.name);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() == entry.size => {}
            _ => return true,
        }

        match &entry.sha256 {
            Some(expected) => match verify_checksum(&path, expected) {
                Ok(()) => false,
                Err(e) => {
                    debug!(package, file = %entry.name, error = %e, "Cached file failed verification");
                    true
                }
            },
            None => false,
        }
    }

    /// Remove cached files of `package` according to `mode`.
    ///
    /// The `Unused*` modes keep what `active` references and do nothing when
    /// no manifest is active.
    pub fn clear(
        &self,
        package: &str,
        mode: ClearMode,
        active: Option<&Manifest>,
    ) -> Result<ClearReport, StoreError> {
        let report = match mode {
            ClearMode::AllBundleFiles => remove_tree_contents(&self.files_dir(package))?,
            ClearMode::AllManifestFiles => remove_tree_contents(&self.manifests_dir(package))?,
            ClearMode::UnusedBundleFiles => match active {
                Some(manifest) => {
                    let keep = manifest.file_names();
                    self.remove_files_not_in(package, &keep)?
                }
                None => ClearReport::default(),
            },
            ClearMode::UnusedManifestFiles => match active {
                Some(manifest) => {
                    let keep = manifest_file_name(package, &manifest.version);
                    remove_siblings_except(&self.manifests_dir(package), &keep)?
                }
                None => ClearReport::default(),
            },
        };

        if report.files_deleted > 0 {
            info!(
                package,
                mode = ?mode,
                files_deleted = report.files_deleted,
                bytes_freed = report.bytes_freed,
                "Cleared cached files"
            );
        }
        Ok(report)
    }

    /// Bytes used by `package`, or 0 if its directory cannot be read.
    pub fn package_size(&self, package: &str) -> u64 {
        let dir = self.package_dir(package);
        match dir_size_bytes(&dir) {
            Ok(size) => size,
            Err(e) => {
                debug!(path = %dir.display(), error = %e, "Could not size package directory");
                0
            }
        }
    }

    fn remove_files_not_in(
        &self,
        package: &str,
        keep: &HashSet<&str>,
    ) -> Result<ClearReport, StoreError> {
        let files_dir = self.files_dir(package);
        let mut files = Vec::new();
        collect_files_recursive(&files_dir, &mut files);

        let mut report = ClearReport::default();
        for (path, size) in files {
            let relative = match path.strip_prefix(&files_dir) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if keep.contains(relative.as_str()) {
                continue;
            }
            remove_file(&path, size, &mut report)?;
        }
        Ok(report)
    }
}

/// Recursive size of every regular file under `path`.
pub fn dir_size_bytes(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size_bytes(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

fn collect_files_recursive(dir: &Path, out: &mut Vec<(PathBuf, u64)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.metadata() {
            Ok(meta) if meta.is_dir() => collect_files_recursive(&path, out),
            Ok(meta) => out.push((path, meta.len())),
            Err(_) => {}
        }
    }
}

fn remove_file(path: &Path, size: u64, report: &mut ClearReport) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => {
            report.files_deleted += 1;
            report.bytes_freed += size;
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn remove_tree_contents(dir: &Path) -> Result<ClearReport, StoreError> {
    let mut files = Vec::new();
    collect_files_recursive(dir, &mut files);

    let mut report = ClearReport::default();
    for (path, size) in files {
        remove_file(&path, size, &mut report)?;
    }
    cleanup_empty_dirs(dir);
    Ok(report)
}

fn remove_siblings_except(dir: &Path, keep: &str) -> Result<ClearReport, StoreError> {
    let mut report = ClearReport::default();
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(report);
    };
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy() == keep {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.is_file() {
                remove_file(&entry.path(), meta.len(), &mut report)?;
            }
        }
    }
    Ok(report)
}

/// Remove empty subdirectories of `dir`, keeping `dir` itself.
fn cleanup_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            cleanup_empty_dirs(&path);
            let _ = fs::remove_dir(&path);
        }
    }
}
