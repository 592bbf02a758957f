//! Clear-cache command - remove cached package files without a patch run.

use clap::ValueEnum;

use bundlepatch::config::ConfigFile;
use bundlepatch::kv::{self, FileKeyValueStore};
use bundlepatch::store::{ClearMode, ClearReport, LocalCache, Manifest};

use super::common::format_size;
use crate::error::CliError;

/// Which cached files to remove.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ClearTarget {
    /// Files and manifests the last good version no longer references
    Unused,
    /// Every cached file and manifest
    All,
}

/// Run the clear-cache command.
pub fn run(file: &ConfigFile, target: ClearTarget) -> Result<(), CliError> {
    let config = file.to_patch_config();
    let cache = LocalCache::new(&config.cache_root);
    let kv = FileKeyValueStore::open(&config.kv_path)?;

    let mut total = ClearReport::default();
    for info in file.package_infos() {
        let package = info.name();
        let report = match target {
            ClearTarget::All => {
                let files = cache.clear(package, ClearMode::AllBundleFiles, None)?;
                let manifests = cache.clear(package, ClearMode::AllManifestFiles, None)?;
                combine(files, manifests)
            }
            ClearTarget::Unused => {
                let Some(manifest) = active_manifest(&cache, &kv, package)? else {
                    println!("{}: no recorded version, skipping", package);
                    continue;
                };
                let files = cache.clear(package, ClearMode::UnusedBundleFiles, Some(&manifest))?;
                let manifests =
                    cache.clear(package, ClearMode::UnusedManifestFiles, Some(&manifest))?;
                combine(files, manifests)
            }
        };

        println!(
            "{}: deleted {} files, freed {}",
            package,
            report.files_deleted,
            format_size(report.bytes_freed)
        );
        total = combine(total, report);
    }

    println!(
        "Deleted {} files, freed {}",
        total.files_deleted,
        format_size(total.bytes_freed)
    );
    Ok(())
}

/// Manifest of the last good version, if it is still cached.
fn active_manifest(
    cache: &LocalCache,
    kv: &FileKeyValueStore,
    package: &str,
) -> Result<Option<Manifest>, CliError> {
    let Some(version) = kv::last_version(kv, package) else {
        return Ok(None);
    };
    match cache.read_manifest(package, &version)? {
        Some(bytes) => Ok(Some(Manifest::parse(&bytes, package, &version)?)),
        None => Ok(None),
    }
}

fn combine(a: ClearReport, b: ClearReport) -> ClearReport {
    ClearReport {
        files_deleted: a.files_deleted + b.files_deleted,
        bytes_freed: a.bytes_freed + b.bytes_freed,
    }
}
