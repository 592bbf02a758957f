//! States of the patch pipeline.

use std::fmt;

/// One step of a patch run, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchState {
    /// Clear every cached file before checking again.
    Repair,
    /// Bookkeeping before a check.
    Prepare,
    /// Register and initialize every package.
    InitMode,
    /// Resolve the version of every package.
    VersionUpdate,
    /// Apply the manifest of every resolved version.
    ManifestUpdate,
    /// Plan the downloads.
    CreateDownloader,
    /// Run the planned downloads.
    BeginDownload,
    /// Record on-disk sizes after downloading.
    DownloadOver,
    /// Remove files the active manifests no longer reference.
    ClearCache,
    /// The run finished.
    Done,
}

impl PatchState {
    pub const ALL: [PatchState; 10] = [
        PatchState::Repair,
        PatchState::Prepare,
        PatchState::InitMode,
        PatchState::VersionUpdate,
        PatchState::ManifestUpdate,
        PatchState::CreateDownloader,
        PatchState::BeginDownload,
        PatchState::DownloadOver,
        PatchState::ClearCache,
        PatchState::Done,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PatchState::Repair => "Repair",
            PatchState::Prepare => "Prepare",
            PatchState::InitMode => "InitMode",
            PatchState::VersionUpdate => "VersionUpdate",
            PatchState::ManifestUpdate => "ManifestUpdate",
            PatchState::CreateDownloader => "CreateDownloader",
            PatchState::BeginDownload => "BeginDownload",
            PatchState::DownloadOver => "DownloadOver",
            PatchState::ClearCache => "ClearCache",
            PatchState::Done => "Done",
        }
    }
}

impl fmt::Display for PatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
