//! Typed notifications emitted by the patch pipeline.
//!
//! The orchestrator reports everything observable through one [`EventSink`].
//! Sinks must not block: [`ChannelSink`] forwards into an unbounded tokio
//! channel so a UI task can consume events at its own pace.

use std::fmt;

use tokio::sync::mpsc;

use crate::download::SpeedSample;
use crate::patch::PatchState;

/// Something observable happened during a patch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchEvent {
    /// The state machine entered a state.
    StateChanged(PatchState),
    /// Clearing the cache during repair failed for at least one package.
    RepairFailed,
    /// Registering or initializing a package failed.
    InitFailed,
    /// No usable version could be resolved.
    VersionUpdateFailed,
    /// Applying a resolved manifest failed.
    ManifestUpdateFailed,
    /// Run-wide download progress.
    DownloadProgression(SpeedSample),
    /// A file exhausted its retry budget.
    DownloadFailed { file_name: String, error: String },
    /// Not enough free disk space for the download plan.
    DiskNotEnoughSpace { available_mb: u64, required_bytes: u64 },
    /// The caller canceled the run.
    DownloadCanceled,
    /// The run reached `Done`.
    PatchDone,
}

impl PatchEvent {
    /// True for events that halt the run until the caller retries.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PatchEvent::RepairFailed
                | PatchEvent::InitFailed
                | PatchEvent::VersionUpdateFailed
                | PatchEvent::ManifestUpdateFailed
                | PatchEvent::DiskNotEnoughSpace { .. }
        )
    }
}

impl fmt::Display for PatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchEvent::StateChanged(state) => write!(f, "state changed to {}", state),
            PatchEvent::RepairFailed => write!(f, "repair failed"),
            PatchEvent::InitFailed => write!(f, "package initialization failed"),
            PatchEvent::VersionUpdateFailed => write!(f, "version update failed"),
            PatchEvent::ManifestUpdateFailed => write!(f, "manifest update failed"),
            PatchEvent::DownloadProgression(s) => write!(
                f,
                "downloaded {}/{} files, {}/{} bytes",
                s.current_count, s.total_count, s.current_bytes, s.total_bytes
            ),
            PatchEvent::DownloadFailed { file_name, error } => {
                write!(f, "download of {} failed: {}", file_name, error)
            }
            PatchEvent::DiskNotEnoughSpace {
                available_mb,
                required_bytes,
            } => write!(
                f,
                "not enough disk space: {} MB available, {} bytes required",
                available_mb, required_bytes
            ),
            PatchEvent::DownloadCanceled => write!(f, "download canceled"),
            PatchEvent::PatchDone => write!(f, "patch done"),
        }
    }
}

/// Receiver of [`PatchEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PatchEvent);
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PatchEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PatchEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PatchEvent) {}
}

/// Adapts a closure into an [`EventSink`].
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(PatchEvent) + Send + Sync,
{
    fn emit(&self, event: PatchEvent) {
        (self.0)(event)
    }
}
