use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by [`PatchOrchestrator`](super::PatchOrchestrator) runs.
///
/// Recoverable failures are reported as events and halt the run instead.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The package list or settings cannot be used. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A run is already in progress.
    #[error("A patch run is already in progress")]
    AlreadyRunning,

    /// The driver task panicked or was aborted.
    #[error("Patch driver failed: {0}")]
    Internal(String),
}
