//! Patch orchestration.
//!
//! A patch run brings a set of packages up to date with their host:
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐   ┌────────────────┐
//! │ InitMode │──►│ Version  │──►│ ManifestUpdate│──►│CreateDownloader│
//! └──────────┘   │ Update   │   └───────────────┘   └───────┬────────┘
//!                └────┬─────┘                               │
//!                     │ host unreachable                    ▼
//!                     └──► last good versions        BeginDownload
//!                                                           │
//!                          Done ◄── ClearCache ◄── DownloadOver
//! ```
//!
//! [`PatchOrchestrator`] owns the state machine and exposes the commands
//! (`check`, `repair`, `retry_from`, `begin_download`, `cancel`). Storage is
//! abstracted behind [`PackageStore`](crate::store::PackageStore) and
//! everything observable is reported as a
//! [`PatchEvent`](crate::events::PatchEvent).

mod disk;
mod error;
mod flags;
mod orchestrator;
mod state;

pub use disk::{fits, DiskSpaceProbe, FixedDiskSpace, Fs2DiskProbe};
pub use error::PatchError;
pub use flags::{FlagsSnapshot, PatchFlags};
pub use orchestrator::{PatchOrchestrator, PatchOrchestratorBuilder, RunHandle, RunOutcome};
pub use state::PatchState;
