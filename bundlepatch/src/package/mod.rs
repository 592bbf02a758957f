//! Resource package identity and host naming.
//!
//! A package is a named, independently versioned set of downloadable files.
//! Two kinds exist:
//!
//! - **App** packages ship with a build of the application and are hosted
//!   under the application version.
//! - **DLC** packages are versioned on their own and may carry explicit
//!   host endpoints.
//!
//! # Type Hierarchy
//!
//! ```text
//! PackageInfo
//! ├── App(AppPackageInfo)  ── name, play_mode
//! └── Dlc(DlcPackageInfo)  ── name, play_mode, dlc_version,
//!                             without_platform, host_server,
//!                             fallback_host_server
//! ```
//!
//! Host URLs for both kinds are produced by the functions in `naming`
//! when endpoint auto-configuration is enabled.

mod info;
mod naming;

pub use info::{AppPackageInfo, DlcPackageInfo, HostEndpoints, PackageInfo, PackageKind, PlayMode};
pub use naming::{app_host_url, dlc_host_url, file_url, manifest_file_name, version_file_name};
