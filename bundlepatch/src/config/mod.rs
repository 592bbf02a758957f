//! Configuration for the patch pipeline.
//!
//! - [`PatchConfig`]: runtime settings consumed by the orchestrator
//! - [`ConfigFile`]: the user's `~/.bundlepatch/config.ini`, convertible
//!   into a `PatchConfig` and package list
//! - `defaults`: every `DEFAULT_*` constant

pub mod defaults;
mod file;
mod parser;
mod patch;
mod writer;

pub use file::{
    config_directory, config_file_path, ConfigFile, ConfigFileError, DownloadSettings,
    HostSettings, PackageSettings, PatchSettings, StorageSettings,
};
pub use patch::PatchConfig;
