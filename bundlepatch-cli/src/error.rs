//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use bundlepatch::config::ConfigFileError;
use bundlepatch::kv::KvError;
use bundlepatch::patch::{PatchError, PatchState};
use bundlepatch::store::StoreError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Package store could not be created or queried
    Store(StoreError),
    /// Persisted records could not be read or written
    Records(KvError),
    /// The patch run failed outright
    Patch(PatchError),
    /// The patch run stopped at a state after reporting a failure
    Halted(PatchState),
    /// Interrupted by the user
    Canceled,
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Halted(PatchState::VersionUpdate) => {
                eprintln!();
                eprintln!("The host could not be reached and no usable local version exists.");
                eprintln!("  1. Check host_server and fallback_host_server in config.ini");
                eprintln!("  2. Run again once the network is available");
            }
            CliError::Halted(PatchState::Repair) => {
                eprintln!();
                eprintln!("Some cached files could not be removed. Run repair again.");
            }
            CliError::Canceled => process::exit(130),
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Store(e) => write!(f, "Package store error: {}", e),
            CliError::Records(e) => write!(f, "Failed to access saved records: {}", e),
            CliError::Patch(e) => write!(f, "Patch failed: {}", e),
            CliError::Halted(state) => write!(f, "Patch stopped during {}", state),
            CliError::Canceled => write!(f, "Canceled"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::Store(e) => Some(e),
            CliError::Records(e) => Some(e),
            CliError::Patch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<KvError> for CliError {
    fn from(e: KvError) -> Self {
        CliError::Records(e)
    }
}

impl From<PatchError> for CliError {
    fn from(e: PatchError) -> Self {
        CliError::Patch(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halted_message_names_state() {
        let err = CliError::Halted(PatchState::BeginDownload);
        assert_eq!(err.to_string(), "Patch stopped during BeginDownload");
    }

    #[test]
    fn test_patch_error_has_source() {
        use std::error::Error;
        let err = CliError::from(PatchError::AlreadyRunning);
        assert!(err.source().is_some());
    }
}
