//! Init command - write the default configuration file.

use console::style;

use bundlepatch::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
pub fn run() -> Result<(), CliError> {
    let path = config_file_path();
    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }

    let path = ConfigFile::ensure_exists()?;
    println!("Created {}", style(path.display()).cyan());
    println!("Set host_server and the package names, then run:");
    println!("     {} check", style("bundlepatch").cyan());
    Ok(())
}
