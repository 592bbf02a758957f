//! Repair command - clear the local cache and download everything again.

use console::style;

use bundlepatch::config::ConfigFile;

use super::common::Session;
use crate::error::CliError;

/// Run the repair command.
pub async fn run(file: &ConfigFile, yes: bool) -> Result<(), CliError> {
    let mut session = Session::open(file, file.to_patch_config())?;
    session.cancel_on_ctrlc()?;

    println!(
        "{}",
        style("Repair removes every cached file before checking again.").yellow()
    );
    let run = session.orchestrator.repair()?;
    session.drive(run, yes).await
}
