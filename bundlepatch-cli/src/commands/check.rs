//! Check command - bring the configured packages up to date.

use tracing::info;

use bundlepatch::config::ConfigFile;

use super::common::{group_from_args, Session};
use crate::error::CliError;

/// Arguments for the check command.
pub struct CheckArgs {
    pub yes: bool,
    pub tags: Vec<String>,
    pub assets: Vec<String>,
    pub last_group: bool,
    pub concurrency: Option<usize>,
    pub retry: Option<u32>,
}

/// Run the check command.
pub async fn run(file: &ConfigFile, args: CheckArgs) -> Result<(), CliError> {
    let mut config = file.to_patch_config();
    if let Some(concurrency) = args.concurrency {
        config = config.with_max_concurrency(concurrency);
    }
    if let Some(retry) = args.retry {
        config = config.with_failed_retry_count(retry);
    }

    let mut session = Session::open(file, config)?;
    let orchestrator = &session.orchestrator;

    if let Some(group) = group_from_args(args.tags, args.assets) {
        info!(group = %group.name, "Using download group from arguments");
        orchestrator.set_last_group(&group)?;
        orchestrator.set_group(group);
    } else if args.last_group {
        match orchestrator.last_group() {
            Some(group) => {
                println!("Resuming download group '{}'", group.name);
                orchestrator.set_group(group);
            }
            None => println!("No saved download group, downloading everything"),
        }
    }

    session.cancel_on_ctrlc()?;
    let run = session.orchestrator.check()?;
    session.drive(run, args.yes).await
}
