//! Bundlepatch CLI - Command-line interface
//!
//! Checks configured resource packages against their host, downloads what
//! is missing and cleans up the local cache.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use bundlepatch::config::{config_file_path, ConfigFile};
use bundlepatch::logging::{default_log_file, init_logging};

use commands::check::CheckArgs;
use commands::clear_cache::ClearTarget;
use error::CliError;

#[derive(Parser)]
#[command(name = "bundlepatch")]
#[command(version, about = "Version-check, download and repair remotely hosted resource packages", long_about = None)]
struct Cli {
    /// Config file (default: ~/.bundlepatch/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write log output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default config file
    Init,

    /// Check for updates and download missing files
    Check {
        /// Start the download without asking
        #[arg(long, short)]
        yes: bool,

        /// Only download files carrying one of these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Only download files containing one of these assets
        #[arg(long, value_delimiter = ',')]
        assets: Vec<String>,

        /// Reuse the download group of the previous run
        #[arg(long, conflicts_with_all = ["tags", "assets"])]
        last_group: bool,

        /// Parallel file transfers per package
        #[arg(long)]
        concurrency: Option<usize>,

        /// Retries per file before the download fails
        #[arg(long)]
        retry: Option<u32>,
    },

    /// Clear the local cache and check again
    Repair {
        /// Start the download without asking
        #[arg(long, short)]
        yes: bool,
    },

    /// Show configuration and local package state
    Status,

    /// Remove cached files without running a check
    ClearCache {
        /// Which files to remove
        #[arg(long, value_enum, default_value = "unused")]
        target: ClearTarget,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Init = cli.command {
        return commands::init::run();
    }

    let config_path = cli.config.unwrap_or_else(config_file_path);
    let file = ConfigFile::load_from(&config_path)?;

    // Logging resolves the local UTC offset, which must happen before any
    // runtime threads exist.
    let logging = init_logging(&file.storage.log_dir, default_log_file(), cli.verbose)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;
    info!(
        version = bundlepatch::VERSION,
        config = %config_path.display(),
        log = %logging.log_path().display(),
        "Bundlepatch CLI starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(async {
        match cli.command {
            Commands::Init => Ok(()),
            Commands::Check {
                yes,
                tags,
                assets,
                last_group,
                concurrency,
                retry,
            } => {
                let args = CheckArgs {
                    yes,
                    tags,
                    assets,
                    last_group,
                    concurrency,
                    retry,
                };
                commands::check::run(&file, args).await
            }
            Commands::Repair { yes } => commands::repair::run(&file, yes).await,
            Commands::Status => commands::status::run(&file),
            Commands::ClearCache { target } => commands::clear_cache::run(&file, target),
        }
    })
}
