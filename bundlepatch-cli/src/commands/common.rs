//! Common types and utilities shared across CLI commands.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use bundlepatch::config::{ConfigFile, PatchConfig};
use bundlepatch::download::{DownloadGroup, SpeedSample};
use bundlepatch::events::{ChannelSink, PatchEvent};
use bundlepatch::kv::FileKeyValueStore;
use bundlepatch::patch::{PatchOrchestrator, PatchState, RunHandle, RunOutcome};
use bundlepatch::store::HttpPackageStore;

use crate::error::CliError;

/// An orchestrator wired to the HTTP store, the on-disk records and a
/// terminal event view.
pub struct Session {
    pub orchestrator: PatchOrchestrator,
    view: EventView,
}

impl Session {
    pub fn open(file: &ConfigFile, config: PatchConfig) -> Result<Self, CliError> {
        let packages = file.package_infos();
        if packages.is_empty() {
            return Err(CliError::Config(
                "No packages configured. Set names in the [packages] section".to_string(),
            ));
        }

        let store = HttpPackageStore::new(config.store_config())?;
        let kv = FileKeyValueStore::open(&config.kv_path)?;
        let (sink, events) = ChannelSink::new();

        info!(
            packages = packages.len(),
            play_mode = %config.play_mode,
            cache = %config.cache_root.display(),
            "Opening patch session"
        );

        let orchestrator = PatchOrchestrator::builder(config, packages, Arc::new(store))
            .with_kv_store(Arc::new(kv))
            .with_event_sink(Arc::new(sink))
            .build();

        Ok(Self {
            orchestrator,
            view: EventView::new(events),
        })
    }

    /// Cancel the run on Ctrl+C.
    pub fn cancel_on_ctrlc(&self) -> Result<(), CliError> {
        let orchestrator = self.orchestrator.clone();
        ctrlc::set_handler(move || {
            println!();
            println!("Received interrupt, canceling...");
            orchestrator.cancel(true);
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))
    }

    /// Follow `run` to the end, confirming the download plan if one is
    /// pending.
    pub async fn drive(&mut self, run: RunHandle, assume_yes: bool) -> Result<(), CliError> {
        let mut outcome = self.view.follow(run).await?;

        if outcome == RunOutcome::AwaitingBegin {
            let group = self.orchestrator.group();
            println!(
                "{} files ({}) to download for group '{}'",
                group.total_count,
                format_size(group.total_bytes),
                group.name
            );

            if !assume_yes && !confirm("Start download?").await? {
                self.orchestrator.cancel(false);
                println!("Download skipped.");
                return Ok(());
            }

            let run = self
                .orchestrator
                .begin_download()
                .ok_or(CliError::Halted(PatchState::CreateDownloader))?;
            outcome = self.view.follow(run).await?;
        }

        match outcome {
            RunOutcome::Completed => {
                for (package, version) in self.orchestrator.versions() {
                    println!("  {} {}", style(&package).cyan(), version);
                }
                if self.orchestrator.is_using_fallback() {
                    println!(
                        "{}",
                        style("Host unreachable, using last good versions").yellow()
                    );
                }
                println!("{}", style("Up to date.").green().bold());
                Ok(())
            }
            RunOutcome::Halted(state) => Err(CliError::Halted(state)),
            RunOutcome::Canceled => Err(CliError::Canceled),
            RunOutcome::AwaitingBegin => Err(CliError::Halted(PatchState::CreateDownloader)),
        }
    }
}

/// Renders patch events on the terminal.
struct EventView {
    events: UnboundedReceiver<PatchEvent>,
    bar: Option<ProgressBar>,
}

impl EventView {
    fn new(events: UnboundedReceiver<PatchEvent>) -> Self {
        Self {
            events,
            bar: None,
        }
    }

    /// Show events until the driver stops.
    async fn follow(&mut self, run: RunHandle) -> Result<RunOutcome, CliError> {
        let finished = run.finished();
        tokio::pin!(finished);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(event) = self.events.recv() => self.show(event),
                outcome = &mut finished => break outcome,
            }
        };

        // Events emitted right before the driver stopped.
        while let Ok(event) = self.events.try_recv() {
            self.show(event);
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        Ok(outcome?)
    }

    fn show(&mut self, event: PatchEvent) {
        match event {
            PatchEvent::StateChanged(state) => {
                println!("{} {}", style("»").dim(), state_label(state));
            }
            PatchEvent::DownloadProgression(sample) => self.progress(sample),
            PatchEvent::DownloadFailed { file_name, error } => {
                self.println(format!("{} {}: {}", style("✗").red(), file_name, error));
            }
            PatchEvent::PatchDone => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
            }
            event if event.is_failure() => {
                self.println(format!("{} {}", style("✗").red().bold(), event));
            }
            event => self.println(format!("  {}", event)),
        }
    }

    fn progress(&mut self, sample: SpeedSample) {
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(sample.total_bytes);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} | {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });

        bar.set_position(sample.current_bytes);
        let speed = sample
            .bytes_per_second()
            .map(|rate| format!("{}/s", format_size(rate)))
            .unwrap_or_default();
        bar.set_message(format!(
            "{}/{} files {}",
            sample.current_count, sample.total_count, speed
        ));
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        }
    }
}

fn state_label(state: PatchState) -> &'static str {
    match state {
        PatchState::Repair => "Clearing local cache",
        PatchState::Prepare => "Preparing",
        PatchState::InitMode => "Initializing packages",
        PatchState::VersionUpdate => "Checking versions",
        PatchState::ManifestUpdate => "Updating manifests",
        PatchState::CreateDownloader => "Planning downloads",
        PatchState::BeginDownload => "Downloading",
        PatchState::DownloadOver => "Download finished",
        PatchState::ClearCache => "Removing unused files",
        PatchState::Done => "Done",
    }
}

/// Ask a yes/no question without blocking the runtime.
async fn confirm(prompt: &str) -> Result<bool, CliError> {
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(true)
            .interact()
            .map_err(|e| CliError::Config(format!("Prompt error: {}", e)))
    })
    .await
    .map_err(|e| CliError::Config(format!("Prompt error: {}", e)))?
}

/// Download group from `--tags`/`--assets`, if either was given.
pub fn group_from_args(tags: Vec<String>, assets: Vec<String>) -> Option<DownloadGroup> {
    if !assets.is_empty() {
        Some(DownloadGroup::with_asset_names("assets", assets))
    } else if !tags.is_empty() {
        Some(DownloadGroup::with_tags(tags.join("+"), tags))
    } else {
        None
    }
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
