//! Patch run state machine.
//!
//! A run walks the states of [`PatchState`] in order, emitting
//! [`PatchEvent::StateChanged`] on every entry. Each run is executed by one
//! driver task; at most one driver per orchestrator executes at a time.
//!
//! ```text
//! repair() ──► Repair ─┐
//!                      ▼
//! check()  ──► Prepare ─► InitMode ─► VersionUpdate ─► ManifestUpdate
//!                                                            │
//!        ┌───────────────────────────────────────────────────┘
//!        ▼
//! CreateDownloader ──(nonzero plan)──► awaiting begin_download()
//!        │                                   │
//!        │ (zero plan)                       ▼
//!        │                             BeginDownload
//!        ▼                                   │
//!   DownloadOver ◄───────────────────────────┘
//!        │
//!        ▼
//!   ClearCache ─► Done
//! ```
//!
//! Failures emit an event and halt the run at the failing state. Flags are
//! left untouched by a halt; the caller resumes with `retry_from` or cancels.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::disk::{fits, DiskSpaceProbe, Fs2DiskProbe};
use super::error::PatchError;
use super::flags::PatchFlags;
use super::state::PatchState;
use crate::config::PatchConfig;
use crate::download::{
    DownloadError, DownloadGroup, DownloadProgress, DownloadStatus, Downloader, SpeedSampler,
};
use crate::events::{EventSink, NullSink, PatchEvent};
use crate::kv::{self, KeyValueStore, KvError, MemoryKeyValueStore};
use crate::package::{app_host_url, dlc_host_url, HostEndpoints, PackageInfo, PlayMode};
use crate::store::{ClearMode, InitParams, PackageStore};

/// Attempts a repair gets before a failing cache clear is ignored.
const REPAIR_RETRY_BUDGET: u32 = 1;

/// How a driver task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run reached `Done`.
    Completed,
    /// A failure event was emitted and the run stopped in this state.
    Halted(PatchState),
    /// A download plan exists; call `begin_download()` to continue.
    AwaitingBegin,
    /// The run was canceled.
    Canceled,
}

/// Handle to a spawned driver task.
#[derive(Debug)]
pub struct RunHandle {
    handle: JoinHandle<Result<RunOutcome, PatchError>>,
}

impl RunHandle {
    /// Wait for the driver to stop.
    pub async fn finished(self) -> Result<RunOutcome, PatchError> {
        self.handle
            .await
            .map_err(|e| PatchError::Internal(e.to_string()))?
    }
}

enum Step {
    Next(PatchState),
    Halt,
    AwaitBegin,
    Finished,
    Canceled,
}

/// Mutable state of the current run.
struct RunState {
    versions: Vec<(String, String)>,
    using_fallback: bool,
    group: DownloadGroup,
    downloaders: Vec<Arc<Downloader>>,
    current: Option<PatchState>,
    awaiting_begin: bool,
    paused: bool,
    token: CancellationToken,
}

struct Inner {
    config: PatchConfig,
    packages: Vec<PackageInfo>,
    store: Arc<dyn PackageStore>,
    kv: Arc<dyn KeyValueStore>,
    events: Arc<dyn EventSink>,
    disk: Arc<dyn DiskSpaceProbe>,
    flags: Arc<PatchFlags>,
    run: Mutex<RunState>,
    driver: Arc<tokio::sync::Mutex<()>>,
    repair_budget: AtomicU32,
}

/// Builder for [`PatchOrchestrator`].
///
/// Without further configuration the orchestrator keeps its records in
/// memory, discards events and asks `fs2` for free disk space.
pub struct PatchOrchestratorBuilder {
    config: PatchConfig,
    packages: Vec<PackageInfo>,
    store: Arc<dyn PackageStore>,
    kv: Arc<dyn KeyValueStore>,
    events: Arc<dyn EventSink>,
    disk: Arc<dyn DiskSpaceProbe>,
    group: DownloadGroup,
}

impl PatchOrchestratorBuilder {
    pub fn with_kv_store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = kv;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_disk_probe(mut self, disk: Arc<dyn DiskSpaceProbe>) -> Self {
        self.disk = disk;
        self
    }

    /// Initial download group.
    pub fn with_group(mut self, group: DownloadGroup) -> Self {
        self.group = group;
        self
    }

    pub fn build(self) -> PatchOrchestrator {
        PatchOrchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                packages: self.packages,
                store: self.store,
                kv: self.kv,
                events: self.events,
                disk: self.disk,
                flags: Arc::new(PatchFlags::new()),
                run: Mutex::new(RunState {
                    versions: Vec::new(),
                    using_fallback: false,
                    group: self.group,
                    downloaders: Vec::new(),
                    current: None,
                    awaiting_begin: false,
                    paused: false,
                    token: CancellationToken::new(),
                }),
                driver: Arc::new(tokio::sync::Mutex::new(())),
                repair_budget: AtomicU32::new(REPAIR_RETRY_BUDGET),
            }),
        }
    }
}

/// Drives packages through version check, download and cache cleanup.
///
/// Commands spawn driver tasks and must be called from within a tokio
/// runtime. Progress and failures are reported through the [`EventSink`].
///
/// # Example
///
/// ```ignore
/// let (sink, mut events) = ChannelSink::new();
/// let orchestrator = PatchOrchestrator::builder(config, packages, store)
///     .with_event_sink(Arc::new(sink))
///     .build();
///
/// let run = orchestrator.check()?;
/// if run.finished().await? == RunOutcome::AwaitingBegin {
///     orchestrator.begin_download().unwrap().finished().await?;
/// }
/// ```
#[derive(Clone)]
pub struct PatchOrchestrator {
    inner: Arc<Inner>,
}

impl PatchOrchestrator {
    pub fn builder(
        config: PatchConfig,
        packages: Vec<PackageInfo>,
        store: Arc<dyn PackageStore>,
    ) -> PatchOrchestratorBuilder {
        PatchOrchestratorBuilder {
            config,
            packages,
            store,
            kv: Arc::new(MemoryKeyValueStore::new()),
            events: Arc::new(NullSink),
            disk: Arc::new(Fs2DiskProbe),
            group: DownloadGroup::default(),
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Start a check at `Prepare`.
    ///
    /// Ignored with a warning while a check or repair is in progress.
    pub fn check(&self) -> Result<RunHandle, PatchError> {
        let flags = &self.inner.flags;
        if flags.is_busy() {
            warn!(
                checking = flags.is_checking(),
                repairing = flags.is_repairing(),
                "Check requested while a run is in progress, ignoring"
            );
            return Err(PatchError::AlreadyRunning);
        }
        flags.mark_checking();
        let token = self.inner.new_run_token();
        Ok(self.spawn_driver(PatchState::Prepare, token, None))
    }

    /// Clear the cache and check again.
    ///
    /// Preempts a running check. Ignored while a repair is in progress.
    pub fn repair(&self) -> Result<RunHandle, PatchError> {
        if self.inner.flags.is_repairing() {
            warn!("Repair requested while repairing, ignoring");
            return Err(PatchError::AlreadyRunning);
        }
        let token = self.inner.new_run_token();
        self.inner.cancel_downloaders();
        self.inner.flags.mark_repairing();
        Ok(self.spawn_driver(PatchState::Repair, token, None))
    }

    /// Resume a halted run at `state`.
    ///
    /// Only honored while no driver is executing.
    pub fn retry_from(&self, state: PatchState) -> Result<RunHandle, PatchError> {
        let guard = match Arc::clone(&self.inner.driver).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(state = %state, "Retry requested while a run is executing, ignoring");
                return Err(PatchError::AlreadyRunning);
            }
        };

        let flags = &self.inner.flags;
        if state == PatchState::Repair {
            flags.mark_repairing();
        } else if !flags.is_busy() {
            flags.mark_checking();
        }
        let token = self.inner.new_run_token();
        info!(state = %state, "Retrying patch run");
        Ok(self.spawn_driver(state, token, Some(guard)))
    }

    /// Confirm the pending download plan.
    ///
    /// Returns `None` unless the run is waiting for confirmation.
    pub fn begin_download(&self) -> Option<RunHandle> {
        let token = {
            let mut run = self.inner.run.lock();
            if !run.awaiting_begin {
                debug!("begin_download called with no pending plan");
                return None;
            }
            run.awaiting_begin = false;
            run.token.clone()
        };
        Some(self.spawn_driver(PatchState::BeginDownload, token, None))
    }

    /// Pause active downloads at their next chunk boundary.
    pub fn pause(&self) {
        let mut run = self.inner.run.lock();
        run.paused = true;
        for downloader in &run.downloaders {
            downloader.pause_download();
        }
    }

    pub fn resume(&self) {
        let mut run = self.inner.run.lock();
        run.paused = false;
        for downloader in &run.downloaders {
            downloader.resume_download();
        }
    }

    /// Cancel the current run and every active download.
    ///
    /// Clears the checking and repairing flags. Partially written files stay
    /// on disk.
    pub fn cancel(&self, send_event: bool) {
        let downloaders = {
            let mut run = self.inner.run.lock();
            run.token.cancel();
            run.awaiting_begin = false;
            run.paused = false;
            std::mem::take(&mut run.downloaders)
        };
        for downloader in &downloaders {
            downloader.cancel_download();
        }
        self.inner.flags.clear_check();
        self.inner.flags.clear_repair();
        if send_event {
            self.inner.events.emit(PatchEvent::DownloadCanceled);
        }
        info!(downloaders = downloaders.len(), "Patch run canceled");
    }

    /// Destroy every package in the store. Failures are logged.
    pub async fn release(&self) {
        self.cancel(false);
        for info in &self.inner.packages {
            if let Err(e) = self.inner.store.destroy(info.name()).await {
                debug!(package = info.name(), error = %e, "Package release failed");
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn flags(&self) -> Arc<PatchFlags> {
        Arc::clone(&self.inner.flags)
    }

    /// Last state entered, if any run has started.
    pub fn current_state(&self) -> Option<PatchState> {
        self.inner.run.lock().current
    }

    pub fn is_awaiting_begin(&self) -> bool {
        self.inner.run.lock().awaiting_begin
    }

    pub fn is_using_fallback(&self) -> bool {
        self.inner.run.lock().using_fallback
    }

    /// Versions resolved by the last `VersionUpdate`.
    pub fn versions(&self) -> Vec<(String, String)> {
        self.inner.run.lock().versions.clone()
    }

    pub fn packages(&self) -> &[PackageInfo] {
        &self.inner.packages
    }

    /// The active download group with its latest totals.
    pub fn group(&self) -> DownloadGroup {
        self.inner.run.lock().group.clone()
    }

    /// Replace the active download group. Takes effect at the next plan.
    pub fn set_group(&self, group: DownloadGroup) {
        self.inner.run.lock().group = group;
    }

    pub fn last_group(&self) -> Option<DownloadGroup> {
        kv::last_group(self.inner.kv.as_ref())
    }

    pub fn set_last_group(&self, group: &DownloadGroup) -> Result<(), KvError> {
        kv::save_last_group(self.inner.kv.as_ref(), group)
    }

    pub fn delete_last_group(&self) -> Result<(), KvError> {
        kv::delete_last_group(self.inner.kv.as_ref())
    }

    fn spawn_driver(
        &self,
        start: PatchState,
        token: CancellationToken,
        guard: Option<OwnedMutexGuard<()>>,
    ) -> RunHandle {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _guard = match guard {
                Some(guard) => guard,
                None => Arc::clone(&inner.driver).lock_owned().await,
            };
            inner.drive(start, token).await
        });
        RunHandle { handle }
    }
}

impl Inner {
    /// Cancel the previous run's token and install a fresh one.
    ///
    /// A pause only applies to the run it was issued against.
    fn new_run_token(&self) -> CancellationToken {
        let mut run = self.run.lock();
        run.token.cancel();
        run.token = CancellationToken::new();
        run.awaiting_begin = false;
        run.paused = false;
        run.token.clone()
    }

    fn cancel_downloaders(&self) {
        let downloaders = std::mem::take(&mut self.run.lock().downloaders);
        for downloader in downloaders {
            downloader.cancel_download();
        }
    }

    async fn drive(&self, start: PatchState, token: CancellationToken) -> Result<RunOutcome, PatchError> {
        let mut state = start;
        loop {
            if token.is_cancelled() {
                return Ok(RunOutcome::Canceled);
            }
            self.enter(state);

            let step = tokio::select! {
                biased;
                _ = token.cancelled() => Ok(Step::Canceled),
                step = self.run_state(state) => step,
            };

            match step {
                Ok(Step::Next(next)) => state = next,
                Ok(Step::Halt) => {
                    info!(state = %state, "Patch run halted");
                    return Ok(RunOutcome::Halted(state));
                }
                Ok(Step::AwaitBegin) => return Ok(RunOutcome::AwaitingBegin),
                Ok(Step::Finished) => return Ok(RunOutcome::Completed),
                Ok(Step::Canceled) => {
                    debug!(state = %state, "Patch run canceled");
                    return Ok(RunOutcome::Canceled);
                }
                Err(e) => {
                    error!(state = %state, error = %e, "Patch run failed");
                    if matches!(e, PatchError::Configuration(_)) {
                        self.flags.clear_check();
                        self.flags.clear_repair();
                    }
                    return Err(e);
                }
            }
        }
    }

    fn enter(&self, state: PatchState) {
        self.run.lock().current = Some(state);
        info!(state = %state, "Entering patch state");
        self.events.emit(PatchEvent::StateChanged(state));
    }

    async fn run_state(&self, state: PatchState) -> Result<Step, PatchError> {
        match state {
            PatchState::Repair => Ok(self.repair().await),
            PatchState::Prepare => {
                self.flags.mark_checking();
                Ok(Step::Next(PatchState::InitMode))
            }
            PatchState::InitMode => self.init_mode().await,
            PatchState::VersionUpdate => Ok(self.version_update().await),
            PatchState::ManifestUpdate => Ok(self.manifest_update().await),
            PatchState::CreateDownloader => self.create_downloader().await,
            PatchState::BeginDownload => self.begin_download().await,
            PatchState::DownloadOver => Ok(self.download_over().await),
            PatchState::ClearCache => Ok(self.clear_cache().await),
            PatchState::Done => Ok(self.done()),
        }
    }

    /// Pause between transitions so observers can react to the state event.
    async fn settle(&self) {
        if !self.config.transition_delay.is_zero() {
            tokio::time::sleep(self.config.transition_delay).await;
        }
    }

    // =========================================================================
    // State actions
    // =========================================================================

    async fn repair(&self) -> Step {
        if self.config.play_mode == PlayMode::EditorSimulate {
            return Step::Next(PatchState::Prepare);
        }

        self.cancel_downloaders();
        self.settle().await;

        let mut all_cleared = true;
        for info in &self.packages {
            let package = info.name();
            if let Err(e) = self.store.register_package(package) {
                debug!(package, error = %e, "Could not register package for repair");
            }
            for mode in [ClearMode::AllBundleFiles, ClearMode::AllManifestFiles] {
                match self.store.clear_cache_files(package, mode).await {
                    Ok(()) => {}
                    Err(e) if e.is_already_clean() => {
                        debug!(package, mode = ?mode, "Nothing to clear");
                    }
                    Err(e) => {
                        warn!(package, mode = ?mode, error = %e, "Failed to clear cache");
                        all_cleared = false;
                    }
                }
            }
        }

        let budget = self.repair_budget.load(Ordering::SeqCst);
        if all_cleared || budget == 0 {
            if !all_cleared {
                warn!("Repair retry budget exhausted, continuing with partial cache");
            }
            self.repair_budget.store(REPAIR_RETRY_BUDGET, Ordering::SeqCst);
            Step::Next(PatchState::Prepare)
        } else {
            self.repair_budget.store(budget - 1, Ordering::SeqCst);
            self.events.emit(PatchEvent::RepairFailed);
            Step::Halt
        }
    }

    async fn init_mode(&self) -> Result<Step, PatchError> {
        self.settle().await;
        self.validate_packages()?;

        for info in &self.packages {
            let package = info.name();
            if let Err(e) = self.store.register_package(package) {
                warn!(package, error = %e, "Package registration failed");
                self.events.emit(PatchEvent::InitFailed);
                return Ok(Step::Halt);
            }

            let params = InitParams {
                play_mode: info.play_mode(),
                endpoints: self.resolve_endpoints(info),
            };
            debug!(
                package,
                host = %params.endpoints.primary,
                fallback = %params.endpoints.fallback,
                "Initializing package"
            );
            if let Err(e) = self.store.initialize(package, params).await {
                warn!(package, error = %e, "Package initialization failed");
                self.events.emit(PatchEvent::InitFailed);
                return Ok(Step::Halt);
            }
        }
        Ok(Step::Next(PatchState::VersionUpdate))
    }

    fn validate_packages(&self) -> Result<(), PatchError> {
        let Some(first) = self.packages.first() else {
            return Err(PatchError::Configuration("no packages configured".to_string()));
        };
        let kind = first.kind();
        if let Some(other) = self.packages.iter().find(|p| p.kind() != kind) {
            return Err(PatchError::Configuration(format!(
                "package '{}' is {} but '{}' is {}; a run must use one package kind",
                other.name(),
                other.kind(),
                first.name(),
                kind
            )));
        }
        Ok(())
    }

    fn resolve_endpoints(&self, info: &PackageInfo) -> HostEndpoints {
        let config = &self.config;
        if let PackageInfo::Dlc(dlc) = info {
            if !dlc.host_server.is_empty() {
                return HostEndpoints::new(&dlc.host_server, &dlc.fallback_host_server);
            }
        }
        if !config.auto_configure_endpoints {
            return HostEndpoints::new(&config.host_server, &config.fallback_host_server);
        }

        let build = |server: &str| -> String {
            if server.is_empty() {
                return String::new();
            }
            match info {
                PackageInfo::App(app) => app_host_url(
                    server,
                    &config.product_name,
                    &config.platform,
                    &config.app_version,
                    &app.name,
                ),
                PackageInfo::Dlc(dlc) => dlc_host_url(
                    server,
                    &config.product_name,
                    &config.platform,
                    &dlc.name,
                    &dlc.dlc_version,
                    dlc.without_platform,
                ),
            }
        };
        HostEndpoints::new(
            build(&config.host_server),
            build(&config.fallback_host_server),
        )
    }

    async fn version_update(&self) -> Step {
        self.flags.clear_repair();
        self.settle().await;

        let mut versions = Vec::with_capacity(self.packages.len());
        let mut failed = false;
        for info in &self.packages {
            match self.store.request_version(info.name()).await {
                Ok(version) => versions.push((info.name().to_string(), version)),
                Err(e) => {
                    warn!(package = info.name(), error = %e, "Version request failed");
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            let mut run = self.run.lock();
            run.versions = versions;
            run.using_fallback = false;
            return Step::Next(PatchState::ManifestUpdate);
        }

        if !self.config.weak_network_fallback {
            self.events.emit(PatchEvent::VersionUpdateFailed);
            return Step::Halt;
        }

        // All packages fall back together or not at all.
        let mut fallback = Vec::with_capacity(self.packages.len());
        for info in &self.packages {
            match kv::last_version(self.kv.as_ref(), info.name()) {
                Some(version) => fallback.push((info.name().to_string(), version)),
                None => {
                    warn!(
                        package = info.name(),
                        "No last good version recorded, cannot fall back"
                    );
                    self.events.emit(PatchEvent::VersionUpdateFailed);
                    return Step::Halt;
                }
            }
        }

        info!(packages = fallback.len(), "Using last good versions");
        let mut run = self.run.lock();
        run.versions = fallback;
        run.using_fallback = true;
        Step::Next(PatchState::ManifestUpdate)
    }

    async fn manifest_update(&self) -> Step {
        self.settle().await;

        let (versions, using_fallback) = {
            let run = self.run.lock();
            (run.versions.clone(), run.using_fallback)
        };
        for (package, version) in &versions {
            match self.store.update_manifest(package, version).await {
                Ok(()) => {
                    if let Err(e) = kv::save_last_version(self.kv.as_ref(), package, version) {
                        warn!(package = %package, error = %e, "Failed to record last good version");
                    }
                }
                Err(e) => {
                    if using_fallback {
                        error!(
                            package = %package,
                            version = %version,
                            error = %e,
                            "Local manifest unusable, an online update is required"
                        );
                    } else {
                        warn!(package = %package, version = %version, error = %e, "Manifest update failed");
                    }
                    self.events.emit(PatchEvent::ManifestUpdateFailed);
                    return Step::Halt;
                }
            }
        }
        Step::Next(PatchState::CreateDownloader)
    }

    async fn create_downloader(&self) -> Result<Step, PatchError> {
        if self.config.play_mode == PlayMode::EditorSimulate {
            return Ok(Step::Next(PatchState::Done));
        }

        let using_fallback = self.run.lock().using_fallback;
        if self.config.skip_download && !using_fallback {
            return Ok(Step::Next(PatchState::DownloadOver));
        }

        let (count, bytes) = self.plan_downloads().await?;
        let group_name = self.run.lock().group.name.clone();

        if count == 0 {
            info!(group = %group_name, "No files to download");
            return Ok(Step::Next(PatchState::DownloadOver));
        }
        if using_fallback {
            error!(
                group = %group_name,
                files = count,
                bytes,
                "Local files are incomplete, an online update is required"
            );
            self.events.emit(PatchEvent::VersionUpdateFailed);
            return Ok(Step::Halt);
        }
        if self.config.auto_begin_download {
            return Ok(Step::Next(PatchState::BeginDownload));
        }

        info!(group = %group_name, files = count, bytes, "Download plan awaiting confirmation");
        self.run.lock().awaiting_begin = true;
        Ok(Step::AwaitBegin)
    }

    /// Create one downloader per package for the active group and store the
    /// new totals on the group.
    async fn plan_downloads(&self) -> Result<(usize, u64), PatchError> {
        let selector = self.run.lock().group.selector();
        let options = self.config.downloader_options(None, None);

        let mut downloaders = Vec::with_capacity(self.packages.len());
        for info in &self.packages {
            downloaders.push(
                self.store
                    .create_downloader(info.name(), &selector, options)
                    .await?,
            );
        }

        let mut run = self.run.lock();
        run.group.reset_totals();
        for downloader in &downloaders {
            if downloader.total_download_count() > 0 {
                run.group
                    .add_plan(downloader.total_download_count(), downloader.total_download_bytes());
            }
        }
        let totals = (run.group.total_count, run.group.total_bytes);
        run.downloaders = downloaders;
        Ok(totals)
    }

    async fn begin_download(&self) -> Result<Step, PatchError> {
        let (count, bytes) = self.plan_downloads().await?;
        let group_name = self.run.lock().group.name.clone();
        info!(group = %group_name, files = count, bytes, "Starting download");

        let mode = self.config.play_mode;
        if self.config.check_disk_space && mode.supports_disk_query() {
            if let Some(available_mb) = self.disk.available_mb(&self.config.cache_root) {
                info!(available_mb, required_bytes = bytes, "Disk space check");
                if !fits(bytes, available_mb) {
                    error!(available_mb, required_bytes = bytes, "Not enough disk space");
                    self.events.emit(PatchEvent::DiskNotEnoughSpace {
                        available_mb,
                        required_bytes: bytes,
                    });
                    return Ok(Step::Halt);
                }
            }
        }

        let (downloaders, paused) = {
            let run = self.run.lock();
            (run.downloaders.clone(), run.paused)
        };
        let sampler = Arc::new(Mutex::new(SpeedSampler::new(
            self.config.speed_sample_interval,
            count,
            bytes,
        )));

        for downloader in downloaders.iter().filter(|d| d.total_download_count() > 0) {
            sampler.lock().start_downloader();

            let progress_sampler = Arc::clone(&sampler);
            let events = Arc::clone(&self.events);
            downloader.set_update_callback(Arc::new(move |progress: DownloadProgress| {
                let sample = progress_sampler.lock().record(&progress);
                if let Some(sample) = sample {
                    events.emit(PatchEvent::DownloadProgression(sample));
                }
            }));

            let events = Arc::clone(&self.events);
            downloader.set_error_callback(Arc::new(move |file_name: &str, error: &DownloadError| {
                events.emit(PatchEvent::DownloadFailed {
                    file_name: file_name.to_string(),
                    error: error.to_string(),
                });
            }));

            if paused {
                downloader.pause_download();
            }
            downloader.begin_download();
            match downloader.wait().await {
                DownloadStatus::Succeeded => {}
                DownloadStatus::Canceled => return Ok(Step::Canceled),
                status => {
                    error!(package = downloader.package(), status = ?status, "Downloader did not succeed");
                    return Ok(Step::Halt);
                }
            }
        }

        let tail = sampler.lock().flush();
        if let Some(sample) = tail {
            self.events.emit(PatchEvent::DownloadProgression(sample));
        }
        Ok(Step::Next(PatchState::DownloadOver))
    }

    async fn download_over(&self) -> Step {
        self.settle().await;

        let total_bytes: u64 = self
            .packages
            .iter()
            .map(|info| self.store.local_size_bytes(info.name()))
            .sum();

        let mut run = self.run.lock();
        run.group.total_count = self.packages.len();
        run.group.total_bytes = total_bytes;
        debug!(group = %run.group.name, total_bytes, "Recorded local package sizes");
        Step::Next(PatchState::ClearCache)
    }

    async fn clear_cache(&self) -> Step {
        self.settle().await;

        for info in &self.packages {
            for mode in [ClearMode::UnusedBundleFiles, ClearMode::UnusedManifestFiles] {
                if let Err(e) = self.store.clear_cache_files(info.name(), mode).await {
                    warn!(package = info.name(), mode = ?mode, error = %e, "Failed to clear unused cache");
                }
            }
        }
        Step::Next(PatchState::Done)
    }

    fn done(&self) -> Step {
        self.flags.mark_done();
        self.run.lock().downloaders.clear();
        info!("Patch done");
        self.events.emit(PatchEvent::PatchDone);
        Step::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::DownloaderOptions;
    use crate::store::{BoxFuture, DownloadSelector, StoreError};
    use std::time::Duration;

    /// Store that fails everything; only used to exercise endpoint
    /// resolution and package validation.
    struct NoStore;

    impl PackageStore for NoStore {
        fn register_package(&self, package: &str) -> Result<(), StoreError> {
            Err(StoreError::NotRegistered(package.to_string()))
        }

        fn initialize<'a>(
            &'a self,
            package: &'a str,
            _params: InitParams,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async move { Err(StoreError::NotRegistered(package.to_string())) })
        }

        fn request_version<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<String, StoreError>> {
            Box::pin(async move { Err(StoreError::NotRegistered(package.to_string())) })
        }

        fn update_manifest<'a>(
            &'a self,
            package: &'a str,
            _version: &'a str,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async move { Err(StoreError::NotRegistered(package.to_string())) })
        }

        fn create_downloader<'a>(
            &'a self,
            package: &'a str,
            _selector: &'a DownloadSelector,
            _options: DownloaderOptions,
        ) -> BoxFuture<'a, Result<Arc<Downloader>, StoreError>> {
            Box::pin(async move { Err(StoreError::NotRegistered(package.to_string())) })
        }

        fn clear_cache_files<'a>(
            &'a self,
            package: &'a str,
            _mode: ClearMode,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async move { Err(StoreError::NotRegistered(package.to_string())) })
        }

        fn local_size_bytes(&self, _package: &str) -> u64 {
            0
        }

        fn destroy<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async move { Err(StoreError::NotRegistered(package.to_string())) })
        }
    }

    fn orchestrator(config: PatchConfig, packages: Vec<PackageInfo>) -> PatchOrchestrator {
        PatchOrchestrator::builder(config, packages, Arc::new(NoStore)).build()
    }

    fn config() -> PatchConfig {
        PatchConfig::default()
            .with_hosts("https://cdn.example.com", "https://backup.example.com")
            .with_product("game", "linux", "1.2.0")
            .with_transition_delay(Duration::ZERO)
    }

    #[test]
    fn test_auto_configured_app_endpoints() {
        let orch = orchestrator(config(), vec![PackageInfo::app("core", PlayMode::Host)]);
        let endpoints = orch.inner.resolve_endpoints(&orch.inner.packages[0]);
        assert_eq!(endpoints.primary, "https://cdn.example.com/game/linux/1.2.0/core");
        assert_eq!(endpoints.fallback, "https://backup.example.com/game/linux/1.2.0/core");
    }

    #[test]
    fn test_explicit_dlc_hosts_win() {
        let dlc = PackageInfo::dlc("maps", PlayMode::Host, "v3").with_hosts("https://dlc", "");
        let orch = orchestrator(config(), vec![dlc]);
        let endpoints = orch.inner.resolve_endpoints(&orch.inner.packages[0]);
        assert_eq!(endpoints, HostEndpoints::new("https://dlc", ""));
    }

    #[test]
    fn test_manual_endpoints_used_verbatim() {
        let orch = orchestrator(
            config().with_auto_configure_endpoints(false),
            vec![PackageInfo::dlc("maps", PlayMode::Host, "v3")],
        );
        let endpoints = orch.inner.resolve_endpoints(&orch.inner.packages[0]);
        assert_eq!(endpoints.primary, "https://cdn.example.com");
    }

    #[test]
    fn test_empty_fallback_host_stays_empty() {
        let orch = orchestrator(
            config().with_hosts("https://cdn.example.com", ""),
            vec![PackageInfo::dlc("maps", PlayMode::Host, "v3")],
        );
        let endpoints = orch.inner.resolve_endpoints(&orch.inner.packages[0]);
        assert_eq!(endpoints.primary, "https://cdn.example.com/game/linux/DLC/maps/v3");
        assert!(endpoints.fallback.is_empty());
    }

    #[test]
    fn test_mixed_package_kinds_rejected() {
        let orch = orchestrator(
            config(),
            vec![
                PackageInfo::app("core", PlayMode::Host),
                PackageInfo::dlc("maps", PlayMode::Host, "v1"),
            ],
        );
        assert!(matches!(
            orch.inner.validate_packages(),
            Err(PatchError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_package_list_is_configuration_error() {
        let orch = orchestrator(config(), vec![]);
        let result = orch.check().unwrap().finished().await;
        assert!(matches!(result, Err(PatchError::Configuration(_))));
        assert!(!orch.flags().is_busy());
    }

    #[tokio::test]
    async fn test_init_failure_halts_at_init_mode() {
        let orch = orchestrator(config(), vec![PackageInfo::app("core", PlayMode::Host)]);
        let outcome = orch.check().unwrap().finished().await.unwrap();
        assert_eq!(outcome, RunOutcome::Halted(PatchState::InitMode));
        assert!(orch.flags().is_checking());
    }

    #[tokio::test]
    async fn test_check_while_busy_is_rejected() {
        let orch = orchestrator(config(), vec![PackageInfo::app("core", PlayMode::Host)]);
        orch.check().unwrap().finished().await.unwrap();
        assert!(matches!(orch.check(), Err(PatchError::AlreadyRunning)));

        orch.cancel(false);
        assert!(orch.check().is_ok());
    }

    #[tokio::test]
    async fn test_begin_without_plan_is_ignored() {
        let orch = orchestrator(config(), vec![PackageInfo::app("core", PlayMode::Host)]);
        assert!(orch.begin_download().is_none());
    }

    #[tokio::test]
    async fn test_last_group_round_trip() {
        let orch = orchestrator(config(), vec![]);
        assert!(orch.last_group().is_none());

        let group = DownloadGroup::with_tags("ui", vec!["ui".into()]);
        orch.set_last_group(&group).unwrap();
        assert_eq!(orch.last_group(), Some(group));
        orch.delete_last_group().unwrap();
        assert!(orch.last_group().is_none());
    }
}
