//! Integration tests for the patch pipeline.
//!
//! These tests drive a [`PatchOrchestrator`] end to end against a scripted
//! in-memory store and transfer:
//! - Full check with confirmation, progress and cleanup
//! - Version and manifest failures with and without weak-network fallback
//! - Per-file download failure, pause and resume
//! - Disk space refusal, cancellation and repair
//!
//! Run with: `cargo test --test patch_pipeline`

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use bundlepatch::config::PatchConfig;
use bundlepatch::download::{
    BoxFuture, DownloadError, DownloadGroup, DownloadResult, DownloadTask, Downloader,
    DownloaderOptions, FileTransfer, TransferControl, TransferProgress, TransferRequest,
};
use bundlepatch::events::{ChannelSink, PatchEvent};
use bundlepatch::kv::{self, KeyValueStore, MemoryKeyValueStore};
use bundlepatch::package::{HostEndpoints, PackageInfo, PlayMode};
use bundlepatch::patch::{FixedDiskSpace, PatchOrchestrator, PatchState, RunOutcome};
use bundlepatch::store::{
    ClearMode, DownloadSelector, InitParams, ManifestEntry, PackageStore, StoreError,
};

// ============================================================================
// Scripted Transfer
// ============================================================================

/// Transfer that completes instantly, blocks until canceled, or always
/// fails for one named file.
#[derive(Default)]
struct ScriptedTransfer {
    calls: AtomicUsize,
    block: bool,
    fail_file: Option<String>,
}

impl ScriptedTransfer {
    fn blocking() -> Self {
        Self {
            block: true,
            ..Default::default()
        }
    }

    fn failing(file_name: &str) -> Self {
        Self {
            fail_file: Some(file_name.to_string()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FileTransfer for ScriptedTransfer {
    fn fetch<'a>(
        &'a self,
        request: &'a TransferRequest,
        progress: TransferProgress<'a>,
        control: &'a TransferControl,
    ) -> BoxFuture<'a, DownloadResult<u64>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.block {
                progress(request.expected_size / 2);
                control.cancel_token().cancelled().await;
                return Err(DownloadError::Canceled);
            }

            control.checkpoint().await?;
            if self.fail_file.as_deref() == Some(request.file_name.as_str()) {
                return Err(DownloadError::Transfer {
                    url: request.url.clone(),
                    reason: "HTTP 503".to_string(),
                });
            }
            progress(request.expected_size / 2);
            progress(request.expected_size);
            Ok(request.expected_size)
        })
    }
}

// ============================================================================
// Scripted Store
// ============================================================================

/// In-memory store with one remote manifest shared by every package.
struct ScriptedStore {
    /// `None` makes every version request fail.
    remote_version: Option<String>,
    files: Vec<ManifestEntry>,
    local: Mutex<HashSet<String>>,
    transfer: Arc<ScriptedTransfer>,
    applied: Mutex<Vec<(String, String)>>,
    create_calls: AtomicUsize,
    clear_calls: AtomicUsize,
    fail_manifest: bool,
    fail_bundle_clear: bool,
}

impl ScriptedStore {
    fn new(remote_version: Option<&str>, files: Vec<ManifestEntry>) -> Self {
        Self {
            remote_version: remote_version.map(str::to_string),
            files,
            local: Mutex::new(HashSet::new()),
            transfer: Arc::new(ScriptedTransfer::default()),
            applied: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
            fail_manifest: false,
            fail_bundle_clear: false,
        }
    }

    /// Every manifest update fails.
    fn with_manifest_failure(mut self) -> Self {
        self.fail_manifest = true;
        self
    }

    /// Clearing all bundle files fails; other clear modes succeed.
    fn with_bundle_clear_failure(mut self) -> Self {
        self.fail_bundle_clear = true;
        self
    }

    fn with_transfer(mut self, transfer: ScriptedTransfer) -> Self {
        self.transfer = Arc::new(transfer);
        self
    }

    /// Mark every remote file as already cached.
    fn with_all_local(self) -> Self {
        {
            let mut local = self.local.lock();
            for entry in &self.files {
                local.insert(entry.name.clone());
            }
        }
        self
    }

    fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

impl PackageStore for ScriptedStore {
    fn register_package(&self, _package: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn initialize<'a>(
        &'a self,
        _package: &'a str,
        _params: InitParams,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }

    fn request_version<'a>(&'a self, package: &'a str) -> BoxFuture<'a, Result<String, StoreError>> {
        Box::pin(async move {
            self.remote_version.clone().ok_or_else(|| StoreError::Network {
                url: format!("http://primary/{}.version", package),
                reason: "connection refused".to_string(),
            })
        })
    }

    fn update_manifest<'a>(
        &'a self,
        package: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if self.fail_manifest {
                return Err(StoreError::ManifestParse {
                    package: package.to_string(),
                    reason: format!("version {} has no manifest", version),
                });
            }
            self.applied
                .lock()
                .push((package.to_string(), version.to_string()));
            Ok(())
        })
    }

    fn create_downloader<'a>(
        &'a self,
        package: &'a str,
        selector: &'a DownloadSelector,
        options: DownloaderOptions,
    ) -> BoxFuture<'a, Result<Arc<Downloader>, StoreError>> {
        Box::pin(async move {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let tasks = {
                let local = self.local.lock();
                self.files
                    .iter()
                    .filter(|entry| selector.matches(entry) && !local.contains(&entry.name))
                    .map(|entry| DownloadTask {
                        file_name: entry.name.clone(),
                        size: entry.size,
                        sha256: None,
                        dest: PathBuf::from(&entry.name),
                    })
                    .collect()
            };

            let transfer: Arc<dyn FileTransfer> = self.transfer.clone();
            Ok(Arc::new(Downloader::new(
                package,
                tasks,
                HostEndpoints::new(
                    format!("http://primary/{}", package),
                    format!("http://fallback/{}", package),
                ),
                transfer,
                options,
            )))
        })
    }

    fn clear_cache_files<'a>(
        &'a self,
        package: &'a str,
        mode: ClearMode,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.clear_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_bundle_clear && mode == ClearMode::AllBundleFiles {
                return Err(StoreError::Io {
                    path: PathBuf::from(package),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "file in use"),
                });
            }
            Ok(())
        })
    }

    fn local_size_bytes(&self, _package: &str) -> u64 {
        self.files.iter().map(|entry| entry.size).sum()
    }

    fn destroy<'a>(&'a self, _package: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn entry(name: &str, size: u64, tags: &[&str]) -> ManifestEntry {
    ManifestEntry {
        name: name.to_string(),
        size,
        sha256: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        assets: Vec::new(),
    }
}

/// Ten files of 500,000 bytes, 5,000,000 bytes in total.
fn core_files() -> Vec<ManifestEntry> {
    (0..10)
        .map(|i| entry(&format!("bundles/core_{}.bundle", i), 500_000, &["core"]))
        .collect()
}

fn host_config() -> PatchConfig {
    PatchConfig::new(PlayMode::Host)
        .with_hosts("http://primary", "http://fallback")
        .with_transition_delay(Duration::ZERO)
        .with_progress_interval(Duration::from_millis(5))
        .with_speed_sample_interval(Duration::ZERO)
}

struct Harness {
    orchestrator: PatchOrchestrator,
    store: Arc<ScriptedStore>,
    kv: Arc<MemoryKeyValueStore>,
    events: UnboundedReceiver<PatchEvent>,
}

fn harness(config: PatchConfig, store: ScriptedStore, available_mb: u64) -> Harness {
    let play_mode = config.play_mode;
    harness_with(config, store, vec![PackageInfo::app("core", play_mode)], available_mb)
}

fn harness_with(
    config: PatchConfig,
    store: ScriptedStore,
    packages: Vec<PackageInfo>,
    available_mb: u64,
) -> Harness {
    let store = Arc::new(store);
    let kv = Arc::new(MemoryKeyValueStore::new());
    let (sink, events) = ChannelSink::new();

    let store_dyn: Arc<dyn PackageStore> = store.clone();
    let kv_dyn: Arc<dyn KeyValueStore> = kv.clone();
    let orchestrator = PatchOrchestrator::builder(config, packages, store_dyn)
        .with_kv_store(kv_dyn)
        .with_event_sink(Arc::new(sink))
        .with_disk_probe(Arc::new(FixedDiskSpace(Some(available_mb))))
        .build();

    Harness {
        orchestrator,
        store,
        kv,
        events,
    }
}

fn drain(rx: &mut UnboundedReceiver<PatchEvent>) -> Vec<PatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn states(events: &[PatchEvent]) -> Vec<PatchState> {
    events
        .iter()
        .filter_map(|e| match e {
            PatchEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

fn progress_bytes(events: &[PatchEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            PatchEvent::DownloadProgression(sample) => Some(sample.current_bytes),
            _ => None,
        })
        .collect()
}

fn count(events: &[PatchEvent], wanted: &PatchEvent) -> usize {
    events.iter().filter(|e| *e == wanted).count()
}

/// Wait until the event stream reports `state`, returning what was seen.
async fn wait_for_state(
    rx: &mut UnboundedReceiver<PatchEvent>,
    state: PatchState,
) -> Vec<PatchEvent> {
    let mut seen = Vec::new();
    let wait = async {
        while let Some(event) = rx.recv().await {
            let reached = event == PatchEvent::StateChanged(state);
            seen.push(event);
            if reached {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("state not reached in time");
    seen
}

// ============================================================================
// Full Check
// ============================================================================

#[tokio::test]
async fn test_core_package_full_check() {
    let mut h = harness(host_config(), ScriptedStore::new(Some("3"), core_files()), 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingBegin);

    let events = drain(&mut h.events);
    assert_eq!(
        states(&events),
        vec![
            PatchState::Prepare,
            PatchState::InitMode,
            PatchState::VersionUpdate,
            PatchState::ManifestUpdate,
            PatchState::CreateDownloader,
        ]
    );
    assert!(h.orchestrator.is_awaiting_begin());
    assert_eq!(h.orchestrator.group().total_count, 10);
    assert_eq!(h.orchestrator.group().total_bytes, 5_000_000);
    assert_eq!(h.store.transfer.calls(), 0);

    let outcome = h
        .orchestrator
        .begin_download()
        .expect("plan pending")
        .finished()
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let events = drain(&mut h.events);
    assert_eq!(
        states(&events),
        vec![
            PatchState::BeginDownload,
            PatchState::DownloadOver,
            PatchState::ClearCache,
            PatchState::Done,
        ]
    );

    let bytes = progress_bytes(&events);
    assert!(!bytes.is_empty());
    assert!(bytes.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", bytes);
    assert_eq!(bytes.last(), Some(&5_000_000));
    assert_eq!(count(&events, &PatchEvent::PatchDone), 1);

    let flags = h.orchestrator.flags();
    assert!(flags.is_done());
    assert!(!flags.is_checking());
    assert_eq!(h.store.transfer.calls(), 10);
    assert_eq!(
        kv::last_version(h.kv.as_ref(), "core"),
        Some("3".to_string())
    );

    // DownloadOver records the on-disk size of every package.
    let group = h.orchestrator.group();
    assert_eq!(group.total_count, 1);
    assert_eq!(group.total_bytes, 5_000_000);
}

#[tokio::test]
async fn test_auto_begin_runs_through() {
    let config = host_config().with_auto_begin_download(true);
    let mut h = harness(config, ScriptedStore::new(Some("3"), core_files()), 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert!(states(&drain(&mut h.events)).contains(&PatchState::BeginDownload));
}

#[tokio::test]
async fn test_zero_plan_skips_download() {
    let store = ScriptedStore::new(Some("3"), core_files()).with_all_local();
    let mut h = harness(host_config(), store, 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let events = drain(&mut h.events);
    let seen = states(&events);
    let create = seen
        .iter()
        .position(|s| *s == PatchState::CreateDownloader)
        .unwrap();
    assert_eq!(seen[create + 1], PatchState::DownloadOver);
    assert!(!seen.contains(&PatchState::BeginDownload));
    assert!(progress_bytes(&events).is_empty());
    assert_eq!(h.store.transfer.calls(), 0);
}

#[tokio::test]
async fn test_recreating_downloaders_resets_group_totals() {
    let mut h = harness(host_config(), ScriptedStore::new(Some("3"), core_files()), 10_000);
    h.orchestrator
        .set_group(DownloadGroup::with_tags("core", vec!["core".to_string()]));

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingBegin);
    assert_eq!(h.orchestrator.group().total_count, 10);

    let outcome = h
        .orchestrator
        .retry_from(PatchState::CreateDownloader)
        .unwrap()
        .finished()
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingBegin);

    let group = h.orchestrator.group();
    assert_eq!(group.total_count, 10);
    assert_eq!(group.total_bytes, 5_000_000);
    assert_eq!(h.store.create_calls(), 2);
    drain(&mut h.events);
}

#[tokio::test]
async fn test_unmatched_tags_plan_nothing() {
    let mut h = harness(host_config(), ScriptedStore::new(Some("3"), core_files()), 10_000);
    h.orchestrator
        .set_group(DownloadGroup::with_tags("extras", vec!["extras".to_string()]));

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert!(progress_bytes(&drain(&mut h.events)).is_empty());
}

// ============================================================================
// Version Failures
// ============================================================================

#[tokio::test]
async fn test_version_failure_without_fallback() {
    let config = host_config().with_weak_network_fallback(false);
    let mut h = harness(config, ScriptedStore::new(None, core_files()), 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::VersionUpdate));

    let events = drain(&mut h.events);
    assert_eq!(count(&events, &PatchEvent::VersionUpdateFailed), 1);
    assert!(!states(&events).contains(&PatchState::ManifestUpdate));

    let flags = h.orchestrator.flags();
    assert!(flags.is_checking());
    assert!(!flags.is_done());
    assert_eq!(h.store.create_calls(), 0);
}

#[tokio::test]
async fn test_fallback_without_recorded_versions_fails() {
    let mut h = harness(host_config(), ScriptedStore::new(None, core_files()), 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::VersionUpdate));

    let events = drain(&mut h.events);
    assert_eq!(count(&events, &PatchEvent::VersionUpdateFailed), 1);
    assert!(h.store.applied.lock().is_empty());
}

#[tokio::test]
async fn test_fallback_requires_every_package_record() {
    let packages = vec![
        PackageInfo::app("core", PlayMode::Host),
        PackageInfo::app("extras", PlayMode::Host),
    ];
    let mut h = harness_with(
        host_config(),
        ScriptedStore::new(None, core_files()).with_all_local(),
        packages,
        10_000,
    );
    kv::save_last_version(h.kv.as_ref(), "core", "2").unwrap();

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::VersionUpdate));
    assert_eq!(
        count(&drain(&mut h.events), &PatchEvent::VersionUpdateFailed),
        1
    );
}

#[tokio::test]
async fn test_fallback_uses_last_good_version() {
    let store = ScriptedStore::new(None, core_files()).with_all_local();
    let mut h = harness(host_config(), store, 10_000);
    kv::save_last_version(h.kv.as_ref(), "core", "2").unwrap();

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert!(h.orchestrator.is_using_fallback());
    assert_eq!(
        *h.store.applied.lock(),
        vec![("core".to_string(), "2".to_string())]
    );
    assert!(!drain(&mut h.events).iter().any(|e| e.is_failure()));
}

#[tokio::test]
async fn test_fallback_with_missing_files_needs_online_update() {
    let mut h = harness(host_config(), ScriptedStore::new(None, core_files()), 10_000);
    kv::save_last_version(h.kv.as_ref(), "core", "2").unwrap();

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::CreateDownloader));

    let events = drain(&mut h.events);
    assert_eq!(count(&events, &PatchEvent::VersionUpdateFailed), 1);
    assert_eq!(h.store.transfer.calls(), 0);
}

#[tokio::test]
async fn test_skip_download_ignored_under_fallback() {
    let config = host_config().with_skip_download(true);
    let mut h = harness(config, ScriptedStore::new(None, core_files()), 10_000);
    kv::save_last_version(h.kv.as_ref(), "core", "2").unwrap();

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::CreateDownloader));
    assert_eq!(h.store.create_calls(), 1);
    drain(&mut h.events);
}

#[tokio::test]
async fn test_skip_download_goes_to_download_over() {
    let config = host_config().with_skip_download(true);
    let mut h = harness(config, ScriptedStore::new(Some("3"), core_files()), 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(h.store.create_calls(), 0);
    assert!(!states(&drain(&mut h.events)).contains(&PatchState::BeginDownload));
}

#[tokio::test]
async fn test_manifest_failure_on_live_version_halts() {
    let store = ScriptedStore::new(Some("3"), core_files()).with_manifest_failure();
    let mut h = harness(host_config(), store, 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::ManifestUpdate));

    let events = drain(&mut h.events);
    assert_eq!(count(&events, &PatchEvent::ManifestUpdateFailed), 1);
    assert!(!states(&events).contains(&PatchState::CreateDownloader));
    assert!(!h.orchestrator.is_using_fallback());
    assert!(h.orchestrator.flags().is_checking());
    assert_eq!(kv::last_version(h.kv.as_ref(), "core"), None);
    assert_eq!(h.store.create_calls(), 0);
}

#[tokio::test]
async fn test_manifest_failure_on_fallback_version_halts() {
    let store = ScriptedStore::new(None, core_files())
        .with_all_local()
        .with_manifest_failure();
    let mut h = harness(host_config(), store, 10_000);
    kv::save_last_version(h.kv.as_ref(), "core", "2").unwrap();

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::ManifestUpdate));
    assert!(h.orchestrator.is_using_fallback());

    let events = drain(&mut h.events);
    assert_eq!(count(&events, &PatchEvent::ManifestUpdateFailed), 1);
    assert_eq!(count(&events, &PatchEvent::VersionUpdateFailed), 0);
    assert_eq!(
        kv::last_version(h.kv.as_ref(), "core"),
        Some("2".to_string())
    );
}

// ============================================================================
// Disk Space
// ============================================================================

#[tokio::test]
async fn test_not_enough_disk_space_halts() {
    let files = vec![
        entry("big_0.bundle", 100_000_000, &[]),
        entry("big_1.bundle", 100_000_000, &[]),
    ];
    let config = host_config().with_auto_begin_download(true);
    let mut h = harness(config, ScriptedStore::new(Some("3"), files), 100);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::BeginDownload));

    let events = drain(&mut h.events);
    assert_eq!(
        count(
            &events,
            &PatchEvent::DiskNotEnoughSpace {
                available_mb: 100,
                required_bytes: 200_000_000,
            }
        ),
        1
    );
    assert!(!states(&events).contains(&PatchState::DownloadOver));
    assert_eq!(h.store.transfer.calls(), 0);
}

#[tokio::test]
async fn test_disk_check_disabled_downloads_anyway() {
    let files = vec![entry("big_0.bundle", 200_000_000, &[])];
    let config = host_config()
        .with_auto_begin_download(true)
        .with_check_disk_space(false);
    let mut h = harness(config, ScriptedStore::new(Some("3"), files), 100);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(h.store.transfer.calls(), 1);
    drain(&mut h.events);
}

// ============================================================================
// Download Failures and Pause
// ============================================================================

#[tokio::test]
async fn test_file_failure_halts_download() {
    let store = ScriptedStore::new(Some("3"), core_files())
        .with_transfer(ScriptedTransfer::failing("bundles/core_3.bundle"));
    let config = host_config().with_auto_begin_download(true);
    let mut h = harness(config, store, 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::BeginDownload));

    let events = drain(&mut h.events);
    let failures: Vec<(String, String)> = events
        .iter()
        .filter_map(|e| match e {
            PatchEvent::DownloadFailed { file_name, error } => {
                Some((file_name.clone(), error.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "bundles/core_3.bundle");
    assert!(failures[0].1.contains("HTTP 503"), "error was {}", failures[0].1);
    assert!(!states(&events).contains(&PatchState::DownloadOver));

    let flags = h.orchestrator.flags();
    assert!(flags.is_checking());
    assert!(!flags.is_done());
}

#[tokio::test]
async fn test_pause_holds_download_until_resume() {
    let mut h = harness(host_config(), ScriptedStore::new(Some("3"), core_files()), 10_000);
    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingBegin);
    drain(&mut h.events);

    h.orchestrator.pause();
    let finished = h
        .orchestrator
        .begin_download()
        .expect("plan pending")
        .finished();
    tokio::pin!(finished);

    let held = tokio::time::timeout(Duration::from_millis(100), &mut finished).await;
    assert!(held.is_err(), "paused download finished");
    assert!(progress_bytes(&drain(&mut h.events)).iter().all(|b| *b == 0));

    h.orchestrator.resume();
    let outcome = tokio::time::timeout(Duration::from_secs(5), finished)
        .await
        .expect("download stalled after resume")
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(h.store.transfer.calls(), 10);
}

#[tokio::test]
async fn test_pause_does_not_outlive_canceled_run() {
    let mut h = harness(host_config(), ScriptedStore::new(Some("3"), core_files()), 10_000);
    h.orchestrator.check().unwrap().finished().await.unwrap();

    h.orchestrator.pause();
    h.orchestrator.cancel(false);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingBegin);

    let run = h.orchestrator.begin_download().expect("plan pending");
    let outcome = tokio::time::timeout(Duration::from_secs(5), run.finished())
        .await
        .expect("new run held by an earlier pause")
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(h.store.transfer.calls(), 10);
    drain(&mut h.events);
}

#[tokio::test]
async fn test_retry_starts_unpaused() {
    let mut h = harness(host_config(), ScriptedStore::new(Some("3"), core_files()), 10_000);
    h.orchestrator.check().unwrap().finished().await.unwrap();
    h.orchestrator.pause();

    let outcome = h
        .orchestrator
        .retry_from(PatchState::CreateDownloader)
        .unwrap()
        .finished()
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::AwaitingBegin);

    let run = h.orchestrator.begin_download().expect("plan pending");
    let outcome = tokio::time::timeout(Duration::from_secs(5), run.finished())
        .await
        .expect("retried run held by an earlier pause")
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    drain(&mut h.events);
}

// ============================================================================
// Cancel and Repair
// ============================================================================

#[tokio::test]
async fn test_cancel_mid_download_clears_flags() {
    let store = ScriptedStore::new(Some("3"), core_files())
        .with_transfer(ScriptedTransfer::blocking());
    let config = host_config().with_auto_begin_download(true);
    let mut h = harness(config, store, 10_000);

    let run = h.orchestrator.check().unwrap();
    wait_for_state(&mut h.events, PatchState::BeginDownload).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.store.transfer.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transfer never started");

    h.orchestrator.cancel(true);
    let outcome = run.finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Canceled);

    let flags = h.orchestrator.flags();
    assert!(!flags.is_checking());
    assert!(!flags.is_repairing());
    assert!(!flags.is_done());

    let events = drain(&mut h.events);
    assert_eq!(count(&events, &PatchEvent::DownloadCanceled), 1);
    assert!(!states(&events).contains(&PatchState::DownloadOver));
}

#[tokio::test]
async fn test_cancel_while_awaiting_begin() {
    let mut h = harness(host_config(), ScriptedStore::new(Some("3"), core_files()), 10_000);
    h.orchestrator.check().unwrap().finished().await.unwrap();

    h.orchestrator.cancel(false);
    assert!(!h.orchestrator.is_awaiting_begin());
    assert!(h.orchestrator.begin_download().is_none());
    assert!(!h.orchestrator.flags().is_busy());
    assert_eq!(count(&drain(&mut h.events), &PatchEvent::DownloadCanceled), 0);
}

#[tokio::test]
async fn test_repair_clears_then_checks() {
    let store = ScriptedStore::new(Some("3"), core_files()).with_all_local();
    let mut h = harness(host_config(), store, 10_000);

    let outcome = h.orchestrator.repair().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let seen = states(&drain(&mut h.events));
    assert_eq!(seen[0], PatchState::Repair);
    assert_eq!(seen[1], PatchState::Prepare);
    assert_eq!(seen.last(), Some(&PatchState::Done));
    // Two full clears during repair, two unused clears during ClearCache.
    assert_eq!(h.store.clear_calls(), 4);
    assert!(!h.orchestrator.flags().is_repairing());
}

#[tokio::test]
async fn test_simulated_repair_never_clears() {
    let store = ScriptedStore::new(Some("simulate"), core_files());
    let config = PatchConfig::new(PlayMode::EditorSimulate).with_transition_delay(Duration::ZERO);
    let mut h = harness(config, store, 10_000);

    let outcome = h.orchestrator.repair().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let seen = states(&drain(&mut h.events));
    assert_eq!(&seen[..2], &[PatchState::Repair, PatchState::Prepare]);
    assert_eq!(seen.last(), Some(&PatchState::Done));
    assert_eq!(h.store.clear_calls(), 0);
    assert_eq!(h.store.create_calls(), 0);
}

#[tokio::test]
async fn test_retry_after_halt_resumes_at_state() {
    let config = host_config().with_weak_network_fallback(false);
    let mut h = harness(config, ScriptedStore::new(None, core_files()), 10_000);

    let outcome = h.orchestrator.check().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::VersionUpdate));
    drain(&mut h.events);

    let outcome = h
        .orchestrator
        .retry_from(PatchState::VersionUpdate)
        .unwrap()
        .finished()
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::VersionUpdate));

    let events = drain(&mut h.events);
    assert_eq!(states(&events), vec![PatchState::VersionUpdate]);
    assert_eq!(count(&events, &PatchEvent::VersionUpdateFailed), 1);
}

#[tokio::test]
async fn test_repair_failure_halts_then_retry_continues() {
    let store = ScriptedStore::new(Some("3"), core_files())
        .with_all_local()
        .with_bundle_clear_failure();
    let mut h = harness(host_config(), store, 10_000);

    let outcome = h.orchestrator.repair().unwrap().finished().await.unwrap();
    assert_eq!(outcome, RunOutcome::Halted(PatchState::Repair));

    let events = drain(&mut h.events);
    assert_eq!(states(&events), vec![PatchState::Repair]);
    assert_eq!(count(&events, &PatchEvent::RepairFailed), 1);
    assert!(h.orchestrator.flags().is_repairing());

    // The one retry is spent; a second partial clear moves on.
    let outcome = h
        .orchestrator
        .retry_from(PatchState::Repair)
        .unwrap()
        .finished()
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let events = drain(&mut h.events);
    let seen = states(&events);
    assert_eq!(&seen[..2], &[PatchState::Repair, PatchState::Prepare]);
    assert_eq!(seen.last(), Some(&PatchState::Done));
    assert_eq!(count(&events, &PatchEvent::RepairFailed), 0);
    assert!(!h.orchestrator.flags().is_repairing());
}
