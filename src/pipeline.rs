//! Per-tree pipeline (scan, diff, resolve, dispatch) and the daemon cycle
//! that runs it over every configured root.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::config::{Config, ConfigError, DaemonConfig, ScanConfig, SnapshotConfig};
use crate::dispatch::Dispatcher;
use crate::error::ErrorClass;
use crate::library::{LibraryProvider, LibraryTarget, MatchResult, Resolver};
use crate::mount::MountClassifier;
use crate::paths::normalize_path;
use crate::plex::PlexClient;
use crate::scan::{ScanError, ScanOptions, Scanner};
use crate::service::{RefreshClient, RefreshError};
use crate::shutdown::Shutdown;
use crate::store::atomic::WritePolicy;
use crate::store::{DispatchStore, SnapshotStore, StoreError};

const DISPATCH_DB: &str = "dispatch.db";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Plex(#[from] RefreshError),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Config(_) => ErrorClass::Config,
            PipelineError::Store(e) => e.class(),
            PipelineError::Plex(e) => e.class(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TreeOutcome {
    Dispatched { files: usize },
    Unchanged,
    Skipped { reason: String },
    Failed { class: ErrorClass, message: String },
    TimedOut,
}

impl TreeOutcome {
    fn failed(class: ErrorClass, message: impl Into<String>) -> Self {
        TreeOutcome::Failed {
            class,
            message: message.into(),
        }
    }
}

fn abandon(root: &Path) -> TreeOutcome {
    tracing::warn!(path = %root.display(), "tree abandoned after its deadline, nothing sent or saved");
    TreeOutcome::TimedOut
}

pub struct Pipeline {
    scanner: Scanner,
    snapshots: SnapshotStore,
    dispatcher: Option<Dispatcher>,
    resolver: Resolver,
    mounts: Arc<MountClassifier>,
    scan: ScanConfig,
    libraries: RwLock<Vec<LibraryTarget>>,
}

impl Pipeline {
    /// `dispatcher` is `None` when the media server integration is disabled.
    pub fn new(
        scanner: Scanner,
        snapshots: SnapshotStore,
        dispatcher: Option<Dispatcher>,
        resolver: Resolver,
        mounts: Arc<MountClassifier>,
        scan: ScanConfig,
    ) -> Self {
        Pipeline {
            scanner,
            snapshots,
            dispatcher,
            resolver,
            mounts,
            scan,
            libraries: RwLock::new(Vec::new()),
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn set_libraries(&self, libraries: Vec<LibraryTarget>) {
        *self.libraries.write() = libraries;
    }

    pub fn libraries(&self) -> Vec<LibraryTarget> {
        self.libraries.read().clone()
    }

    pub fn process_tree(&self, root: &Path) -> TreeOutcome {
        self.process_tree_until(root, &AtomicBool::new(false))
    }

    /// Like [`Pipeline::process_tree`], but gives up without dispatching or
    /// saving once `abandoned` is raised. The daemon raises it when the tree
    /// outlives its deadline.
    pub fn process_tree_until(&self, root: &Path, abandoned: &AtomicBool) -> TreeOutcome {
        let root = normalize_path(root);
        let options = ScanOptions::from_config(&self.scan, self.mounts.policy(&root));

        let report = match self.scanner.scan(&root, &options) {
            Ok(report) => report,
            Err(ScanError::DeadlineExceeded { .. }) => return TreeOutcome::TimedOut,
            Err(ScanError::Cancelled { .. }) => {
                return TreeOutcome::Skipped {
                    reason: "shutdown requested".into(),
                }
            }
            Err(e) => return TreeOutcome::failed(e.class(), e.to_string()),
        };

        let previous = match self.snapshots.load(&root) {
            Ok(previous) => previous,
            Err(e @ StoreError::Corrupt { .. }) => {
                tracing::warn!(path = %root.display(), error = %e, "previous snapshot unreadable, treating as first scan");
                None
            }
            Err(e) => return TreeOutcome::failed(e.class(), e.to_string()),
        };
        let first_scan = previous.is_none();
        let diff = SnapshotStore::diff(previous.as_ref(), &report.snapshot);

        tracing::info!(
            path = %root.display(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            modified = diff.modified.len(),
            first_scan,
            "tree diffed"
        );

        if abandoned.load(Ordering::SeqCst) {
            return abandon(&root);
        }

        let outcome = if diff.added.is_empty() {
            TreeOutcome::Unchanged
        } else {
            self.dispatch_added(&root, diff.added.iter().cloned().collect())
        };

        if matches!(outcome, TreeOutcome::Failed { .. }) {
            tracing::warn!(path = %root.display(), "dispatch incomplete, snapshot kept for retry");
            return outcome;
        }
        if abandoned.load(Ordering::SeqCst) {
            return abandon(&root);
        }
        // rewritten even when unchanged so housekeeping sees a live tree
        if let Err(e) = self.snapshots.save(&report.snapshot) {
            return TreeOutcome::failed(e.class(), e.to_string());
        }
        outcome
    }

    fn dispatch_added(&self, root: &Path, added: Vec<PathBuf>) -> TreeOutcome {
        let Some(dispatcher) = &self.dispatcher else {
            return TreeOutcome::Skipped {
                reason: format!("media server disabled, {} new files not sent", added.len()),
            };
        };

        let libraries = self.libraries.read().clone();
        let (groups, unmatched) = self.group_by_library(added, &libraries);
        if unmatched > 0 {
            tracing::warn!(path = %root.display(), files = unmatched, "no library matched, files skipped");
        }
        if groups.is_empty() {
            return TreeOutcome::Skipped {
                reason: format!("no library matched {unmatched} new files"),
            };
        }

        let mut dispatched = 0;
        let mut failure: Option<(ErrorClass, String)> = None;
        for (target, files) in groups.values() {
            match dispatcher.dispatch(target, files) {
                Ok(outcome) => {
                    dispatched += outcome.dispatched;
                    if !outcome.fully_succeeded() {
                        failure.get_or_insert((
                            ErrorClass::TransientIo,
                            format!("{} files failed to refresh in library {}", outcome.failed, outcome.library_id),
                        ));
                    }
                }
                Err(e) => {
                    tracing::error!(path = %root.display(), library = %target.target.id, error = %e, "dispatch failed");
                    failure.get_or_insert((e.class(), e.to_string()));
                }
            }
        }

        match failure {
            Some((class, message)) => TreeOutcome::failed(class, message),
            // every new file was already on record for its library
            None if dispatched == 0 => TreeOutcome::Unchanged,
            None => TreeOutcome::Dispatched { files: dispatched },
        }
    }

    /// Resolve each file's directory once and group files by library id.
    fn group_by_library(
        &self,
        files: Vec<PathBuf>,
        libraries: &[LibraryTarget],
    ) -> (BTreeMap<String, (MatchResult, Vec<PathBuf>)>, usize) {
        let mut resolved: HashMap<PathBuf, Option<MatchResult>> = HashMap::new();
        let mut groups: BTreeMap<String, (MatchResult, Vec<PathBuf>)> = BTreeMap::new();
        let mut unmatched = 0;

        for file in files {
            let Some(parent) = file.parent().map(Path::to_path_buf) else {
                unmatched += 1;
                continue;
            };
            let hit = resolved
                .entry(parent)
                .or_insert_with_key(|dir| self.resolver.resolve(dir, libraries))
                .clone();
            match hit {
                Some(hit) => groups
                    .entry(hit.target.id.clone())
                    .or_insert_with(|| (hit, Vec::new()))
                    .1
                    .push(file),
                None => unmatched += 1,
            }
        }
        (groups, unmatched)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub succeeded: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub dispatched: usize,
    pub cleaned: usize,
    pub elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<usize>,
    pub trees: Vec<(PathBuf, TreeOutcome)>,
}

impl CycleReport {
    fn record(&mut self, root: PathBuf, outcome: TreeOutcome) {
        match &outcome {
            TreeOutcome::Dispatched { files } => {
                self.succeeded += 1;
                self.dispatched += files;
            }
            TreeOutcome::Unchanged => self.unchanged += 1,
            TreeOutcome::Skipped { .. } => self.skipped += 1,
            TreeOutcome::Failed { .. } => self.failed += 1,
            TreeOutcome::TimedOut => self.timed_out += 1,
        }
        self.trees.push((root, outcome));
    }
}

pub struct Daemon {
    pipeline: Arc<Pipeline>,
    provider: Option<Arc<dyn LibraryProvider>>,
    roots: Vec<PathBuf>,
    config: DaemonConfig,
    retention: SnapshotConfig,
    shutdown: Shutdown,
    /// roots whose worker thread has not finished yet
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Clears a root from the in-flight set when its worker finishes or panics.
struct InFlight {
    roots: Arc<Mutex<HashSet<PathBuf>>>,
    root: PathBuf,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.roots.lock().remove(&self.root);
    }
}

impl Daemon {
    pub fn new(
        pipeline: Arc<Pipeline>,
        provider: Option<Arc<dyn LibraryProvider>>,
        roots: Vec<PathBuf>,
        config: DaemonConfig,
        retention: SnapshotConfig,
        shutdown: Shutdown,
    ) -> Self {
        Daemon {
            pipeline,
            provider,
            roots: dedupe_roots(roots),
            config,
            retention,
            shutdown,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Wire the real filesystem, state stores and Plex client from config.
    pub fn from_config(config: &Config, shutdown: Shutdown) -> Result<Self, PipelineError> {
        let state_dir = config.state_dir()?;
        let snapshots = SnapshotStore::open(&state_dir)?.with_write_policy(WritePolicy {
            attempts: config.snapshots.write_attempts.max(1),
            ..WritePolicy::default()
        });
        let mounts = Arc::new(MountClassifier::from_system(config.mount_overrides()));
        let resolver = Resolver::new(config.path_mappings.clone());

        let (dispatcher, provider) = if config.plex.enabled {
            let client = Arc::new(PlexClient::from_config(&config.plex)?);
            let store = DispatchStore::open(&state_dir.join(DISPATCH_DB))?;
            let refresh: Arc<dyn RefreshClient> = client.clone();
            let dispatcher = Dispatcher::new(refresh, store, config.dispatch.clone(), shutdown.clone())
                .with_min_size(config.scan.min_file_size_bytes())
                .with_resolver(resolver.clone())
                .with_mounts(Arc::clone(&mounts));
            let provider: Arc<dyn LibraryProvider> = client;
            (Some(dispatcher), Some(provider))
        } else {
            tracing::warn!("plex integration disabled, changes will be detected but not sent");
            (None, None)
        };

        let pipeline = Pipeline::new(
            Scanner::local(shutdown.clone()),
            snapshots,
            dispatcher,
            resolver,
            mounts,
            config.scan.clone(),
        );

        Ok(Daemon::new(
            Arc::new(pipeline),
            provider,
            config.scan.roots.clone(),
            config.daemon.clone(),
            config.snapshots.clone(),
            shutdown,
        ))
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn refresh_libraries(&self) -> Result<usize, RefreshError> {
        let Some(provider) = &self.provider else {
            return Ok(0);
        };
        let libraries = provider.list_libraries()?;
        let count = libraries.len();
        self.pipeline.set_libraries(libraries);
        Ok(count)
    }

    pub fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        match self
            .pipeline
            .snapshots()
            .clean_old(self.retention.retention, self.retention.max_count)
        {
            Ok(cleaned) => report.cleaned = cleaned.removed.len(),
            Err(e) => tracing::warn!(error = %e, class = %e.class(), "snapshot cleanup failed"),
        }

        match self.refresh_libraries() {
            Ok(count) => tracing::debug!(count, "libraries refreshed"),
            Err(e) => tracing::warn!(error = %e, class = %e.class(), "library refresh failed, keeping previous list"),
        }

        for root in &self.roots {
            if self.shutdown.is_triggered() {
                break;
            }
            let outcome = self.run_tree(root);
            match &outcome {
                TreeOutcome::Failed { class, message } => {
                    tracing::error!(path = %root.display(), class = %class, error = %message, "tree failed")
                }
                TreeOutcome::TimedOut => tracing::error!(
                    path = %root.display(),
                    timeout = ?self.config.tree_timeout,
                    "tree timed out, abandoned"
                ),
                other => tracing::debug!(path = %root.display(), outcome = ?other, "tree processed"),
            }
            report.record(root.clone(), outcome);
        }

        report.elapsed_ms = started.elapsed().as_millis();
        report.peak_memory_bytes = memory_stats::memory_stats().map(|m| m.physical_mem);

        tracing::info!(
            succeeded = report.succeeded,
            unchanged = report.unchanged,
            failed = report.failed,
            skipped = report.skipped,
            timed_out = report.timed_out,
            dispatched = report.dispatched,
            elapsed_ms = report.elapsed_ms as u64,
            "cycle complete"
        );
        report
    }

    /// Run one tree on its own thread so a hung mount cannot stall the cycle.
    fn run_tree(&self, root: &Path) -> TreeOutcome {
        let owned = root.to_path_buf();
        if !self.in_flight.lock().insert(owned.clone()) {
            tracing::warn!(path = %root.display(), "previous run of this tree still in progress, skipping");
            return TreeOutcome::Skipped {
                reason: "previous run still in progress".into(),
            };
        }
        let guard = InFlight {
            roots: Arc::clone(&self.in_flight),
            root: owned.clone(),
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        let pipeline = Arc::clone(&self.pipeline);
        let abandoned = Arc::new(AtomicBool::new(false));
        let worker_abandoned = Arc::clone(&abandoned);

        let spawned = std::thread::Builder::new()
            .name("mediawatch-tree".into())
            .spawn(move || {
                let outcome = pipeline.process_tree_until(&owned, &worker_abandoned);
                // released before the send so the next cycle never sees a finished tree as busy
                drop(guard);
                let _ = tx.send(outcome);
            });
        if let Err(e) = spawned {
            return TreeOutcome::failed(crate::error::classify_io(&e), format!("cannot start tree worker: {e}"));
        }

        match rx.recv_timeout(self.config.tree_timeout) {
            Ok(outcome) => outcome,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                abandoned.store(true, Ordering::SeqCst);
                TreeOutcome::TimedOut
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                TreeOutcome::failed(ErrorClass::Unknown, "tree worker exited without a result")
            }
        }
    }

    /// Loop cycles until shutdown.
    pub fn run(&self) {
        tracing::info!(
            roots = self.roots.len(),
            interval = %humantime::format_duration(self.config.interval),
            "daemon started"
        );
        while !self.shutdown.is_triggered() {
            self.run_cycle();
            if !self.shutdown.sleep(self.config.interval) {
                break;
            }
        }
        tracing::info!("daemon stopped");
    }
}

/// Normalize and drop duplicate roots, keeping first-seen order.
pub fn dedupe_roots(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    roots
        .into_iter()
        .map(|r| normalize_path(&r))
        .filter(|r| seen.insert(r.clone()))
        .collect()
}
