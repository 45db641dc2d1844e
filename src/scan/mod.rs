//! Directory scanner.
//!
//! Enumeration always runs on the worker pool so a stalled directory only
//! blocks one worker. Metadata lookups go through the pool too once the
//! candidate count passes the mount's parallel threshold; below it they run
//! inline. Between batches the [`tuner::Tuner`] resizes the pool and paces
//! the next batch.

pub mod filter;
pub mod keepalive;
pub mod pool;
pub mod tuner;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{classify_io, ErrorClass};
use crate::mount::{MountPolicy, PermissionCheck};
use crate::paths::{is_excluded, normalize_path};
use crate::shutdown::Shutdown;
use crate::snapshot::{FileRecord, Snapshot};
use filter::Verdict;
use keepalive::KeepAlive;
use pool::WorkerPool;
use tuner::{Adjustment, Change, Tuner, TuningConfig};

// how often the coordinator wakes to check the deadline and shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);
// directory listings between tuning decisions during enumeration
const LISTINGS_PER_EVALUATION: usize = 32;
const MAX_DIAGNOSTICS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// symlinks, sockets, devices
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub path: PathBuf,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: SystemTime,
}

/// The two filesystem calls the scanner makes. Tests swap in faulty
/// implementations to exercise throttling.
pub trait TreeFs: Send + Sync {
    /// Immediate children of `dir`, with full paths.
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<EntryInfo>>;
    fn stat(&self, path: &Path) -> io::Result<FileStat>;
}

pub struct LocalFs;

impl TreeFs for LocalFs {
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<EntryInfo>> {
        let mut entries = Vec::new();
        let walker = WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false);

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    let kind = if file_type.is_dir() {
                        EntryKind::Dir
                    } else if file_type.is_file() {
                        EntryKind::File
                    } else {
                        EntryKind::Other
                    };
                    entries.push(EntryInfo {
                        path: entry.into_path(),
                        kind,
                    });
                }
                // depth 0 means opening `dir` itself failed
                Err(err) if err.depth() == 0 => return Err(walk_error_to_io(err)),
                Err(err) => {
                    tracing::debug!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                }
            }
        }

        Ok(entries)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = std::fs::metadata(path)?;
        Ok(FileStat {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }
}

fn walk_error_to_io(err: walkdir::Error) -> io::Error {
    let message = err.to_string();
    err.into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message))
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot enumerate root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        class: ErrorClass,
        source: io::Error,
    },
    #[error("scan of {path} exceeded its {timeout:?} deadline")]
    DeadlineExceeded { path: PathBuf, timeout: Duration },
    #[error("scan of {path} cancelled by shutdown")]
    Cancelled { path: PathBuf },
    #[error("failed to start scan workers: {0}")]
    Spawn(#[source] io::Error),
}

impl ScanError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ScanError::RootUnreadable { class, .. } => *class,
            ScanError::DeadlineExceeded { .. } => ErrorClass::TransientIo,
            ScanError::Cancelled { .. } | ScanError::Spawn(_) => ErrorClass::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub min_file_size_bytes: u64,
    pub max_file_size_bytes: Option<u64>,
    pub max_files: Option<usize>,
    pub exclude: Vec<PathBuf>,
    pub overall_timeout: Duration,
    pub policy: MountPolicy,
    pub tuning: TuningConfig,
}

impl ScanOptions {
    pub fn new(policy: MountPolicy) -> Self {
        ScanOptions::from_config(&ScanConfig::default(), policy)
    }

    pub fn from_config(config: &ScanConfig, policy: MountPolicy) -> Self {
        ScanOptions {
            min_file_size_bytes: config.min_file_size_bytes(),
            max_file_size_bytes: config.max_file_size_bytes(),
            max_files: config.max_files,
            exclude: config.exclude.iter().map(|p| normalize_path(p)).collect(),
            overall_timeout: config.timeout,
            policy,
            tuning: TuningConfig {
                min_workers: config.min_workers,
                max_workers: config.max_workers,
                batch_size: config.batch_size,
                base_delay: config.batch_delay,
                max_delay: config.max_batch_delay,
                error_threshold: config.error_threshold,
                recovery_threshold: config.recovery_threshold,
                ..TuningConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub directories: u64,
    pub candidates: u64,
    pub auxiliary: u64,
    pub excluded: u64,
    pub skipped_small: u64,
    pub skipped_large: u64,
    /// dropped by the max_files cap
    pub capped: u64,
    pub vanished: u64,
    pub permission_denied: u64,
    pub errors: u64,
    pub transient_errors: u64,
    pub parallel: bool,
    pub grows: u32,
    pub shrinks: u32,
    pub final_workers: usize,
    pub final_batch_delay: Duration,
    pub keepalive_probes: u64,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub snapshot: Snapshot,
    pub stats: ScanStats,
    pub diagnostics: Vec<String>,
}

#[derive(Clone)]
pub struct Scanner {
    fs: Arc<dyn TreeFs>,
    shutdown: Shutdown,
}

impl Scanner {
    pub fn new(fs: Arc<dyn TreeFs>, shutdown: Shutdown) -> Self {
        Scanner { fs, shutdown }
    }

    pub fn local(shutdown: Shutdown) -> Self {
        Scanner::new(Arc::new(LocalFs), shutdown)
    }

    /// Scan `root` into a sorted snapshot. Per-file failures are counted and
    /// skipped; only an unreadable root, the deadline or shutdown fail the
    /// call.
    pub fn scan(&self, root: &Path, options: &ScanOptions) -> Result<ScanReport, ScanError> {
        let started = Instant::now();
        let root = normalize_path(root);
        let deadline = started
            .checked_add(options.overall_timeout)
            .unwrap_or_else(|| started + Duration::from_secs(365 * 24 * 60 * 60));

        let ctx = Arc::new(ScanContext {
            fs: Arc::clone(&self.fs),
            tuner: Tuner::new(options.tuning, &options.policy),
            policy: options.policy,
            shutdown: self.shutdown.clone(),
            abandoned: AtomicBool::new(false),
        });
        let _abandon = AbandonOnDrop(Arc::clone(&ctx));

        let pool = WorkerPool::new(options.tuning.max_workers, ctx.tuner.workers())
            .map_err(ScanError::Spawn)?;

        let keepalive = match options.policy.keepalive {
            Some(interval) => match KeepAlive::start(Arc::clone(&self.fs), root.clone(), interval) {
                Ok(k) => Some(k),
                Err(e) => {
                    tracing::warn!(path = %root.display(), error = %e, "keep-alive not started");
                    None
                }
            },
            None => None,
        };

        let mut run = ScanRun {
            ctx: &ctx,
            pool: &pool,
            root: &root,
            options,
            deadline,
            stats: ScanStats::default(),
            diagnostics: Vec::new(),
        };

        tracing::info!(
            path = %root.display(),
            mount = %options.policy.kind,
            workers = ctx.tuner.workers(),
            "scan started"
        );

        let mut candidates = run.enumerate()?;
        candidates.sort();
        candidates.dedup();

        if let Some(max) = options.max_files {
            if candidates.len() > max {
                let dropped = candidates.len() - max;
                tracing::warn!(path = %root.display(), max, dropped, "file cap reached, truncating scan");
                run.stats.capped = dropped as u64;
                candidates.truncate(max);
            }
        }
        run.stats.candidates = candidates.len() as u64;

        let parallel = candidates.len() > options.policy.parallel_threshold;
        run.stats.parallel = parallel;
        let records = if parallel {
            run.stat_parallel(candidates)?
        } else {
            run.stat_sequential(candidates)?
        };

        let ScanRun { mut stats, diagnostics, .. } = run;
        pool.join();

        stats.transient_errors = ctx.tuner.transient_errors();
        stats.final_workers = ctx.tuner.workers();
        stats.final_batch_delay = ctx.tuner.delay();
        stats.keepalive_probes = keepalive.as_ref().map_or(0, |k| k.probes());
        stats.duration_ms = started.elapsed().as_millis();
        stats.peak_memory_bytes = memory_stats::memory_stats().map(|m| m.physical_mem);
        drop(keepalive);

        let snapshot = Snapshot::new(&root, records, options.min_file_size_bytes);

        tracing::info!(
            path = %root.display(),
            files = snapshot.file_count,
            skipped_small = stats.skipped_small,
            auxiliary = stats.auxiliary,
            errors = stats.errors,
            transient = stats.transient_errors,
            workers = stats.final_workers,
            elapsed_ms = stats.duration_ms as u64,
            "scan complete"
        );

        Ok(ScanReport {
            snapshot,
            stats,
            diagnostics,
        })
    }
}

/// State shared with worker threads for a single scan.
struct ScanContext {
    fs: Arc<dyn TreeFs>,
    tuner: Tuner,
    policy: MountPolicy,
    shutdown: Shutdown,
    abandoned: AtomicBool,
}

struct AbandonOnDrop(Arc<ScanContext>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.abandoned.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct Failure {
    class: ErrorClass,
    error: io::Error,
    attempts: u32,
}

struct Listing {
    dir: PathBuf,
    result: Result<Vec<EntryInfo>, Failure>,
}

struct StatOutcome {
    path: PathBuf,
    result: Result<FileStat, Failure>,
}

impl ScanContext {
    fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Run `op`, retrying transient failures with linear backoff up to the
    /// mount's retry count. Every attempt feeds the tuner.
    fn with_retry<T, F>(&self, path: &Path, op: F) -> Result<T, Failure>
    where
        F: Fn(&dyn TreeFs) -> io::Result<T>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match op(self.fs.as_ref()) {
                Ok(value) => {
                    self.tuner.record_success();
                    return Ok(value);
                }
                Err(error) => {
                    let class = classify_io(&error);
                    self.tuner.record_error(class);

                    let give_up = !class.is_transient()
                        || attempts > self.policy.retries
                        || self.is_abandoned();
                    if give_up {
                        return Err(Failure { class, error, attempts });
                    }

                    tracing::debug!(
                        path = %path.display(),
                        attempt = attempts,
                        error = %error,
                        "transient error, retrying"
                    );
                    let backoff = self
                        .policy
                        .retry_delay
                        .saturating_mul(attempts)
                        .min(self.policy.io_timeout);
                    if !self.shutdown.sleep(backoff) {
                        return Err(Failure { class, error, attempts });
                    }
                }
            }
        }
    }
}

fn list_job(ctx: Arc<ScanContext>, dir: PathBuf, results: Sender<Listing>) {
    if ctx.is_abandoned() {
        return;
    }
    let result = ctx.with_retry(&dir, |fs| fs.read_dir(&dir));
    let _ = results.send(Listing { dir, result });
}

fn stat_job(ctx: Arc<ScanContext>, path: PathBuf, results: Sender<StatOutcome>) {
    if ctx.is_abandoned() {
        return;
    }
    let result = ctx.with_retry(&path, |fs| fs.stat(&path));
    let _ = results.send(StatOutcome { path, result });
}

/// Coordinator-side state for one scan. Only the coordinator thread
/// touches the stats, workers report through channels.
struct ScanRun<'a> {
    ctx: &'a Arc<ScanContext>,
    pool: &'a WorkerPool,
    root: &'a Path,
    options: &'a ScanOptions,
    deadline: Instant,
    stats: ScanStats,
    diagnostics: Vec<String>,
}

impl ScanRun<'_> {
    fn check_interrupt(&self) -> Result<(), ScanError> {
        if self.ctx.shutdown.is_triggered() {
            return Err(ScanError::Cancelled {
                path: self.root.to_path_buf(),
            });
        }
        if Instant::now() >= self.deadline {
            tracing::warn!(path = %self.root.display(), "scan deadline exceeded, abandoning");
            return Err(ScanError::DeadlineExceeded {
                path: self.root.to_path_buf(),
                timeout: self.options.overall_timeout,
            });
        }
        Ok(())
    }

    fn wait_slice(&self) -> Duration {
        self.deadline
            .saturating_duration_since(Instant::now())
            .min(POLL_INTERVAL)
    }

    fn enumerate(&mut self) -> Result<Vec<PathBuf>, ScanError> {
        let (sender, receiver) = unbounded::<Listing>();
        let mut candidates = Vec::new();
        let mut pending = 1usize;
        let mut since_evaluation = 0usize;

        self.submit_listing(self.root.to_path_buf(), &sender);

        while pending > 0 {
            self.check_interrupt()?;
            let listing = match receiver.recv_timeout(self.wait_slice()) {
                Ok(listing) => listing,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            pending -= 1;
            self.stats.directories += 1;

            match listing.result {
                Ok(entries) => {
                    for entry in entries {
                        if is_excluded(&entry.path, &self.options.exclude) {
                            self.stats.excluded += 1;
                            continue;
                        }
                        match (entry.kind, filter::classify(&entry.path, entry.kind)) {
                            (EntryKind::Dir, Verdict::Keep) => {
                                pending += 1;
                                self.submit_listing(entry.path, &sender);
                            }
                            (EntryKind::File, Verdict::Keep) => candidates.push(entry.path),
                            (_, Verdict::Auxiliary) => self.stats.auxiliary += 1,
                            _ => {}
                        }
                    }
                }
                Err(failure) if listing.dir == self.root => {
                    return Err(ScanError::RootUnreadable {
                        path: listing.dir,
                        class: failure.class,
                        source: failure.error,
                    });
                }
                Err(failure) => self.note_failure(&listing.dir, failure),
            }

            since_evaluation += 1;
            if since_evaluation >= LISTINGS_PER_EVALUATION {
                since_evaluation = 0;
                self.apply(self.ctx.tuner.evaluate());
            }
        }

        Ok(candidates)
    }

    fn submit_listing(&self, dir: PathBuf, sender: &Sender<Listing>) {
        let ctx = Arc::clone(self.ctx);
        let sender = sender.clone();
        self.pool.execute(move || list_job(ctx, dir, sender));
    }

    fn stat_sequential(&mut self, candidates: Vec<PathBuf>) -> Result<Vec<FileRecord>, ScanError> {
        let mut records = Vec::with_capacity(candidates.len());
        for path in candidates {
            self.check_interrupt()?;
            let result = self.ctx.with_retry(&path, |fs| fs.stat(&path));
            self.accept(StatOutcome { path, result }, &mut records);
        }
        Ok(records)
    }

    fn stat_parallel(&mut self, candidates: Vec<PathBuf>) -> Result<Vec<FileRecord>, ScanError> {
        let batch_size = self.options.tuning.batch_size.max(1);
        let batches = candidates.len().div_ceil(batch_size);
        let mut records = Vec::with_capacity(candidates.len());
        let (sender, receiver) = unbounded::<StatOutcome>();

        for (index, batch) in candidates.chunks(batch_size).enumerate() {
            self.check_interrupt()?;
            for path in batch {
                let ctx = Arc::clone(self.ctx);
                let sender = sender.clone();
                let path = path.clone();
                self.pool.execute(move || stat_job(ctx, path, sender));
            }

            let mut received = 0;
            while received < batch.len() {
                self.check_interrupt()?;
                match receiver.recv_timeout(self.wait_slice()) {
                    Ok(outcome) => {
                        received += 1;
                        self.accept(outcome, &mut records);
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            let adjustment = self.ctx.tuner.evaluate();
            self.apply(adjustment);

            if index + 1 < batches {
                let pause = adjustment
                    .delay
                    .min(self.deadline.saturating_duration_since(Instant::now()));
                if !self.ctx.shutdown.sleep(pause) {
                    return Err(ScanError::Cancelled {
                        path: self.root.to_path_buf(),
                    });
                }
            }
        }

        Ok(records)
    }

    fn accept(&mut self, outcome: StatOutcome, records: &mut Vec<FileRecord>) {
        match outcome.result {
            Ok(stat) if stat.size < self.options.min_file_size_bytes => {
                self.stats.skipped_small += 1;
            }
            Ok(stat) if self.options.max_file_size_bytes.is_some_and(|max| stat.size > max) => {
                self.stats.skipped_large += 1;
            }
            Ok(stat) => records.push(FileRecord {
                path: outcome.path,
                size: stat.size,
                modified_at: DateTime::<Utc>::from(stat.modified),
            }),
            Err(failure) => self.note_failure(&outcome.path, failure),
        }
    }

    fn note_failure(&mut self, path: &Path, failure: Failure) {
        let Failure { class, error, attempts } = failure;
        match class {
            ErrorClass::NotFound => {
                self.stats.vanished += 1;
                tracing::debug!(path = %path.display(), "vanished during scan");
                return;
            }
            ErrorClass::Permission => {
                self.stats.permission_denied += 1;
                if self.options.policy.permission == PermissionCheck::Strict {
                    tracing::warn!(path = %path.display(), class = %class, "permission denied, skipping");
                } else {
                    tracing::debug!(path = %path.display(), class = %class, "permission denied, skipping");
                }
            }
            _ => {
                self.stats.errors += 1;
                tracing::warn!(
                    path = %path.display(),
                    class = %class,
                    attempts,
                    error = %error,
                    "skipping path"
                );
            }
        }

        if self.diagnostics.len() < MAX_DIAGNOSTICS {
            self.diagnostics.push(format!(
                "{}: {class} after {attempts} attempt(s): {error}",
                path.display()
            ));
        }
    }

    fn apply(&mut self, adjustment: Adjustment) {
        let before = self.pool.size();
        self.pool.resize(adjustment.workers);
        match adjustment.change {
            Change::Grew => {
                self.stats.grows += 1;
                tracing::debug!(
                    from = before,
                    workers = adjustment.workers,
                    throughput = adjustment.throughput,
                    "mount healthy, growing pool"
                );
            }
            Change::Shrank => {
                self.stats.shrinks += 1;
                tracing::info!(
                    path = %self.root.display(),
                    from = before,
                    workers = adjustment.workers,
                    delay_ms = adjustment.delay.as_millis() as u64,
                    "mount struggling, shrinking pool"
                );
            }
            Change::Steady => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::{MountKind, MountPolicy};
    use std::fs::{self, File};

    fn sized(path: &Path, size: u64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().set_len(size).unwrap();
    }

    fn options(min: u64) -> ScanOptions {
        let mut options = ScanOptions::new(MountPolicy::for_kind(MountKind::Local));
        options.min_file_size_bytes = min;
        options.overall_timeout = Duration::from_secs(30);
        options
    }

    #[test]
    fn local_fs_lists_children_only() {
        let dir = tempfile::tempdir().unwrap();
        sized(&dir.path().join("a.mkv"), 1);
        sized(&dir.path().join("sub/b.mkv"), 1);

        let mut entries = LocalFs.read_dir(dir.path()).unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].kind, EntryKind::Dir);
    }

    #[test]
    fn local_fs_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFs.read_dir(&dir.path().join("nope")).unwrap_err();
        assert_eq!(classify_io(&err), ErrorClass::NotFound);
    }

    #[test]
    fn size_threshold_boundary() {
        let dir = tempfile::tempdir().unwrap();
        sized(&dir.path().join("under.mkv"), 999);
        sized(&dir.path().join("exact.mkv"), 1000);

        let report = Scanner::local(Shutdown::new()).scan(dir.path(), &options(1000)).unwrap();
        let names: Vec<_> = report
            .snapshot
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["exact.mkv"]);
        assert_eq!(report.stats.skipped_small, 1);
    }

    #[test]
    fn excluded_and_auxiliary_paths_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        sized(&dir.path().join("Movie/Movie.mkv"), 10);
        sized(&dir.path().join("Movie/Movie.srt"), 10_000);
        sized(&dir.path().join("Movie/Subs/eng.mkv"), 10);
        sized(&dir.path().join("tmp/partial.mkv"), 10);

        let mut opts = options(1);
        opts.exclude = vec![normalize_path(&dir.path().join("tmp"))];
        let report = Scanner::local(Shutdown::new()).scan(dir.path(), &opts).unwrap();

        assert_eq!(report.snapshot.file_count, 1);
        assert!(report.snapshot.files[0].path.ends_with("Movie/Movie.mkv"));
        assert_eq!(report.stats.excluded, 1);
        assert_eq!(report.stats.auxiliary, 2);
    }

    #[test]
    fn file_cap_truncates_sorted_candidates() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.mkv", "a.mkv", "b.mkv"] {
            sized(&dir.path().join(name), 5);
        }
        let mut opts = options(1);
        opts.max_files = Some(2);
        let report = Scanner::local(Shutdown::new()).scan(dir.path(), &opts).unwrap();
        assert_eq!(report.snapshot.file_count, 2);
        assert_eq!(report.stats.capped, 1);
        assert!(report.snapshot.files[1].path.ends_with("b.mkv"));
    }

    #[test]
    fn oversized_files_are_skipped_when_capped() {
        let dir = tempfile::tempdir().unwrap();
        sized(&dir.path().join("huge.mkv"), 5000);
        sized(&dir.path().join("fine.mkv"), 50);
        let mut opts = options(1);
        opts.max_file_size_bytes = Some(1000);
        let report = Scanner::local(Shutdown::new()).scan(dir.path(), &opts).unwrap();
        assert_eq!(report.snapshot.file_count, 1);
        assert_eq!(report.stats.skipped_large, 1);
    }

    #[test]
    fn missing_root_fails_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let err = Scanner::local(Shutdown::new())
            .scan(&dir.path().join("absent"), &options(1))
            .unwrap_err();
        assert!(matches!(err, ScanError::RootUnreadable { class: ErrorClass::NotFound, .. }));
    }

    #[test]
    fn parallel_path_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        for season in 0..4 {
            for ep in 0..30 {
                sized(&dir.path().join(format!("Show/S{season:02}/E{ep:02}.mkv")), 100);
            }
        }

        let scanner = Scanner::local(Shutdown::new());
        let sequential = scanner.scan(dir.path(), &options(1)).unwrap();

        let mut opts = options(1);
        opts.policy.parallel_threshold = 10;
        opts.tuning.batch_size = 16;
        opts.tuning.base_delay = Duration::ZERO;
        let parallel = scanner.scan(dir.path(), &opts).unwrap();

        assert!(!sequential.stats.parallel);
        assert!(parallel.stats.parallel);
        assert_eq!(sequential.snapshot.files, parallel.snapshot.files);
        assert_eq!(parallel.snapshot.file_count, 120);
    }

    #[test]
    fn shutdown_cancels_scan() {
        let dir = tempfile::tempdir().unwrap();
        sized(&dir.path().join("a.mkv"), 5);
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let err = Scanner::local(shutdown).scan(dir.path(), &options(1)).unwrap_err();
        assert!(matches!(err, ScanError::Cancelled { .. }));
    }
}
