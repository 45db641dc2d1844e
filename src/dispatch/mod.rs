//! Turns changed files into paced refresh calls for one library, skipping
//! work the media server has already been told about.

pub mod merge;
pub mod pacing;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::DispatchConfig;
use crate::error::ErrorClass;
use crate::library::{MatchResult, Resolver};
use crate::mount::MountClassifier;
use crate::service::{RefreshClient, RefreshError};
use crate::shutdown::Shutdown;
use crate::store::dispatch::checksum;
use crate::store::{DispatchSnapshot, DispatchStore, StoreError};

use merge::{DirectoryGroup, MergeOptions};
use pacing::{Pacer, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch state for library {library_id}: {source}")]
    Store {
        library_id: String,
        #[source]
        source: StoreError,
    },
}

impl DispatchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DispatchError::Store { source, .. } => source.class(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchOutcome {
    pub library_id: String,
    /// files that passed the existence and size filter
    pub considered: usize,
    /// files covered by a successful refresh call
    pub dispatched: usize,
    /// files whose refresh failed after retries
    pub failed: usize,
    /// refresh requests sent, retries included
    pub calls: usize,
    pub directories: usize,
    /// the file set matched the last recorded checksum
    pub skipped_unchanged: bool,
}

impl DispatchOutcome {
    pub fn fully_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Why a single refresh call did not go through.
#[derive(Debug)]
enum CallFailure {
    Rejected,
    Error(RefreshError),
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::Rejected => f.write_str("refresh rejected"),
            CallFailure::Error(e) => write!(f, "{e}"),
        }
    }
}

pub struct Dispatcher {
    client: Arc<dyn RefreshClient>,
    store: Mutex<DispatchStore>,
    config: DispatchConfig,
    min_size_bytes: u64,
    resolver: Resolver,
    mounts: Arc<MountClassifier>,
    pacer: Mutex<Pacer>,
    shutdown: Shutdown,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn RefreshClient>,
        store: DispatchStore,
        config: DispatchConfig,
        shutdown: Shutdown,
    ) -> Self {
        Dispatcher {
            client,
            store: Mutex::new(store),
            pacer: Mutex::new(Pacer::new(config.call_delay)),
            config,
            min_size_bytes: 0,
            resolver: Resolver::default(),
            mounts: Arc::new(MountClassifier::new(Vec::new(), Vec::new())),
            shutdown,
        }
    }

    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_size_bytes = bytes;
        self
    }

    /// Host-to-server path mappings applied to refresh directories.
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_mounts(mut self, mounts: Arc<MountClassifier>) -> Self {
        self.mounts = mounts;
        self
    }

    /// Send refresh calls for the new files among `changed` and record what
    /// was sent. Files whose refresh failed are left out of the record so the
    /// next dispatch picks them up again.
    pub fn dispatch(&self, target: &MatchResult, changed: &[PathBuf]) -> Result<DispatchOutcome, DispatchError> {
        let library_id = target.target.id.as_str();
        let store_err = |source| DispatchError::Store {
            library_id: library_id.to_string(),
            source,
        };

        let current = self.filter(changed);
        let mut outcome = DispatchOutcome {
            library_id: library_id.to_string(),
            considered: current.len(),
            ..DispatchOutcome::default()
        };

        let sum = checksum(current.iter().map(|p| p.as_path()));
        let previous = self.store.lock().load(library_id).map_err(store_err)?;
        if previous.as_ref().is_some_and(|p| p.checksum == sum) {
            tracing::debug!(library = library_id, files = current.len(), "file set unchanged since last dispatch");
            outcome.skipped_unchanged = true;
            return Ok(outcome);
        }

        let fresh: Vec<&PathBuf> = match &previous {
            Some(prev) => current.difference(&prev.dispatched_paths).collect(),
            None => current.iter().collect(),
        };

        let mut failed: BTreeSet<PathBuf> = BTreeSet::new();
        if !fresh.is_empty() {
            let groups = self.plan(target, &fresh);
            outcome.directories = groups.len();
            let batches = merge::batches(groups, self.config.batch_size);
            self.send(library_id, batches, &mut outcome, &mut failed);
        }

        // everything ever refreshed for this library that still exists, so a
        // full re-surface of the tree only sends what the server never saw
        let mut persisted: BTreeSet<PathBuf> = match previous {
            Some(prev) => prev.dispatched_paths.into_iter().filter(|p| p.exists()).collect(),
            None => BTreeSet::new(),
        };
        persisted.extend(current.difference(&failed).cloned());
        let record = DispatchSnapshot::new(library_id, persisted);
        self.store.lock().save(&record).map_err(store_err)?;

        tracing::info!(
            library = library_id,
            name = %target.target.name,
            considered = outcome.considered,
            dispatched = outcome.dispatched,
            failed = outcome.failed,
            calls = outcome.calls,
            "dispatch finished"
        );
        Ok(outcome)
    }

    fn filter(&self, changed: &[PathBuf]) -> BTreeSet<PathBuf> {
        changed
            .iter()
            .filter(|path| match fs::metadata(path) {
                Ok(meta) => meta.is_file() && meta.len() >= self.min_size_bytes,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "changed file no longer readable");
                    false
                }
            })
            .cloned()
            .collect()
    }

    fn plan(&self, target: &MatchResult, fresh: &[&PathBuf]) -> Vec<DirectoryGroup> {
        let entries = fresh.iter().filter_map(|file| {
            let parent = file.parent()?;
            Some((self.resolver.map_path(parent), (*file).clone()))
        });

        let roots: Vec<PathBuf> = match &target.root {
            Some(root) => vec![root.clone()],
            None => target.target.root_paths.clone(),
        };

        merge::plan(
            entries,
            &roots,
            MergeOptions {
                enabled: self.config.merge_directories,
                max_depth: self.config.max_directory_depth.max(1),
            },
        )
    }

    fn send(
        &self,
        library_id: &str,
        batches: Vec<Vec<DirectoryGroup>>,
        outcome: &mut DispatchOutcome,
        failed: &mut BTreeSet<PathBuf>,
    ) {
        let total = batches.len();
        let retry = RetryPolicy {
            retries: self.config.retries,
            delay: self.config.retry_delay,
        };

        for (index, batch) in batches.into_iter().enumerate() {
            let batch_files: usize = batch.iter().map(|g| g.files.len()).sum();
            let batch_slow = batch.iter().any(|g| self.is_slow(g));
            let deepest = batch
                .iter()
                .map(|g| g.dir.as_path())
                .max_by_key(|d| crate::paths::depth(d))
                .map(Path::to_path_buf)
                .unwrap_or_default();

            tracing::debug!(
                library = library_id,
                batch = index + 1,
                batches = total,
                directories = batch.len(),
                files = batch_files,
                "refresh batch"
            );

            for group in batch {
                if self.shutdown.is_triggered() {
                    outcome.failed += group.files.len();
                    failed.extend(group.files);
                    continue;
                }

                let result = pacing::retry_linear(
                    retry,
                    &self.shutdown,
                    |attempt| {
                        outcome.calls += 1;
                        let result = match self.client.refresh(library_id, &group.dir) {
                            Ok(true) => Ok(()),
                            Ok(false) => Err(CallFailure::Rejected),
                            Err(e) => Err(CallFailure::Error(e)),
                        };
                        if let Err(e) = &result {
                            self.pacer.lock().record_failure();
                            tracing::warn!(
                                library = library_id,
                                path = %group.dir.display(),
                                attempt,
                                error = %e,
                                "refresh call failed"
                            );
                        }
                        result
                    },
                    |failure| match failure {
                        CallFailure::Rejected => true,
                        CallFailure::Error(err) => err.class().is_transient(),
                    },
                );

                match result {
                    Ok(()) => {
                        outcome.dispatched += group.files.len();
                        let delay = {
                            let mut pacer = self.pacer.lock();
                            pacer.record_success();
                            pacer.call_delay(group.files.len(), self.is_slow(&group), &group.dir)
                        };
                        self.shutdown.sleep(delay);
                    }
                    Err(e) => {
                        let class = match &e {
                            CallFailure::Rejected => ErrorClass::Unknown,
                            CallFailure::Error(err) => err.class(),
                        };
                        tracing::error!(
                            library = library_id,
                            path = %group.dir.display(),
                            class = %class,
                            files = group.files.len(),
                            "refresh failed after retries"
                        );
                        outcome.failed += group.files.len();
                        failed.extend(group.files);
                    }
                }
            }

            if index + 1 < total {
                let gap = self
                    .pacer
                    .lock()
                    .call_delay(batch_files, batch_slow, &deepest)
                    .min(self.config.batch_delay);
                self.shutdown.sleep(gap);
            }
        }
    }

    fn is_slow(&self, group: &DirectoryGroup) -> bool {
        group
            .files
            .first()
            .is_some_and(|file| self.mounts.policy(file).is_slow_protocol())
    }
}
