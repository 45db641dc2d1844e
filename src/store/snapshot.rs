use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use walkdir::WalkDir;

use super::atomic::{write_atomic, WritePolicy};
use super::diff::{self, DiffResult};
use super::StoreError;
use crate::paths::normalize_path;
use crate::snapshot::{root_identity, Snapshot};

const PREFIX: &str = "snapshot_";
const SUFFIX: &str = ".json";

/// Metadata about a persisted snapshot file.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    pub kept: usize,
    pub removed: Vec<PathBuf>,
}

/// One JSON file per tree root, named after the hash of the normalized root.
pub struct SnapshotStore {
    dir: PathBuf,
    write: WritePolicy,
}

impl SnapshotStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(SnapshotStore {
            dir,
            write: WritePolicy::default(),
        })
    }

    pub fn with_write_policy(mut self, write: WritePolicy) -> Self {
        self.write = write;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, root: &Path) -> PathBuf {
        self.dir.join(format!("{PREFIX}{}{SUFFIX}", root_identity(root)))
    }

    /// The last saved snapshot for `root`, or `None` on a first scan.
    pub fn load(&self, root: &Path) -> Result<Option<Snapshot>, StoreError> {
        let path = self.path_for(root);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let mut snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;

        let expected = normalize_path(root);
        if snapshot.root != expected {
            // identity collision or a hand-copied file
            tracing::warn!(
                path = %path.display(),
                stored_root = %snapshot.root.display(),
                root = %expected.display(),
                "snapshot belongs to another root, ignoring"
            );
            return Ok(None);
        }

        snapshot.repair();
        Ok(Some(snapshot))
    }

    /// Persist atomically, replacing any previous snapshot of the same root.
    pub fn save(&self, snapshot: &Snapshot) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&snapshot.root);
        let bytes = serde_json::to_vec(snapshot)?;
        write_atomic(&path, &bytes, &self.write)?;
        tracing::debug!(
            path = %path.display(),
            root = %snapshot.root.display(),
            files = snapshot.file_count,
            "snapshot saved"
        );
        Ok(path)
    }

    pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> DiffResult {
        diff::compare(previous, current)
    }

    /// Snapshot files in the store, newest first.
    pub fn list(&self) -> Result<Vec<StoredSnapshot>, StoreError> {
        let mut stored = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::Read {
                path: self.dir.clone(),
                source: e.into_io_error().unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed")),
            })?;
            if !entry.file_type().is_file() || !is_snapshot_name(entry.file_name().to_str()) {
                continue;
            }
            // a file removed under us is simply not listed
            let Ok(metadata) = entry.metadata() else { continue };
            stored.push(StoredSnapshot {
                path: entry.into_path(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
            });
        }
        stored.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(stored)
    }

    /// Keep the newest `max_count` snapshots unconditionally; remove the
    /// rest when older than `max_age`.
    pub fn clean_old(&self, max_age: Duration, max_count: usize) -> Result<CleanReport, StoreError> {
        let now = SystemTime::now();
        let mut report = CleanReport::default();

        for (index, stored) in self.list()?.into_iter().enumerate() {
            let age = now.duration_since(stored.modified).unwrap_or(Duration::ZERO);
            if index < max_count || age <= max_age {
                report.kept += 1;
                continue;
            }
            match fs::remove_file(&stored.path) {
                Ok(()) => report.removed.push(stored.path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StoreError::Remove {
                        path: stored.path,
                        source,
                    })
                }
            }
        }

        if !report.removed.is_empty() {
            tracing::info!(removed = report.removed.len(), kept = report.kept, "old snapshots cleaned");
        }
        Ok(report)
    }
}

fn is_snapshot_name(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FileRecord;
    use chrono::DateTime;
    use std::fs::File;

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            size,
            modified_at: DateTime::from_timestamp(1_700_000_123, 456).unwrap(),
        }
    }

    fn age_file(path: &Path, age: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn load_returns_none_on_first_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(store.load(Path::new("/media/tv")).unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let snapshot = Snapshot::new(
            Path::new("/media/tv"),
            vec![record("/media/tv/b.mkv", 2), record("/media/tv/a.mkv", 1)],
            10,
        );

        store.save(&snapshot).unwrap();
        let loaded = store.load(Path::new("/media/tv/")).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn same_root_overwrites_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let first = Snapshot::new(Path::new("/media/tv"), vec![record("/media/tv/a.mkv", 1)], 0);
        let second = Snapshot::new(Path::new("/media//tv"), vec![record("/media/tv/b.mkv", 1)], 0);

        let p1 = store.save(&first).unwrap();
        let p2 = store.save(&second).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.load(Path::new("/media/tv")).unwrap().unwrap(), second);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        fs::write(store.path_for(Path::new("/media")), b"{not json").unwrap();
        assert!(matches!(store.load(Path::new("/media")), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn clean_old_keeps_newest_and_young() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let day = Duration::from_secs(24 * 60 * 60);

        let mut paths = Vec::new();
        for (i, root) in ["/a", "/b", "/c", "/d"].iter().enumerate() {
            let path = store.save(&Snapshot::new(Path::new(root), Vec::new(), 0)).unwrap();
            // /a is newest, /d oldest
            age_file(&path, day * (i as u32 * 10));
            paths.push(path);
        }
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
        age_file(&dir.path().join("notes.txt"), day * 100);

        let report = store.clean_old(day * 7, 2).unwrap();

        // /a and /b are the newest two, /c and /d are both past 7 days
        assert_eq!(report.kept, 2);
        assert_eq!(report.removed.len(), 2);
        assert!(paths[0].exists() && paths[1].exists());
        assert!(!paths[2].exists() && !paths[3].exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn clean_old_spares_recent_files_beyond_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        for root in ["/a", "/b", "/c"] {
            store.save(&Snapshot::new(Path::new(root), Vec::new(), 0)).unwrap();
        }
        let report = store.clean_old(Duration::from_secs(3600), 1).unwrap();
        assert_eq!(report.kept, 3);
        assert!(report.removed.is_empty());
    }
}
