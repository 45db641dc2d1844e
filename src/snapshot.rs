//! File records and tree snapshots.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::paths::normalize_path;

/// One media file as seen by the last scan. Identity is `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Sorted, duplicate-free file metadata for one tree root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub root: PathBuf,
    pub captured_at: DateTime<Utc>,
    pub files: Vec<FileRecord>,
    pub file_count: usize,
    pub min_size_bytes: u64,
}

impl Snapshot {
    pub fn new(root: &Path, files: Vec<FileRecord>, min_size_bytes: u64) -> Self {
        Snapshot::captured(root, files, min_size_bytes, Utc::now())
    }

    pub fn captured(
        root: &Path,
        mut files: Vec<FileRecord>,
        min_size_bytes: u64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        sort_and_dedup(&mut files);
        Snapshot {
            root: normalize_path(root),
            captured_at,
            file_count: files.len(),
            files,
            min_size_bytes,
        }
    }

    /// Stable key for this snapshot's root, see [`root_identity`].
    pub fn identity(&self) -> String {
        root_identity(&self.root)
    }

    pub fn paths(&self) -> BTreeSet<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().fold(0u64, |acc, f| acc.saturating_add(f.size))
    }

    /// Restore the sorted and unique invariant after deserializing a record
    /// that may have been edited by hand.
    pub(crate) fn repair(&mut self) {
        sort_and_dedup(&mut self.files);
        self.file_count = self.files.len();
    }
}

// identical paths keep the first record seen
fn sort_and_dedup(files: &mut Vec<FileRecord>) {
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
}

/// Hex prefix of sha-256 over the normalized root. Scans of the same root
/// always map to the same key no matter how the root was spelled.
pub fn root_identity(root: &Path) -> String {
    let normalized = normalize_path(root);
    let digest = Sha256::digest(normalized.to_string_lossy().as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            size,
            modified_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn files_are_sorted_and_unique() {
        let snapshot = Snapshot::new(
            Path::new("/media"),
            vec![record("/media/b.mkv", 2), record("/media/a.mkv", 1), record("/media/b.mkv", 3)],
            0,
        );
        let paths: Vec<_> = snapshot.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/media/a.mkv"), PathBuf::from("/media/b.mkv")]);
        assert_eq!(snapshot.file_count, 2);
    }

    #[test]
    fn identity_ignores_spelling_of_root() {
        assert_eq!(root_identity(Path::new("/mnt/media/")), root_identity(Path::new("/mnt//media")));
        assert_ne!(root_identity(Path::new("/mnt/media")), root_identity(Path::new("/mnt/tv")));
        assert_eq!(root_identity(Path::new("/mnt/media")).len(), 16);
    }
}
