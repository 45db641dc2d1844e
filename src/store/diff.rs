//! Snapshot comparison engine.
//!
//! Compares two snapshots of the same root by path:
//! - added: only in the current snapshot
//! - removed: only in the previous one
//! - modified: in both, with a different size or mtime
//!
//! The three sets never overlap.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::snapshot::{FileRecord, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub added: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
    pub modified: BTreeSet<PathBuf>,
    /// bytes gained minus bytes lost
    pub net_change: i64,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

fn signed(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Compare `current` against `previous`. Without a previous snapshot every
/// file is added.
pub fn compare(previous: Option<&Snapshot>, current: &Snapshot) -> DiffResult {
    let from_map: HashMap<&Path, &FileRecord> = previous
        .map(|snap| snap.files.iter().map(|f| (f.path.as_path(), f)).collect())
        .unwrap_or_default();
    let to_map: HashMap<&Path, &FileRecord> =
        current.files.iter().map(|f| (f.path.as_path(), f)).collect();

    let mut result = DiffResult::default();

    for (path, to_entry) in &to_map {
        match from_map.get(path) {
            Some(from_entry) => {
                if from_entry.size != to_entry.size || from_entry.modified_at != to_entry.modified_at {
                    result.modified.insert(path.to_path_buf());
                    result.net_change = result
                        .net_change
                        .saturating_add(signed(to_entry.size).saturating_sub(signed(from_entry.size)));
                }
            }
            None => {
                result.added.insert(path.to_path_buf());
                result.net_change = result.net_change.saturating_add(signed(to_entry.size));
            }
        }
    }

    for (path, from_entry) in &from_map {
        if !to_map.contains_key(path) {
            result.removed.insert(path.to_path_buf());
            result.net_change = result.net_change.saturating_sub(signed(from_entry.size));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn entry(path: &str, size: u64) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            size,
            modified_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn snap(files: Vec<FileRecord>) -> Snapshot {
        Snapshot::new(Path::new("/media"), files, 0)
    }

    #[test]
    fn no_previous_means_everything_added() {
        let current = snap(vec![entry("/media/a.mkv", 1), entry("/media/b.mkv", 2)]);
        let result = compare(None, &current);
        assert_eq!(result.added.len(), 2);
        assert!(result.removed.is_empty());
        assert_eq!(result.net_change, 3);
    }

    #[test]
    fn new_entry_detected() {
        let from = snap(vec![entry("/media/a.mkv", 100)]);
        let to = snap(vec![entry("/media/a.mkv", 100), entry("/media/b.mkv", 50)]);
        let result = compare(Some(&from), &to);
        assert_eq!(result.added, BTreeSet::from([PathBuf::from("/media/b.mkv")]));
        assert!(result.removed.is_empty());
        assert!(result.modified.is_empty());
    }

    #[test]
    fn gone_entry_detected() {
        let from = snap(vec![entry("/media/a.mkv", 100), entry("/media/b.mkv", 50)]);
        let to = snap(vec![entry("/media/a.mkv", 100)]);
        let result = compare(Some(&from), &to);
        assert_eq!(result.removed, BTreeSet::from([PathBuf::from("/media/b.mkv")]));
        assert_eq!(result.net_change, -50);
    }

    #[test]
    fn changed_size_is_modified_not_added() {
        let from = snap(vec![entry("/media/a.mkv", 100)]);
        let to = snap(vec![entry("/media/a.mkv", 150)]);
        let result = compare(Some(&from), &to);
        assert!(result.added.is_empty() && result.removed.is_empty());
        assert_eq!(result.modified.len(), 1);
        assert_eq!(result.net_change, 50);
    }

    #[test]
    fn identical_snapshots_are_empty() {
        let files = vec![entry("/media/a.mkv", 1), entry("/media/b.mkv", 2)];
        let result = compare(Some(&snap(files.clone())), &snap(files));
        assert!(result.is_empty());
    }

    #[test]
    fn sets_are_disjoint() {
        let from = snap(vec![entry("/media/a", 1), entry("/media/b", 2), entry("/media/c", 3)]);
        let to = snap(vec![entry("/media/b", 5), entry("/media/c", 3), entry("/media/d", 4)]);
        let result = compare(Some(&from), &to);
        assert!(result.added.is_disjoint(&result.removed));
        assert!(result.added.is_disjoint(&result.modified));
        assert!(result.removed.is_disjoint(&result.modified));
    }
}
