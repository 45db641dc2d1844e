//! Persistence for scan and dispatch state.
//!
//! - snapshot: one JSON file per tree root, keyed by a hash of the root
//! - dispatch: SQLite record of which paths were already sent per library
//! - diff: pure comparison of two snapshots
//! - atomic: temp-write, fsync, rename with a copy fallback

pub mod atomic;
pub mod diff;
pub mod dispatch;
pub mod snapshot;

use std::io;
use std::path::PathBuf;

use crate::error::{classify_io, ErrorClass};

pub use dispatch::{DispatchSnapshot, DispatchStore};
pub use snapshot::SnapshotStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create state directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to persist {path} after {attempts} attempts and a copy fallback: {source}")]
    Persist {
        path: PathBuf,
        attempts: u32,
        source: io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
    #[error("dispatch database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("dispatch record for {library_id} is malformed: {detail}")]
    Malformed { library_id: String, detail: String },
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Read { source, .. } => classify_io(source),
            StoreError::Corrupt { .. } | StoreError::Malformed { .. } => ErrorClass::Unknown,
            _ => ErrorClass::Persistence,
        }
    }
}
