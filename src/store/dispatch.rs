use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use super::StoreError;

/// Paths already sent to the media server for one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub library_id: String,
    pub checksum: String,
    pub dispatched_paths: BTreeSet<PathBuf>,
    pub saved_at: DateTime<Utc>,
}

impl DispatchSnapshot {
    pub fn new(library_id: impl Into<String>, dispatched_paths: BTreeSet<PathBuf>) -> Self {
        DispatchSnapshot {
            library_id: library_id.into(),
            checksum: checksum(dispatched_paths.iter().map(|p| p.as_path())),
            dispatched_paths,
            saved_at: Utc::now(),
        }
    }
}

/// sha-256 over the sorted, newline-joined paths. Order of the input does
/// not matter and duplicates count once.
pub fn checksum<'a, I>(paths: I) -> String
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut lines: Vec<String> = paths
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    lines.sort();
    lines.dedup();

    let mut hasher = Sha256::new();
    hasher.update(lines.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// Summary row for listing.
#[derive(Debug, Clone)]
pub struct DispatchSummary {
    pub library_id: String,
    pub checksum: String,
    pub saved_at: DateTime<Utc>,
    pub path_count: u64,
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS dispatch_snapshots (
            library_id TEXT PRIMARY KEY,
            checksum TEXT NOT NULL,
            saved_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS dispatched_paths (
            library_id TEXT NOT NULL,
            path TEXT NOT NULL,
            PRIMARY KEY (library_id, path),
            FOREIGN KEY(library_id) REFERENCES dispatch_snapshots(library_id) ON DELETE CASCADE
        )",
        [],
    )?;

    Ok(())
}

/// Database handle. Open once per process, reuse across dispatches.
pub struct DispatchStore {
    conn: Connection,
}

impl DispatchStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        DispatchStore::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        DispatchStore::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        init_schema(&conn)?;
        Ok(DispatchStore { conn })
    }

    pub fn load(&self, library_id: &str) -> Result<Option<DispatchSnapshot>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT checksum, saved_at FROM dispatch_snapshots WHERE library_id = ?1",
                params![library_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((checksum, saved_at)) = row else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare_cached("SELECT path FROM dispatched_paths WHERE library_id = ?1")?;
        let dispatched_paths = stmt
            .query_map(params![library_id], |row| row.get::<_, String>(0))?
            .map(|r| r.map(PathBuf::from))
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Some(DispatchSnapshot {
            library_id: library_id.to_string(),
            checksum,
            dispatched_paths,
            saved_at: parse_time(library_id, &saved_at)?,
        }))
    }

    /// Replace the library's record in one transaction.
    pub fn save(&mut self, snapshot: &DispatchSnapshot) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM dispatched_paths WHERE library_id = ?1",
            params![snapshot.library_id],
        )?;
        tx.execute(
            "INSERT INTO dispatch_snapshots (library_id, checksum, saved_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(library_id) DO UPDATE SET checksum = excluded.checksum, saved_at = excluded.saved_at",
            params![
                snapshot.library_id,
                snapshot.checksum,
                snapshot.saved_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
            ],
        )?;

        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO dispatched_paths (library_id, path) VALUES (?1, ?2)",
        )?;
        for path in &snapshot.dispatched_paths {
            stmt.execute(params![snapshot.library_id, path.to_string_lossy()])?;
        }

        drop(stmt);
        tx.commit()?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<DispatchSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.library_id, s.checksum, s.saved_at, COUNT(p.path)
             FROM dispatch_snapshots s
             LEFT JOIN dispatched_paths p ON p.library_id = s.library_id
             GROUP BY s.library_id
             ORDER BY s.saved_at DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?.max(0) as u64,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(library_id, checksum, saved_at, path_count)| {
                let saved_at = parse_time(&library_id, &saved_at)?;
                Ok(DispatchSummary {
                    library_id,
                    checksum,
                    saved_at,
                    path_count,
                })
            })
            .collect()
    }
}

fn parse_time(library_id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Malformed {
            library_id: library_id.to_string(),
            detail: format!("saved_at {raw:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> BTreeSet<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn checksum_is_order_independent() {
        let a = checksum([Path::new("/m/b.mkv"), Path::new("/m/a.mkv")]);
        let b = checksum([Path::new("/m/a.mkv"), Path::new("/m/b.mkv"), Path::new("/m/a.mkv")]);
        assert_eq!(a, b);
        assert_ne!(a, checksum([Path::new("/m/a.mkv")]));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn empty_store_has_no_record() {
        let store = DispatchStore::open_in_memory().unwrap();
        assert!(store.load("1").unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = DispatchStore::open_in_memory().unwrap();
        let snapshot = DispatchSnapshot::new("7", paths(&["/m/Movies/A/a.mkv", "/m/Movies/B/b.mkv"]));
        store.save(&snapshot).unwrap();
        assert_eq!(store.load("7").unwrap().unwrap(), snapshot);
    }

    #[test]
    fn save_replaces_previous_paths() {
        let mut store = DispatchStore::open_in_memory().unwrap();
        store.save(&DispatchSnapshot::new("7", paths(&["/m/a", "/m/b"]))).unwrap();
        let second = DispatchSnapshot::new("7", paths(&["/m/c"]));
        store.save(&second).unwrap();

        let loaded = store.load("7").unwrap().unwrap();
        assert_eq!(loaded.dispatched_paths, paths(&["/m/c"]));
        assert_eq!(loaded.checksum, second.checksum);

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path_count, 1);
    }

    #[test]
    fn libraries_are_independent() {
        let mut store = DispatchStore::open_in_memory().unwrap();
        store.save(&DispatchSnapshot::new("1", paths(&["/m/a"]))).unwrap();
        store.save(&DispatchSnapshot::new("2", paths(&["/m/b", "/m/c"]))).unwrap();
        assert_eq!(store.load("1").unwrap().unwrap().dispatched_paths.len(), 1);
        assert_eq!(store.load("2").unwrap().unwrap().dispatched_paths.len(), 2);
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state/dispatch.db");
        {
            let mut store = DispatchStore::open(&db).unwrap();
            store.save(&DispatchSnapshot::new("3", paths(&["/m/x"]))).unwrap();
        }
        let store = DispatchStore::open(&db).unwrap();
        assert!(store.load("3").unwrap().is_some());
    }
}
