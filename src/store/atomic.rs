//! Crash-safe file replacement.
//!
//! Write to `<target>.tmp`, fsync, rename over the target and check the
//! result is not empty. The whole cycle is retried with linear backoff; if
//! every rename fails the temp file is copied byte for byte instead.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self {
        WritePolicy {
            attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

pub fn write_atomic(target: &Path, bytes: &[u8], policy: &WritePolicy) -> Result<(), StoreError> {
    write_atomic_with(target, bytes, policy, |from, to| fs::rename(from, to))
}

fn write_atomic_with<R>(
    target: &Path,
    bytes: &[u8],
    policy: &WritePolicy,
    rename: R,
) -> Result<(), StoreError>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    let tmp = temp_path(target);
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let result = write_synced(&tmp, bytes)
            .and_then(|_| rename(&tmp, target))
            .and_then(|_| verify_non_empty(target));

        match result {
            Ok(()) => {
                sync_parent(target);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(
                    path = %target.display(),
                    attempt,
                    attempts,
                    error = %e,
                    "atomic write failed"
                );
                last_error = Some(e);
                if attempt < attempts {
                    std::thread::sleep(policy.backoff.saturating_mul(attempt));
                }
            }
        }
    }

    tracing::warn!(path = %target.display(), "rename kept failing, falling back to copy");
    match copy_fallback(&tmp, target, bytes) {
        Ok(()) => {
            let _ = fs::remove_file(&tmp);
            sync_parent(target);
            Ok(())
        }
        Err(copy_error) => {
            let _ = fs::remove_file(&tmp);
            tracing::error!(
                path = %target.display(),
                rename_error = ?last_error.as_ref().map(|e| e.to_string()),
                error = %copy_error,
                "copy fallback failed"
            );
            Err(StoreError::Persist {
                path: target.to_path_buf(),
                attempts,
                source: copy_error,
            })
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

fn verify_non_empty(path: &Path) -> io::Result<()> {
    let len = fs::metadata(path)?.len();
    if len == 0 {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} is empty after rename", path.display()),
        ));
    }
    Ok(())
}

fn copy_fallback(tmp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    // the temp file may be gone if the last rename half-succeeded
    if fs::metadata(tmp).map(|m| m.len()).unwrap_or(0) != bytes.len() as u64 {
        write_synced(tmp, bytes)?;
    }

    let mut source = File::open(tmp)?;
    let mut dest = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(target)?;
    let copied = io::copy(&mut source, &mut dest)?;
    dest.flush()?;
    dest.sync_all()?;

    let on_disk = fs::metadata(target)?.len();
    if copied != bytes.len() as u64 || on_disk != copied {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("copy size mismatch: wrote {copied}, expected {}, found {on_disk}", bytes.len()),
        ));
    }
    Ok(())
}

// directory fsync makes the rename durable; not every platform allows it
fn sync_parent(target: &Path) {
    if let Some(parent) = target.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> WritePolicy {
        WritePolicy {
            attempts: 2,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn writes_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("snap.json");
        write_atomic(&target, b"{\"a\":1}", &quick()).unwrap();
        write_atomic(&target, b"{\"a\":2}", &quick()).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"{\"a\":2}");
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn falls_back_to_copy_when_rename_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("snap.json");
        let result = write_atomic_with(&target, b"payload", &quick(), |_, _| {
            Err(io::Error::new(io::ErrorKind::Other, "device busy"))
        });

        result.unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"payload");
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn reports_persist_error_when_everything_fails() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory where the file should go
        let target = dir.path().join("snap.json");
        fs::create_dir_all(target.join("occupied")).unwrap();

        let err = write_atomic(&target, b"payload", &quick()).unwrap_err();
        assert!(matches!(err, StoreError::Persist { attempts: 2, .. }));
    }
}
