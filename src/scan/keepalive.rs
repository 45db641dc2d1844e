//! Periodic probe that keeps an idle network mount from timing out while a
//! long scan is busy elsewhere in the tree.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use super::TreeFs;

pub struct KeepAlive {
    stop: Option<Sender<()>>,
    probes: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl KeepAlive {
    pub fn start(fs: Arc<dyn TreeFs>, root: PathBuf, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = bounded::<()>(1);
        let probes = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));
        let probe_count = Arc::clone(&probes);
        let failure_count = Arc::clone(&failures);

        thread::Builder::new()
            .name("scan-keepalive".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        probe_count.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = fs.stat(&root) {
                            failure_count.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(path = %root.display(), error = %e, "keep-alive probe failed");
                        }
                    }
                    // stop requested or handle dropped
                    _ => break,
                }
            })?;

        Ok(KeepAlive {
            stop: Some(stop),
            probes,
            failures,
        })
    }

    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Drop for KeepAlive {
    // not joined: the probe thread may be parked on a hung mount
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{EntryInfo, FileStat};
    use std::io;
    use std::path::Path;

    struct FlakyRoot;

    impl TreeFs for FlakyRoot {
        fn read_dir(&self, _dir: &Path) -> io::Result<Vec<EntryInfo>> {
            Ok(Vec::new())
        }

        fn stat(&self, _path: &Path) -> io::Result<FileStat> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "share unavailable"))
        }
    }

    #[test]
    fn probes_until_dropped_and_survives_failures() {
        let keepalive =
            KeepAlive::start(Arc::new(FlakyRoot), PathBuf::from("/mnt/smb"), Duration::from_millis(5))
                .unwrap();
        thread::sleep(Duration::from_millis(60));
        assert!(keepalive.probes() >= 2);
        assert!(keepalive.failures() >= 1);
        drop(keepalive);
    }
}
