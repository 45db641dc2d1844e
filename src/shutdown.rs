//! Cooperative shutdown flag with interruptible sleeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct Inner {
    flag: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cloneable handle; every clone observes the same flag.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown::default()
    }

    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until shutdown is triggered.
    /// Returns true if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }

        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        while !self.is_triggered() {
            if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                return !self.is_triggered();
            }
        }
        false
    }

    /// Route SIGINT and SIGTERM to this flag. Only one handler may be
    /// installed per process.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let handle = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutdown requested, finishing current work");
            handle.trigger();
        })
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
