//! Delays between refresh calls and the retry loop around each call.

use std::path::Path;
use std::time::Duration;

use crate::paths::depth;
use crate::shutdown::Shutdown;

const FACTOR_MIN: f64 = 0.5;
const FACTOR_MAX: f64 = 4.0;
const FACTOR_SHRINK: f64 = 0.8;
const FACTOR_GROW: f64 = 1.5;
const SUCCESS_STREAK: u32 = 3;
const FAILURE_STREAK: u32 = 2;

const SLOW_MOUNT_FACTOR: f64 = 1.5;
const DEEP_PATH_FACTOR: f64 = 1.2;
const DEEP_PATH_COMPONENTS: usize = 6;

/// Multiplier on the base delay by how many files a call covers.
pub fn tier(file_count: usize) -> u32 {
    match file_count {
        0..=5 => 1,
        6..=20 => 2,
        _ => 4,
    }
}

/// Per-call delay that backs off after repeated failures and relaxes after
/// a run of successes.
#[derive(Debug, Clone)]
pub struct Pacer {
    base: Duration,
    factor: f64,
    successes: u32,
    failures: u32,
}

impl Pacer {
    pub fn new(base: Duration) -> Self {
        Pacer {
            base,
            factor: 1.0,
            successes: 0,
            failures: 0,
        }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn call_delay(&self, file_count: usize, slow_mount: bool, dir: &Path) -> Duration {
        let mut scale = f64::from(tier(file_count)) * self.factor;
        if slow_mount {
            scale *= SLOW_MOUNT_FACTOR;
        }
        if depth(dir) > DEEP_PATH_COMPONENTS {
            scale *= DEEP_PATH_FACTOR;
        }
        self.base.mul_f64(scale)
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.successes += 1;
        if self.successes >= SUCCESS_STREAK {
            self.factor = (self.factor * FACTOR_SHRINK).max(FACTOR_MIN);
            self.successes = 0;
        }
    }

    pub fn record_failure(&mut self) {
        self.successes = 0;
        self.failures += 1;
        if self.failures >= FAILURE_STREAK {
            self.factor = (self.factor * FACTOR_GROW).min(FACTOR_MAX);
            self.failures = 0;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// attempts after the first
    pub retries: u32,
    pub delay: Duration,
}

/// Run `action` until it succeeds, `should_retry` declines, retries run out
/// or shutdown interrupts the backoff. Backoff is linear: `delay × attempt`.
pub fn retry_linear<T, E, F, R>(
    policy: RetryPolicy,
    shutdown: &Shutdown,
    mut action: F,
    mut should_retry: R,
) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match action(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt > policy.retries || !should_retry(&err) {
                    return Err(err);
                }
                if !shutdown.sleep(policy.delay.saturating_mul(attempt)) {
                    return Err(err);
                }
            }
        }
    }
}
