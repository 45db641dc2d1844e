//! Adaptive pool sizing and pacing.
//!
//! Workers report every I/O outcome into lock-free streak counters; the
//! coordinator calls [`Tuner::evaluate`] between batches and applies the
//! returned [`Adjustment`] to the pool.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::ErrorClass;
use crate::mount::MountPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub batch_size: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub error_threshold: u32,
    pub recovery_threshold: u32,
    /// throughput is only judged degraded once this much time has passed
    pub warmup: Duration,
}

impl Default for TuningConfig {
    fn default() -> Self {
        TuningConfig {
            min_workers: 2,
            max_workers: 10,
            batch_size: 500,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            error_threshold: 3,
            recovery_threshold: 10,
            warmup: Duration::from_secs(5),
        }
    }
}

impl TuningConfig {
    /// Start halfway between the bounds.
    pub fn initial_workers(&self) -> usize {
        let mid = self.min_workers + (self.max_workers.saturating_sub(self.min_workers) + 1) / 2;
        mid.clamp(self.min_workers.max(1), self.max_workers.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Grew,
    Shrank,
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub workers: usize,
    pub delay: Duration,
    pub change: Change,
    pub throughput: f64,
}

#[derive(Debug)]
struct Pacing {
    workers: usize,
    delay: Duration,
}

pub struct Tuner {
    config: TuningConfig,
    grow_step: usize,
    healthy_throughput: f64,
    degraded_throughput: f64,
    started: Instant,
    consecutive_successes: AtomicU32,
    consecutive_errors: AtomicU32,
    processed: AtomicU64,
    transient_errors: AtomicU64,
    pacing: Mutex<Pacing>,
}

impl Tuner {
    pub fn new(config: TuningConfig, policy: &MountPolicy) -> Self {
        Tuner {
            config,
            grow_step: policy.grow_step.clamp(1, 4),
            healthy_throughput: policy.healthy_throughput,
            degraded_throughput: policy.degraded_throughput,
            started: Instant::now(),
            consecutive_successes: AtomicU32::new(0),
            consecutive_errors: AtomicU32::new(0),
            processed: AtomicU64::new(0),
            transient_errors: AtomicU64::new(0),
            pacing: Mutex::new(Pacing {
                workers: config.initial_workers(),
                delay: config.base_delay,
            }),
        }
    }

    pub fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_errors.store(0, Ordering::Relaxed);
        self.consecutive_successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Only transient errors feed the error streak. Anything else is a
    /// property of the path, not of the mount's health.
    pub fn record_error(&self, class: ErrorClass) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if class.is_transient() {
            self.transient_errors.fetch_add(1, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            self.consecutive_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn workers(&self) -> usize {
        self.pacing.lock().workers
    }

    pub fn delay(&self) -> Duration {
        self.pacing.lock().delay
    }

    pub fn transient_errors(&self) -> u64 {
        self.transient_errors.load(Ordering::Relaxed)
    }

    pub fn throughput(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64().max(0.001);
        self.processed.load(Ordering::Relaxed) as f64 / elapsed
    }

    pub fn evaluate(&self) -> Adjustment {
        let mut pacing = self.pacing.lock();
        let throughput = self.throughput();
        let errors = self.consecutive_errors.load(Ordering::Relaxed);
        let successes = self.consecutive_successes.load(Ordering::Relaxed);
        let warmed_up = self.started.elapsed() >= self.config.warmup;
        let degraded = warmed_up && throughput < self.degraded_throughput;

        let change = if errors >= self.config.error_threshold || degraded {
            pacing.workers = pacing.workers.saturating_sub(1).max(self.config.min_workers);
            pacing.delay = pacing.delay.mul_f64(1.5).min(self.config.max_delay);
            // the next shrink needs a fresh streak
            self.consecutive_errors.store(0, Ordering::Relaxed);
            Change::Shrank
        } else if successes >= self.config.recovery_threshold
            && throughput >= self.healthy_throughput
            && pacing.workers < self.config.max_workers
        {
            pacing.workers = (pacing.workers + self.grow_step).min(self.config.max_workers);
            pacing.delay = pacing.delay.div_f64(1.2).max(self.config.base_delay);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            Change::Grew
        } else {
            Change::Steady
        };

        Adjustment {
            workers: pacing.workers,
            delay: pacing.delay,
            change,
            throughput,
        }
    }
}
