//! Fixed set of threads whose effective concurrency is a resizable permit
//! count. Shrinking never interrupts running jobs, it only makes the next
//! jobs wait for a permit.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PermitState {
    active: usize,
    limit: usize,
}

struct Permits {
    state: Mutex<PermitState>,
    freed: Condvar,
}

impl Permits {
    fn acquire(&self) -> Permit<'_> {
        let mut state = self.state.lock();
        while state.active >= state.limit {
            self.freed.wait(&mut state);
        }
        state.active += 1;
        Permit { permits: self }
    }

    fn set_limit(&self, limit: usize) {
        let mut state = self.state.lock();
        state.limit = limit;
        self.freed.notify_all();
    }
}

struct Permit<'a> {
    permits: &'a Permits,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.permits.state.lock();
        state.active -= 1;
        self.permits.freed.notify_one();
    }
}

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    permits: Arc<Permits>,
    capacity: usize,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `capacity` threads, `initial` of which may run at once.
    pub fn new(capacity: usize, initial: usize) -> std::io::Result<Self> {
        let capacity = capacity.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let permits = Arc::new(Permits {
            state: Mutex::new(PermitState {
                active: 0,
                limit: initial.clamp(1, capacity),
            }),
            freed: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let receiver = receiver.clone();
            let permits = Arc::clone(&permits);
            let handle = thread::Builder::new()
                .name(format!("scan-worker-{index}"))
                .spawn(move || {
                    // exits once every sender is gone and the queue drained
                    while let Ok(job) = receiver.recv() {
                        let _permit = permits.acquire();
                        job();
                    }
                })?;
            handles.push(handle);
        }

        Ok(WorkerPool {
            sender: Some(sender),
            permits,
            capacity,
            handles,
        })
    }

    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            // only fails when every worker has exited, nothing to run it on
            let _ = sender.send(Box::new(job));
        }
    }

    /// Change how many jobs may run at once, clamped to `1..=capacity`.
    pub fn resize(&self, workers: usize) {
        self.permits.set_limit(workers.clamp(1, self.capacity));
    }

    pub fn size(&self) -> usize {
        self.permits.state.lock().limit
    }

    /// Close the queue and wait for queued jobs to finish.
    pub fn join(mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    // dropping without join detaches the workers: a worker stuck on a hung
    // mount must not block the caller past its deadline
    fn drop(&mut self) {
        self.sender.take();
    }
}
