//! Bounded worker pool with two priority levels.
//!
//! ```text
//!  submit(Interactive) ──► ┌──────────────┐
//!                          │ interactive  │──┐
//!                          └──────────────┘  │   ┌──────────────┐
//!  submit(Prefetch) ─────► ┌──────────────┐  ├──►│ worker 0..N  │
//!                          │ prefetch     │──┘   └──────────────┘
//!                          └──────────────┘
//! ```
//!
//! Workers always drain the interactive queue before touching prefetch
//! work. The pool keeps a count of queued plus running jobs so callers can
//! block until everything they submitted has finished (`wait_idle`).
//!
//! Stopping cancels the pool's [`CancellationToken`]: no new job is
//! accepted, queued jobs are dropped without running, and running jobs are
//! left to finish on their own.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Scheduling class of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Work the user is looking at right now.
    Interactive,
    /// Cache warming for slices the user has not reached yet.
    Prefetch,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Default)]
struct Queues {
    interactive: VecDeque<Job>,
    prefetch: VecDeque<Job>,
    /// Queued plus running jobs.
    outstanding: usize,
}

impl Queues {
    fn pop(&mut self) -> Option<Job> {
        self.interactive
            .pop_front()
            .or_else(|| self.prefetch.pop_front())
    }

    fn queued(&self) -> usize {
        self.interactive.len() + self.prefetch.len()
    }
}

struct Shared {
    queues: Mutex<Queues>,
    work_ready: Condvar,
    idle: Condvar,
    cancel: CancellationToken,
}

/// Fixed set of named OS threads executing [`Job`]s.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    name: String,
    threads: usize,
}

impl WorkerPool {
    /// Start `threads` workers (at least one) named `{name}-{i}`.
    pub fn new(threads: usize, name: &str) -> Result<Self, ExecutorError> {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues::default()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            cancel: CancellationToken::new(),
        });

        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let worker_name = format!("{}-{}", name, i);
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(worker_name.clone())
                .spawn(move || worker_loop(worker_shared));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    shared.cancel.cancel();
                    shared.work_ready.notify_all();
                    return Err(ExecutorError::Spawn {
                        name: worker_name,
                        source,
                    });
                }
            }
        }

        info!(pool = name, threads, "worker pool started");

        Ok(Self {
            shared,
            handles: Mutex::new(handles),
            name: name.to_string(),
            threads,
        })
    }

    /// Queue a job. Returns `false` if the pool has been stopped.
    pub fn submit(&self, priority: Priority, job: Job) -> bool {
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        let mut queues = self.shared.queues.lock();
        // Re-checked under the lock so a concurrent stop cannot miss the job.
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        match priority {
            Priority::Interactive => queues.interactive.push_back(job),
            Priority::Prefetch => queues.prefetch.push_back(job),
        }
        queues.outstanding += 1;
        self.shared.work_ready.notify_one();
        true
    }

    /// Jobs queued or running.
    pub fn outstanding(&self) -> usize {
        self.shared.queues.lock().outstanding
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.queues.lock().queued()
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Token cancelled when the pool stops. Jobs may poll it.
    pub fn token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Block until no job is queued or running.
    ///
    /// Jobs submitted by running jobs are waited for too. Must not be called
    /// from a worker thread.
    pub fn wait_idle(&self) {
        let mut queues = self.shared.queues.lock();
        while queues.outstanding > 0 {
            self.shared.idle.wait(&mut queues);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) with an upper bound. Returns
    /// whether the pool went idle in time.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queues = self.shared.queues.lock();
        while queues.outstanding > 0 {
            if self
                .shared
                .idle
                .wait_until(&mut queues, deadline)
                .timed_out()
            {
                return queues.outstanding == 0;
            }
        }
        true
    }

    /// Stop accepting work and drop everything still queued.
    ///
    /// Does not block; running jobs finish in the background.
    pub fn notify_threads_to_stop(&self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        self.shared.cancel.cancel();

        let dropped = {
            let mut queues = self.shared.queues.lock();
            let dropped = queues.queued();
            queues.interactive.clear();
            queues.prefetch.clear();
            queues.outstanding -= dropped;
            self.shared.work_ready.notify_all();
            if queues.outstanding == 0 {
                self.shared.idle.notify_all();
            }
            dropped
        };
        info!(pool = %self.name, dropped, "worker pool stopping");
    }

    /// Stop the pool and wait for every worker thread to exit.
    pub fn join_threads(&self) {
        self.notify_threads_to_stop();
        let handles = std::mem::take(&mut *self.handles.lock());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(pool = %self.name, "worker thread panicked");
            }
        }
        debug!(pool = %self.name, "worker threads joined");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.notify_threads_to_stop();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queues = shared.queues.lock();
            loop {
                if shared.cancel.is_cancelled() {
                    return;
                }
                if let Some(job) = queues.pop() {
                    break job;
                }
                shared.work_ready.wait(&mut queues);
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(
                worker = thread::current().name().unwrap_or("worker"),
                "job panicked"
            );
        }

        let mut queues = shared.queues.lock();
        queues.outstanding -= 1;
        if queues.outstanding == 0 {
            shared.idle.notify_all();
        }
    }
}
