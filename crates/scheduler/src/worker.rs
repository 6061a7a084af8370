//! Background worker pool for long-running decode tasks.
//!
//! Animation loops run for as long as their texture lives, so a fixed-size
//! pool would starve textures queued behind it. This pool hands each task to
//! an idle worker, or spawns a new worker when none is idle. Workers that stay
//! idle for the keep-alive interval exit on their own.

use crate::error::SchedulerError;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

/// A unit of work executed by a worker thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// How long an idle worker waits for a task before exiting.
    /// Default: 3s.
    pub keep_alive: Duration,

    /// Thread name prefix; workers are named `{name}-{id}`.
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_millis(3000),
            name: "tilestream-decode".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    /// Set the idle keep-alive interval.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the worker thread name prefix.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

struct PoolState {
    queue: VecDeque<Task>,
    workers: usize,
    idle: usize,
    next_id: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
    config: WorkerPoolConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Elastic pool of background threads.
///
/// # Example
///
/// ```
/// use tilestream_scheduler::{WorkerPool, WorkerPoolConfig};
/// use std::sync::mpsc;
///
/// let pool = WorkerPool::new(WorkerPoolConfig::default());
/// let (tx, rx) = mpsc::channel();
///
/// pool.execute(Box::new(move || tx.send(42).unwrap())).unwrap();
/// assert_eq!(rx.recv().unwrap(), 42);
///
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool. No threads are started until work arrives.
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    workers: 0,
                    idle: 0,
                    next_id: 0,
                    shutdown: false,
                }),
                available: Condvar::new(),
                config,
            }),
        }
    }

    /// Run `task` on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutDown`] after [`WorkerPool::shutdown`], and
    /// [`SchedulerError::Spawn`] if a new worker thread could not be started
    /// while no other worker exists to pick the task up.
    pub fn execute(&self, task: Task) -> Result<(), SchedulerError> {
        let mut state = self.shared.lock();
        if state.shutdown {
            return Err(SchedulerError::ShutDown);
        }

        state.queue.push_back(task);

        // Idle workers that are already woken count against the queue
        if state.idle >= state.queue.len() {
            self.shared.available.notify_one();
            return Ok(());
        }

        let id = state.next_id;
        state.next_id += 1;
        state.workers += 1;
        drop(state);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.shared.config.name, id))
            .spawn(move || Worker::run(id, shared));

        if let Err(err) = spawned {
            let mut state = self.shared.lock();
            state.workers -= 1;
            if state.workers == 0 {
                // Nobody will ever drain the queue; hand the task back as an error
                state.queue.pop_back();
                return Err(SchedulerError::Spawn(err));
            }
            // An existing worker picks the task up once it finishes
            warn!(error = %err, "worker spawn failed, task left queued");
        }
        Ok(())
    }

    /// Number of live worker threads.
    pub fn num_workers(&self) -> usize {
        self.shared.lock().workers
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Check if the pool is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.lock().shutdown
    }

    /// Stop accepting tasks.
    ///
    /// Queued tasks still run; workers exit once the queue is empty.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        state.shutdown = true;
        self.shared.available.notify_all();
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(WorkerPoolConfig::default())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A single worker thread in the pool.
struct Worker;

impl Worker {
    /// Main worker loop.
    ///
    /// Takes tasks until the queue stays empty for the keep-alive interval or
    /// the pool shuts down with nothing left to run.
    fn run(id: usize, shared: Arc<Shared>) {
        trace!(worker = id, "worker started");
        let mut state = shared.lock();

        loop {
            if let Some(task) = state.queue.pop_front() {
                drop(state);
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    warn!(worker = id, "task panicked");
                }
                state = shared.lock();
                continue;
            }

            if state.shutdown {
                break;
            }

            state.idle += 1;
            let (guard, timeout) = shared
                .available
                .wait_timeout(state, shared.config.keep_alive)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            state.idle -= 1;

            if timeout.timed_out() && state.queue.is_empty() {
                break;
            }
        }

        state.workers -= 1;
        trace!(worker = id, "worker exited");
    }
}
