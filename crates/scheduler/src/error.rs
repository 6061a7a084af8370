//! Scheduler error types

use std::io;

/// Errors returned when handing work to the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    /// The pool no longer accepts tasks
    #[error("worker pool is shut down")]
    ShutDown,
}
