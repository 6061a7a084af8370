//! Tilestream Scheduler Library
//!
//! Render-thread and background scheduling for texture streaming.
//!
//! - [`Uploader`] spends a fixed slice of each idle tick uploading tiles.
//! - [`ConcurrencyGate`] caps how many first-frame decodes run at once.
//! - [`WorkerPool`] runs animation loops on background threads.
//!
//! # Example
//!
//! ```
//! use tilestream_scheduler::ConcurrencyGate;
//!
//! let gate = ConcurrencyGate::new(3);
//! {
//!     let _permit = gate.acquire();
//!     // decode the first frame
//! }
//! assert_eq!(gate.available(), 3);
//! ```

mod error;
pub mod frame_budget;
mod gate;
mod uploader;
mod worker;

// Re-export public API
pub use error::SchedulerError;
pub use frame_budget::{FrameBudget, UPLOAD_BUDGET};
pub use gate::{ConcurrencyGate, GatePermit, DEFAULT_GATE_CAPACITY};
pub use uploader::{IdleListener, RenderLoop, UploadTask, Uploader};
pub use worker::{Task, WorkerPool, WorkerPoolConfig};
