//! Frame budget tracking for render-thread work
//!
//! Tile uploads run on the render thread between frames. Each idle tick gets a
//! slice of wall-clock time and yields once it is spent, so large images
//! stream in over several frames instead of stalling one.
//!
//! At 60 FPS a frame lasts 16.67ms; the 4ms upload slice leaves the rest of
//! it for drawing.

use std::time::{Duration, Instant};

/// Time spent uploading tiles per idle tick (4ms)
pub const UPLOAD_BUDGET: Duration = Duration::from_millis(4);

/// Frame budget tracker
///
/// Tracks the time spent since the start of a slice. Callers check
/// [`FrameBudget::is_exceeded`] between units of work and yield once it
/// reports true.
///
/// # Example
///
/// ```
/// use tilestream_scheduler::frame_budget::{FrameBudget, UPLOAD_BUDGET};
///
/// let budget = FrameBudget::new(UPLOAD_BUDGET);
///
/// let mut units = 0;
/// while !budget.is_exceeded() && units < 10 {
///     // upload one tile
///     units += 1;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FrameBudget {
    /// When this slice started
    frame_start: Instant,

    /// Total budget for this slice
    budget: Duration,
}

impl FrameBudget {
    /// Start a slice of `budget` now
    pub fn new(budget: Duration) -> Self {
        Self {
            frame_start: Instant::now(),
            budget,
        }
    }

    /// Get the elapsed time since the slice started
    pub fn elapsed(&self) -> Duration {
        self.frame_start.elapsed()
    }

    /// Get the remaining time in this slice
    ///
    /// Returns `Duration::ZERO` if the budget has been exceeded.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    /// Check if the budget has been used up
    pub fn is_exceeded(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    /// Get the total budget
    pub fn budget(&self) -> Duration {
        self.budget
    }
}
