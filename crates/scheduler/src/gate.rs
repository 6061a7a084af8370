//! Counting permit pool
//!
//! Caps how many expensive operations run at once across the process. The
//! render crate holds a permit only around the first decode of an animated
//! image; later frames are not gated.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Default number of permits
pub const DEFAULT_GATE_CAPACITY: usize = 3;

/// Counting semaphore with a fixed capacity
///
/// # Example
///
/// ```
/// use tilestream_scheduler::ConcurrencyGate;
///
/// let gate = ConcurrencyGate::new(2);
/// let permit = gate.acquire();
/// assert_eq!(gate.available(), 1);
/// drop(permit);
/// assert_eq!(gate.available(), 2);
/// ```
#[derive(Debug)]
pub struct ConcurrencyGate {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl ConcurrencyGate {
    /// Create a gate with `capacity` permits
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; such a gate would block forever.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "concurrency gate needs at least one permit");
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is free and take it
    ///
    /// The permit is returned when the guard is dropped.
    pub fn acquire(&self) -> GatePermit<'_> {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        GatePermit { gate: self }
    }

    /// Take a permit if one is free, without blocking
    pub fn try_acquire(&self) -> Option<GatePermit<'_>> {
        let mut available = self.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(GatePermit { gate: self })
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        *self.lock()
    }

    /// Total number of permits
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self) {
        let mut available = self.lock();
        *available += 1;
        debug_assert!(*available <= self.capacity);
        self.released.notify_one();
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_CAPACITY)
    }
}

/// A held permit; dropping it releases the permit
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a ConcurrencyGate,
}

impl GatePermit<'_> {
    /// Return the permit now
    pub fn release(self) {}
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
