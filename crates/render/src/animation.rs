//! Background animation loop and the monitor it shares with its texture
//!
//! The texture and its decoder meet in a [`Monitor`]: one mutex over the
//! control flags and the tile grid, plus a condition variable for pause,
//! resume, seek and recycle wake-ups.
//!
//! ```text
//!  InitialDecode --> Animating <--> Paused
//!        |               |            |
//!        +--> Stopped    +------------+--> Recycled
//! ```

use crate::bitmap::{AnimatedImage, Image};
use crate::tile::Tile;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tilestream_scheduler::ConcurrencyGate;
use tracing::{debug, trace, warn};

/// Invoked after a new frame is committed; the owner should redraw.
pub type InvalidateCallback = Arc<dyn Fn() + Send + Sync>;

/// Where a texture's animation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationPhase {
    /// Not animated
    Static,

    /// Waiting for or running the first decode
    InitialDecode,

    /// Advancing frames
    Animating,

    /// Blocked until resumed or seeked
    Paused,

    /// Ended without a recycle: single frame or failed decode
    Stopped,

    /// Recycled; nothing more happens
    Recycled,
}

impl AnimationPhase {
    /// Whether the phase can no longer change
    pub fn is_terminal(self) -> bool {
        matches!(self, AnimationPhase::Stopped | AnimationPhase::Recycled)
    }
}

/// State guarded by the monitor
pub(crate) struct TextureState {
    pub(crate) tiles: Vec<Tile>,
    pub(crate) recycled: bool,
    /// A decode is running outside the lock; the image must not be released
    pub(crate) recycle_locked: bool,
    pub(crate) released: bool,
    pub(crate) paused: bool,
    pub(crate) target_frame: Option<usize>,
    /// A frame was committed that the tiles have not picked up yet
    pub(crate) confirm_frame: bool,
    pub(crate) phase: AnimationPhase,
    pub(crate) callback: Option<InvalidateCallback>,
}

/// Per-image monitor shared by a texture and its decoder
pub(crate) struct Monitor {
    pub(crate) image: Arc<dyn Image>,
    state: Mutex<TextureState>,
    wake: Condvar,
}

impl Monitor {
    pub(crate) fn new(image: Arc<dyn Image>, tiles: Vec<Tile>, phase: AnimationPhase) -> Self {
        Self {
            image,
            state: Mutex::new(TextureState {
                tiles,
                recycled: false,
                recycle_locked: false,
                released: false,
                paused: false,
                target_frame: None,
                confirm_frame: false,
                phase,
                callback: None,
            }),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TextureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake the decoder if it is waiting
    pub(crate) fn notify(&self) {
        self.wake.notify_all();
    }

    /// Release the image's pixels unless that already happened.
    pub(crate) fn release_image(&self, state: &mut TextureState) {
        if !state.released {
            state.released = true;
            self.image.recycle();
        }
    }

    fn wait_while<'a>(
        &self,
        state: MutexGuard<'a, TextureState>,
        condition: impl FnMut(&mut TextureState) -> bool,
    ) -> MutexGuard<'a, TextureState> {
        self.wake
            .wait_while(state, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_timeout_while<'a>(
        &self,
        state: MutexGuard<'a, TextureState>,
        timeout: Duration,
        condition: impl FnMut(&mut TextureState) -> bool,
    ) -> MutexGuard<'a, TextureState> {
        match self.wake.wait_timeout_while(state, timeout, condition) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}

/// Exit path shared by every recycle check in the loop
fn finish_recycled(monitor: &Monitor, state: &mut TextureState) {
    monitor.release_image(state);
    state.phase = AnimationPhase::Recycled;
    debug!("animation loop exited after recycle");
}

/// Run the animation loop for the monitor's image until it is recycled.
///
/// The first decode happens under a permit from `gate`. Single-frame images
/// and failed decodes end the loop early.
pub(crate) fn run(monitor: Arc<Monitor>, gate: Arc<ConcurrencyGate>) {
    let Some(animated) = monitor.image.as_animated() else {
        return;
    };

    {
        let mut state = monitor.lock();
        if state.recycled {
            finish_recycled(&monitor, &mut state);
            return;
        }
        state.recycle_locked = true;
    }

    let decoded = {
        let _permit = gate.acquire();
        animated.decode()
    };

    let (frame_count, callback) = {
        let mut state = monitor.lock();
        state.recycle_locked = false;
        if state.recycled {
            finish_recycled(&monitor, &mut state);
            return;
        }
        if let Err(err) = decoded {
            warn!(error = %err, "initial decode failed, animation disabled");
            state.phase = AnimationPhase::Stopped;
            return;
        }

        // Tiles drawn before the decode hold blank pixels
        state.confirm_frame = true;
        let frame_count = animated.frame_count();
        state.phase = if frame_count <= 1 {
            AnimationPhase::Stopped
        } else {
            AnimationPhase::Animating
        };
        (frame_count, state.callback.clone())
    };

    if let Some(callback) = callback {
        callback();
    }
    if frame_count <= 1 {
        debug!(frame_count, "nothing to animate");
        return;
    }

    debug!(frame_count, "animation started");
    animate(&monitor, animated, frame_count);
}

fn animate(monitor: &Monitor, animated: &dyn AnimatedImage, frame_count: usize) {
    let mut frame = animated.current_frame();
    // When the frame that was just scheduled is due
    let mut forecast = Instant::now();
    let mut state = monitor.lock();

    loop {
        if state.recycled {
            finish_recycled(monitor, &mut state);
            return;
        }

        if state.paused && state.target_frame.is_none() {
            state.phase = AnimationPhase::Paused;
            debug!(frame, "animation paused");
            state = monitor.wait_while(state, |s| {
                s.paused && s.target_frame.is_none() && !s.recycled
            });
            if state.recycled {
                finish_recycled(monitor, &mut state);
                return;
            }
            // Time spent paused is not lag
            forecast = Instant::now();
        }
        state.phase = AnimationPhase::Animating;

        let now = Instant::now();
        let delay = match state.target_frame.take() {
            Some(target) => {
                frame = target % frame_count;
                state.paused = false;
                Duration::ZERO
            }
            None => {
                frame = (frame + 1) % frame_count;
                animated
                    .delay(frame)
                    .saturating_sub(now.saturating_duration_since(forecast))
            }
        };
        forecast = now + delay;

        if !delay.is_zero() {
            state = monitor.wait_timeout_while(state, delay, |s| {
                !s.recycled && s.target_frame.is_none()
            });
            if state.recycled {
                finish_recycled(monitor, &mut state);
                return;
            }
            if state.target_frame.is_some() {
                // A seek replaces the frame that was waiting
                continue;
            }
        }

        animated.set_current_frame(frame);
        state.confirm_frame = true;
        trace!(frame, "frame committed");

        let callback = state.callback.clone();
        drop(state);
        if let Some(callback) = callback {
            callback();
        }
        state = monitor.lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TextureError, TextureResult};
    use image::RgbaImage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    /// Animated image with fixed delays and observable releases
    struct Counter {
        frames: usize,
        delay: Duration,
        current: AtomicUsize,
        releases: AtomicUsize,
        fail: bool,
        decoded: AtomicBool,
    }

    impl Counter {
        fn new(frames: usize, delay_ms: u64) -> Arc<Self> {
            Self::build(frames, delay_ms, false)
        }

        fn failing() -> Arc<Self> {
            Self::build(3, 10, true)
        }

        fn build(frames: usize, delay_ms: u64, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                frames,
                delay: Duration::from_millis(delay_ms),
                current: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                fail,
                decoded: AtomicBool::new(false),
            })
        }
    }

    impl Image for Counter {
        fn width(&self) -> u32 {
            8
        }

        fn height(&self) -> u32 {
            8
        }

        fn copy_pixels(&self, _x: i32, _y: i32, _dst: &mut RgbaImage, _w: u32, _h: u32) {}

        fn recycle(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn is_recycled(&self) -> bool {
            self.releases.load(Ordering::SeqCst) > 0
        }

        fn as_animated(&self) -> Option<&dyn AnimatedImage> {
            Some(self)
        }
    }

    impl AnimatedImage for Counter {
        fn decode(&self) -> TextureResult<()> {
            self.decoded.store(true, Ordering::SeqCst);
            if self.fail {
                Err(TextureError::NoFrames)
            } else {
                Ok(())
            }
        }

        fn current_frame(&self) -> usize {
            self.current.load(Ordering::SeqCst)
        }

        fn set_current_frame(&self, frame: usize) {
            self.current.store(frame, Ordering::SeqCst);
        }

        fn frame_count(&self) -> usize {
            if self.decoded.load(Ordering::SeqCst) {
                self.frames
            } else {
                0
            }
        }

        fn delay(&self, _frame: usize) -> Duration {
            self.delay
        }
    }

    fn spawn(image: Arc<Counter>) -> (Arc<Monitor>, thread::JoinHandle<()>) {
        let monitor = Arc::new(Monitor::new(
            image,
            Vec::new(),
            AnimationPhase::InitialDecode,
        ));
        let gate = Arc::new(ConcurrencyGate::new(1));
        let handle = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || run(monitor, gate))
        };
        (monitor, handle)
    }

    fn recycle(monitor: &Monitor) {
        let mut state = monitor.lock();
        state.recycled = true;
        if !state.recycle_locked {
            monitor.release_image(&mut state);
        }
        drop(state);
        monitor.notify();
    }

    #[test]
    fn test_single_frame_stops() {
        let image = Counter::new(1, 10);
        let (monitor, handle) = spawn(Arc::clone(&image));
        handle.join().unwrap();
        let state = monitor.lock();
        assert_eq!(state.phase, AnimationPhase::Stopped);
        assert!(state.confirm_frame);
        assert_eq!(image.releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_decode_completion_notifies_owner() {
        let image = Counter::new(3, 1000);
        let monitor = Arc::new(Monitor::new(
            Arc::clone(&image) as Arc<dyn Image>,
            Vec::new(),
            AnimationPhase::InitialDecode,
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&calls);
        monitor.lock().callback = Some(Arc::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
        }));

        let handle = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || run(monitor, Arc::new(ConcurrencyGate::new(1))))
        };
        let deadline = Instant::now() + Duration::from_secs(2);
        while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        // Frame 0 is announced right away, long before the first delay ends
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(image.current_frame(), 0);
        assert!(monitor.lock().confirm_frame);

        recycle(&monitor);
        handle.join().unwrap();
    }

    #[test]
    fn test_failed_decode_stops() {
        let (monitor, handle) = spawn(Counter::failing());
        handle.join().unwrap();
        let state = monitor.lock();
        assert_eq!(state.phase, AnimationPhase::Stopped);
        assert!(!state.confirm_frame);
    }

    #[test]
    fn test_recycle_before_start_releases_once() {
        let image = Counter::new(3, 10);
        let monitor = Arc::new(Monitor::new(
            Arc::clone(&image) as Arc<dyn Image>,
            Vec::new(),
            AnimationPhase::InitialDecode,
        ));
        recycle(&monitor);
        run(Arc::clone(&monitor), Arc::new(ConcurrencyGate::new(1)));

        assert_eq!(monitor.lock().phase, AnimationPhase::Recycled);
        assert_eq!(image.releases.load(Ordering::SeqCst), 1);
        assert!(!image.decoded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_loop_advances_and_exits_on_recycle() {
        let image = Counter::new(3, 5);
        let (monitor, handle) = spawn(Arc::clone(&image));

        thread::sleep(Duration::from_millis(60));
        assert!(monitor.lock().confirm_frame);

        recycle(&monitor);
        handle.join().unwrap();
        assert_eq!(monitor.lock().phase, AnimationPhase::Recycled);
        assert_eq!(image.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_seek_wraps_and_lifts_pause() {
        let image = Counter::new(4, 1000);
        let (monitor, handle) = spawn(Arc::clone(&image));

        monitor.lock().paused = true;
        {
            let mut state = monitor.lock();
            state.target_frame = Some(6);
        }
        monitor.notify();

        let deadline = Instant::now() + Duration::from_secs(2);
        while image.current_frame() != 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(image.current_frame(), 2);
        assert!(!monitor.lock().paused);

        recycle(&monitor);
        handle.join().unwrap();
    }

    #[test]
    fn test_phase_is_terminal() {
        assert!(AnimationPhase::Recycled.is_terminal());
        assert!(AnimationPhase::Stopped.is_terminal());
        assert!(!AnimationPhase::Paused.is_terminal());
        assert!(!AnimationPhase::Static.is_terminal());
    }
}
