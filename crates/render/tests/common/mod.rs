//! Helpers shared by the integration tests

#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tilestream_render::{AnimatedImage, Image, ImageTexture, TextureError, TextureResult};

/// Tracks how many decodes run at once
#[derive(Default)]
pub struct DecodeProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl DecodeProbe {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Animated image whose decode, delays and failures are under test control.
///
/// Every pixel of frame `n` is [`frame_color`]`(n)`.
pub struct ScriptedImage {
    width: u32,
    height: u32,
    delays: Vec<Duration>,
    decode_time: Duration,
    fail: bool,
    hold: Mutex<Option<Receiver<()>>>,
    probe: Option<Arc<DecodeProbe>>,
    current: AtomicUsize,
    decoded: AtomicBool,
    decode_started: AtomicBool,
    releases: AtomicUsize,
}

pub fn frame_color(frame: usize) -> Rgba<u8> {
    Rgba([(frame * 60 + 30) as u8, 0, 0, 255])
}

impl ScriptedImage {
    pub fn new(width: u32, height: u32, delays_ms: &[u64]) -> Self {
        Self {
            width,
            height,
            delays: delays_ms.iter().map(|&ms| Duration::from_millis(ms)).collect(),
            decode_time: Duration::ZERO,
            fail: false,
            hold: Mutex::new(None),
            probe: None,
            current: AtomicUsize::new(0),
            decoded: AtomicBool::new(false),
            decode_started: AtomicBool::new(false),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_decode_time(mut self, decode_time: Duration) -> Self {
        self.decode_time = decode_time;
        self
    }

    pub fn with_probe(mut self, probe: Arc<DecodeProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Decode blocks until the returned sender fires or is dropped
    pub fn held(self) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        *self.hold.lock().unwrap() = Some(rx);
        (self, tx)
    }

    pub fn decode_started(&self) -> bool {
        self.decode_started.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl Image for ScriptedImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn copy_pixels(&self, x: i32, y: i32, dst: &mut RgbaImage, width: u32, height: u32) {
        let color = frame_color(self.current_frame());
        for dy in 0..height.min(dst.height()) {
            for dx in 0..width.min(dst.width()) {
                let sx = x + dx as i32;
                let sy = y + dy as i32;
                let inside = sx >= 0
                    && sy >= 0
                    && (sx as u32) < self.width
                    && (sy as u32) < self.height
                    && !self.is_recycled();
                dst.put_pixel(dx, dy, if inside { color } else { Rgba([0, 0, 0, 0]) });
            }
        }
    }

    fn recycle(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn is_recycled(&self) -> bool {
        self.releases() > 0
    }

    fn as_animated(&self) -> Option<&dyn AnimatedImage> {
        Some(self)
    }
}

impl AnimatedImage for ScriptedImage {
    fn decode(&self) -> TextureResult<()> {
        self.decode_started.store(true, Ordering::SeqCst);
        if let Some(probe) = &self.probe {
            probe.enter();
        }

        if let Some(hold) = self.hold.lock().unwrap().take() {
            let _ = hold.recv_timeout(Duration::from_secs(5));
        }
        thread::sleep(self.decode_time);

        if let Some(probe) = &self.probe {
            probe.exit();
        }
        if self.fail {
            return Err(TextureError::NoFrames);
        }
        self.decoded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn current_frame(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn set_current_frame(&self, frame: usize) {
        self.current.store(frame, Ordering::SeqCst);
    }

    fn frame_count(&self) -> usize {
        if self.decoded.load(Ordering::SeqCst) {
            self.delays.len()
        } else {
            0
        }
    }

    fn delay(&self, frame: usize) -> Duration {
        self.delays.get(frame).copied().unwrap_or_default()
    }
}

/// Frames reported to a texture's callback, with the time they arrived
pub type Commits = Arc<Mutex<Vec<(usize, Instant)>>>;

/// Record every committed frame of `texture`
pub fn record_commits(texture: &ImageTexture, image: &Arc<ScriptedImage>) -> Commits {
    let commits = Commits::default();
    let sink = Arc::clone(&commits);
    let image = Arc::clone(image);
    texture.set_callback(Some(Arc::new(move || {
        sink.lock()
            .unwrap()
            .push((image.current_frame(), Instant::now()));
    })));
    commits
}

pub fn commit_count(commits: &Commits) -> usize {
    commits.lock().unwrap().len()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
