//! Decoded bitmap abstractions
//!
//! The engine consumes images through [`Image`] and, for animated formats,
//! [`AnimatedImage`]. Implementations are shared between the render thread
//! and an animation worker, so every method takes `&self` and implementations
//! synchronize internally.
//!
//! Two implementations backed by the `image` crate are provided:
//! [`StaticImage`] for still bitmaps and [`FrameSequence`] for animations.

use crate::error::{TextureError, TextureResult};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Frame, ImageDecoder, ImageResult, RgbaImage};
use std::io::{BufRead, Seek};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

/// A decoded bitmap shared between a texture and its animation worker.
pub trait Image: Send + Sync {
    /// Width in pixels
    fn width(&self) -> u32;

    /// Height in pixels
    fn height(&self) -> u32;

    /// Copy `[x, x + width) x [y, y + height)` into the top-left corner of `dst`.
    ///
    /// Pixels outside the image, or of a released image, are written as
    /// transparent black.
    fn copy_pixels(&self, x: i32, y: i32, dst: &mut RgbaImage, width: u32, height: u32);

    /// Release the pixel memory. Called at most once by the engine.
    fn recycle(&self);

    /// Whether [`Image::recycle`] has been called
    fn is_recycled(&self) -> bool;

    /// The animated view of this image, if it has one
    fn as_animated(&self) -> Option<&dyn AnimatedImage> {
        None
    }
}

/// An image with several frames and per-frame delays.
pub trait AnimatedImage: Image {
    /// Decode the frames. Runs once, on a worker thread, before animating.
    fn decode(&self) -> TextureResult<()>;

    /// Frame whose pixels [`Image::copy_pixels`] currently returns
    fn current_frame(&self) -> usize;

    /// Switch the visible frame
    fn set_current_frame(&self, frame: usize);

    /// Number of frames; zero before a successful decode
    fn frame_count(&self) -> usize;

    /// How long `frame` stays on screen
    fn delay(&self, frame: usize) -> Duration;
}

/// Copy a region of `src` into the top-left corner of `dst`.
///
/// `src` positioned with its top-left at (`left`, `top`) in image space;
/// anything it does not cover, including the whole region when `src` is
/// `None`, becomes transparent. The region is clipped to `dst`.
pub(crate) fn copy_region(
    src: Option<(&RgbaImage, u32, u32)>,
    x: i32,
    y: i32,
    dst: &mut RgbaImage,
    width: u32,
    height: u32,
) {
    let dst_width = dst.width() as usize;
    let width = width.min(dst.width()) as usize;
    let height = height.min(dst.height());
    let buffer: &mut [u8] = dst;

    for dy in 0..height {
        let row_start = dy as usize * dst_width * 4;
        let row = &mut buffer[row_start..row_start + width * 4];
        row.fill(0);

        let Some((src, left, top)) = src else {
            continue;
        };

        // Source coordinates relative to the frame's own origin
        let sy = i64::from(y) + i64::from(dy) - i64::from(top);
        if sy < 0 || sy >= i64::from(src.height()) {
            continue;
        }
        let origin_x = i64::from(x) - i64::from(left);
        let sx0 = origin_x.max(0);
        let sx1 = (origin_x + width as i64).min(i64::from(src.width()));
        if sx0 >= sx1 {
            continue;
        }

        let count = (sx1 - sx0) as usize;
        let dx0 = (sx0 - origin_x) as usize;
        let src_start = (sy as usize * src.width() as usize + sx0 as usize) * 4;
        row[dx0 * 4..(dx0 + count) * 4]
            .copy_from_slice(&src.as_raw()[src_start..src_start + count * 4]);
    }
}

/// A still bitmap held in memory
pub struct StaticImage {
    width: u32,
    height: u32,
    pixels: RwLock<Option<RgbaImage>>,
}

impl StaticImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            pixels: RwLock::new(Some(pixels)),
        }
    }
}

impl Image for StaticImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn copy_pixels(&self, x: i32, y: i32, dst: &mut RgbaImage, width: u32, height: u32) {
        let pixels = self.pixels.read().unwrap_or_else(PoisonError::into_inner);
        copy_region(
            pixels.as_ref().map(|p| (p, 0, 0)),
            x,
            y,
            dst,
            width,
            height,
        );
    }

    fn recycle(&self) {
        self.pixels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_recycled(&self) -> bool {
        self.pixels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

type FrameSource = Box<dyn FnOnce() -> ImageResult<Vec<Frame>> + Send>;

struct DecodedFrame {
    buffer: RgbaImage,
    left: u32,
    top: u32,
    delay: Duration,
}

impl From<Frame> for DecodedFrame {
    fn from(frame: Frame) -> Self {
        let left = frame.left();
        let top = frame.top();
        let delay = Duration::from(frame.delay());
        Self {
            buffer: frame.into_buffer(),
            left,
            top,
            delay,
        }
    }
}

/// An animation made of fully composed frames.
///
/// Frames can be supplied up front or produced by a deferred decode that
/// runs in [`AnimatedImage::decode`], off the render thread.
pub struct FrameSequence {
    width: u32,
    height: u32,
    source: Mutex<Option<FrameSource>>,
    frames: RwLock<Vec<DecodedFrame>>,
    current: AtomicUsize,
    recycled: AtomicBool,
}

impl FrameSequence {
    /// Animation from frames that are already decoded
    pub fn from_frames(width: u32, height: u32, frames: Vec<Frame>) -> Self {
        Self {
            width,
            height,
            source: Mutex::new(None),
            frames: RwLock::new(frames.into_iter().map(DecodedFrame::from).collect()),
            current: AtomicUsize::new(0),
            recycled: AtomicBool::new(false),
        }
    }

    /// Animation whose frames come from `decode` the first time they are needed
    pub fn deferred<F>(width: u32, height: u32, decode: F) -> Self
    where
        F: FnOnce() -> ImageResult<Vec<Frame>> + Send + 'static,
    {
        Self {
            width,
            height,
            source: Mutex::new(Some(Box::new(decode))),
            frames: RwLock::new(Vec::new()),
            current: AtomicUsize::new(0),
            recycled: AtomicBool::new(false),
        }
    }

    /// Animated GIF. Only the header is read here; frames decode later.
    pub fn from_gif<R>(reader: R) -> TextureResult<Self>
    where
        R: BufRead + Seek + Send + 'static,
    {
        let decoder = GifDecoder::new(reader)?;
        let (width, height) = decoder.dimensions();
        Ok(Self::deferred(width, height, move || {
            decoder.into_frames().collect_frames()
        }))
    }
}

impl Image for FrameSequence {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn copy_pixels(&self, x: i32, y: i32, dst: &mut RgbaImage, width: u32, height: u32) {
        let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
        let frame = frames.get(self.current.load(Ordering::Acquire));
        copy_region(
            frame.map(|f| (&f.buffer, f.left, f.top)),
            x,
            y,
            dst,
            width,
            height,
        );
    }

    fn recycle(&self) {
        self.recycled.store(true, Ordering::Release);
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
        frames.clear();
        frames.shrink_to_fit();
    }

    fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::Acquire)
    }

    fn as_animated(&self) -> Option<&dyn AnimatedImage> {
        Some(self)
    }
}

impl AnimatedImage for FrameSequence {
    fn decode(&self) -> TextureResult<()> {
        if self.is_recycled() {
            return Err(TextureError::Released);
        }
        let source = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(source) = source {
            let decoded: Vec<DecodedFrame> =
                source()?.into_iter().map(DecodedFrame::from).collect();
            if self.is_recycled() {
                return Err(TextureError::Released);
            }
            *self.frames.write().unwrap_or_else(PoisonError::into_inner) = decoded;
            self.current.store(0, Ordering::Release);
        }

        if self.frame_count() == 0 {
            return Err(TextureError::NoFrames);
        }
        Ok(())
    }

    fn current_frame(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    fn set_current_frame(&self, frame: usize) {
        self.current.store(frame, Ordering::Release);
    }

    fn frame_count(&self) -> usize {
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn delay(&self, frame: usize) -> Duration {
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(frame)
            .map_or(Duration::ZERO, |f| f.delay)
    }
}
