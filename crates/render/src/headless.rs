//! Headless canvas and render loop
//!
//! [`RecordingCanvas`] keeps every texture operation in memory instead of
//! touching a GPU, and [`ManualRenderLoop`] runs idle ticks only when asked.
//! Together they drive textures and the uploader without a window.

use crate::canvas::{GpuCanvas, RectF, TextureId};
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tilestream_scheduler::{IdleListener, RenderLoop};

/// One recorded draw call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub texture: TextureId,
    pub source: RectF,
    pub target: RectF,
    /// Blend color and ratio for mixed draws
    pub mix: Option<(Rgba<u8>, f32)>,
}

/// A [`GpuCanvas`] that records what it is asked to do
#[derive(Default)]
pub struct RecordingCanvas {
    /// Textures created, with their sizes
    pub created: Vec<(TextureId, u32, u32)>,
    /// Every upload, with a copy of the pixels
    pub uploads: Vec<(TextureId, RgbaImage)>,
    pub draws: Vec<DrawCall>,
    next_id: u64,
}

impl RecordingCanvas {
    /// Pixels of the most recent upload
    pub fn last_upload(&self) -> Option<&RgbaImage> {
        self.uploads.last().map(|(_, pixels)| pixels)
    }

    /// Pixels most recently uploaded to `texture`
    pub fn texture_pixels(&self, texture: TextureId) -> Option<&RgbaImage> {
        self.uploads
            .iter()
            .rev()
            .find(|(id, _)| *id == texture)
            .map(|(_, pixels)| pixels)
    }

    /// Forget recorded uploads and draws; created textures stay known
    pub fn clear(&mut self) {
        self.uploads.clear();
        self.draws.clear();
    }
}

impl GpuCanvas for RecordingCanvas {
    fn create_texture(&mut self, width: u32, height: u32) -> TextureId {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.created.push((id, width, height));
        id
    }

    fn upload_texture(&mut self, texture: TextureId, pixels: &RgbaImage) {
        self.uploads.push((texture, pixels.clone()));
    }

    fn draw_texture(&mut self, texture: TextureId, source: RectF, target: RectF) {
        self.draws.push(DrawCall {
            texture,
            source,
            target,
            mix: None,
        });
    }

    fn draw_mixed(
        &mut self,
        texture: TextureId,
        color: Rgba<u8>,
        ratio: f32,
        source: RectF,
        target: RectF,
    ) {
        self.draws.push(DrawCall {
            texture,
            source,
            target,
            mix: Some((color, ratio)),
        });
    }
}

/// A [`RenderLoop`] whose idle ticks are run by hand
pub struct ManualRenderLoop<C: 'static> {
    listeners: Mutex<Vec<Arc<dyn IdleListener<C>>>>,
    registrations: AtomicUsize,
    render_requests: AtomicUsize,
}

impl<C: 'static> ManualRenderLoop<C> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run one idle tick against `canvas`.
    ///
    /// Returns the number of listeners still registered afterwards.
    pub fn run_idle(&self, canvas: &mut C) -> usize {
        let listeners = std::mem::take(
            &mut *self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let render_requested = self.render_requests.load(Ordering::SeqCst) > 0;
        let kept: Vec<_> = listeners
            .into_iter()
            .filter(|listener| listener.on_idle(canvas, render_requested))
            .collect();

        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.extend(kept);
        listeners.len()
    }

    /// Times a listener was added
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Times a redraw was requested
    pub fn render_requests(&self) -> usize {
        self.render_requests.load(Ordering::SeqCst)
    }
}

impl<C: 'static> Default for ManualRenderLoop<C> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            registrations: AtomicUsize::new(0),
            render_requests: AtomicUsize::new(0),
        }
    }
}

impl<C: 'static> RenderLoop<C> for ManualRenderLoop<C> {
    fn add_idle_listener(&self, listener: Arc<dyn IdleListener<C>>) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn request_render(&self) {
        self.render_requests.fetch_add(1, Ordering::SeqCst);
    }
}
