//! Tiled, streamable texture for one image
//!
//! An [`ImageTexture`] splits its image into tiles at construction, uploads
//! them a tile at a time through the [`crate::TextureUploader`] and draws them
//! as one quad per tile. Animated images also get a background loop that
//! commits frames; the next draw notices and refreshes the tiles.

use crate::animation::{self, AnimationPhase, InvalidateCallback, Monitor, TextureState};
use crate::bitmap::Image;
use crate::canvas::{GpuCanvas, RectF};
use crate::resources::TextureResources;
use crate::tile::{build_grid, Tile};
use image::Rgba;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tilestream_cache::TilePool;
use tilestream_scheduler::UploadTask;
use tracing::{debug, trace, warn};

/// A texture made of GPU-sized tiles
///
/// Owner-side methods (`draw*`, `set_*`, `recycle`) are meant to be called
/// from the thread that owns the texture and its canvas. The animation loop
/// runs elsewhere and meets them in the shared monitor.
///
/// Dropping the texture recycles it.
pub struct ImageTexture {
    monitor: Arc<Monitor>,
    pool: Arc<TilePool<Tile>>,
    width: u32,
    height: u32,
    tile_count: usize,
    cursor: AtomicUsize,
}

impl ImageTexture {
    /// Build the tile grid for `image` and, if it is animated, start its
    /// animation loop on the shared worker pool.
    pub fn new(image: Arc<dyn Image>, resources: &TextureResources) -> Self {
        let pool = resources.pool();
        let tiles = build_grid(&image, &pool);
        let width = image.width();
        let height = image.height();
        let tile_count = tiles.len();
        let animated = image.as_animated().is_some();

        let phase = if animated {
            AnimationPhase::InitialDecode
        } else {
            AnimationPhase::Static
        };
        let monitor = Arc::new(Monitor::new(image, tiles, phase));
        debug!(width, height, tile_count, animated, "texture created");

        if animated {
            let task_monitor = Arc::clone(&monitor);
            let gate = resources.gate();
            let started = resources
                .workers()
                .execute(Box::new(move || animation::run(task_monitor, gate)));

            if let Err(err) = started {
                warn!(error = %err, "animation loop not started");
                monitor.lock().phase = AnimationPhase::Stopped;
            }
        }

        Self {
            monitor,
            pool,
            width,
            height,
            tile_count,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The image this texture displays
    pub fn image(&self) -> &Arc<dyn Image> {
        &self.monitor.image
    }

    /// Number of tiles in the grid
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    /// Tiles drawn with borders are never opaque
    pub fn is_opaque(&self) -> bool {
        false
    }

    /// Whether every tile has gone through the uploader
    pub fn is_ready(&self) -> bool {
        self.cursor.load(Ordering::Acquire) == self.tile_count
    }

    /// Register the callback fired after each committed frame.
    ///
    /// The callback runs on the animation worker, outside the monitor.
    pub fn set_callback(&self, callback: Option<InvalidateCallback>) {
        self.monitor.lock().callback = callback;
    }

    /// Jump to `frame` without waiting for the current delay.
    ///
    /// Frames past the end wrap around. A pending seek also lifts a pause.
    pub fn set_frame(&self, frame: usize) {
        self.monitor.lock().target_frame = Some(frame);
        self.monitor.notify();
    }

    /// Pause or resume the animation.
    ///
    /// A pause takes effect at the next frame boundary.
    pub fn set_pause(&self, pause: bool) {
        self.monitor.lock().paused = pause;
        if !pause {
            self.monitor.notify();
        }
    }

    pub fn animation_phase(&self) -> AnimationPhase {
        self.monitor.lock().phase
    }

    pub fn is_recycled(&self) -> bool {
        self.monitor.lock().recycled
    }

    /// Return every tile to the pool and release the image.
    ///
    /// If the animation loop is inside its first decode, the loop releases
    /// the image itself once the decode returns. Calling this again is a no-op.
    pub fn recycle(&self) {
        let mut state = self.monitor.lock();
        if state.recycled {
            return;
        }
        state.recycled = true;
        state.phase = AnimationPhase::Recycled;

        for tile in mem::take(&mut state.tiles) {
            self.pool.free(tile);
        }
        let deferred = state.recycle_locked;
        if !deferred {
            self.monitor.release_image(&mut state);
        }
        drop(state);

        self.monitor.notify();
        debug!(tiles = self.tile_count, deferred, "texture recycled");
    }

    /// Draw the whole texture unscaled at (`x`, `y`).
    pub fn draw(&self, canvas: &mut dyn GpuCanvas, x: f32, y: f32) {
        self.draw_rect(canvas, x, y, self.width as f32, self.height as f32);
    }

    /// Draw the whole texture scaled into the given rectangle.
    pub fn draw_rect(&self, canvas: &mut dyn GpuCanvas, x: f32, y: f32, width: f32, height: f32) {
        self.draw_tiles(canvas, self.bounds(), RectF::from_xywh(x, y, width, height), None);
    }

    /// Draw the `source` region of the image into `target`.
    pub fn draw_region(&self, canvas: &mut dyn GpuCanvas, source: RectF, target: RectF) {
        self.draw_tiles(canvas, source, target, None);
    }

    /// Draw the whole texture blended toward `color`.
    ///
    /// The result is `texel * (1 - ratio) + color * ratio`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_mixed(
        &self,
        canvas: &mut dyn GpuCanvas,
        color: Rgba<u8>,
        ratio: f32,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) {
        let target = RectF::from_xywh(x, y, width, height);
        self.draw_tiles(canvas, self.bounds(), target, Some((color, ratio)));
    }

    /// Draw the `source` region blended toward `color`.
    pub fn draw_mixed_region(
        &self,
        canvas: &mut dyn GpuCanvas,
        color: Rgba<u8>,
        ratio: f32,
        source: RectF,
        target: RectF,
    ) {
        self.draw_tiles(canvas, source, target, Some((color, ratio)));
    }

    /// Upload the tile under the cursor and advance it.
    ///
    /// Returns `true` once the cursor has passed the last tile.
    pub fn upload_next_tile(&self, canvas: &mut dyn GpuCanvas) -> bool {
        let mut state = self.monitor.lock();
        let index = self.cursor.load(Ordering::Acquire);
        if index >= self.tile_count {
            return true;
        }
        self.cursor.store(index + 1, Ordering::Release);

        // Tiles are gone after a recycle; the slot just counts as done
        if let Some(tile) = state.tiles.get_mut(index).filter(|tile| tile.has_image()) {
            let first_upload = !tile.is_loaded();
            tile.update_content(canvas);
            // A texture's first draw is slow; pay for it now instead of mid-scroll
            if first_upload {
                tile.draw_at(canvas, 0.0, 0.0);
            }
        }

        index + 1 == self.tile_count
    }

    fn bounds(&self) -> RectF {
        RectF::from_xywh(0.0, 0.0, self.width as f32, self.height as f32)
    }

    fn draw_tiles(
        &self,
        canvas: &mut dyn GpuCanvas,
        source: RectF,
        target: RectF,
        mix: Option<(Rgba<u8>, f32)>,
    ) {
        let scale_x = target.width() / source.width();
        let scale_y = target.height() / source.height();

        let mut state = self.monitor.lock();
        sync_frame(&mut state);

        for tile in &mut state.tiles {
            let Some(visible) = tile.content_rect().intersection(&source) else {
                continue;
            };
            let dest = visible.map(
                source.left,
                source.top,
                target.left,
                target.top,
                scale_x,
                scale_y,
            );
            let src = tile.to_texture_space(visible);

            match mix {
                Some((color, ratio)) => tile.draw_mixed(canvas, color, ratio, src, dest),
                None => tile.draw(canvas, src, dest),
            }
        }
    }
}

/// Pick up a committed frame by invalidating every tile's content
fn sync_frame(state: &mut TextureState) {
    if !state.confirm_frame {
        return;
    }
    state.confirm_frame = false;
    for tile in &mut state.tiles {
        tile.invalidate_content();
    }
    trace!(tiles = state.tiles.len(), "frame picked up by draw");
}

impl<C: GpuCanvas> UploadTask<C> for ImageTexture {
    fn is_ready(&self) -> bool {
        ImageTexture::is_ready(self)
    }

    fn upload_next_tile(&self, canvas: &mut C) -> bool {
        ImageTexture::upload_next_tile(self, canvas)
    }
}

impl Drop for ImageTexture {
    fn drop(&mut self) {
        self.recycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::RecordingCanvas;
    use crate::bitmap::StaticImage;
    use image::RgbaImage;

    fn texture(width: u32, height: u32, resources: &TextureResources) -> ImageTexture {
        let image = Arc::new(StaticImage::new(RgbaImage::new(width, height)));
        ImageTexture::new(image, resources)
    }

    #[test]
    fn test_static_texture_properties() {
        let resources = TextureResources::default();
        let texture = texture(1000, 1000, &resources);

        assert_eq!((texture.width(), texture.height()), (1000, 1000));
        assert_eq!(texture.tile_count(), 4);
        assert_eq!(texture.animation_phase(), AnimationPhase::Static);
        assert!(!texture.is_opaque());
        assert!(!texture.is_ready());
    }

    #[test]
    fn test_upload_cursor_moves_forward_once() {
        let resources = TextureResources::default();
        let texture = texture(1000, 1000, &resources);
        let mut canvas = RecordingCanvas::default();

        let done: Vec<bool> = (0..4).map(|_| texture.upload_next_tile(&mut canvas)).collect();
        assert_eq!(done, vec![false, false, false, true]);
        assert!(texture.is_ready());
        assert_eq!(canvas.uploads.len(), 4);

        // First uploads are each followed by a zero-offset draw
        assert_eq!(canvas.draws.len(), 4);
        assert_eq!(canvas.draws[0].target, RectF::new(0.0, 0.0, 512.0, 512.0));

        assert!(texture.upload_next_tile(&mut canvas));
        assert_eq!(canvas.uploads.len(), 4);
        assert!(texture.is_ready());
    }

    #[test]
    fn test_draw_maps_every_tile() {
        let resources = TextureResources::default();
        let texture = texture(1000, 1000, &resources);
        let mut canvas = RecordingCanvas::default();

        texture.draw_rect(&mut canvas, 10.0, 20.0, 500.0, 500.0);

        assert_eq!(canvas.draws.len(), 4);
        // Drawing uploads lazily
        assert_eq!(canvas.uploads.len(), 4);
        let last = &canvas.draws[3];
        assert_eq!(last.source, RectF::new(2.0, 2.0, 494.0, 494.0));
        assert_eq!(last.target, RectF::new(264.0, 274.0, 510.0, 520.0));
        assert!(last.mix.is_none());
    }

    #[test]
    fn test_draw_region_skips_hidden_tiles() {
        let resources = TextureResources::default();
        let texture = texture(1000, 1000, &resources);
        let mut canvas = RecordingCanvas::default();

        let source = RectF::new(0.0, 0.0, 100.0, 100.0);
        let target = RectF::new(0.0, 0.0, 200.0, 200.0);
        texture.draw_region(&mut canvas, source, target);

        assert_eq!(canvas.draws.len(), 1);
        assert_eq!(canvas.draws[0].source, RectF::new(2.0, 2.0, 102.0, 102.0));
        assert_eq!(canvas.draws[0].target, target);
    }

    #[test]
    fn test_draw_mixed_carries_color() {
        let resources = TextureResources::default();
        let texture = texture(300, 100, &resources);
        let mut canvas = RecordingCanvas::default();
        let color = Rgba([255, 0, 0, 255]);

        texture.draw_mixed(&mut canvas, color, 0.25, 0.0, 0.0, 300.0, 100.0);
        assert_eq!(canvas.draws.len(), 2);
        assert!(canvas.draws.iter().all(|d| d.mix == Some((color, 0.25))));

        canvas.clear();
        let source = RectF::new(260.0, 0.0, 300.0, 100.0);
        texture.draw_mixed_region(&mut canvas, color, 0.5, source, source);
        assert_eq!(canvas.draws.len(), 1);
        assert_eq!(canvas.draws[0].source, RectF::new(7.0, 1.0, 47.0, 101.0));
    }

    #[test]
    fn test_recycle_is_idempotent() {
        let resources = TextureResources::default();
        let pool = resources.pool();
        let image = Arc::new(StaticImage::new(RgbaImage::new(600, 300)));
        let texture = ImageTexture::new(image.clone(), &resources);

        texture.recycle();
        assert!(texture.is_recycled());
        assert!(image.is_recycled());
        assert_eq!(texture.animation_phase(), AnimationPhase::Recycled);
        let stats = pool.stats();
        assert_eq!((stats.small_free, stats.large_free), (2, 1));

        texture.recycle();
        drop(texture);
        let stats = pool.stats();
        assert_eq!((stats.small_free, stats.large_free), (2, 1));
    }

    #[test]
    fn test_upload_after_recycle_counts_as_done() {
        let resources = TextureResources::default();
        let texture = texture(1000, 1000, &resources);
        let mut canvas = RecordingCanvas::default();

        texture.upload_next_tile(&mut canvas);
        texture.recycle();

        let done: Vec<bool> = (0..3).map(|_| texture.upload_next_tile(&mut canvas)).collect();
        assert_eq!(done, vec![false, false, true]);
        assert!(texture.is_ready());
        assert_eq!(canvas.uploads.len(), 1);

        texture.draw(&mut canvas, 0.0, 0.0);
        assert_eq!(canvas.draws.len(), 1);
    }

    #[test]
    fn test_drop_returns_tiles() {
        let resources = TextureResources::default();
        {
            let _texture = texture(1000, 1000, &resources);
        }
        assert_eq!(resources.pool().stats().large_free, 4);

        // The next texture reuses them
        let _texture = texture(1000, 1000, &resources);
        let stats = resources.pool().stats();
        assert_eq!((stats.large_free, stats.reused), (0, 4));
    }
}
