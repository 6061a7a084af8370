//! Tile grid for GPU-sized image pieces
//!
//! An image larger than the GPU texture limit is split into tiles. Each tile
//! carries a transparent-or-neighbour border so bilinear sampling at its edges
//! never bleeds in stale texels.

use crate::bitmap::Image;
use crate::canvas::{GpuCanvas, RectF, TextureId};
use image::Rgba;
use std::sync::{Arc, PoisonError};
use tilestream_cache::{Pooled, SizeClass, TilePool, UploadBuffer, SMALL_CONTENT_SIZE};
use tracing::trace;

/// Placement of one tile in image space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub class: SizeClass,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileLayout {
    fn new(class: SizeClass, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            class,
            x,
            y,
            width,
            height,
        }
    }
}

/// Compute the tile grid for a `width`x`height` image.
///
/// The image is walked in LARGE content steps, columns first. A cell whose
/// width fits the SMALL content size becomes one or two SMALL tiles stacked
/// vertically; failing that, a cell whose height fits becomes one or two
/// SMALL tiles side by side. Every other cell is a single LARGE tile.
///
/// # Example
///
/// ```
/// use tilestream_render::tile::grid_layout;
///
/// let grid = grid_layout(1000, 1000);
/// assert_eq!(grid.len(), 4);
/// assert_eq!((grid[1].x, grid[1].y, grid[1].width, grid[1].height), (0, 508, 508, 492));
/// ```
pub fn grid_layout(width: u32, height: u32) -> Vec<TileLayout> {
    let step = SizeClass::Large.content_size();
    let small = SMALL_CONTENT_SIZE;
    let mut layout = Vec::new();

    for x in (0..width).step_by(step as usize) {
        for y in (0..height).step_by(step as usize) {
            let w = step.min(width - x);
            let h = step.min(height - y);

            if w <= small {
                layout.push(TileLayout::new(SizeClass::Small, x, y, w, small.min(h)));
                if h > small {
                    layout.push(TileLayout::new(SizeClass::Small, x, y + small, w, h - small));
                }
            } else if h <= small {
                layout.push(TileLayout::new(SizeClass::Small, x, y, small.min(w), h));
                if w > small {
                    layout.push(TileLayout::new(SizeClass::Small, x + small, y, w - small, h));
                }
            } else {
                layout.push(TileLayout::new(SizeClass::Large, x, y, w, h));
            }
        }
    }

    layout
}

/// Build the tiles covering `image`, taking them from `pool`.
pub(crate) fn build_grid(image: &Arc<dyn Image>, pool: &TilePool<Tile>) -> Vec<Tile> {
    grid_layout(image.width(), image.height())
        .into_iter()
        .map(|layout| {
            let mut tile = pool.obtain(layout.class);
            tile.assign(Arc::clone(image), layout, pool.upload_buffer(layout.class));
            tile
        })
        .collect()
}

/// A GPU-uploadable piece of an image
///
/// The texture handle survives pooling, so a reused tile refills its existing
/// texture instead of allocating a new one.
pub struct Tile {
    class: SizeClass,
    offset_x: u32,
    offset_y: u32,
    content_width: u32,
    content_height: u32,
    image: Option<Arc<dyn Image>>,
    buffer: Option<UploadBuffer>,
    texture: Option<TextureId>,
    content_valid: bool,
}

impl Tile {
    fn assign(&mut self, image: Arc<dyn Image>, layout: TileLayout, buffer: UploadBuffer) {
        debug_assert_eq!(layout.class, self.class);
        // Fails fast on content that does not fit the class
        self.class.buffer_size(layout.width, layout.height);

        self.offset_x = layout.x;
        self.offset_y = layout.y;
        self.content_width = layout.width;
        self.content_height = layout.height;
        self.image = Some(image);
        self.buffer = Some(buffer);
        self.content_valid = false;
    }

    /// Position of the content in image space
    pub fn offset(&self) -> (u32, u32) {
        (self.offset_x, self.offset_y)
    }

    pub fn content_size(&self) -> (u32, u32) {
        (self.content_width, self.content_height)
    }

    pub fn border_size(&self) -> u32 {
        self.class.border_size()
    }

    /// Content plus border on both sides
    pub fn buffer_size(&self) -> (u32, u32) {
        self.class.buffer_size(self.content_width, self.content_height)
    }

    /// Whether the tile owns a GPU texture yet
    pub fn is_loaded(&self) -> bool {
        self.texture.is_some()
    }

    /// Whether the GPU texture holds the image's current pixels
    pub fn is_content_valid(&self) -> bool {
        self.content_valid
    }

    /// Whether the tile still references its image
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Content rectangle in image space
    pub(crate) fn content_rect(&self) -> RectF {
        RectF::from_xywh(
            self.offset_x as f32,
            self.offset_y as f32,
            self.content_width as f32,
            self.content_height as f32,
        )
    }

    /// Convert an image-space rectangle inside this tile to texture space.
    pub(crate) fn to_texture_space(&self, rect: RectF) -> RectF {
        let border = self.border_size() as f32;
        rect.offset(border - self.offset_x as f32, border - self.offset_y as f32)
    }

    /// Copy the tile's pixels into the class buffer and upload them.
    ///
    /// Creates the GPU texture on first use. Returns `false` without touching
    /// the canvas when the tile lost its image to a recycle.
    pub(crate) fn update_content(&mut self, canvas: &mut dyn GpuCanvas) -> bool {
        let (Some(image), Some(buffer)) = (&self.image, &self.buffer) else {
            return false;
        };
        if self.content_valid {
            return true;
        }

        let size = self.class.tile_size();
        let texture = *self
            .texture
            .get_or_insert_with(|| canvas.create_texture(size, size));

        let border = self.class.border_size() as i32;
        let mut pixels = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        image.copy_pixels(
            self.offset_x as i32 - border,
            self.offset_y as i32 - border,
            &mut pixels,
            size,
            size,
        );
        canvas.upload_texture(texture, &pixels);
        self.content_valid = true;

        trace!(
            x = self.offset_x,
            y = self.offset_y,
            class = ?self.class,
            "tile uploaded"
        );
        true
    }

    /// Draw the texture-space `source` of this tile onto `target`.
    pub(crate) fn draw(&mut self, canvas: &mut dyn GpuCanvas, source: RectF, target: RectF) {
        if let Some(texture) = self.bind(canvas) {
            canvas.draw_texture(texture, source, target);
        }
    }

    /// Like [`Tile::draw`], blended toward `color` by `ratio`.
    pub(crate) fn draw_mixed(
        &mut self,
        canvas: &mut dyn GpuCanvas,
        color: Rgba<u8>,
        ratio: f32,
        source: RectF,
        target: RectF,
    ) {
        if let Some(texture) = self.bind(canvas) {
            canvas.draw_mixed(texture, color, ratio, source, target);
        }
    }

    /// Draw the whole bordered tile unscaled at (`x`, `y`).
    pub(crate) fn draw_at(&mut self, canvas: &mut dyn GpuCanvas, x: f32, y: f32) {
        let (width, height) = self.buffer_size();
        let source = RectF::from_xywh(0.0, 0.0, width as f32, height as f32);
        self.draw(canvas, source, source.offset(x, y));
    }

    /// Make sure the texture is current before it is sampled
    fn bind(&mut self, canvas: &mut dyn GpuCanvas) -> Option<TextureId> {
        self.update_content(canvas);
        self.texture
    }

    /// Force a fresh copy and upload on next use.
    ///
    /// The texture and the tile geometry stay as they are.
    pub(crate) fn invalidate_content(&mut self) {
        self.content_valid = false;
    }
}

impl Pooled for Tile {
    fn allocate(class: SizeClass) -> Self {
        Self {
            class,
            offset_x: 0,
            offset_y: 0,
            content_width: 0,
            content_height: 0,
            image: None,
            buffer: None,
            texture: None,
            content_valid: false,
        }
    }

    fn size_class(&self) -> SizeClass {
        self.class
    }

    fn reset(&mut self) {
        self.invalidate_content();
        self.image = None;
        self.buffer = None;
    }
}
