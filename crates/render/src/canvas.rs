//! GPU canvas abstraction
//!
//! The engine never talks to a graphics API directly. A [`GpuCanvas`] owns
//! texture objects and knows how to draw a textured quad; everything else is
//! rectangle arithmetic done here.

use image::{Rgba, RgbaImage};

/// Opaque handle to a texture owned by a [`GpuCanvas`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Axis-aligned rectangle in floating point coordinates
///
/// `left <= right` and `top <= bottom` for every rectangle the engine builds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle at (`x`, `y`) with the given size
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Move the rectangle by (`dx`, `dy`)
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// Overlap of two rectangles, or `None` if they only touch or are apart
    pub fn intersection(&self, other: &RectF) -> Option<RectF> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        (left < right && top < bottom).then(|| RectF::new(left, top, right, bottom))
    }

    /// Map this rectangle from source space into target space.
    ///
    /// The source space has its origin at (`x0`, `y0`); that origin lands on
    /// (`x`, `y`) and both axes are scaled independently.
    ///
    /// ```text
    ///  (x0,y0) source             (x,y) target
    ///     +---------+               +--------------+
    ///     | +--+    |  scale_x/y    | +----+       |
    ///     | +--+    |  -------->    | |    |       |
    ///     +---------+               | +----+       |
    ///                               +--------------+
    /// ```
    pub fn map(&self, x0: f32, y0: f32, x: f32, y: f32, scale_x: f32, scale_y: f32) -> RectF {
        RectF::new(
            x + (self.left - x0) * scale_x,
            y + (self.top - y0) * scale_y,
            x + (self.right - x0) * scale_x,
            y + (self.bottom - y0) * scale_y,
        )
    }
}

/// A drawing surface backed by a GPU.
///
/// Implementations wrap a real graphics API. Textures are created at a fixed
/// size and refilled from CPU buffers; draws sample `source` (texture pixel
/// space) into `target` (canvas space).
pub trait GpuCanvas {
    /// Allocate a `width`x`height` RGBA texture
    fn create_texture(&mut self, width: u32, height: u32) -> TextureId;

    /// Replace the texture's contents with `pixels`
    fn upload_texture(&mut self, texture: TextureId, pixels: &RgbaImage);

    /// Draw part of a texture as a quad
    fn draw_texture(&mut self, texture: TextureId, source: RectF, target: RectF);

    /// Draw part of a texture blended toward `color`.
    ///
    /// The output is `texel * (1 - ratio) + color * ratio`.
    fn draw_mixed(
        &mut self,
        texture: TextureId,
        color: Rgba<u8>,
        ratio: f32,
        source: RectF,
        target: RectF,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_size() {
        let rect = RectF::from_xywh(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.width(), 30.0);
        assert_eq!(rect.height(), 40.0);
        assert_eq!(rect.right, 40.0);
    }

    #[test]
    fn test_intersection() {
        let a = RectF::new(0.0, 0.0, 10.0, 10.0);
        let b = RectF::new(5.0, 5.0, 20.0, 20.0);
        assert_eq!(a.intersection(&b), Some(RectF::new(5.0, 5.0, 10.0, 10.0)));

        // Touching edges do not intersect
        let c = RectF::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn test_map_scales_around_origin() {
        let src = RectF::new(10.0, 10.0, 20.0, 30.0);
        let out = src.map(10.0, 10.0, 100.0, 200.0, 2.0, 0.5);
        assert_eq!(out, RectF::new(100.0, 200.0, 120.0, 210.0));
    }

    #[test]
    fn test_offset() {
        let rect = RectF::new(0.0, 0.0, 4.0, 4.0).offset(1.0, -1.0);
        assert_eq!(rect, RectF::new(1.0, -1.0, 5.0, 3.0));
    }
}
