//! Tilestream Render Library
//!
//! Tiled texture streaming for large and animated images.
//!
//! An [`ImageTexture`] splits an image into GPU-sized tiles, a
//! [`TextureUploader`] streams those tiles to the GPU in small per-tick
//! slices, and animated images advance on a background loop that the render
//! thread picks up lazily on its next draw.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use image::RgbaImage;
//! use tilestream_render::headless::{ManualRenderLoop, RecordingCanvas};
//! use tilestream_render::{ImageTexture, StaticImage, TextureResources};
//!
//! let resources = TextureResources::default();
//! let render_loop = ManualRenderLoop::<RecordingCanvas>::new();
//! let uploader = resources.uploader::<RecordingCanvas>(render_loop.clone());
//!
//! let image = Arc::new(StaticImage::new(RgbaImage::new(1000, 600)));
//! let texture = Arc::new(ImageTexture::new(image, &resources));
//! uploader.add_texture(texture.clone());
//!
//! let mut canvas = RecordingCanvas::default();
//! while render_loop.run_idle(&mut canvas) > 0 {}
//! assert!(texture.is_ready());
//!
//! texture.draw(&mut canvas, 0.0, 0.0);
//! ```

pub mod animation;
pub mod bitmap;
pub mod canvas;
pub mod error;
pub mod headless;
pub mod resources;
pub mod texture;
pub mod tile;

// Re-export public API
pub use animation::{AnimationPhase, InvalidateCallback};
pub use bitmap::{AnimatedImage, FrameSequence, Image, StaticImage};
pub use canvas::{GpuCanvas, RectF, TextureId};
pub use error::{TextureError, TextureResult};
pub use resources::TextureResources;
pub use texture::ImageTexture;
pub use tile::{grid_layout, Tile, TileLayout};

/// Uploader that streams [`ImageTexture`] tiles onto a canvas of type `C`
pub type TextureUploader<C> = tilestream_scheduler::Uploader<ImageTexture, C>;
