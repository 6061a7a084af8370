//! Tilestream Cache Library
//!
//! Tile size classes, the per-class tile pool and streaming configuration.

pub mod config;
pub mod pool;
pub mod size_class;

pub use config::{ConfigError, StreamingConfig};
pub use pool::{PoolStats, Pooled, TilePool, UploadBuffer};
pub use size_class::{
    SizeClass, LARGE_BORDER_SIZE, LARGE_CONTENT_SIZE, LARGE_TILE_SIZE, SMALL_BORDER_SIZE,
    SMALL_CONTENT_SIZE, SMALL_TILE_SIZE,
};
