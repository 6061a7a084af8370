//! Tile pool with one free list per size class
//!
//! Tiles are cheap metadata wrappers around a GPU texture. Scrolling through a
//! gallery builds and recycles textures constantly, so freed tiles are kept on
//! a per-class stack and handed out again instead of being reallocated.
//!
//! The pool also owns the scratch upload buffer of each class. Uploads happen
//! one tile at a time on the render thread, so every tile of a class shares a
//! single buffer.

use crate::size_class::SizeClass;
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared scratch buffer that tile pixels are copied into before upload
pub type UploadBuffer = Arc<Mutex<RgbaImage>>;

/// An object that can live in a [`TilePool`].
pub trait Pooled {
    /// Allocate a fresh object for the given class.
    fn allocate(class: SizeClass) -> Self;

    /// Size class this object belongs to
    fn size_class(&self) -> SizeClass;

    /// Drop references to external resources before the object is pooled.
    fn reset(&mut self);
}

/// Statistics about pool usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tiles waiting on the SMALL free list
    pub small_free: usize,

    /// Tiles waiting on the LARGE free list
    pub large_free: usize,

    /// Tiles ever allocated because a free list was empty
    pub allocated: u64,

    /// Tiles handed out from a free list
    pub reused: u64,
}

struct FreeList<T> {
    tiles: Mutex<Vec<T>>,
    buffer: UploadBuffer,
}

impl<T> FreeList<T> {
    fn new(class: SizeClass) -> Self {
        let size = class.tile_size();
        Self {
            tiles: Mutex::new(Vec::new()),
            buffer: Arc::new(Mutex::new(RgbaImage::new(size, size))),
        }
    }

    fn len(&self) -> usize {
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Free-list allocator for tiles, keyed by size class
///
/// Thread-safe. Each class has its own short-held lock; neither lock is ever
/// held across an upload or a decode. The pool grows without bound.
///
/// # Example
///
/// ```
/// use tilestream_cache::{Pooled, SizeClass, TilePool};
///
/// struct Slot(SizeClass);
///
/// impl Pooled for Slot {
///     fn allocate(class: SizeClass) -> Self { Slot(class) }
///     fn size_class(&self) -> SizeClass { self.0 }
///     fn reset(&mut self) {}
/// }
///
/// let pool = TilePool::<Slot>::new();
/// let slot = pool.obtain(SizeClass::Small);
/// pool.free(slot);
/// assert_eq!(pool.stats().small_free, 1);
/// ```
pub struct TilePool<T> {
    small: FreeList<T>,
    large: FreeList<T>,
    allocated: AtomicU64,
    reused: AtomicU64,
}

impl<T: Pooled> TilePool<T> {
    /// Create an empty pool and its two scratch buffers
    pub fn new() -> Self {
        Self {
            small: FreeList::new(SizeClass::Small),
            large: FreeList::new(SizeClass::Large),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    fn list(&self, class: SizeClass) -> &FreeList<T> {
        match class {
            SizeClass::Small => &self.small,
            SizeClass::Large => &self.large,
        }
    }

    /// Pop a tile from the class free list, or allocate a new one.
    pub fn obtain(&self, class: SizeClass) -> T {
        let popped = self
            .list(class)
            .tiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match popped {
            Some(tile) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                tile
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                T::allocate(class)
            }
        }
    }

    /// Reset a tile and push it onto its class free list.
    pub fn free(&self, mut tile: T) {
        tile.reset();
        self.list(tile.size_class())
            .tiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tile);
    }

    /// Scratch upload buffer shared by every tile of `class`
    pub fn upload_buffer(&self, class: SizeClass) -> UploadBuffer {
        Arc::clone(&self.list(class).buffer)
    }

    /// Drop every pooled tile
    pub fn clear(&self) {
        for class in SizeClass::ALL {
            self.list(class)
                .tiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            small_free: self.small.len(),
            large_free: self.large.len(),
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }
}

impl<T: Pooled> Default for TilePool<T> {
    fn default() -> Self {
        Self::new()
    }
}
