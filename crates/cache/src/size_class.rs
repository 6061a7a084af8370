//! Tile size classes
//!
//! Tiles come in two tiers. Each carries a transparent border proportional to
//! its content size so bilinear sampling at content edges never reads a
//! neighbouring tile. The LARGE bordered size is the hard per-upload limit.

/// Content size of a SMALL tile in pixels
pub const SMALL_CONTENT_SIZE: u32 = 254;

/// Border of a SMALL tile in pixels
pub const SMALL_BORDER_SIZE: u32 = 1;

/// Bordered size of a SMALL tile (256)
pub const SMALL_TILE_SIZE: u32 = SMALL_CONTENT_SIZE + 2 * SMALL_BORDER_SIZE;

/// Content size of a LARGE tile in pixels
pub const LARGE_CONTENT_SIZE: u32 = SMALL_CONTENT_SIZE * 2;

/// Border of a LARGE tile in pixels
pub const LARGE_BORDER_SIZE: u32 = SMALL_BORDER_SIZE * 2;

/// Bordered size of a LARGE tile (512)
pub const LARGE_TILE_SIZE: u32 = LARGE_CONTENT_SIZE + 2 * LARGE_BORDER_SIZE;

/// Tile dimension tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// 254px content, 1px border
    Small,

    /// 508px content, 2px border
    Large,
}

impl SizeClass {
    /// Both classes, in pool order
    pub const ALL: [SizeClass; 2] = [SizeClass::Small, SizeClass::Large];

    /// Maximum content extent on either axis
    pub fn content_size(self) -> u32 {
        match self {
            SizeClass::Small => SMALL_CONTENT_SIZE,
            SizeClass::Large => LARGE_CONTENT_SIZE,
        }
    }

    /// Border added on every side of the content
    pub fn border_size(self) -> u32 {
        match self {
            SizeClass::Small => SMALL_BORDER_SIZE,
            SizeClass::Large => LARGE_BORDER_SIZE,
        }
    }

    /// Bordered extent; the GPU texture and scratch buffer are this size square.
    pub fn tile_size(self) -> u32 {
        match self {
            SizeClass::Small => SMALL_TILE_SIZE,
            SizeClass::Large => LARGE_TILE_SIZE,
        }
    }

    /// Allocated buffer size for content of the given dimensions.
    ///
    /// # Panics
    ///
    /// Panics if the content does not fit this class. Grid construction never
    /// produces such a tile, so reaching this is a programming error.
    pub fn buffer_size(self, content_width: u32, content_height: u32) -> (u32, u32) {
        assert!(
            content_width <= self.content_size() && content_height <= self.content_size(),
            "{}x{} content does not fit a {:?} tile",
            content_width,
            content_height,
            self
        );
        let border = 2 * self.border_size();
        (content_width + border, content_height + border)
    }
}
