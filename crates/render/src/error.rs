//! Render error types
//!
//! Nothing here reaches the owner of a texture: decode failures stop the
//! animation loop and are logged. The types exist so image implementations
//! can report what went wrong.

use image::ImageError;

/// Errors produced by [`crate::Image`] implementations
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// The underlying decoder failed
    #[error("decode failed: {0}")]
    Decode(#[from] ImageError),

    /// The image was released before it could be decoded
    #[error("image already released")]
    Released,

    /// Decoding produced no frames
    #[error("image has no frames")]
    NoFrames,
}

/// Result type for image operations
pub type TextureResult<T> = Result<T, TextureError>;
