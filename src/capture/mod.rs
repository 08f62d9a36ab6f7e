//! # Frame Sources
//!
//! A frame source produces a [`PixelBuffer`] of whatever is currently on
//! screen. On a phone that is the platform's view-snapshot facility; this
//! crate treats it as a black box behind the [`FrameSource`] trait.
//!
//! Snapshots may only be taken on the UI-affine execution context. Sources
//! do not enforce that themselves; the orchestrator routes every capture
//! through a [`crate::dispatch::UiContext`].
//!
//! ## Provided Sources
//!
//! | Source | Use |
//! |--------|-----|
//! | [`ImageFileSource`] | Desktop/CLI: a screenshot file stands in for the view |
//! | [`StaticFrame`] | A fixed buffer, handy for tests and previews |
//! | [`FnSource`] | Adapter for a closure (platform bindings) |

mod pixels;

use std::path::{Path, PathBuf};

pub use pixels::{Argb, Luminance, PixelBuffer};

use crate::error::{PrintError, Result};

/// Something that can snapshot the current view.
pub trait FrameSource: Send + Sync {
    /// Capture the current view. Must be called on the UI-affine context.
    fn capture_pixels(&self) -> Result<PixelBuffer>;
}

/// Reads a screenshot from disk on every capture.
#[derive(Debug, Clone)]
pub struct ImageFileSource {
    path: PathBuf,
}

impl ImageFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for ImageFileSource {
    fn capture_pixels(&self) -> Result<PixelBuffer> {
        let image = image::open(&self.path).map_err(|e| {
            PrintError::CaptureFailed(format!("Failed to load {}: {}", self.path.display(), e))
        })?;
        Ok(PixelBuffer::from_image(&image))
    }
}

/// Returns a copy of the same buffer on every capture.
#[derive(Debug, Clone)]
pub struct StaticFrame {
    buffer: PixelBuffer,
}

impl StaticFrame {
    pub fn new(buffer: PixelBuffer) -> Self {
        Self { buffer }
    }
}

impl FrameSource for StaticFrame {
    fn capture_pixels(&self) -> Result<PixelBuffer> {
        Ok(self.buffer.clone())
    }
}

/// Wraps a closure as a [`FrameSource`].
///
/// ```
/// use snapprint::capture::{FnSource, FrameSource, PixelBuffer};
///
/// let source = FnSource::new(|| PixelBuffer::from_luma(1, 1, vec![0]));
/// assert_eq!(source.capture_pixels().unwrap().width(), 1);
/// ```
pub struct FnSource<F> {
    capture: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> Result<PixelBuffer> + Send + Sync,
{
    pub fn new(capture: F) -> Self {
        Self { capture }
    }
}

impl<F> FrameSource for FnSource<F>
where
    F: Fn() -> Result<PixelBuffer> + Send + Sync,
{
    fn capture_pixels(&self) -> Result<PixelBuffer> {
        (self.capture)()
    }
}
