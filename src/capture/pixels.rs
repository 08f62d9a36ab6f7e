//! # Pixel Buffers
//!
//! [`PixelBuffer`] is the immutable snapshot handed from a frame source to
//! the encoder. Samples are stored as 8-bit luminance (0 = black,
//! 255 = white), converted once at construction time.
//!
//! ## Luminance
//!
//! Color samples are reduced with the integer Rec.601 luma weights after
//! compositing over a white background, so fully transparent regions of a
//! screenshot print as paper white:
//!
//! ```text
//! c'   = (c·a + 255·(255 − a)) / 255        for each of r, g, b
//! luma = (299·r' + 587·g' + 114·b' + 500) / 1000
//! ```

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgb, Rgba};

use crate::error::{PrintError, Result};

/// A sample that can be reduced to a luminance scalar.
pub trait Luminance {
    /// Perceived brightness, 0 (black) to 255 (white).
    fn luminance(&self) -> u8;
}

impl Luminance for u8 {
    #[inline]
    fn luminance(&self) -> u8 {
        *self
    }
}

impl Luminance for Rgb<u8> {
    #[inline]
    fn luminance(&self) -> u8 {
        let [r, g, b] = self.0;
        luma(r, g, b)
    }
}

impl Luminance for Rgba<u8> {
    #[inline]
    fn luminance(&self) -> u8 {
        let [r, g, b, a] = self.0;
        luma(over_white(r, a), over_white(g, a), over_white(b, a))
    }
}

/// Packed `0xAARRGGBB` sample, the layout mobile bitmaps hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argb(pub u32);

impl Luminance for Argb {
    #[inline]
    fn luminance(&self) -> u8 {
        let [a, r, g, b] = self.0.to_be_bytes();
        Rgba([r, g, b, a]).luminance()
    }
}

#[inline]
fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = channel as u32;
    let a = alpha as u32;
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// # Pixel Buffer
///
/// A `width × height` grid of luminance samples in row-major order.
///
/// ## Example
///
/// ```
/// use snapprint::capture::PixelBuffer;
///
/// let buffer = PixelBuffer::from_luma(2, 1, vec![0, 255]).unwrap();
/// assert_eq!(buffer.luminance(0, 0), 0);
/// assert_eq!(buffer.luminance(1, 0), 255);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    luma: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap row-major luminance samples.
    ///
    /// Zero dimensions are accepted here; the encoder and orchestrator
    /// decide what an empty buffer means for them.
    pub fn from_luma(width: usize, height: usize, luma: Vec<u8>) -> Result<Self> {
        check_len(width, height, luma.len())?;
        Ok(Self {
            width,
            height,
            luma,
        })
    }

    /// Build from any slice of samples that implement [`Luminance`].
    pub fn from_samples<P: Luminance>(width: usize, height: usize, samples: &[P]) -> Result<Self> {
        check_len(width, height, samples.len())?;
        let luma = samples.iter().map(Luminance::luminance).collect();
        Ok(Self {
            width,
            height,
            luma,
        })
    }

    /// Build from tightly packed RGBA8 bytes (4 bytes per pixel).
    pub fn from_rgba8(width: usize, height: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(PrintError::InvalidImage(format!(
                "RGBA data length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        check_len(width, height, bytes.len() / 4)?;
        let luma = bytes
            .chunks_exact(4)
            .map(|px| Rgba([px[0], px[1], px[2], px[3]]).luminance())
            .collect();
        Ok(Self {
            width,
            height,
            luma,
        })
    }

    /// Build from packed `0xAARRGGBB` words.
    pub fn from_argb32(width: usize, height: usize, pixels: &[u32]) -> Result<Self> {
        check_len(width, height, pixels.len())?;
        let luma = pixels.iter().map(|&p| Argb(p).luminance()).collect();
        Ok(Self {
            width,
            height,
            luma,
        })
    }

    /// Convert a decoded image, compositing any alpha over white.
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let luma = rgba.pixels().map(Luminance::luminance).collect();
        Self {
            width: width as usize,
            height: height as usize,
            luma,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// True when either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Luminance at `(x, y)`. Panics when out of bounds.
    #[inline]
    pub fn luminance(&self, x: usize, y: usize) -> u8 {
        self.luma[y * self.width + x]
    }

    /// One row of luminance samples.
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;
        &self.luma[start..start + self.width]
    }

    /// Downscale so the buffer is at most `max_width` samples wide.
    ///
    /// Aspect ratio is preserved. Buffers already narrow enough (and empty
    /// buffers) are returned unchanged.
    pub fn fit_width(self, max_width: usize) -> Self {
        if self.is_empty() || max_width == 0 || self.width <= max_width {
            return self;
        }

        let new_height = ((self.height * max_width + self.width / 2) / self.width).max(1);
        let gray = GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            Luma([self.luminance(x as usize, y as usize)])
        });
        let resized = imageops::resize(&gray, max_width as u32, new_height as u32, FilterType::Triangle);

        Self {
            width: max_width,
            height: new_height,
            luma: resized.into_raw(),
        }
    }

    /// Consume the buffer, returning the raw luminance samples.
    pub fn into_luma(self) -> Vec<u8> {
        self.luma
    }
}

fn check_len(width: usize, height: usize, len: usize) -> Result<()> {
    let expected = width.checked_mul(height).ok_or_else(|| {
        PrintError::InvalidImage(format!("{}x{} overflows the address space", width, height))
    })?;
    if expected != len {
        return Err(PrintError::InvalidImage(format!(
            "{}x{} needs {} samples, got {}",
            width, height, expected, len
        )));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
