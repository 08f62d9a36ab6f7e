//! # Raster Encoder
//!
//! Converts a [`PixelBuffer`] into an ESC/POS 24-dot bit-image command
//! stream.
//!
//! ## Algorithm
//!
//! ```text
//! PixelBuffer (W × H luminance)
//!     │
//!     ├── ESC 3 24                      (optional, contiguous bands)
//!     │
//!     └── for each 24-row band, top to bottom:
//!           ESC * 33 nL nH              (nL nH = W dot columns)
//!           for x in 0..W:
//!               3 bytes: rows band_top+0..8, +8..16, +16..24 at column x
//!               bit7 = topmost row of the group, 1 = black
//!           LF
//! ```
//!
//! A dot is black when its luminance is strictly below the threshold.
//! Rows past the bottom of the image (padding in the final band) are white.
//!
//! ## Output Size
//!
//! The stream length depends only on `(W, H)` and whether the line-spacing
//! header is emitted:
//!
//! ```text
//! len = 3 (header) + ceil(H / 24) × (5 + 3·W + 1)
//! ```
//!
//! ## Example
//!
//! ```
//! use snapprint::capture::PixelBuffer;
//! use snapprint::render::encoder;
//!
//! let black = PixelBuffer::from_luma(8, 24, vec![0; 8 * 24]).unwrap();
//! let stream = encoder::encode(black, 128).unwrap();
//!
//! assert_eq!(&stream.as_bytes()[..3], &[0x1B, 0x33, 0x18]);
//! assert_eq!(&stream.as_bytes()[3..8], &[0x1B, 0x2A, 0x21, 0x08, 0x00]);
//! assert_eq!(stream.len(), 3 + 5 + 24 + 1);
//! ```

use tracing::debug;

use crate::capture::PixelBuffer;
use crate::error::{PrintError, Result};
use crate::protocol::commands;
use crate::protocol::graphics::{self, BAND_HEIGHT, BYTES_PER_COLUMN};

/// Midpoint luminance; darker samples print black.
pub const DEFAULT_THRESHOLD: u8 = 128;

/// Length of the line-spacing header.
const LINE_SPACING_LEN: usize = 3;

// ============================================================================
// COMMAND STREAM
// ============================================================================

/// # Command Stream
///
/// The finished ESC/POS byte sequence for one print request. Built once by
/// the encoder, then handed by value to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStream {
    bytes: Vec<u8>,
    bands: usize,
    columns: u16,
}

impl CommandStream {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of 24-row bands in the stream.
    #[inline]
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Dot columns per band (the image width).
    #[inline]
    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for CommandStream {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

// ============================================================================
// RASTER BANDS
// ============================================================================

/// # Raster Band
///
/// A 24-row horizontal slice of a [`PixelBuffer`]. Rows are read lazily
/// from the buffer; nothing is copied. Rows beyond the image bottom read
/// as white.
#[derive(Debug, Clone, Copy)]
pub struct RasterBand<'a> {
    pixels: &'a PixelBuffer,
    index: usize,
}

impl<'a> RasterBand<'a> {
    /// Band number, 0 at the top.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// First source row covered by this band.
    #[inline]
    pub fn top(&self) -> usize {
        self.index * BAND_HEIGHT
    }

    /// Source rows that actually exist in this band (1..=24).
    #[inline]
    pub fn rows(&self) -> usize {
        (self.pixels.height() - self.top()).min(BAND_HEIGHT)
    }

    /// Pack the 24 dots of column `x` into three bytes, MSB = top row.
    pub fn column(&self, x: usize, threshold: u8) -> [u8; BYTES_PER_COLUMN] {
        let mut packed = [0u8; BYTES_PER_COLUMN];
        let top = self.top();

        for dy in 0..self.rows() {
            if self.pixels.luminance(x, top + dy) < threshold {
                packed[dy / 8] |= 0x80 >> (dy % 8);
            }
        }

        packed
    }

    /// Packed columns `0..columns`, left to right.
    pub fn payload(&self, columns: u16, threshold: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(columns as usize * BYTES_PER_COLUMN);
        for x in 0..columns as usize {
            data.extend_from_slice(&self.column(x, threshold));
        }
        data
    }

    /// Append this band's full command (header, payload, LF) to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>, columns: u16, threshold: u8) {
        out.append(&mut graphics::band(columns, &self.payload(columns, threshold)));
    }
}

/// Iterate over the 24-row bands of a buffer, top to bottom.
pub fn bands(pixels: &PixelBuffer) -> impl Iterator<Item = RasterBand<'_>> {
    (0..pixels.height().div_ceil(BAND_HEIGHT)).map(move |index| RasterBand { pixels, index })
}

// ============================================================================
// ENCODER
// ============================================================================

/// # Raster Encoder
///
/// ## Example
///
/// ```
/// use snapprint::capture::PixelBuffer;
/// use snapprint::render::encoder::Encoder;
///
/// let gray = PixelBuffer::from_luma(4, 30, vec![100; 4 * 30]).unwrap();
///
/// // A low threshold leaves mid-gray white
/// let stream = Encoder::new().threshold(64).encode(gray).unwrap();
/// assert_eq!(stream.bands(), 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    threshold: u8,
    line_spacing: bool,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            line_spacing: true,
        }
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples with luminance below `threshold` print black.
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Emit (or skip) the leading `ESC 3 24` line-spacing command.
    pub fn line_spacing(mut self, enabled: bool) -> Self {
        self.line_spacing = enabled;
        self
    }

    /// Exact stream length for a `width × height` image.
    pub fn encoded_len(&self, width: u16, height: usize) -> usize {
        let header = if self.line_spacing { LINE_SPACING_LEN } else { 0 };
        header + height.div_ceil(BAND_HEIGHT) * graphics::band_len(width)
    }

    /// Encode the buffer, consuming it.
    ///
    /// ## Errors
    ///
    /// [`PrintError::InvalidImage`] when either dimension is zero or the
    /// width does not fit the 16-bit column count.
    pub fn encode(&self, pixels: PixelBuffer) -> Result<CommandStream> {
        if pixels.is_empty() {
            return Err(PrintError::InvalidImage(format!(
                "cannot encode a {}x{} image",
                pixels.width(),
                pixels.height()
            )));
        }
        let columns = u16::try_from(pixels.width()).map_err(|_| {
            PrintError::InvalidImage(format!(
                "width {} exceeds the {} column limit",
                pixels.width(),
                u16::MAX
            ))
        })?;

        let mut bytes = Vec::with_capacity(self.encoded_len(columns, pixels.height()));
        if self.line_spacing {
            bytes.extend_from_slice(&commands::line_spacing(BAND_HEIGHT as u8));
        }

        let mut band_count = 0;
        for band in bands(&pixels) {
            band.write_to(&mut bytes, columns, self.threshold);
            band_count += 1;
        }

        debug!(
            width = pixels.width(),
            height = pixels.height(),
            bands = band_count,
            bytes = bytes.len(),
            threshold = self.threshold,
            "encoded bit-image stream"
        );

        Ok(CommandStream {
            bytes,
            bands: band_count,
            columns,
        })
    }
}

/// Encode with the line-spacing header and the given threshold.
pub fn encode(pixels: PixelBuffer, threshold: u8) -> Result<CommandStream> {
    Encoder::new().threshold(threshold).encode(pixels)
}

// ============================================================================
// TESTS
// ============================================================================
