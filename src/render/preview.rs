//! # Stream Preview
//!
//! Renders an ESC/POS bit-image command stream back into a grayscale image,
//! showing what the printer will put on paper.
//!
//! ## Understood Commands
//!
//! | Bytes | Effect |
//! |-------|--------|
//! | `1B 33 n` | line feed advances `n` dots |
//! | `1B 2A 21 nL nH d...` | draw a 24-dot band at the current row |
//! | `0A` | advance by the line spacing |
//!
//! Anything else is rejected, since this crate never produces it.
//!
//! ## Example
//!
//! ```
//! use snapprint::capture::PixelBuffer;
//! use snapprint::render::{encoder, preview};
//!
//! let buffer = PixelBuffer::from_luma(4, 10, vec![0; 40]).unwrap();
//! let stream = encoder::encode(buffer, 128).unwrap();
//! let image = preview::render_stream(stream.as_bytes()).unwrap();
//!
//! // Paper advances a whole band even for a 10-row image
//! assert_eq!(image.dimensions(), (4, 24));
//! ```

use std::path::Path;

use image::{GrayImage, Luma};

use crate::error::{PrintError, Result};
use crate::protocol::commands::{ESC, LF};
use crate::protocol::graphics::{BAND_HEIGHT, BYTES_PER_COLUMN, DOUBLE_DENSITY_24};

/// Line spacing a printer uses before any `ESC 3` (1/6 inch at 203 DPI).
pub const DEFAULT_LINE_SPACING: usize = 30;

const BLACK: u8 = 0;
const WHITE: u8 = 255;

/// A band placed on the virtual paper.
struct PlacedBand<'a> {
    y: usize,
    columns: usize,
    data: &'a [u8],
}

/// Interpret `stream` and draw it onto white paper.
///
/// The image is as wide as the widest band and as tall as the total paper
/// advance (at least tall enough to show every band).
pub fn render_stream(stream: &[u8]) -> Result<GrayImage> {
    let mut spacing = DEFAULT_LINE_SPACING;
    let mut y = 0usize;
    let mut placed = Vec::new();
    let mut pos = 0;

    while pos < stream.len() {
        match stream[pos] {
            LF => {
                y += spacing;
                pos += 1;
            }
            ESC => {
                let op = *stream.get(pos + 1).ok_or_else(|| truncated(pos))?;
                match op {
                    b'3' => {
                        spacing = *stream.get(pos + 2).ok_or_else(|| truncated(pos))? as usize;
                        pos += 3;
                    }
                    b'*' => {
                        let header = stream.get(pos + 2..pos + 5).ok_or_else(|| truncated(pos))?;
                        if header[0] != DOUBLE_DENSITY_24 {
                            return Err(PrintError::InvalidImage(format!(
                                "unsupported bit-image mode {} at byte {}",
                                header[0], pos
                            )));
                        }
                        let columns = u16::from_le_bytes([header[1], header[2]]) as usize;
                        let start = pos + 5;
                        let end = start + columns * BYTES_PER_COLUMN;
                        let data = stream.get(start..end).ok_or_else(|| truncated(pos))?;
                        placed.push(PlacedBand { y, columns, data });
                        pos = end;
                    }
                    other => {
                        return Err(PrintError::InvalidImage(format!(
                            "unexpected command ESC 0x{:02X} at byte {}",
                            other, pos
                        )));
                    }
                }
            }
            other => {
                return Err(PrintError::InvalidImage(format!(
                    "unexpected byte 0x{:02X} at byte {}",
                    other, pos
                )));
            }
        }
    }

    let width = placed.iter().map(|b| b.columns).max().unwrap_or(0);
    let height = placed
        .iter()
        .map(|b| b.y + BAND_HEIGHT)
        .max()
        .unwrap_or(0)
        .max(y);

    let mut image = GrayImage::from_pixel(width as u32, height as u32, Luma([WHITE]));
    for band in &placed {
        draw_band(&mut image, band);
    }
    Ok(image)
}

fn draw_band(image: &mut GrayImage, band: &PlacedBand<'_>) {
    for (x, column) in band.data.chunks_exact(BYTES_PER_COLUMN).enumerate() {
        for dy in 0..BAND_HEIGHT {
            if column[dy / 8] & (0x80 >> (dy % 8)) != 0 {
                image.put_pixel(x as u32, (band.y + dy) as u32, Luma([BLACK]));
            }
        }
    }
}

fn truncated(pos: usize) -> PrintError {
    PrintError::InvalidImage(format!("command at byte {} is truncated", pos))
}

/// Render `stream` and save it as a PNG.
pub fn save_png<P: AsRef<Path>>(stream: &[u8], path: P) -> Result<()> {
    let path = path.as_ref();
    let image = render_stream(stream)?;
    image
        .save(path)
        .map_err(|e| PrintError::InvalidImage(format!("Failed to save {}: {}", path.display(), e)))
}

// ============================================================================
// TESTS
// ============================================================================
