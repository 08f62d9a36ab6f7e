//! # ESC/POS Bit-Image Commands
//!
//! This module implements the 24-dot column bit-image command used to print
//! raster bands on ESC/POS receipt printers.
//!
//! ## Coordinate System
//!
//! ```text
//! (0,0) ──────────────────────► X (columns, one per dot)
//!   │
//!   │   ████████  ← Each dot is ~0.125mm (203 DPI)
//!   │   ████████
//!   │   ████████
//!   ▼
//!   Y (vertical, paper feed direction)
//! ```
//!
//! ## Bit Packing
//!
//! Unlike raster mode, bit-image data is **column-major**. Each column of a
//! 24-dot band is three bytes, top to bottom:
//!
//! ```text
//!            column x
//!          ┌─────────┐
//! byte 0   │ rows 0-7│  bit7 = row 0 (top) ... bit0 = row 7
//! byte 1   │rows 8-15│
//! byte 2   │rows16-23│
//!          └─────────┘
//! ```
//!
//! - 1 = black (print), 0 = white (no print)

use super::commands::{ESC, LF, u16_le};

/// Dot rows covered by one 24-dot bit-image band.
pub const BAND_HEIGHT: usize = 24;

/// Payload bytes per column in 24-dot mode (24 dots / 8).
pub const BYTES_PER_COLUMN: usize = BAND_HEIGHT / 8;

/// Mode byte `m` for 24-dot double-density bit images.
pub const DOUBLE_DENSITY_24: u8 = 33;

/// Length of the `ESC * m nL nH` header.
pub const BIT_IMAGE_HEADER_LEN: usize = 5;

// ============================================================================
// BIT-IMAGE MODE (ESC *)
// ============================================================================

/// # Select Bit-Image Mode Header (ESC * m nL nH)
///
/// Begins a 24-dot double-density band that is `columns` dots wide.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC * 33 nL nH |
/// | Hex     | 1B 2A 21 nL nH |
/// | Decimal | 27 42 33 nL nH |
///
/// ## Parameters
///
/// - `nL, nH`: number of **dot columns**, little-endian. This is not a byte
///   count; the payload that follows is `3 × columns` bytes.
///
/// ## Example
///
/// ```
/// use snapprint::protocol::graphics;
///
/// assert_eq!(graphics::bit_image_header(8), [0x1B, 0x2A, 0x21, 0x08, 0x00]);
/// assert_eq!(graphics::bit_image_header(576), [0x1B, 0x2A, 0x21, 0x40, 0x02]);
/// ```
#[inline]
pub const fn bit_image_header(columns: u16) -> [u8; BIT_IMAGE_HEADER_LEN] {
    let [nl, nh] = u16_le(columns);
    [ESC, b'*', DOUBLE_DENSITY_24, nl, nh]
}

/// # Complete Bit-Image Band
///
/// Header, `3 × columns` payload bytes, and the trailing LF that advances
/// the paper past the band.
///
/// ## Example
///
/// ```
/// use snapprint::protocol::graphics;
///
/// let data = vec![0xFF; 2 * 3];
/// let cmd = graphics::band(2, &data);
///
/// assert_eq!(&cmd[0..5], &[0x1B, 0x2A, 0x21, 2, 0]);
/// assert_eq!(cmd.len(), 5 + 6 + 1);
/// assert_eq!(cmd.last(), Some(&0x0A));
/// ```
pub fn band(columns: u16, data: &[u8]) -> Vec<u8> {
    debug_assert!(
        data.len() == columns as usize * BYTES_PER_COLUMN,
        "Band data must be exactly columns * 3 bytes. Expected {}, got {}",
        columns as usize * BYTES_PER_COLUMN,
        data.len()
    );

    let mut cmd = Vec::with_capacity(band_len(columns));
    cmd.extend_from_slice(&bit_image_header(columns));
    cmd.extend_from_slice(data);
    cmd.push(LF);
    cmd
}

/// Encoded size of one band: header + payload + LF.
#[inline]
pub const fn band_len(columns: u16) -> usize {
    BIT_IMAGE_HEADER_LEN + columns as usize * BYTES_PER_COLUMN + 1
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_uses_column_count() {
        // 300 columns = 0x012C, not the 38-byte row width
        assert_eq!(bit_image_header(300), [0x1B, 0x2A, 0x21, 0x2C, 0x01]);
    }

    #[test]
    fn test_band_layout() {
        let data: Vec<u8> = (0..8 * 3).map(|i| i as u8).collect();
        let cmd = band(8, &data);

        assert_eq!(&cmd[0..5], &[0x1B, 0x2A, 0x21, 0x08, 0x00]);
        assert_eq!(&cmd[5..29], &data[..]);
        assert_eq!(cmd[29], LF);
        assert_eq!(cmd.len(), band_len(8));
    }

    #[test]
    fn test_band_len() {
        assert_eq!(band_len(1), 9);
        assert_eq!(band_len(576), 5 + 1728 + 1);
    }
}
