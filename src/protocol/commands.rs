//! # ESC/POS Control Commands
//!
//! The handful of ESC/POS control sequences needed to print raster bands.
//!
//! ## Escape Sequence Structure
//!
//! Commands follow these patterns:
//! - Single byte: `LF`
//! - Multi-byte with parameters: `ESC 3 n`, `ESC * m nL nH data...`
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
///
/// Most ESC/POS commands begin with ESC (0x1B). This byte signals the start
/// of a control sequence rather than printable text.
pub const ESC: u8 = 0x1B;

/// LF (Line Feed) - Print and advance one line
///
/// Prints any data in the line buffer and advances paper by the current
/// line spacing amount. After a bit-image band this moves the head past it.
pub const LF: u8 = 0x0A;

// ============================================================================
// LINE SPACING
// ============================================================================

/// # Set Line Spacing (ESC 3 n)
///
/// Sets the distance a line feed advances the paper to `n` dots.
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | ESC 3 n  |
/// | Hex     | 1B 33 n  |
/// | Decimal | 27 51 n  |
///
/// With `n = 24` every LF advances exactly one 24-dot bit-image band, so
/// consecutive bands print without white gaps between them.
///
/// ## Example
///
/// ```
/// use snapprint::protocol::commands;
///
/// assert_eq!(commands::line_spacing(24), [0x1B, 0x33, 0x18]);
/// ```
#[inline]
pub const fn line_spacing(dots: u8) -> [u8; 3] {
    [ESC, b'3', dots]
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Encode a u16 value as little-endian bytes [low, high]
///
/// ## Example
///
/// ```
/// use snapprint::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x1234), [0x34, 0x12]);
/// assert_eq!(u16_le(576), [0x40, 0x02]); // 576 = 0x0240
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

// ============================================================================
// TESTS
// ============================================================================
