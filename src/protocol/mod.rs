//! # ESC/POS Protocol Subset
//!
//! Low-level command builders for the part of ESC/POS this crate speaks:
//! line spacing and 24-dot bit-image bands.
//!
//! ## Module Structure
//!
//! - [`commands`]: Control bytes and line spacing
//! - [`graphics`]: 24-dot bit-image band commands
//!
//! ## Wire Format
//!
//! | Command | Bytes | Meaning |
//! |---|---|---|
//! | Set line spacing | `1B 33 18` | 24-dot band pitch |
//! | Select bit-image mode | `1B 2A 21 nL nH` | begin a band, `nL nH` = columns |
//! | Raster payload | `3·W` bytes | 3 bytes per column, MSB = top dot |
//! | Line feed | `0A` | advance past the band |
//!
//! ## Usage Example
//!
//! ```
//! use snapprint::protocol::{commands, graphics};
//!
//! let mut data = Vec::new();
//! data.extend(commands::line_spacing(24));
//! data.extend(graphics::band(4, &[0u8; 12]));
//!
//! assert_eq!(data.len(), 3 + 5 + 12 + 1);
//! ```

pub mod commands;
pub mod graphics;
