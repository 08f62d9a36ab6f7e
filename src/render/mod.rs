//! # Rendering Module
//!
//! Turns captured pixels into printer commands, and printer commands back
//! into pixels for previewing.
//!
//! ## Modules
//!
//! - [`encoder`]: Threshold + bit-packing into ESC/POS 24-dot bands
//! - [`preview`]: Draw a command stream as a grayscale image
//!
//! ## Usage Example
//!
//! ```
//! use snapprint::capture::PixelBuffer;
//! use snapprint::render::encoder::Encoder;
//!
//! let pixels = PixelBuffer::from_luma(576, 100, vec![255; 576 * 100]).unwrap();
//! let stream = Encoder::new().threshold(140).encode(pixels).unwrap();
//!
//! // 100 rows round up to 5 bands
//! assert_eq!(stream.bands(), 5);
//! ```

pub mod encoder;
pub mod preview;

pub use encoder::{CommandStream, DEFAULT_THRESHOLD, Encoder, encode};
