//! # Snapprint - Print the Current View on a Bluetooth Thermal Printer
//!
//! Snapprint captures whatever is on screen, turns it into ESC/POS 24-dot
//! bit-image bands and streams the result to a paired receipt printer over
//! the Bluetooth Serial Port Profile.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use snapprint::{
//!     BluezAdapter, PrintOrchestrator, PrintSettings,
//!     capture::ImageFileSource,
//!     dispatch::UiThread,
//!     transport::PrinterTransport,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), snapprint::PrintError> {
//! let settings = PrintSettings::default();
//! let orchestrator = PrintOrchestrator::new(
//!     Arc::new(UiThread::spawn("ui")?),
//!     Arc::new(ImageFileSource::new("screen.png")),
//!     PrinterTransport::new(BluezAdapter::default(), settings.transport_settings()),
//! );
//!
//! let report = orchestrator.print_current_view(&settings.print_options()).await?;
//! println!("sent {} bytes to {}", report.bytes_sent, report.device);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`capture`] | Frame sources and the luminance buffer |
//! | [`render`] | Raster encoder and PNG preview of encoded streams |
//! | [`protocol`] | ESC/POS command builders |
//! | [`transport`] | Discovery, connection and streaming over serial links |
//! | [`dispatch`] | UI-affine execution contexts |
//! | [`orchestrator`] | The end-to-end print request |
//! | [`printer`] | Printer presets and settings |
//! | [`error`] | Error types |

pub mod capture;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod transport;

// Re-exports for convenience
pub use capture::{FrameSource, PixelBuffer};
pub use error::PrintError;
pub use orchestrator::{PrintOptions, PrintOrchestrator, PrintReport};
pub use printer::{PrintSettings, PrinterConfig};
pub use transport::{BluezAdapter, PrinterTransport};
