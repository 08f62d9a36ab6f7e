//! # Printer Module
//!
//! Printer-specific configuration.
//!
//! ## Modules
//!
//! - [`config`]: Printer presets and print settings

pub mod config;

pub use config::{PrintSettings, PrinterConfig};
