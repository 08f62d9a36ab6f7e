//! # Printer Configuration
//!
//! Hardware presets and the user-tunable settings for a print run.
//!
//! ## Supported Printers
//!
//! | Model | Width (dots) | Resolution |
//! |-------|--------------|------------|
//! | XP-P800 | 576 | 203 DPI |
//!
//! ## Settings File
//!
//! [`PrintSettings`] loads from JSON. Every field is optional:
//!
//! ```json
//! {
//!   "device_name": "XP-P800",
//!   "threshold": 140,
//!   "send_timeout_secs": 120
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PrintError, Result};
use crate::orchestrator::PrintOptions;
use crate::render::DEFAULT_THRESHOLD;
use crate::transport::{DEFAULT_CHUNK_DELAY_MS, DEFAULT_CHUNK_SIZE, TransportSettings};

/// # Printer Configuration
///
/// Defines the hardware characteristics of a thermal printer.
///
/// ## Calculations
///
/// ```text
/// dots_per_mm = dpi / 25.4
/// mm = dots / dots_per_mm
///
/// For XP-P800:
///   dots_per_mm = 203 / 25.4 ≈ 8
///   576 dots / 8 = 72mm
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: &'static str,

    /// Substring the printer advertises in its Bluetooth name
    pub name_pattern: &'static str,

    /// Maximum print width in dots (pixels)
    pub width_dots: u16,

    /// Resolution in dots per inch
    pub dpi: u16,
}

impl PrinterConfig {
    /// # Xprinter XP-P800
    ///
    /// 80mm portable receipt printer with Bluetooth SPP.
    ///
    /// ```text
    /// ├── 4mm ──┼────── 72mm printable ──────┼── 4mm ──┤
    /// │ margin  │         576 dots           │ margin  │
    /// ```
    pub const XP_P800: Self = Self {
        name: "Xprinter XP-P800",
        name_pattern: "XP-P800",
        width_dots: 576,
        dpi: 203,
    };

    /// Calculate dots per millimeter
    ///
    /// ## Example
    ///
    /// ```
    /// use snapprint::printer::PrinterConfig;
    ///
    /// let config = PrinterConfig::XP_P800;
    /// assert!((config.dots_per_mm() - 8.0).abs() < 0.1);
    /// ```
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi as f32 / 25.4
    }

    /// Convert a length in dots to millimeters of paper
    #[inline]
    pub fn dots_to_mm(&self, dots: usize) -> f32 {
        dots as f32 / self.dots_per_mm()
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::XP_P800
    }
}

/// # Print Settings
///
/// Everything a user can tune about a print run. Missing JSON fields take
/// the defaults shown by [`PrintSettings::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintSettings {
    /// Substring to look for in paired device names
    pub device_name: String,
    /// Samples darker than this print black
    pub threshold: u8,
    /// Downscale wider captures to this many dots; `null` disables
    pub max_width: Option<usize>,
    /// Emit `ESC 3 24` so bands abut
    pub line_spacing: bool,
    pub connect_timeout_secs: Option<u64>,
    pub send_timeout_secs: Option<u64>,
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
    /// `N` in `/dev/rfcommN` for new bindings
    pub rfcomm_device: u8,
}

impl Default for PrintSettings {
    fn default() -> Self {
        let printer = PrinterConfig::default();
        Self {
            device_name: printer.name_pattern.to_string(),
            threshold: DEFAULT_THRESHOLD,
            max_width: Some(printer.width_dots as usize),
            line_spacing: true,
            connect_timeout_secs: Some(30),
            send_timeout_secs: Some(60),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            rfcomm_device: 0,
        }
    }
}

impl PrintSettings {
    /// Read settings from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| PrintError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| PrintError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(text).map_err(|e| PrintError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            return Err(PrintError::Config("device_name must not be empty".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(PrintError::Config("chunk_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Per-request options for the orchestrator.
    pub fn print_options(&self) -> PrintOptions {
        PrintOptions {
            name_pattern: self.device_name.clone(),
            threshold: self.threshold,
            max_width: self.max_width,
            line_spacing: self.line_spacing,
        }
    }

    /// Transport timing and chunking.
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
            send_timeout: self.send_timeout_secs.map(Duration::from_secs),
            chunk_size: self.chunk_size,
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
        }
    }
}
