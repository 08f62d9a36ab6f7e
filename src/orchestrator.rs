//! # Print Orchestrator
//!
//! Runs one "print current view" request end to end:
//!
//! ```text
//! UiContext          capture_pixels()            (UI-affine)
//!     │  PixelBuffer
//!     ▼
//! blocking worker    fit_width → encode          (background)
//!                    discover → connect → send → close
//!     │
//!     ▼
//! exactly one Result<PrintReport, PrintError>
//! ```
//!
//! Hopping between the two contexts is the only suspension point. Nothing
//! is retried and no state survives between requests. Callers that may
//! fire several requests should serialize them; two concurrent connects
//! would race for the same device.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::task::{self, JoinHandle};
use tracing::{info, warn};

use crate::capture::FrameSource;
use crate::dispatch::UiContext;
use crate::error::{PrintError, Result};
use crate::render::{DEFAULT_THRESHOLD, Encoder};
use crate::transport::{DeviceHandle, PrinterTransport, SerialAdapter};

/// Per-request knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    /// Substring matched against paired device names
    pub name_pattern: String,
    pub threshold: u8,
    /// Downscale wider captures before encoding
    pub max_width: Option<usize>,
    /// Emit the `ESC 3 24` line-spacing header
    pub line_spacing: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            name_pattern: "XP-P800".to_string(),
            threshold: DEFAULT_THRESHOLD,
            max_width: None,
            line_spacing: true,
        }
    }
}

/// What a successful request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintReport {
    pub device: DeviceHandle,
    /// Encoded image width in dots (after any downscaling)
    pub width: usize,
    /// Encoded image height in dots
    pub height: usize,
    pub bands: usize,
    pub bytes_sent: usize,
    pub finished_at: DateTime<Local>,
}

/// # Print Orchestrator
///
/// ## Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), snapprint::PrintError> {
/// use std::sync::Arc;
/// use snapprint::capture::{PixelBuffer, StaticFrame};
/// use snapprint::dispatch::CurrentThread;
/// use snapprint::orchestrator::{PrintOptions, PrintOrchestrator};
/// use snapprint::transport::{DeviceHandle, MemoryAdapter, PrinterTransport, TransportSettings};
///
/// let adapter = MemoryAdapter::with_devices(vec![DeviceHandle::new("XP-P800", "00:11:22:33:44:55")]);
/// let orchestrator = PrintOrchestrator::new(
///     Arc::new(CurrentThread),
///     Arc::new(StaticFrame::new(PixelBuffer::from_luma(8, 24, vec![0; 192])?)),
///     PrinterTransport::new(adapter, TransportSettings::default()),
/// );
///
/// let report = orchestrator.print_current_view(&PrintOptions::default()).await?;
/// assert_eq!(report.bands, 1);
/// # Ok(())
/// # }
/// ```
pub struct PrintOrchestrator<A> {
    ui: Arc<dyn UiContext>,
    source: Arc<dyn FrameSource>,
    transport: Arc<PrinterTransport<A>>,
}

impl<A> Clone for PrintOrchestrator<A> {
    fn clone(&self) -> Self {
        Self {
            ui: Arc::clone(&self.ui),
            source: Arc::clone(&self.source),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<A: SerialAdapter + 'static> PrintOrchestrator<A> {
    pub fn new(
        ui: Arc<dyn UiContext>,
        source: Arc<dyn FrameSource>,
        transport: PrinterTransport<A>,
    ) -> Self {
        Self {
            ui,
            source,
            transport: Arc::new(transport),
        }
    }

    pub fn transport(&self) -> &PrinterTransport<A> {
        &self.transport
    }

    /// Capture, encode and print the current view.
    ///
    /// ## Errors
    ///
    /// The first failure wins: [`PrintError::CaptureFailed`] for a failed or
    /// empty capture (the transport is never touched), then encoder errors,
    /// then discovery, connect and transmit errors.
    pub async fn print_current_view(&self, options: &PrintOptions) -> Result<PrintReport> {
        let pixels = self.ui.capture(Arc::clone(&self.source)).await?;
        if pixels.is_empty() {
            return Err(PrintError::CaptureFailed(format!(
                "frame source returned an empty {}x{} buffer",
                pixels.width(),
                pixels.height()
            )));
        }
        info!(width = pixels.width(), height = pixels.height(), "captured view");

        let transport = Arc::clone(&self.transport);
        let options = options.clone();

        task::spawn_blocking(move || {
            let pixels = match options.max_width {
                Some(max) => pixels.fit_width(max),
                None => pixels,
            };
            let (width, height) = (pixels.width(), pixels.height());

            let stream = Encoder::new()
                .threshold(options.threshold)
                .line_spacing(options.line_spacing)
                .encode(pixels)?;
            let bands = stream.bands();
            info!(width, height, bands, bytes = stream.len(), "encoded view");

            let delivery = transport.deliver(&options.name_pattern, stream)?;

            Ok(PrintReport {
                device: delivery.device,
                width,
                height,
                bands,
                bytes_sent: delivery.bytes_sent,
                finished_at: Local::now(),
            })
        })
        .await
        .map_err(|e| PrintError::Worker(e.to_string()))?
    }

    /// Run [`print_current_view`](Self::print_current_view) as a task and
    /// deliver its outcome to `on_done` exactly once.
    pub fn spawn_print<F>(&self, options: PrintOptions, on_done: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<PrintReport>) + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.print_current_view(&options).await;
            if let Err(e) = &result {
                warn!(error = %e, "print failed");
            }
            on_done(result);
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
