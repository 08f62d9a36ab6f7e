//! # Snapprint CLI
//!
//! Command-line front end for printing a captured view.
//!
//! ## Usage
//!
//! ```bash
//! # Print a screenshot on the first paired XP-P800
//! snapprint print --image screen.png
//!
//! # Pick another printer and a darker threshold
//! snapprint print --image screen.png --device-name TM-P20 --threshold 160
//!
//! # Preview what the printer would produce, without printing
//! snapprint print --image screen.png --png preview.png
//!
//! # Write the raw ESC/POS stream to a file
//! snapprint print --image screen.png --dump stream.bin
//!
//! # Show the adapter state and paired devices
//! snapprint devices --json
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use snapprint::{
    BluezAdapter, PrintError, PrintOrchestrator, PrintSettings, PrinterConfig, PrinterTransport,
    capture::{FrameSource, ImageFileSource},
    dispatch::UiThread,
    protocol::graphics::BAND_HEIGHT,
    render::{Encoder, preview},
    transport::{AdapterStatus, DeviceHandle, SerialAdapter, select_device},
};

/// Snapprint - print the current view on a Bluetooth thermal printer
#[derive(Parser, Debug)]
#[command(name = "snapprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Substring of the printer's Bluetooth name
    #[arg(long, global = true)]
    device_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture an image and print it
    Print {
        /// Image to use as the captured view
        #[arg(long, value_name = "FILE")]
        image: PathBuf,

        /// Luminance below this prints black
        #[arg(long)]
        threshold: Option<u8>,

        /// Downscale wider images to this many dots
        #[arg(long, conflicts_with = "no_scale")]
        max_width: Option<usize>,

        /// Print at the captured width, even if it exceeds the paper
        #[arg(long)]
        no_scale: bool,

        /// Render the encoded stream to PNG instead of printing
        #[arg(long, value_name = "FILE")]
        png: Option<PathBuf>,

        /// Write the encoded stream to a file instead of printing
        #[arg(long, value_name = "FILE")]
        dump: Option<PathBuf>,
    },

    /// Show adapter state and paired devices
    Devices {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct DeviceListing<'a> {
    status: AdapterStatus,
    pattern: &'a str,
    devices: Vec<DeviceEntry<'a>>,
}

#[derive(Serialize)]
struct DeviceEntry<'a> {
    #[serde(flatten)]
    device: &'a DeviceHandle,
    selected: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), PrintError> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => PrintSettings::load(path)?,
        None => PrintSettings::default(),
    };
    if let Some(name) = cli.device_name {
        settings.device_name = name;
    }

    match cli.command {
        Commands::Print {
            image,
            threshold,
            max_width,
            no_scale,
            png,
            dump,
        } => {
            if let Some(threshold) = threshold {
                settings.threshold = threshold;
            }
            if no_scale {
                settings.max_width = None;
            } else if max_width.is_some() {
                settings.max_width = max_width;
            }

            if png.is_some() || dump.is_some() {
                return encode_to_files(&settings, &image, png, dump);
            }

            print_image(&settings, image).await
        }
        Commands::Devices { json } => list_devices(&settings, json),
    }
}

/// Encode without touching Bluetooth.
fn encode_to_files(
    settings: &PrintSettings,
    image: &Path,
    png: Option<PathBuf>,
    dump: Option<PathBuf>,
) -> Result<(), PrintError> {
    let mut pixels = ImageFileSource::new(image).capture_pixels()?;
    if let Some(max) = settings.max_width {
        pixels = pixels.fit_width(max);
    }

    let stream = Encoder::new()
        .threshold(settings.threshold)
        .line_spacing(settings.line_spacing)
        .encode(pixels)?;
    let printer = PrinterConfig::default();
    println!(
        "Encoded {} dots wide, {} bands, {} bytes (~{:.0} mm of paper)",
        stream.columns(),
        stream.bands(),
        stream.len(),
        printer.dots_to_mm(stream.bands() * BAND_HEIGHT)
    );

    if let Some(path) = png {
        preview::save_png(stream.as_bytes(), &path)?;
        println!("Saved preview to {}", path.display());
    }
    if let Some(path) = dump {
        fs::write(&path, stream.as_bytes())?;
        println!("Saved stream to {}", path.display());
    }
    Ok(())
}

async fn print_image(settings: &PrintSettings, image: PathBuf) -> Result<(), PrintError> {
    let orchestrator = PrintOrchestrator::new(
        Arc::new(UiThread::spawn("snapprint-ui")?),
        Arc::new(ImageFileSource::new(image)),
        PrinterTransport::new(
            BluezAdapter::new(settings.rfcomm_device),
            settings.transport_settings(),
        ),
    );

    println!("Printing on '{}'...", settings.device_name);
    let report = orchestrator
        .print_current_view(&settings.print_options())
        .await?;

    let printer = PrinterConfig::default();
    println!(
        "Printed {}x{} ({} bands, {} bytes, ~{:.0} mm) on {} at {}",
        report.width,
        report.height,
        report.bands,
        report.bytes_sent,
        printer.dots_to_mm(report.bands * BAND_HEIGHT),
        report.device,
        report.finished_at.format("%H:%M:%S")
    );
    Ok(())
}

fn list_devices(settings: &PrintSettings, json: bool) -> Result<(), PrintError> {
    let adapter = BluezAdapter::new(settings.rfcomm_device);
    let status = adapter.status();
    let devices = match status {
        AdapterStatus::Ready => adapter.paired_devices()?,
        _ => Vec::new(),
    };
    let selected = select_device(&devices, &settings.device_name);

    if json {
        let listing = DeviceListing {
            status,
            pattern: &settings.device_name,
            devices: devices
                .iter()
                .map(|device| DeviceEntry {
                    device,
                    selected: selected == Some(device),
                })
                .collect(),
        };
        let text = serde_json::to_string_pretty(&listing)
            .map_err(|e| PrintError::Config(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("Adapter: {}", status);
    if devices.is_empty() {
        println!("No paired devices");
        return Ok(());
    }

    println!("Paired devices:");
    for device in &devices {
        let marker = if selected == Some(device) { "*" } else { " " };
        println!(" {} {}", marker, device);
    }
    if selected.is_none() {
        println!("\nNo device name contains '{}'", settings.device_name);
    }
    Ok(())
}
