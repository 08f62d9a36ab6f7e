//! # Print Flow Tests
//!
//! End-to-end checks of capture → encode → deliver against the in-memory
//! adapter, plus byte-exact checks of the wire format.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use snapprint::capture::{FnSource, PixelBuffer, StaticFrame};
use snapprint::dispatch::{CurrentThread, UiThread};
use snapprint::render::{encode, preview};
use snapprint::transport::memory::{MemoryAdapter, WriteBehavior};
use snapprint::transport::{DeviceHandle, PrinterTransport, TransportSettings};
use snapprint::{PrintError, PrintOptions, PrintOrchestrator};

fn paired() -> MemoryAdapter {
    MemoryAdapter::with_devices(vec![
        DeviceHandle::new("Headphones", "AA:AA:AA:AA:AA:AA"),
        DeviceHandle::new("Printer-XP-P800-A", "00:11:22:33:44:55"),
    ])
}

fn transport(adapter: MemoryAdapter) -> PrinterTransport<MemoryAdapter> {
    PrinterTransport::new(
        adapter,
        TransportSettings {
            chunk_size: 64,
            chunk_delay: Duration::ZERO,
            ..Default::default()
        },
    )
}

fn expected_single_band(column: u8) -> Vec<u8> {
    let mut bytes = vec![0x1B, 0x33, 0x18, 0x1B, 0x2A, 0x21, 0x08, 0x00];
    bytes.extend(std::iter::repeat_n(column, 24));
    bytes.push(0x0A);
    bytes
}

#[test]
fn black_8x24_is_byte_exact() {
    let stream = encode(PixelBuffer::from_luma(8, 24, vec![0; 192]).unwrap(), 128).unwrap();
    assert_eq!(stream.as_bytes(), expected_single_band(0xFF).as_slice());
}

#[test]
fn white_8x24_is_byte_exact() {
    let stream = encode(PixelBuffer::from_luma(8, 24, vec![255; 192]).unwrap(), 128).unwrap();
    assert_eq!(stream.as_bytes(), expected_single_band(0x00).as_slice());
}

#[test]
fn transparent_argb_prints_white() {
    let mut pixels = vec![0x0000_0000u32; 8 * 24];
    pixels[0] = 0xFF00_0000;
    let buffer = PixelBuffer::from_argb32(8, 24, &pixels).unwrap();
    let stream = encode(buffer, 128).unwrap();

    // Top-left dot is the MSB of the first column byte
    let data = &stream.as_bytes()[8..8 + 24];
    assert_eq!(data[0], 0x80);
    assert!(data[1..].iter().all(|&b| b == 0));
}

#[test]
fn preview_matches_thresholded_input() {
    let (width, height) = (40, 50);
    let luma: Vec<u8> = (0..width * height)
        .map(|i| if (i % width + i / width) % 3 == 0 { 20 } else { 230 })
        .collect();
    let stream = encode(PixelBuffer::from_luma(width, height, luma.clone()).unwrap(), 128).unwrap();

    let image = preview::render_stream(stream.as_bytes()).unwrap();
    assert_eq!(image.width() as usize, width);
    assert!(image.height() as usize >= 72);

    for y in 0..height {
        for x in 0..width {
            let expected = if luma[y * width + x] < 128 { 0 } else { 255 };
            assert_eq!(image.get_pixel(x as u32, y as u32).0[0], expected, "({x}, {y})");
        }
    }
    // Padding rows of the last band stay white
    for y in height..72 {
        assert_eq!(image.get_pixel(0, y as u32).0[0], 255);
    }
}

#[tokio::test]
async fn prints_on_matching_printer() {
    let adapter = paired();
    let frame = StaticFrame::new(PixelBuffer::from_luma(8, 24, vec![0; 192]).unwrap());
    let orchestrator = PrintOrchestrator::new(
        Arc::new(CurrentThread),
        Arc::new(frame),
        transport(adapter.clone()),
    );

    let report = orchestrator
        .print_current_view(&PrintOptions::default())
        .await
        .unwrap();

    assert_eq!(report.device, DeviceHandle::new("Printer-XP-P800-A", "00:11:22:33:44:55"));
    assert_eq!(adapter.stats().received, expected_single_band(0xFF));
    assert_eq!(adapter.stats().closes, 1);
}

#[tokio::test]
async fn failed_send_still_closes_once() {
    let adapter = paired();
    adapter.set_write(WriteBehavior::DisconnectAfter(100));
    let source = FnSource::new(|| PixelBuffer::from_luma(200, 100, vec![0; 20_000]));
    let orchestrator = PrintOrchestrator::new(
        Arc::new(UiThread::spawn("ui").unwrap()),
        Arc::new(source),
        transport(adapter.clone()),
    );

    let err = orchestrator
        .print_current_view(&PrintOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PrintError::TransmitFailed { bytes_sent: 100, .. }));
    let stats = adapter.stats();
    assert_eq!((stats.opens, stats.closes), (1, 1));
    assert_eq!(stats.received.len(), 100);
}

#[tokio::test]
async fn no_matching_printer_never_connects() {
    let adapter = MemoryAdapter::with_devices(vec![DeviceHandle::new("Headphones", "AA")]);
    let frame = StaticFrame::new(PixelBuffer::from_luma(8, 24, vec![0; 192]).unwrap());
    let orchestrator = PrintOrchestrator::new(
        Arc::new(CurrentThread),
        Arc::new(frame),
        transport(adapter.clone()),
    );

    let err = orchestrator
        .print_current_view(&PrintOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "No paired device matching 'XP-P800'");
    assert_eq!(adapter.stats().opens, 0);
}
