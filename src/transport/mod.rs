//! # Printer Transport Layer
//!
//! Finds a paired serial-capable printer, opens a connection to it, streams
//! a [`CommandStream`] and releases the connection.
//!
//! ## Layers
//!
//! ```text
//! PrinterTransport<A>          discover → connect → send → close
//!     │
//!     └── A: SerialAdapter     platform capability (adapter state,
//!             │                paired devices, opening links)
//!             └── SerialLink   one open byte-stream channel
//! ```
//!
//! ## Available Adapters
//!
//! - [`bluetooth`]: BlueZ + RFCOMM TTYs (Linux)
//! - [`memory`]: In-memory fake for tests and dry runs
//!
//! ## Connection Discipline
//!
//! A [`Connection`] is single-use. It is closed exactly once: explicitly via
//! [`PrinterTransport::close`], immediately when a send fails or times out,
//! or on drop if neither happened.

pub mod bluetooth;
pub mod memory;

use std::fmt;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PrintError, Result, Stage};
use crate::render::CommandStream;

pub use bluetooth::BluezAdapter;
pub use memory::MemoryAdapter;

/// Bluetooth Serial Port Profile service class.
pub const SERIAL_PORT_PROFILE: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5F9B_34FB);

/// Default chunk size for writes (bytes)
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default delay between chunks (milliseconds)
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 2;

// ============================================================================
// CAPABILITY INTERFACE
// ============================================================================

/// Power state of the local adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterStatus {
    /// No controller present
    Unavailable,
    /// Controller present but powered off or blocked
    Disabled,
    Ready,
}

impl fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterStatus::Unavailable => f.write_str("unavailable"),
            AdapterStatus::Disabled => f.write_str("disabled"),
            AdapterStatus::Ready => f.write_str("ready"),
        }
    }
}

/// A paired peer as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Human-readable advertised name
    pub name: String,
    /// Opaque platform address (a MAC on Bluetooth)
    pub address: String,
}

impl DeviceHandle {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// An open byte-stream channel to one device.
pub trait SerialLink: Send {
    /// Write some of `buf`, waiting at most `timeout` for the link to accept
    /// data. Returns the number of bytes accepted. A stalled link reports
    /// [`io::ErrorKind::TimedOut`].
    fn write(&mut self, buf: &[u8], timeout: Option<Duration>) -> io::Result<usize>;

    /// Push buffered bytes to the device.
    fn flush(&mut self) -> io::Result<()>;

    /// Release the channel. Called exactly once.
    fn close(&mut self) -> io::Result<()>;
}

/// Platform access to the local serial-capable radio.
pub trait SerialAdapter: Send + Sync {
    /// Current adapter state. Reading it has no side effects.
    fn status(&self) -> AdapterStatus;

    /// Devices previously paired with this host, in platform order.
    fn paired_devices(&self) -> io::Result<Vec<DeviceHandle>>;

    /// Open a serial-profile channel to `device`.
    ///
    /// Must give up with [`io::ErrorKind::TimedOut`] once `timeout` passes.
    fn open(&self, device: &DeviceHandle, timeout: Option<Duration>) -> io::Result<Box<dyn SerialLink>>;
}

impl<A: SerialAdapter + ?Sized> SerialAdapter for std::sync::Arc<A> {
    fn status(&self) -> AdapterStatus {
        (**self).status()
    }

    fn paired_devices(&self) -> io::Result<Vec<DeviceHandle>> {
        (**self).paired_devices()
    }

    fn open(&self, device: &DeviceHandle, timeout: Option<Duration>) -> io::Result<Box<dyn SerialLink>> {
        (**self).open(device, timeout)
    }
}

// ============================================================================
// CONNECTION
// ============================================================================

/// # Connection
///
/// A single-use channel bound to one device. Dropping an unclosed
/// connection closes it.
pub struct Connection {
    device: DeviceHandle,
    link: Option<Box<dyn SerialLink>>,
}

impl Connection {
    fn new(device: DeviceHandle, link: Box<dyn SerialLink>) -> Self {
        Self {
            device,
            link: Some(link),
        }
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// False once the link has been released.
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Release the link if still held. Safe to call repeatedly.
    fn release(&mut self) {
        if let Some(mut link) = self.link.take() {
            match link.close() {
                Ok(()) => debug!(device = %self.device, "connection closed"),
                Err(e) => warn!(device = %self.device, error = %e, "closing connection failed"),
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("device", &self.device)
            .field("open", &self.is_open())
            .finish()
    }
}

// ============================================================================
// PRINTER TRANSPORT
// ============================================================================

/// Timing and chunking knobs for [`PrinterTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    /// Upper bound on opening the channel
    pub connect_timeout: Option<Duration>,
    /// Upper bound on streaming the whole command stream
    pub send_timeout: Option<Duration>,
    /// Larger chunks are faster but may overflow the Bluetooth buffer.
    pub chunk_size: usize,
    /// Pause between chunks; gives the printer time to drain.
    pub chunk_delay: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            send_timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::from_millis(DEFAULT_CHUNK_DELAY_MS),
        }
    }
}

/// Outcome of a complete discover → connect → send → close run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub device: DeviceHandle,
    pub bytes_sent: usize,
}

/// # Printer Transport
///
/// ## Example
///
/// ```
/// use snapprint::transport::{DeviceHandle, MemoryAdapter, PrinterTransport, TransportSettings};
/// use snapprint::capture::PixelBuffer;
/// use snapprint::render::encode;
///
/// let adapter = MemoryAdapter::with_devices(vec![
///     DeviceHandle::new("Printer-XP-P800-A", "00:11:22:33:44:55"),
/// ]);
/// let transport = PrinterTransport::new(adapter.clone(), TransportSettings::default());
///
/// let stream = encode(PixelBuffer::from_luma(8, 24, vec![0; 192]).unwrap(), 128)?;
/// let delivery = transport.deliver("XP-P800", stream)?;
///
/// assert_eq!(delivery.device.name, "Printer-XP-P800-A");
/// assert_eq!(adapter.stats().closes, 1);
/// # Ok::<(), snapprint::PrintError>(())
/// ```
pub struct PrinterTransport<A> {
    adapter: A,
    settings: TransportSettings,
}

impl<A: SerialAdapter> PrinterTransport<A> {
    pub fn new(adapter: A, settings: TransportSettings) -> Self {
        Self { adapter, settings }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Find the first paired device whose name contains `name_pattern`.
    ///
    /// ## Errors
    ///
    /// Adapter state is checked before enumerating:
    /// [`PrintError::AdapterUnavailable`], [`PrintError::AdapterDisabled`],
    /// then [`PrintError::DiscoveryFailed`] if the paired set cannot be read
    /// and [`PrintError::DeviceNotFound`] when nothing matches.
    pub fn discover(&self, name_pattern: &str) -> Result<DeviceHandle> {
        match self.adapter.status() {
            AdapterStatus::Unavailable => return Err(PrintError::AdapterUnavailable),
            AdapterStatus::Disabled => return Err(PrintError::AdapterDisabled),
            AdapterStatus::Ready => {}
        }

        let devices = self
            .adapter
            .paired_devices()
            .map_err(|e| PrintError::DiscoveryFailed {
                pattern: name_pattern.to_string(),
                reason: e.to_string(),
            })?;
        debug!(count = devices.len(), pattern = name_pattern, "enumerated paired devices");

        let device = select_device(&devices, name_pattern)
            .cloned()
            .ok_or_else(|| PrintError::DeviceNotFound {
                pattern: name_pattern.to_string(),
            })?;

        info!(device = %device, "selected printer");
        Ok(device)
    }

    /// Open a serial-profile channel to `device`. No retries.
    pub fn connect(&self, device: &DeviceHandle) -> Result<Connection> {
        let timeout = self.settings.connect_timeout;
        info!(device = %device, service = %SERIAL_PORT_PROFILE, "connecting");

        let started = Instant::now();
        let link = self.adapter.open(device, timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                PrintError::Timeout {
                    stage: Stage::Connect,
                    // Unbounded connects can still time out inside the platform
                    after: timeout.unwrap_or_else(|| started.elapsed()),
                    bytes_sent: 0,
                }
            } else {
                PrintError::ConnectFailed {
                    device: device.name.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        info!(device = %device, "connected");
        Ok(Connection::new(device.clone(), link))
    }

    /// Write the whole stream and flush.
    ///
    /// Large streams are written in chunks with a short pause between them.
    /// On any failure the connection is closed before returning, and the
    /// error carries the number of bytes the link accepted.
    pub fn send(&self, conn: &mut Connection, stream: CommandStream) -> Result<usize> {
        let result = self.write_stream(conn, stream.as_bytes());
        if result.is_err() {
            conn.release();
        }
        result
    }

    fn write_stream(&self, conn: &mut Connection, data: &[u8]) -> Result<usize> {
        let device = conn.device.name.clone();
        let total = data.len();
        let send_timeout = self.settings.send_timeout;
        let deadline = send_timeout.map(|t| Instant::now() + t);
        let timed_out = |bytes_sent| PrintError::Timeout {
            stage: Stage::Send,
            after: send_timeout.unwrap_or_default(),
            bytes_sent,
        };
        let failed = |bytes_sent, reason: String| PrintError::TransmitFailed {
            device: device.clone(),
            bytes_sent,
            reason,
        };

        let link = conn
            .link
            .as_mut()
            .ok_or_else(|| failed(0, "connection already closed".to_string()))?;

        let mut sent = 0;
        for chunk in data.chunks(self.settings.chunk_size.max(1)) {
            let mut offset = 0;
            while offset < chunk.len() {
                let remaining = match deadline {
                    Some(deadline) => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            return Err(timed_out(sent));
                        }
                        Some(left)
                    }
                    None => None,
                };

                match link.write(&chunk[offset..], remaining) {
                    Ok(0) => return Err(failed(sent, "link accepted no data".to_string())),
                    Ok(n) => {
                        offset += n;
                        sent += n;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(timed_out(sent)),
                    Err(e) => return Err(failed(sent, format!("Write failed: {}", e))),
                }
            }
            debug!(sent, total, "transmit progress");

            if sent < total && !self.settings.chunk_delay.is_zero() {
                thread::sleep(self.settings.chunk_delay);
            }
        }

        link.flush()
            .map_err(|e| failed(sent, format!("Flush failed: {}", e)))?;

        info!(device = %conn.device, bytes = sent, "stream sent");
        Ok(sent)
    }

    /// Release the connection. Failures are logged, never returned.
    pub fn close(&self, mut conn: Connection) {
        conn.release();
    }

    /// Run the full discover → connect → send → close sequence.
    ///
    /// The connection is closed whatever `send` returns.
    pub fn deliver(&self, name_pattern: &str, stream: CommandStream) -> Result<Delivery> {
        let device = self.discover(name_pattern)?;
        let mut conn = self.connect(&device)?;
        let result = self.send(&mut conn, stream);
        self.close(conn);

        Ok(Delivery {
            device,
            bytes_sent: result?,
        })
    }
}

/// First device whose name contains `pattern` (case-sensitive).
pub fn select_device<'a>(devices: &'a [DeviceHandle], pattern: &str) -> Option<&'a DeviceHandle> {
    devices.iter().find(|d| d.name.contains(pattern))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::memory::{ConnectBehavior, WriteBehavior};
    use super::*;
    use crate::capture::PixelBuffer;
    use crate::render::encode;

    fn stream(width: usize, height: usize) -> CommandStream {
        encode(
            PixelBuffer::from_luma(width, height, vec![0; width * height]).unwrap(),
            128,
        )
        .unwrap()
    }

    fn printers() -> Vec<DeviceHandle> {
        vec![
            DeviceHandle::new("Printer-XP-P800-A", "00:11:22:33:44:55"),
            DeviceHandle::new("OtherDevice", "66:77:88:99:AA:BB"),
        ]
    }

    fn fast_settings() -> TransportSettings {
        TransportSettings {
            chunk_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_serial_port_profile_uuid() {
        assert_eq!(
            SERIAL_PORT_PROFILE.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_select_device_substring() {
        let devices = printers();
        let found = select_device(&devices, "XP-P800").unwrap();
        assert_eq!(found.name, "Printer-XP-P800-A");
    }

    #[test]
    fn test_select_device_case_sensitive() {
        assert!(select_device(&printers(), "xp-p800").is_none());
    }

    #[test]
    fn test_select_device_first_match() {
        let devices = vec![
            DeviceHandle::new("XP-P800 kitchen", "01"),
            DeviceHandle::new("XP-P800 bar", "02"),
        ];
        assert_eq!(select_device(&devices, "XP-P800").unwrap().address, "01");
    }

    #[test]
    fn test_discover_empty_set() {
        let transport = PrinterTransport::new(MemoryAdapter::with_devices(vec![]), fast_settings());
        let err = transport.discover("XP-P800").unwrap_err();
        assert!(matches!(err, PrintError::DeviceNotFound { ref pattern } if pattern == "XP-P800"));
    }

    #[test]
    fn test_discover_disabled_before_enumerating() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_status(AdapterStatus::Disabled);
        let transport = PrinterTransport::new(adapter.clone(), fast_settings());

        assert!(matches!(
            transport.discover("XP-P800").unwrap_err(),
            PrintError::AdapterDisabled
        ));
        assert_eq!(adapter.stats().enumerations, 0);
    }

    #[test]
    fn test_discover_unavailable() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_status(AdapterStatus::Unavailable);
        let transport = PrinterTransport::new(adapter, fast_settings());

        assert!(matches!(
            transport.discover("XP-P800").unwrap_err(),
            PrintError::AdapterUnavailable
        ));
    }

    #[test]
    fn test_discover_enumeration_failure_names_pattern() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_enumerate_error(Some("bluetoothd not running"));
        let transport = PrinterTransport::new(adapter.clone(), fast_settings());

        let err = transport.discover("XP-P800").unwrap_err();
        assert!(err.is_discovery_failure());
        match err {
            PrintError::DiscoveryFailed { pattern, reason } => {
                assert_eq!(pattern, "XP-P800");
                assert!(reason.contains("bluetoothd not running"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(adapter.stats().opens, 0);
    }

    #[test]
    fn test_connect_refused() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_connect(ConnectBehavior::Refuse("device busy".into()));
        let transport = PrinterTransport::new(adapter.clone(), fast_settings());

        let device = transport.discover("XP-P800").unwrap();
        let err = transport.connect(&device).unwrap_err();
        match err {
            PrintError::ConnectFailed { device, reason } => {
                assert_eq!(device, "Printer-XP-P800-A");
                assert!(reason.contains("device busy"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(adapter.stats().opens, 0);
    }

    #[test]
    fn test_unreachable_peer_is_connect_failure_not_timeout() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_connect(ConnectBehavior::Unreachable("Host is down".into()));
        let transport = PrinterTransport::new(
            adapter,
            TransportSettings {
                connect_timeout: Some(Duration::from_secs(30)),
                ..fast_settings()
            },
        );

        let device = transport.discover("XP-P800").unwrap();
        match transport.connect(&device).unwrap_err() {
            PrintError::ConnectFailed { reason, .. } => assert!(reason.contains("Host is down")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_connect_timeout() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_connect(ConnectBehavior::TimeOut);
        let transport = PrinterTransport::new(
            adapter,
            TransportSettings {
                connect_timeout: Some(Duration::from_secs(3)),
                ..fast_settings()
            },
        );

        let device = transport.discover("XP-P800").unwrap();
        match transport.connect(&device).unwrap_err() {
            PrintError::Timeout { stage, after, .. } => {
                assert_eq!(stage, Stage::Connect);
                assert_eq!(after, Duration::from_secs(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_send_in_chunks() {
        let adapter = MemoryAdapter::with_devices(printers());
        let transport = PrinterTransport::new(
            adapter.clone(),
            TransportSettings {
                chunk_size: 100,
                ..fast_settings()
            },
        );
        let data = stream(64, 48);
        let expected = data.as_bytes().to_vec();

        let delivery = transport.deliver("XP-P800", data).unwrap();

        let stats = adapter.stats();
        assert_eq!(delivery.bytes_sent, expected.len());
        assert_eq!(stats.received, expected);
        assert_eq!(stats.writes, expected.len().div_ceil(100));
        assert_eq!(stats.flushes, 1);
    }

    #[test]
    fn test_send_continues_short_writes() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_write(WriteBehavior::ShortWrites(7));
        let transport = PrinterTransport::new(adapter.clone(), fast_settings());
        let data = stream(8, 24);
        let expected = data.as_bytes().to_vec();

        transport.deliver("XP-P800", data).unwrap();
        assert_eq!(adapter.stats().received, expected);
    }

    #[test]
    fn test_transmit_failure_reports_bytes_and_closes() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_write(WriteBehavior::DisconnectAfter(10));
        let transport = PrinterTransport::new(adapter.clone(), fast_settings());

        let err = transport.deliver("XP-P800", stream(8, 24)).unwrap_err();
        match err {
            PrintError::TransmitFailed {
                device, bytes_sent, ..
            } => {
                assert_eq!(device, "Printer-XP-P800-A");
                assert_eq!(bytes_sent, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let stats = adapter.stats();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.closes, 1);
    }

    #[test]
    fn test_send_timeout_force_closes() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_write(WriteBehavior::StallAfter(5));
        let transport = PrinterTransport::new(
            adapter.clone(),
            TransportSettings {
                send_timeout: Some(Duration::from_millis(50)),
                ..fast_settings()
            },
        );

        let device = transport.discover("XP-P800").unwrap();
        let mut conn = transport.connect(&device).unwrap();
        let err = transport.send(&mut conn, stream(8, 24)).unwrap_err();

        assert!(matches!(
            err,
            PrintError::Timeout {
                stage: Stage::Send,
                bytes_sent: 5,
                ..
            }
        ));
        // Already released by the failed send
        assert!(!conn.is_open());
        assert_eq!(adapter.stats().closes, 1);

        transport.close(conn);
        assert_eq!(adapter.stats().closes, 1);
    }

    #[test]
    fn test_dropped_connection_closes_once() {
        let adapter = MemoryAdapter::with_devices(printers());
        let transport = PrinterTransport::new(adapter.clone(), fast_settings());

        let device = transport.discover("XP-P800").unwrap();
        {
            let _conn = transport.connect(&device).unwrap();
        }
        assert_eq!(adapter.stats().opens, 1);
        assert_eq!(adapter.stats().closes, 1);
    }

    #[test]
    fn test_close_failure_does_not_fail_delivery() {
        let adapter = MemoryAdapter::with_devices(printers());
        adapter.set_close_error(true);
        let transport = PrinterTransport::new(adapter.clone(), fast_settings());

        assert!(transport.deliver("XP-P800", stream(8, 24)).is_ok());
        assert_eq!(adapter.stats().closes, 1);
    }
}
