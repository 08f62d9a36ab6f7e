//! # In-Memory Transport
//!
//! A [`SerialAdapter`] that keeps everything in process memory. It records
//! what was opened, written and closed, and can be told to misbehave, which
//! makes it the fake transport for tests and the sink for dry runs.
//!
//! Clones share state, so a test can hand one clone to the transport and
//! inspect the other.
//!
//! ## Example
//!
//! ```
//! use snapprint::transport::memory::{MemoryAdapter, WriteBehavior};
//! use snapprint::transport::DeviceHandle;
//!
//! let adapter = MemoryAdapter::with_devices(vec![DeviceHandle::new("XP-P800", "01")]);
//! adapter.set_write(WriteBehavior::DisconnectAfter(100));
//!
//! assert_eq!(adapter.stats().opens, 0);
//! ```

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{AdapterStatus, DeviceHandle, SerialAdapter, SerialLink};

/// How `open` responds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    #[default]
    Accept,
    /// Fail with `ConnectionRefused` and this message
    Refuse(String),
    /// Fail at once with an unclassified error, like a peer that is out of range
    Unreachable(String),
    /// Fail with `TimedOut`
    TimeOut,
}

/// How an open link treats writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteBehavior {
    #[default]
    Accept,
    /// Accept at most this many bytes per call
    ShortWrites(usize),
    /// Accept this many bytes in total, then fail with `BrokenPipe`
    DisconnectAfter(usize),
    /// Accept this many bytes in total, then report `TimedOut`
    StallAfter(usize),
}

/// Counters and captured bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Calls to `paired_devices`
    pub enumerations: usize,
    /// Successful `open` calls
    pub opens: usize,
    /// Link `close` calls
    pub closes: usize,
    /// Link `write` calls that accepted data
    pub writes: usize,
    pub flushes: usize,
    /// Every byte accepted, across all connections
    pub received: Vec<u8>,
}

#[derive(Debug)]
struct State {
    status: AdapterStatus,
    devices: Vec<DeviceHandle>,
    connect: ConnectBehavior,
    write: WriteBehavior,
    close_error: bool,
    enumerate_error: Option<String>,
    stats: MemoryStats,
}

/// In-memory [`SerialAdapter`].
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::with_devices(Vec::new())
    }
}

impl MemoryAdapter {
    /// A ready adapter with the given paired devices.
    pub fn with_devices(devices: Vec<DeviceHandle>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                status: AdapterStatus::Ready,
                devices,
                connect: ConnectBehavior::default(),
                write: WriteBehavior::default(),
                close_error: false,
                enumerate_error: None,
                stats: MemoryStats::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub fn set_status(&self, status: AdapterStatus) {
        self.lock().status = status;
    }

    pub fn set_devices(&self, devices: Vec<DeviceHandle>) {
        self.lock().devices = devices;
    }

    pub fn set_connect(&self, behavior: ConnectBehavior) {
        self.lock().connect = behavior;
    }

    pub fn set_write(&self, behavior: WriteBehavior) {
        self.lock().write = behavior;
    }

    /// Make link `close` report an error (it still counts as closed).
    pub fn set_close_error(&self, fail: bool) {
        self.lock().close_error = fail;
    }

    /// Make `paired_devices` fail with this message.
    pub fn set_enumerate_error(&self, message: Option<&str>) {
        self.lock().enumerate_error = message.map(str::to_string);
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MemoryStats {
        self.lock().stats.clone()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SerialAdapter for MemoryAdapter {
    fn status(&self) -> AdapterStatus {
        self.lock().status
    }

    fn paired_devices(&self) -> io::Result<Vec<DeviceHandle>> {
        let mut state = self.lock();
        state.stats.enumerations += 1;
        if let Some(message) = &state.enumerate_error {
            return Err(io::Error::other(message.clone()));
        }
        Ok(state.devices.clone())
    }

    fn open(&self, device: &DeviceHandle, _timeout: Option<Duration>) -> io::Result<Box<dyn SerialLink>> {
        let mut state = self.lock();
        match &state.connect {
            ConnectBehavior::Accept => {}
            ConnectBehavior::Refuse(reason) => {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, reason.clone()));
            }
            ConnectBehavior::Unreachable(reason) => {
                return Err(io::Error::other(reason.clone()));
            }
            ConnectBehavior::TimeOut => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} did not answer", device.address),
                ));
            }
        }
        state.stats.opens += 1;

        Ok(Box::new(MemoryLink {
            state: Arc::clone(&self.state),
            accepted: 0,
        }))
    }
}

/// Link handed out by [`MemoryAdapter`].
struct MemoryLink {
    state: Arc<Mutex<State>>,
    /// Bytes accepted on this link
    accepted: usize,
}

impl SerialLink for MemoryLink {
    fn write(&mut self, buf: &[u8], _timeout: Option<Duration>) -> io::Result<usize> {
        let mut state = lock(&self.state);

        let n = match state.write {
            WriteBehavior::Accept => buf.len(),
            WriteBehavior::ShortWrites(max) => buf.len().min(max.max(1)),
            WriteBehavior::DisconnectAfter(limit) => {
                let room = limit.saturating_sub(self.accepted);
                if room == 0 {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer disconnected"));
                }
                buf.len().min(room)
            }
            WriteBehavior::StallAfter(limit) => {
                let room = limit.saturating_sub(self.accepted);
                if room == 0 {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "link stalled"));
                }
                buf.len().min(room)
            }
        };

        state.stats.writes += 1;
        state.stats.received.extend_from_slice(&buf[..n]);
        self.accepted += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.state).stats.flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.stats.closes += 1;
        if state.close_error {
            return Err(io::Error::other("close failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let adapter = MemoryAdapter::default();
        let other = adapter.clone();
        other.set_status(AdapterStatus::Disabled);
        assert_eq!(adapter.status(), AdapterStatus::Disabled);
    }

    #[test]
    fn test_link_records_bytes() {
        let adapter = MemoryAdapter::with_devices(vec![DeviceHandle::new("a", "1")]);
        let device = adapter.paired_devices().unwrap().remove(0);
        let mut link = adapter.open(&device, None).unwrap();

        assert_eq!(link.write(b"abc", None).unwrap(), 3);
        link.flush().unwrap();
        link.close().unwrap();

        let stats = adapter.stats();
        assert_eq!(stats.received, b"abc");
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.closes, 1);
        assert_eq!(stats.enumerations, 1);
    }

    #[test]
    fn test_disconnect_after_limit() {
        let adapter = MemoryAdapter::with_devices(vec![DeviceHandle::new("a", "1")]);
        adapter.set_write(WriteBehavior::DisconnectAfter(2));
        let mut link = adapter.open(&DeviceHandle::new("a", "1"), None).unwrap();

        assert_eq!(link.write(b"abc", None).unwrap(), 2);
        let err = link.write(b"c", None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
