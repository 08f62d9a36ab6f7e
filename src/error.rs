//! # Error Types
//!
//! This module defines error types used throughout the snapprint library.
//!
//! Every failure a print request can hit is a variant of [`PrintError`].
//! Components pass these upward unchanged; the orchestrator reports the
//! first one it sees.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, PrintError>;

/// Transport stage that a [`PrintError::Timeout`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Send,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => f.write_str("connect"),
            Stage::Send => f.write_str("send"),
        }
    }
}

/// Main error type for snapprint operations
#[derive(Debug, Error)]
pub enum PrintError {
    /// The frame source produced no usable pixel buffer
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// A zero-dimension or malformed buffer reached the encoder
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// No Bluetooth controller is present
    #[error("Bluetooth adapter unavailable")]
    AdapterUnavailable,

    /// A controller exists but is powered off or blocked
    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    /// No paired device advertises a name containing the pattern
    #[error("No paired device matching '{pattern}'")]
    DeviceNotFound { pattern: String },

    /// The adapter is up but listing paired devices failed
    #[error("Could not list paired devices while looking for '{pattern}': {reason}")]
    DiscoveryFailed { pattern: String, reason: String },

    /// Opening the serial channel failed (refused, in use, unreachable)
    #[error("Failed to connect to {device}: {reason}")]
    ConnectFailed { device: String, reason: String },

    /// The link broke or refused data mid-stream
    #[error("Transmission to {device} failed after {bytes_sent} bytes: {reason}")]
    TransmitFailed {
        device: String,
        bytes_sent: usize,
        reason: String,
    },

    /// A bounded connect or send exceeded its time budget
    #[error("{stage} timed out after {after:?} ({bytes_sent} bytes sent)")]
    Timeout {
        stage: Stage,
        after: Duration,
        bytes_sent: usize,
    },

    /// The background worker panicked or was cancelled
    #[error("Background worker failed: {0}")]
    Worker(String),

    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrintError {
    /// True when discovery failed to produce a device.
    pub fn is_discovery_failure(&self) -> bool {
        matches!(
            self,
            PrintError::AdapterUnavailable
                | PrintError::AdapterDisabled
                | PrintError::DiscoveryFailed { .. }
                | PrintError::DeviceNotFound { .. }
        )
    }

    /// Bytes that reached the device before the failure, when known.
    pub fn bytes_sent(&self) -> Option<usize> {
        match self {
            PrintError::TransmitFailed { bytes_sent, .. } | PrintError::Timeout { bytes_sent, .. } => {
                Some(*bytes_sent)
            }
            _ => None,
        }
    }
}
