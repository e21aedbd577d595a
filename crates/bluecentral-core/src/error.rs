//! Error types for bluecentral-core.
//!
//! Errors fall into two groups that are reported in different ways.
//!
//! ## State-validity errors (synchronous)
//!
//! These are returned directly from the call that was rejected. Nothing is
//! queued and no event is emitted.
//!
//! | Error | Raised by | Meaning |
//! |-------|-----------|---------|
//! | [`Error::NotReady`] | `start_scanning`, `connect` | Adapter is not `poweredOn` |
//! | [`Error::InvalidState`] | `connect`, `Central::start` | Operation invalid for the current state |
//! | [`Error::AlreadyInProgress`] | `update_rssi`, `discover_services` | Same request already outstanding |
//! | [`Error::NotConnected`] | `update_rssi`, `discover_services` | Peripheral session is not connected |
//! | [`Error::Closed`] | any peripheral operation | The owning `Central` was shut down |
//!
//! ## Transport errors (asynchronous)
//!
//! Radio failures ([`Error::TransportFailure`], [`Error::Bluetooth`],
//! [`Error::Timeout`], [`Error::ConnectionFailed`]) are produced by a
//! [`Transport`](crate::transport::Transport) and never surface from a
//! request call. The session manager turns them into failure events such as
//! `connectFailure` / `peripheralConnectFailure`, carrying a
//! [`ConnectionFailureReason`] derived from the error.
//!
//! The core never retries. To retry, re-issue the operation after observing
//! the failure event:
//!
//! ```ignore
//! peripheral.on("connectFailure", |peripheral, _event| {
//!     let _ = peripheral.connect();
//! });
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bluecentral_types::AdapterState;

/// Errors produced by the session manager and its transports.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The adapter is not powered on.
    #[error("Bluetooth adapter not ready (state: {state})")]
    NotReady {
        /// The adapter state at the time of the call.
        state: AdapterState,
    },

    /// The operation is not valid in the current state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state that rejected it.
        state: String,
    },

    /// The same request is already outstanding.
    #[error("{operation} already in progress")]
    AlreadyInProgress {
        /// The duplicated operation.
        operation: &'static str,
    },

    /// Operation attempted while not connected to the peripheral.
    #[error("Not connected to peripheral")]
    NotConnected,

    /// Opaque radio or link failure reported by a transport.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Bluetooth Low Energy error from btleplug.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The peripheral identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// No Bluetooth adapter is available.
    #[error("No Bluetooth adapter available")]
    AdapterNotFound,

    /// The transport does not know the requested peripheral.
    #[error("Peripheral not found: {0}")]
    PeripheralNotFound(String),

    /// The owning session manager has been shut down.
    #[error("Session manager has been shut down")]
    Closed,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid identifier, state name or UUID text.
    #[error(transparent)]
    Parse(#[from] bluecentral_types::ParseError),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Peripheral is out of range or no longer known to the stack.
    OutOfRange,
    /// Peripheral rejected the connection.
    Rejected,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "peripheral out of range"),
            Self::Rejected => write!(f, "connection rejected by peripheral"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<&Error> for ConnectionFailureReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::ConnectionFailed { reason, .. } => reason.clone(),
            Error::Timeout { .. } => Self::Timeout,
            Error::NotReady { .. } | Error::AdapterNotFound => Self::AdapterUnavailable,
            Error::PeripheralNotFound(_) => Self::OutOfRange,
            Error::Bluetooth(e) => Self::BleError(e.to_string()),
            Error::TransportFailure(msg) => Self::BleError(msg.clone()),
            other => Self::Other(other.to_string()),
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an opaque transport failure.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::TransportFailure(reason.into())
    }

    /// Create an invalid-state error.
    pub fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }
}

/// Result type alias using bluecentral-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
