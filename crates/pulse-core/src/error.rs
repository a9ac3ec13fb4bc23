//! Error types for pulse-core.
//!
//! Only failures of [`DeviceSession::connect`](crate::DeviceSession::connect)
//! are surfaced to callers. Discovery failures, decode failures and subscriber
//! failures are logged and, where useful, published as
//! [`SessionEvent::Error`](crate::SessionEvent::Error); the session stays alive.
//!
//! | Error | Meaning |
//! |-------|---------|
//! | [`Error::Connect`] | Classified transport failure while connecting |
//! | [`Error::Cancelled`] | A `disconnect()` superseded the pending connect |
//! | [`Error::NotConnected`] | Operation requires a live link |
//! | [`Error::Timeout`] | A platform call exceeded its configured timeout |
//! | [`Error::InvalidConfig`] | Rejected [`SessionConfig`](crate::SessionConfig) |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::classify::{ErrorKind, PlatformError};

/// Errors that can occur while running a device session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connecting failed with a classified transport error.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The operation was superseded by a disconnect.
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation attempted while not connected to a device.
    #[error("Not connected to device")]
    NotConnected,

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Error reported by a platform backend.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a classified connect error.
    pub fn connect(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Connect(ConnectError::new(kind, detail))
    }

    /// The user-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect(e) => e.kind,
            Error::NotConnected | Error::Timeout { .. } => ErrorKind::TransportUnavailable,
            Error::Bluetooth(e) => PlatformError::from(e).kind(),
            Error::Platform(e) => e.kind(),
            Error::Cancelled | Error::InvalidConfig(_) => ErrorKind::Unknown,
        }
    }
}

/// A connect failure classified into an [`ErrorKind`].
///
/// Displays the kind's message template followed by the platform detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectError {
    pub kind: ErrorKind,
    /// Underlying platform message.
    pub detail: String,
}

impl ConnectError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Classify a platform error.
    pub fn from_platform(err: &PlatformError) -> Self {
        Self::new(err.kind(), err.message.clone())
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.message())?;
        if !self.detail.is_empty() {
            write!(f, " ({})", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConnectError {}

/// Result type alias using pulse-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
