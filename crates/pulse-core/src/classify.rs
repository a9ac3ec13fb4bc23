//! Classification of platform failures into user-facing error kinds.
//!
//! Bluetooth stacks report failures in very different shapes: a named error
//! code on some platforms, a bare message string on others. [`classify`]
//! folds all of them into a closed [`ErrorKind`] taxonomy. The result is a
//! pure function of the error's code and message; anything unrecognised is
//! [`ErrorKind::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-facing category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No matching device within the selection window, or selection was cancelled.
    DeviceNotFound,
    /// The user declined or the process lacks Bluetooth authorization.
    PermissionDenied,
    /// The platform lacks a required capability.
    NotSupported,
    /// The session or link is already in use.
    AlreadyConnected,
    /// Radio or link layer failure.
    TransportUnavailable,
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::DeviceNotFound,
        ErrorKind::PermissionDenied,
        ErrorKind::NotSupported,
        ErrorKind::AlreadyConnected,
        ErrorKind::TransportUnavailable,
        ErrorKind::Unknown,
    ];

    /// Human-readable message template for this kind.
    ///
    /// Callers that need localization should key on [`ErrorKind::code`] instead.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::DeviceNotFound => {
                "No matching device found. Make sure it is powered on, advertising and in range."
            }
            ErrorKind::PermissionDenied => {
                "Bluetooth permission denied. Grant Bluetooth access and try again."
            }
            ErrorKind::NotSupported => "Bluetooth Low Energy is not supported on this platform.",
            ErrorKind::AlreadyConnected => {
                "A device is already connected. Disconnect before connecting again."
            }
            ErrorKind::TransportUnavailable => {
                "Bluetooth link failed. Check that Bluetooth is on and move closer to the device."
            }
            ErrorKind::Unknown => "An unexpected Bluetooth error occurred.",
        }
    }

    /// Stable snake_case key for this kind.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::DeviceNotFound => "device_not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::AlreadyConnected => "already_connected",
            ErrorKind::TransportUnavailable => "transport_unavailable",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A failure as reported by the platform Bluetooth stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PlatformError {
    /// Platform error name, when the stack reports one (e.g. `NotFoundError`).
    pub code: Option<String>,
    pub message: String,
}

impl PlatformError {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create an error with a platform error code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }
}

/// Exact error-code matches, compared case-insensitively.
const CODE_TABLE: &[(&str, ErrorKind)] = &[
    ("NotFoundError", ErrorKind::DeviceNotFound),
    ("AbortError", ErrorKind::DeviceNotFound),
    ("device_not_found", ErrorKind::DeviceNotFound),
    ("NotAllowedError", ErrorKind::PermissionDenied),
    ("SecurityError", ErrorKind::PermissionDenied),
    ("permission_denied", ErrorKind::PermissionDenied),
    ("NotSupportedError", ErrorKind::NotSupported),
    ("not_supported", ErrorKind::NotSupported),
    ("InvalidStateError", ErrorKind::AlreadyConnected),
    ("already_connected", ErrorKind::AlreadyConnected),
    ("NetworkError", ErrorKind::TransportUnavailable),
    ("TimeoutError", ErrorKind::TransportUnavailable),
    ("not_connected", ErrorKind::TransportUnavailable),
    ("timed_out", ErrorKind::TransportUnavailable),
    ("transport_unavailable", ErrorKind::TransportUnavailable),
];

/// Lowercase message substrings, checked in order. Earlier entries win.
const MESSAGE_TABLE: &[(&str, ErrorKind)] = &[
    ("already connected", ErrorKind::AlreadyConnected),
    ("already in progress", ErrorKind::AlreadyConnected),
    ("busy", ErrorKind::AlreadyConnected),
    ("permission", ErrorKind::PermissionDenied),
    ("access denied", ErrorKind::PermissionDenied),
    ("not allowed", ErrorKind::PermissionDenied),
    ("unauthorized", ErrorKind::PermissionDenied),
    ("not supported", ErrorKind::NotSupported),
    ("unsupported", ErrorKind::NotSupported),
    ("no bluetooth adapter", ErrorKind::NotSupported),
    ("user cancelled", ErrorKind::DeviceNotFound),
    ("user canceled", ErrorKind::DeviceNotFound),
    ("no device", ErrorKind::DeviceNotFound),
    ("device not found", ErrorKind::DeviceNotFound),
    ("not found", ErrorKind::DeviceNotFound),
    ("timed out", ErrorKind::TransportUnavailable),
    ("timeout", ErrorKind::TransportUnavailable),
    ("disconnected", ErrorKind::TransportUnavailable),
    ("not connected", ErrorKind::TransportUnavailable),
    ("gatt", ErrorKind::TransportUnavailable),
    ("connection", ErrorKind::TransportUnavailable),
    ("adapter", ErrorKind::TransportUnavailable),
    ("powered off", ErrorKind::TransportUnavailable),
    ("out of range", ErrorKind::TransportUnavailable),
];

/// Classify a platform failure.
///
/// The error code is consulted first; if it is absent or unrecognised the
/// message is searched for known substrings. Unrecognised errors are
/// [`ErrorKind::Unknown`].
pub fn classify(error: &PlatformError) -> ErrorKind {
    if let Some(code) = error.code.as_deref()
        && let Some((_, kind)) = CODE_TABLE
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(code))
    {
        return *kind;
    }

    let message = error.message.to_lowercase();
    MESSAGE_TABLE
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map_or(ErrorKind::Unknown, |(_, kind)| *kind)
}

impl From<&btleplug::Error> for PlatformError {
    fn from(err: &btleplug::Error) -> Self {
        let code = match err {
            btleplug::Error::PermissionDenied => Some("permission_denied"),
            btleplug::Error::DeviceNotFound => Some("device_not_found"),
            btleplug::Error::NotConnected => Some("not_connected"),
            btleplug::Error::NotSupported(_) => Some("not_supported"),
            btleplug::Error::TimedOut(_) => Some("timed_out"),
            _ => None,
        };
        Self {
            code: code.map(str::to_owned),
            message: err.to_string(),
        }
    }
}

impl From<btleplug::Error> for PlatformError {
    fn from(err: btleplug::Error) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_classify_by_code() {
        let cases = [
            ("NotFoundError", ErrorKind::DeviceNotFound),
            ("NotAllowedError", ErrorKind::PermissionDenied),
            ("SecurityError", ErrorKind::PermissionDenied),
            ("NotSupportedError", ErrorKind::NotSupported),
            ("InvalidStateError", ErrorKind::AlreadyConnected),
            ("NetworkError", ErrorKind::TransportUnavailable),
        ];
        for (code, expected) in cases {
            let err = PlatformError::with_code(code, "something happened");
            assert_eq!(classify(&err), expected, "code {code}");
        }
    }

    #[test]
    fn test_code_match_is_case_insensitive() {
        let err = PlatformError::with_code("notfounderror", "");
        assert_eq!(classify(&err), ErrorKind::DeviceNotFound);
    }

    #[test]
    fn test_code_takes_precedence_over_message() {
        let err = PlatformError::with_code("NotAllowedError", "device not found");
        assert_eq!(classify(&err), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_unknown_code_falls_back_to_message() {
        let err = PlatformError::with_code("E_WEIRD", "Bluetooth permission denied");
        assert_eq!(classify(&err), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_classify_by_message() {
        let cases = [
            ("User cancelled the requestDevice() chooser.", ErrorKind::DeviceNotFound),
            ("Device 'HRM-Pro' not found", ErrorKind::DeviceNotFound),
            ("Access denied to Bluetooth", ErrorKind::PermissionDenied),
            ("Web Bluetooth is not supported", ErrorKind::NotSupported),
            ("Device is already connected", ErrorKind::AlreadyConnected),
            ("GATT Server is disconnected", ErrorKind::TransportUnavailable),
            ("Connection timed out after 15s", ErrorKind::TransportUnavailable),
            ("Bluetooth adapter is powered off", ErrorKind::TransportUnavailable),
        ];
        for (message, expected) in cases {
            assert_eq!(classify(&PlatformError::new(message)), expected, "{message}");
        }
    }

    #[test]
    fn test_message_order_prefers_permission_over_connection() {
        let err = PlatformError::new("Connection not allowed");
        assert_eq!(classify(&err), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_unrecognised_is_unknown() {
        assert_eq!(classify(&PlatformError::new("xyzzy")), ErrorKind::Unknown);
        assert_eq!(classify(&PlatformError::new("")), ErrorKind::Unknown);
    }

    #[test]
    fn test_kind_codes_classify_to_themselves() {
        for kind in ErrorKind::ALL {
            let err = PlatformError::with_code(kind.code(), "");
            assert_eq!(classify(&err), kind);
        }
    }

    #[test]
    fn test_every_kind_has_a_message() {
        for kind in ErrorKind::ALL {
            assert!(!kind.message().is_empty());
        }
    }

    #[test]
    fn test_btleplug_error_conversion() {
        let err = PlatformError::from(&btleplug::Error::PermissionDenied);
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = PlatformError::from(&btleplug::Error::DeviceNotFound);
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);

        let err = PlatformError::from(btleplug::Error::TimedOut(Duration::from_secs(5)));
        assert_eq!(err.kind(), ErrorKind::TransportUnavailable);

        let err = PlatformError::from(btleplug::Error::NotSupported("scan filter".into()));
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::TransportUnavailable).unwrap();
        assert_eq!(json, "\"transport_unavailable\"");
    }
}
