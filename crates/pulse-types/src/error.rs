//! Error types for characteristic decoding in pulse-types.

use thiserror::Error;

/// Errors that can occur when decoding a characteristic value.
///
/// A decode error never carries a partially-populated sample: a buffer that
/// does not satisfy the length implied by its own flags is rejected whole.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The buffer was empty.
    #[error("Empty buffer")]
    Empty,

    /// The buffer is shorter than the length its flags declare.
    #[error("Truncated buffer: flags require {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required by the declared flags.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// RR-interval payload length is not a multiple of two.
    #[error("Malformed RR-interval payload: {remaining} trailing bytes is not a multiple of 2")]
    OddRrIntervalBytes {
        /// Bytes left after the fixed fields.
        remaining: usize,
    },

    /// A string characteristic was not valid UTF-8.
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

impl DecodeError {
    /// Create a truncated-buffer error.
    pub fn truncated(expected: usize, actual: usize) -> Self {
        Self::Truncated { expected, actual }
    }
}

/// Result type alias using pulse-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
