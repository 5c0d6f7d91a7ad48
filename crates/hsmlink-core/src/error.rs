//! Error type for encoding and decoding wire messages.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A declared length field does not match the data actually available.
    #[error("length mismatch: declared {declared}, available is {available}")]
    LengthMismatch { declared: usize, available: usize },

    /// A payload exceeds the fixed transport MTU or a field's capacity.
    #[error("payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The group byte of a message kind is not a recognized subsystem.
    #[error("unknown message group: 0x{0:02X}")]
    UnknownGroup(u8),

    /// The payload could not be parsed (field value out of range, reserved
    /// discriminant, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
