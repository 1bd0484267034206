//! Error types for the wire format.

use core::fmt;

use crate::value::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// The tag byte did not announce the expected type.
    TagMismatch { expected: Tag, actual: u8 },
    /// A string exceeded the 16-bit length prefix.
    StringTooLong { len: usize },
    /// A character outside the one-byte ASCII range cannot be carried.
    NonAsciiChar(char),
    /// A boolean payload was neither 0 nor 1.
    InvalidBool(u8),
    /// A received string was not valid UTF-8.
    InvalidUtf8,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::TagMismatch { expected, actual } => {
                write!(
                    f,
                    "type tag mismatch: expected '{}', got {actual:#04x}",
                    expected.byte() as char
                )
            }
            WireError::StringTooLong { len } => {
                write!(f, "string too long to send: {len} bytes")
            }
            WireError::NonAsciiChar(c) => {
                write!(f, "character {c:?} does not fit in one byte")
            }
            WireError::InvalidBool(b) => write!(f, "invalid boolean byte {b:#04x}"),
            WireError::InvalidUtf8 => write!(f, "received string is not valid UTF-8"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WireError {}
