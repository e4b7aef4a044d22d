//! Error types for the jscale library.

use std::fmt;

/// Result type alias for jscale operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during image decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed JPEG data (bad marker, truncated segment, invalid table).
    InvalidDecode(String),
    /// Well-formed JPEG using a feature this decoder does not implement.
    UnsupportedDecode(String),
    /// Scaled size outside the supported 1..=8 range.
    InvalidScaledSize(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidDecode(msg) => {
                write!(f, "Invalid JPEG data: {}", msg)
            }
            Error::UnsupportedDecode(msg) => {
                write!(f, "Unsupported JPEG feature: {}", msg)
            }
            Error::InvalidScaledSize(n) => {
                write!(f, "Invalid scaled size {}: must be 1-8", n)
            }
        }
    }
}

impl std::error::Error for Error {}
