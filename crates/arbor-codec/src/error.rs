//! Codec error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    #[error("unknown frame type byte {0}")]
    UnknownType(u8),

    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),

    #[error("frame exceeds maximum size ({0} bytes)")]
    TooLarge(usize),
}
