//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// I/O error while reading or writing frames
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid frame format
    #[error("Invalid frame format")]
    InvalidFrame,

    /// Frame ended before a header field could be read
    #[error("Frame truncated: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required by the field being read
        needed: usize,
        /// Bytes left in the frame
        available: usize,
    },

    /// Frame too large
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// API key not known to this crate
    #[error("Unknown API key: {0}")]
    UnknownApiKey(i16),

    /// Acknowledgement level outside the known set
    #[error("Invalid required acks: {0}")]
    InvalidRequiredAcks(i16),
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(format!("MessagePack encode error: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for ProtocolError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(format!("MessagePack decode error: {}", err))
    }
}
