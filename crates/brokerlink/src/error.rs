//! Error types for broker connections

use brokerlink_proto::{CorrelationId, ProtocolError};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Why a connection stopped accepting requests
///
/// Recorded exactly once per connection and handed to every caller that
/// observes the closed state afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloseReason {
    /// `close` was called on the connection
    #[error("connection closed by caller")]
    ClosedByCaller,

    /// The broker closed its end of the stream
    #[error("connection closed by peer")]
    EndOfStream,

    /// Reading or parsing a frame failed
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The connection was dropped while the request was outstanding
    #[error("connection dropped")]
    Dropped,
}

/// Main error type for connection operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The connection is closed; carries the reason it was closed with
    #[error("connection closed: {0}")]
    Closed(CloseReason),

    /// A correlation id was registered twice while still pending
    #[error("correlation conflict: {0}")]
    CorrelationConflict(CorrelationId),

    /// Writing a request to the stream failed
    #[error("write failed: {0}")]
    Write(#[source] ProtocolError),

    /// The request could not be encoded
    #[error("encode failed: {0}")]
    Encode(#[source] ProtocolError),

    /// The response payload could not be decoded
    #[error("decode failed: {0}")]
    Decode(#[source] ProtocolError),

    /// A response arrived for a correlation id nobody is waiting on
    #[error("response to unknown request: {0}")]
    OrphanResponse(CorrelationId),

    /// No response within the configured request timeout
    #[error("Timeout after {duration:?}")]
    Timeout {
        /// Duration that was exceeded
        duration: Duration,
    },

    /// Dialing the broker failed
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Address that was dialed
        addr: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl BrokerError {
    /// The terminal reason if this error reports a closed connection
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            Self::Closed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<CloseReason> for BrokerError {
    fn from(reason: CloseReason) -> Self {
        Self::Closed(reason)
    }
}
