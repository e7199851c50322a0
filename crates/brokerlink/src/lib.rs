//! # Brokerlink
//!
//! Multiplexes many concurrent broker RPCs over a single persistent duplex
//! stream.
//!
//! A [`Connection`] tags every request with a correlation id, writes it to the
//! shared stream and parks the caller on a one-shot handle. A single reader
//! task owns the read half, parses response frames and hands each payload to
//! the caller whose id it carries. When the stream fails or the connection is
//! closed, every parked caller wakes up with the same [`CloseReason`].

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use brokerlink_proto as proto;

/// Error types for broker connections
pub mod error;

/// Connection configuration
pub mod config;

/// Correlation id allocation
pub mod correlation;

/// Table of requests waiting for a response
pub mod pending;

/// Background task that demultiplexes response frames
mod reader;

/// Background task that writes request frames
mod writer;

/// Connection façade and request/response exchange
pub mod connection;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionStats};
pub use correlation::CorrelationIds;
pub use error::{BrokerError, CloseReason};
pub use pending::{PendingRequests, ResponseWaiter};

/// Result type alias for connection operations
pub type Result<T> = std::result::Result<T, BrokerError>;
