//! # Brokerlink Protocol
//!
//! Wire framing, request headers and typed message bodies for the brokerlink
//! connection multiplexer.

#![warn(missing_docs)]

/// Frame structure and header parsing
pub mod frame;

/// Request and response message bodies
pub mod message;

/// Length-prefixed frame codec for async streams
pub mod codec;

/// Error types for protocol operations
pub mod error;

pub use frame::{CorrelationId, RequestFrame, RequestHeader, ResponseFrame};
pub use message::{ApiKey, BrokerRequest, BrokerResponse, RequiredAcks, NON_BROKER_REPLICA_ID};
pub use codec::{FrameCodec, MAX_FRAME_SIZE};
pub use error::ProtocolError;
