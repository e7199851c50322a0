//! Connection configuration

use brokerlink_proto::MAX_FRAME_SIZE;
use std::time::Duration;

/// Settings shared by every request on a connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Client identifier written into every request header
    pub client_id: String,
    /// How long a caller waits for its response; `None` waits until the
    /// response arrives or the connection dies
    pub request_timeout: Option<Duration>,
    /// Dial timeout used by [`Connection::connect`](crate::Connection::connect)
    pub connect_timeout: Duration,
    /// Largest frame accepted in either direction
    pub max_frame_size: usize,
    /// Frames that may wait for the writer task before callers block
    pub write_queue_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_id: "brokerlink".to_string(),
            request_timeout: None,
            connect_timeout: Duration::from_secs(30),
            max_frame_size: MAX_FRAME_SIZE,
            write_queue_depth: 128,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client identifier
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set a per-request response timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the dial timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum frame size
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Set how many frames may queue for the writer; at least one
    pub fn with_write_queue_depth(mut self, depth: usize) -> Self {
        self.write_queue_depth = depth.max(1);
        self
    }
}
