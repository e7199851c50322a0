//! Stub broker shared by the integration tests

#![allow(dead_code)]

use brokerlink::{Connection, ConnectionConfig};
use brokerlink_proto::message::{MetadataResponse, TopicMetadata};
use brokerlink_proto::{BrokerResponse, CorrelationId, FrameCodec, RequestFrame, ResponseFrame};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream};

/// Broker end of a connection, driven by the test
pub struct StubBroker<S> {
    stream: S,
    codec: FrameCodec,
}

impl<S> StubBroker<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            codec: FrameCodec::new(),
        }
    }

    /// Next request written by the client, or `None` once it hung up
    pub async fn next_request(&mut self) -> Option<RequestFrame> {
        let raw = self.codec.read_frame(&mut self.stream).await.ok()??;
        Some(RequestFrame::parse(raw).expect("malformed request frame"))
    }

    /// Read exactly `count` requests
    pub async fn collect_requests(&mut self, count: usize) -> Vec<RequestFrame> {
        let mut requests = Vec::with_capacity(count);
        while requests.len() < count {
            requests.push(self.next_request().await.expect("client hung up early"));
        }
        requests
    }

    pub async fn respond<T: BrokerResponse>(&mut self, correlation_id: CorrelationId, body: &T) {
        self.send_raw(correlation_id, body.encode_body().unwrap()).await;
    }

    pub async fn send_raw(&mut self, correlation_id: CorrelationId, payload: Bytes) {
        let encoded = self
            .codec
            .encode_response(&ResponseFrame::new(correlation_id, payload))
            .unwrap();
        self.write_bytes(&encoded).await;
    }

    pub async fn write_bytes(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }
}

/// Client connection and stub broker joined by an in-memory stream
pub fn connection_pair(config: ConnectionConfig) -> (Connection, StubBroker<DuplexStream>) {
    connection_pair_with_buffer(config, 256 * 1024)
}

/// Like [`connection_pair`] with a stream that holds at most `buffer` bytes
pub fn connection_pair_with_buffer(
    config: ConnectionConfig,
    buffer: usize,
) -> (Connection, StubBroker<DuplexStream>) {
    let (client, server) = tokio::io::duplex(buffer);
    (Connection::new(client, config), StubBroker::new(server))
}

pub fn topic_metadata(name: &str) -> MetadataResponse {
    MetadataResponse {
        brokers: vec![],
        topics: vec![TopicMetadata {
            error_code: 0,
            name: name.to_string(),
            partitions: vec![],
        }],
    }
}
