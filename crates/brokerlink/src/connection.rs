//! Connection façade and request/response exchange
//!
//! A [`Connection`] owns one duplex stream to a broker. Callers share it
//! freely; each request is tagged with a fresh correlation id, queued for the
//! writer task that owns the write half, and answered through the
//! pending-request table by the background reader.

use crate::reader::StreamReader;
use crate::writer::{OutboundFrame, StreamWriter};
use crate::{BrokerError, CloseReason, ConnectionConfig, CorrelationIds, PendingRequests, Result};
use brokerlink_proto::message::{
    ConsumerMetadataRequest, ConsumerMetadataResponse, FetchRequest, FetchResponse,
    MetadataRequest, MetadataResponse, OffsetCommitRequest, OffsetCommitResponse,
    OffsetFetchRequest, OffsetFetchResponse, OffsetRequest, OffsetResponse, ProduceRequest,
    ProduceResponse,
};
use brokerlink_proto::{
    BrokerRequest, BrokerResponse, CorrelationId, FrameCodec, RequestHeader, NON_BROKER_REPLICA_ID,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Snapshot of a connection's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Request frames fully written to the stream
    pub requests_sent: u64,
    /// Responses handed to a waiting caller
    pub responses_delivered: u64,
    /// Responses nobody was waiting for
    pub orphan_responses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests_sent: AtomicU64,
    responses_delivered: AtomicU64,
    orphan_responses: AtomicU64,
}

/// State shared between callers and the background tasks
pub(crate) struct Shared {
    config: ConnectionConfig,
    /// Encode side only; the reader keeps its own codec
    codec: FrameCodec,
    ids: CorrelationIds,
    pub(crate) pending: PendingRequests,
    outbound: mpsc::Sender<OutboundFrame>,
    terminal: Mutex<Option<CloseReason>>,
    cancel: CancellationToken,
    counters: Counters,
}

impl Shared {
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn max_frame_size(&self) -> usize {
        self.config.max_frame_size
    }

    pub(crate) fn record_delivered(&self) {
        self.counters.responses_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_orphan(&self) {
        self.counters.orphan_responses.fetch_add(1, Ordering::Relaxed);
    }

    async fn terminal_reason(&self) -> Option<CloseReason> {
        self.terminal.lock().await.clone()
    }

    async fn closed_error(&self) -> BrokerError {
        BrokerError::Closed(self.terminal_reason().await.unwrap_or(CloseReason::Dropped))
    }

    /// Move the connection to its closed state
    ///
    /// The first caller records `reason` and tears the connection down; every
    /// call returns the reason that was recorded first.
    pub(crate) async fn shutdown(&self, reason: CloseReason) -> CloseReason {
        {
            let mut terminal = self.terminal.lock().await;
            if let Some(existing) = terminal.as_ref() {
                return existing.clone();
            }
            *terminal = Some(reason.clone());
        }

        // Ids stop before the table drains.
        self.ids.shutdown().await;
        let released = self.pending.close_all(reason.clone()).await;

        // Stops the reader and the writer; the writer shuts the write half
        self.cancel.cancel();

        info!("Connection closed ({}), released {} pending requests", reason, released);
        reason
    }

    /// Queue a frame for the writer task and wait until it is on the wire
    ///
    /// Once queued the frame is written in full even if this future is
    /// dropped.
    async fn write(&self, frame: Bytes) -> Result<()> {
        let (done, written) = oneshot::channel();
        if self.outbound.send(OutboundFrame { frame, done }).await.is_err() {
            return Err(self.closed_error().await);
        }

        match written.await {
            Ok(Ok(())) => {
                self.counters.requests_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(e)) => Err(BrokerError::Write(e)),
            Err(_) => Err(self.closed_error().await),
        }
    }
}

struct Inner {
    shared: Arc<Shared>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Stop both tasks so they release the stream
        self.shared.cancel.cancel();
    }
}

/// Multiplexed connection to a single broker
///
/// Cloning is cheap and yields another handle to the same stream. When the
/// last handle is dropped the reader task stops.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Wrap an already open duplex stream and start its reader task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S>(stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_correlation_ids(stream, config, CorrelationIds::new())
    }

    pub(crate) fn with_correlation_ids<S>(
        stream: S,
        config: ConnectionConfig,
        ids: CorrelationIds,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::channel(config.write_queue_depth.max(1));
        let cancel = CancellationToken::new();

        let shared = Arc::new(Shared {
            codec: FrameCodec::with_max_frame_size(config.max_frame_size),
            config,
            ids,
            pending: PendingRequests::new(),
            outbound,
            terminal: Mutex::new(None),
            cancel: cancel.clone(),
            counters: Counters::default(),
        });

        let writer = StreamWriter::new(write_half, outbound_rx, cancel);
        tokio::spawn(writer.run());

        let reader = StreamReader::new(read_half, shared.clone());
        tokio::spawn(reader.run());

        Self {
            inner: Arc::new(Inner { shared }),
        }
    }

    /// Dial a broker over TCP
    pub async fn connect(addr: &str, config: ConnectionConfig) -> Result<Self> {
        debug!("Connecting to {}", addr);

        let duration = config.connect_timeout;
        let stream = timeout(duration, TcpStream::connect(addr))
            .await
            .map_err(|_| BrokerError::Timeout { duration })?
            .map_err(|source| BrokerError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true).map_err(|source| BrokerError::Connect {
            addr: addr.to_string(),
            source,
        })?;

        info!("Connected to {}", addr);
        Ok(Self::new(stream, config))
    }

    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    /// Close the connection
    ///
    /// Safe to call any number of times from any number of tasks. Every call
    /// returns the terminal reason recorded by whichever close happened first,
    /// which is [`CloseReason::ClosedByCaller`] unless the stream had already
    /// failed.
    pub async fn close(&self) -> CloseReason {
        self.shared().shutdown(CloseReason::ClosedByCaller).await
    }

    /// Reason the connection was closed, if it has been
    pub async fn terminal_reason(&self) -> Option<CloseReason> {
        self.shared().terminal_reason().await
    }

    /// Whether the connection has been closed
    pub async fn is_closed(&self) -> bool {
        self.terminal_reason().await.is_some()
    }

    /// Number of requests currently waiting for a response
    pub async fn pending_requests(&self) -> usize {
        self.shared().pending.len().await
    }

    /// Snapshot of the connection's counters
    pub fn stats(&self) -> ConnectionStats {
        let counters = &self.shared().counters;
        ConnectionStats {
            requests_sent: counters.requests_sent.load(Ordering::Relaxed),
            responses_delivered: counters.responses_delivered.load(Ordering::Relaxed),
            orphan_responses: counters.orphan_responses.load(Ordering::Relaxed),
        }
    }

    /// Send any request, honouring its [`BrokerRequest::expects_response`]
    ///
    /// Returns `Ok(None)` without waiting when no response is expected.
    pub async fn send<R: BrokerRequest>(&self, request: &R) -> Result<Option<R::Response>> {
        let correlation_id = self.next_correlation_id().await?;

        if !request.expects_response() {
            let frame = self.encode(correlation_id, request)?;
            self.shared().write(frame).await?;
            debug!("Sent {:?} request {} without waiting", R::API_KEY, correlation_id);
            return Ok(None);
        }

        self.round_trip(correlation_id, request).await.map(Some)
    }

    /// Send a request that always has a response and wait for it
    async fn request<R: BrokerRequest>(&self, request: &R) -> Result<R::Response> {
        let correlation_id = self.next_correlation_id().await?;
        self.round_trip(correlation_id, request).await
    }

    async fn next_correlation_id(&self) -> Result<CorrelationId> {
        match self.shared().ids.next().await {
            Some(id) => Ok(id),
            None => Err(self.shared().closed_error().await),
        }
    }

    fn encode<R: BrokerRequest>(&self, correlation_id: CorrelationId, request: &R) -> Result<Bytes> {
        let shared = self.shared();
        let header = RequestHeader::new(
            R::API_KEY,
            R::API_VERSION,
            correlation_id,
            shared.config.client_id.as_str(),
        );
        let body = request.encode_body().map_err(BrokerError::Encode)?;
        shared
            .codec
            .encode_request(&header, &body)
            .map_err(BrokerError::Encode)
    }

    async fn round_trip<R: BrokerRequest>(
        &self,
        correlation_id: CorrelationId,
        request: &R,
    ) -> Result<R::Response> {
        let shared = self.shared();
        let frame = self.encode(correlation_id, request)?;

        let waiter = shared.pending.register(correlation_id).await?;

        if let Err(e) = shared.write(frame).await {
            shared.pending.cancel(correlation_id).await;
            return Err(e);
        }

        let payload = match shared.config.request_timeout {
            Some(duration) => match timeout(duration, waiter.wait()).await {
                Ok(result) => result?,
                Err(_) => {
                    shared.pending.cancel(correlation_id).await;
                    debug!("Request {} timed out after {:?}", correlation_id, duration);
                    return Err(BrokerError::Timeout { duration });
                }
            },
            None => waiter.wait().await?,
        };

        R::Response::decode(&payload).map_err(BrokerError::Decode)
    }

    /// Fetch broker and topic metadata
    pub async fn metadata(&self, request: &MetadataRequest) -> Result<MetadataResponse> {
        self.request(request).await
    }

    /// Produce messages
    ///
    /// With [`RequiredAcks::NoAck`](brokerlink_proto::RequiredAcks::NoAck) the
    /// request is only written and `Ok(None)` is returned immediately.
    pub async fn produce(&self, request: &ProduceRequest) -> Result<Option<ProduceResponse>> {
        self.send(request).await
    }

    /// Fetch messages
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.request(request).await
    }

    /// Look up offsets by time
    ///
    /// The replica id is always sent as [`NON_BROKER_REPLICA_ID`].
    pub async fn offset(&self, request: &OffsetRequest) -> Result<OffsetResponse> {
        let request = OffsetRequest {
            replica_id: NON_BROKER_REPLICA_ID,
            ..request.clone()
        };
        self.request(&request).await
    }

    /// Locate the coordinator of a consumer group
    pub async fn consumer_metadata(
        &self,
        request: &ConsumerMetadataRequest,
    ) -> Result<ConsumerMetadataResponse> {
        self.request(request).await
    }

    /// Commit consumer group offsets
    pub async fn offset_commit(&self, request: &OffsetCommitRequest) -> Result<OffsetCommitResponse> {
        self.request(request).await
    }

    /// Read committed consumer group offsets
    pub async fn offset_fetch(&self, request: &OffsetFetchRequest) -> Result<OffsetFetchResponse> {
        self.request(request).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("client_id", &self.shared().config.client_id)
            .field("stats", &self.stats())
            .finish()
    }
}
