//! Background task that demultiplexes response frames

use crate::connection::Shared;
use crate::CloseReason;
use brokerlink_proto::{FrameCodec, ResponseFrame};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, error, warn};

/// Sole owner of a connection's read half
///
/// Reads one frame at a time and hands its payload to the caller registered
/// under the frame's correlation id. The first read or parse failure closes
/// the whole connection and ends the task; it is never restarted.
pub(crate) struct StreamReader<R> {
    reader: R,
    codec: FrameCodec,
    shared: Arc<Shared>,
}

impl<R> StreamReader<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(reader: R, shared: Arc<Shared>) -> Self {
        Self {
            reader,
            codec: FrameCodec::with_max_frame_size(shared.max_frame_size()),
            shared,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Starting stream reader");
        let cancel = self.shared.cancel_token();

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Stream reader cancelled");
                    break;
                }
                frame = self.codec.read_response(&mut self.reader) => frame,
            };

            match frame {
                Ok(Some(frame)) => route(&self.shared, frame).await,
                Ok(None) => {
                    debug!("Peer closed the stream");
                    self.shared.shutdown(CloseReason::EndOfStream).await;
                    break;
                }
                Err(e) => {
                    error!("Failed to read frame: {}", e);
                    self.shared
                        .shutdown(CloseReason::ReadFailed(e.to_string()))
                        .await;
                    break;
                }
            }
        }

        debug!("Stream reader stopped");
    }
}

async fn route(shared: &Shared, frame: ResponseFrame) {
    let correlation_id = frame.correlation_id;

    match shared.pending.deliver(correlation_id, frame.payload).await {
        Ok(()) => shared.record_delivered(),
        Err(e) => {
            warn!("{}", e);
            shared.record_orphan();
        }
    }
}
