//! Background task that serializes request frames onto the stream

use brokerlink_proto::{FrameCodec, ProtocolError};
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A complete request frame and the slot its outcome is reported on
pub(crate) struct OutboundFrame {
    pub(crate) frame: Bytes,
    pub(crate) done: oneshot::Sender<Result<(), ProtocolError>>,
}

/// Sole owner of a connection's write half
///
/// Frames are written one at a time, each in full, in the order they were
/// queued. A caller that stops waiting does not interrupt its frame; only
/// cancellation of the connection does, after which the stream is unusable
/// anyway.
pub(crate) struct StreamWriter<W> {
    writer: W,
    codec: FrameCodec,
    rx: mpsc::Receiver<OutboundFrame>,
    cancel: CancellationToken,
}

impl<W> StreamWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        writer: W,
        rx: mpsc::Receiver<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            writer,
            codec: FrameCodec::new(),
            rx,
            cancel,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Starting stream writer");

        loop {
            let outbound = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outbound = self.rx.recv() => match outbound {
                    Some(outbound) => outbound,
                    None => break,
                },
            };

            let result = tokio::select! {
                result = self.codec.write_frame(&mut self.writer, &outbound.frame) => result,
                _ = self.cancel.cancelled() => {
                    debug!("Stream writer cancelled mid-frame");
                    break;
                }
            };

            if let Err(e) = &result {
                warn!("Failed to write frame: {}", e);
            }
            let _ = outbound.done.send(result);
        }

        // Frames still queued are dropped, which fails their callers
        self.rx.close();
        if let Err(e) = self.writer.shutdown().await {
            warn!("Failed to shut down write half: {}", e);
        }
        debug!("Stream writer stopped");
    }
}
