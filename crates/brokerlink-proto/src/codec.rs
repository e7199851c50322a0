//! Frame codec for async streams

use crate::{ProtocolError, RequestHeader, ResponseFrame};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const SIZE_PREFIX_LEN: usize = 4;

/// Frame codec for encoding/decoding size-prefixed frames over async streams
pub struct FrameCodec {
    /// Read buffer for incoming data
    read_buf: BytesMut,
    /// Maximum frame size allowed
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a new frame codec with default settings
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a new frame codec with custom max frame size
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_frame_size,
        }
    }

    /// Encode a request header and body into one size-prefixed frame
    pub fn encode_request(&self, header: &RequestHeader, body: &[u8]) -> Result<Bytes, ProtocolError> {
        let frame_len = header.encoded_len() + body.len();
        self.check_size(frame_len)?;

        let mut buf = BytesMut::with_capacity(SIZE_PREFIX_LEN + frame_len);
        buf.put_u32(frame_len as u32);
        header.put(&mut buf)?;
        buf.put_slice(body);

        Ok(buf.freeze())
    }

    /// Encode a response frame with its size prefix
    pub fn encode_response(&self, frame: &ResponseFrame) -> Result<Bytes, ProtocolError> {
        let frame_len = 4 + frame.payload.len();
        self.check_size(frame_len)?;

        let mut buf = BytesMut::with_capacity(SIZE_PREFIX_LEN + frame_len);
        buf.put_u32(frame_len as u32);
        buf.put_i32(frame.correlation_id);
        buf.put_slice(&frame.payload);

        Ok(buf.freeze())
    }

    /// Write an already encoded frame to an async writer in one piece
    pub async fn write_frame<W>(&self, writer: &mut W, encoded: &[u8]) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one raw frame (without its size prefix) from an async reader
    ///
    /// Returns `Ok(None)` on a clean end of stream between frames.
    pub async fn read_frame<R>(&mut self, reader: &mut R) -> Result<Option<Bytes>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(frame) = self.try_decode_frame()? {
                return Ok(Some(frame));
            }

            let n = reader.read_buf(&mut self.read_buf).await?;

            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                } else {
                    return Err(ProtocolError::InvalidFrame);
                }
            }
        }
    }

    /// Read the next response frame and split off its correlation id
    pub async fn read_response<R>(&mut self, reader: &mut R) -> Result<Option<ResponseFrame>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        match self.read_frame(reader).await? {
            Some(raw) => ResponseFrame::parse(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Try to decode a frame from the internal buffer
    pub fn try_decode_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.read_buf.len() < SIZE_PREFIX_LEN {
            return Ok(None);
        }

        // Peek at the length prefix without consuming it
        let frame_len = (&self.read_buf[..SIZE_PREFIX_LEN]).get_i32();
        if frame_len < 0 {
            return Err(ProtocolError::InvalidFrame);
        }
        let frame_len = frame_len as usize;
        self.check_size(frame_len)?;

        if self.read_buf.len() < SIZE_PREFIX_LEN + frame_len {
            self.read_buf.reserve(SIZE_PREFIX_LEN + frame_len - self.read_buf.len());
            return Ok(None);
        }

        self.read_buf.advance(SIZE_PREFIX_LEN);
        Ok(Some(self.read_buf.split_to(frame_len).freeze()))
    }

    /// Get the current buffer size
    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApiKey, RequestFrame};
    use proptest::prelude::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_request_encode_read() {
        let codec = FrameCodec::new();
        let header = RequestHeader::new(ApiKey::Metadata, 0, 5, "test");
        let encoded = codec.encode_request(&header, b"body").unwrap();

        let mut reader = FrameCodec::new();
        let mut cursor = Cursor::new(encoded);
        let raw = reader.read_frame(&mut cursor).await.unwrap().unwrap();
        let frame = RequestFrame::parse(raw).unwrap();

        assert_eq!(frame.header, header);
        assert_eq!(frame.body, Bytes::from_static(b"body"));
    }

    #[tokio::test]
    async fn test_write_read_response() {
        let codec = FrameCodec::new();
        let frame = ResponseFrame::new(99, Bytes::from("response"));
        let encoded = codec.encode_response(&frame).unwrap();

        let mut buffer = Vec::new();
        codec.write_frame(&mut buffer, &encoded).await.unwrap();

        let mut reader = FrameCodec::new();
        let mut cursor = Cursor::new(buffer);
        let decoded = reader.read_response(&mut cursor).await.unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_partial_frame_reading() {
        let codec = FrameCodec::new();
        let encoded = codec
            .encode_response(&ResponseFrame::new(1, Bytes::from("test")))
            .unwrap();

        let mut reader = FrameCodec::new();
        let mid = encoded.len() / 2;
        reader.read_buf.extend_from_slice(&encoded[..mid]);
        assert!(reader.try_decode_frame().unwrap().is_none());

        reader.read_buf.extend_from_slice(&encoded[mid..]);
        let raw = reader.try_decode_frame().unwrap().unwrap();
        let frame = ResponseFrame::parse(raw).unwrap();
        assert_eq!(frame.correlation_id, 1);
        assert_eq!(frame.payload, Bytes::from("test"));
        assert_eq!(reader.buffer_size(), 0);
    }

    #[tokio::test]
    async fn test_multiple_frames_in_buffer() {
        let codec = FrameCodec::new();
        let first = ResponseFrame::new(1, Bytes::from("first"));
        let second = ResponseFrame::new(2, Bytes::from("second"));

        let mut combined = BytesMut::new();
        combined.extend_from_slice(&codec.encode_response(&first).unwrap());
        combined.extend_from_slice(&codec.encode_response(&second).unwrap());

        let mut reader = FrameCodec::new();
        let mut cursor = Cursor::new(combined.freeze());

        assert_eq!(reader.read_response(&mut cursor).await.unwrap(), Some(first));
        assert_eq!(reader.read_response(&mut cursor).await.unwrap(), Some(second));
        assert_eq!(reader.read_response(&mut cursor).await.unwrap(), None);
    }

    #[test]
    fn test_frame_too_large_on_encode() {
        let codec = FrameCodec::with_max_frame_size(100);
        let frame = ResponseFrame::new(1, Bytes::from(vec![0u8; 200]));

        let result = codec.encode_response(&frame);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { size: 204, max: 100 })));
    }

    #[tokio::test]
    async fn test_frame_too_large_on_read() {
        let mut data = BytesMut::new();
        data.put_u32(1_000);
        data.put_slice(&[0u8; 16]);

        let mut reader = FrameCodec::with_max_frame_size(100);
        let mut cursor = Cursor::new(data.freeze());
        let result = reader.read_frame(&mut cursor).await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { size: 1_000, .. })));
    }

    #[tokio::test]
    async fn test_negative_size_prefix() {
        let mut data = BytesMut::new();
        data.put_i32(-1);

        let mut reader = FrameCodec::new();
        let mut cursor = Cursor::new(data.freeze());
        let result = reader.read_frame(&mut cursor).await;
        assert!(matches!(result, Err(ProtocolError::InvalidFrame)));
    }

    #[tokio::test]
    async fn test_eof_mid_frame() {
        let codec = FrameCodec::new();
        let encoded = codec
            .encode_response(&ResponseFrame::new(3, Bytes::from("cut short")))
            .unwrap();

        let mut reader = FrameCodec::new();
        let mut cursor = Cursor::new(encoded.slice(..encoded.len() - 2));
        let result = reader.read_frame(&mut cursor).await;
        assert!(matches!(result, Err(ProtocolError::InvalidFrame)));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mut reader = FrameCodec::new();
        let mut cursor = Cursor::new(Vec::<u8>::new());

        let result = reader.read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    proptest! {
        #[test]
        fn test_response_roundtrip_properties(
            correlation_id in any::<i32>(),
            payload in prop::collection::vec(any::<u8>(), 0..1000)
        ) {
            tokio_test::block_on(async {
                let codec = FrameCodec::new();
                let frame = ResponseFrame::new(correlation_id, Bytes::from(payload));
                let encoded = codec.encode_response(&frame)?;

                let mut reader = FrameCodec::new();
                let mut cursor = Cursor::new(encoded);
                let decoded = reader.read_response(&mut cursor).await?.unwrap();

                prop_assert_eq!(frame, decoded);
                Ok(())
            })?;
        }
    }
}
