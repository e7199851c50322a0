//! Frame structure and header parsing
//!
//! Every frame on the wire is `[i32 size][frame bytes]`. The size prefix is
//! handled by [`FrameCodec`](crate::FrameCodec); the types here describe the
//! bytes that follow it.

use crate::{ApiKey, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Numeric tag that pairs a request with its response
pub type CorrelationId = i32;

/// Header written in front of every request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    /// Which RPC this request invokes
    pub api_key: ApiKey,
    /// Version of the RPC body layout
    pub api_version: i16,
    /// Tag echoed back by the broker in the response frame
    pub correlation_id: CorrelationId,
    /// Free-form client identifier
    pub client_id: String,
}

impl RequestHeader {
    /// Create a new request header
    pub fn new(
        api_key: ApiKey,
        api_version: i16,
        correlation_id: CorrelationId,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key,
            api_version,
            correlation_id,
            client_id: client_id.into(),
        }
    }

    /// Number of bytes the header occupies on the wire
    pub fn encoded_len(&self) -> usize {
        2 + 2 + 4 + 2 + self.client_id.len()
    }

    /// Append the header to `buf`
    pub fn put(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let client_id_len = i16::try_from(self.client_id.len()).map_err(|_| {
            ProtocolError::Serialization(format!(
                "client id too long: {} bytes",
                self.client_id.len()
            ))
        })?;

        buf.put_i16(self.api_key as i16);
        buf.put_i16(self.api_version);
        buf.put_i32(self.correlation_id);
        buf.put_i16(client_id_len);
        buf.put_slice(self.client_id.as_bytes());
        Ok(())
    }

    fn parse(raw: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure(raw, 10)?;
        let api_key = ApiKey::try_from(raw.get_i16())?;
        let api_version = raw.get_i16();
        let correlation_id = raw.get_i32();
        let client_id_len = raw.get_i16();

        // A negative length is a null string
        let client_id = if client_id_len < 0 {
            String::new()
        } else {
            let len = client_id_len as usize;
            ensure(raw, len)?;
            let bytes = raw.split_to(len);
            String::from_utf8(bytes.to_vec())
                .map_err(|e| ProtocolError::Serialization(format!("client id: {}", e)))?
        };

        Ok(Self {
            api_key,
            api_version,
            correlation_id,
            client_id,
        })
    }
}

/// A request frame split into header and body
#[derive(Debug, Clone)]
pub struct RequestFrame {
    /// Parsed request header
    pub header: RequestHeader,
    /// Encoded request body
    pub body: Bytes,
}

impl RequestFrame {
    /// Split a raw frame (without size prefix) into header and body
    pub fn parse(mut raw: Bytes) -> Result<Self, ProtocolError> {
        let header = RequestHeader::parse(&mut raw)?;
        Ok(Self { header, body: raw })
    }
}

/// A response frame as read off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Tag copied from the request this frame answers
    pub correlation_id: CorrelationId,
    /// Encoded response body, opaque until decoded by the caller
    pub payload: Bytes,
}

impl ResponseFrame {
    /// Create a new response frame
    pub fn new(correlation_id: CorrelationId, payload: Bytes) -> Self {
        Self {
            correlation_id,
            payload,
        }
    }

    /// Split a raw frame (without size prefix) into correlation id and payload
    pub fn parse(mut raw: Bytes) -> Result<Self, ProtocolError> {
        ensure(&raw, 4)?;
        let correlation_id = raw.get_i32();
        Ok(Self {
            correlation_id,
            payload: raw,
        })
    }
}

fn ensure(raw: &Bytes, needed: usize) -> Result<(), ProtocolError> {
    if raw.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            available: raw.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(header: &RequestHeader) -> Bytes {
        let mut buf = BytesMut::with_capacity(header.encoded_len());
        header.put(&mut buf).unwrap();
        buf.freeze()
    }

    #[test]
    fn test_request_header_layout() {
        let header = RequestHeader::new(ApiKey::Metadata, 0, 7, "client");
        let bytes = header_bytes(&header);

        assert_eq!(bytes.len(), header.encoded_len());
        assert_eq!(&bytes[..2], &3i16.to_be_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_be_bytes());
        assert_eq!(&bytes[8..10], &6i16.to_be_bytes());
        assert_eq!(&bytes[10..], b"client");
    }

    #[test]
    fn test_request_frame_parse() {
        let header = RequestHeader::new(ApiKey::Fetch, 1, 42, "fetcher");
        let mut buf = BytesMut::new();
        header.put(&mut buf).unwrap();
        buf.put_slice(b"body");

        let frame = RequestFrame::parse(buf.freeze()).unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.body, Bytes::from_static(b"body"));
    }

    #[test]
    fn test_null_client_id() {
        let mut buf = BytesMut::new();
        buf.put_i16(ApiKey::Produce as i16);
        buf.put_i16(0);
        buf.put_i32(9);
        buf.put_i16(-1);

        let frame = RequestFrame::parse(buf.freeze()).unwrap();
        assert_eq!(frame.header.client_id, "");
        assert_eq!(frame.header.correlation_id, 9);
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_unknown_api_key() {
        let mut buf = BytesMut::new();
        buf.put_i16(77);
        buf.put_i16(0);
        buf.put_i32(1);
        buf.put_i16(0);

        let result = RequestFrame::parse(buf.freeze());
        assert!(matches!(result, Err(ProtocolError::UnknownApiKey(77))));
    }

    #[test]
    fn test_truncated_client_id() {
        let mut buf = BytesMut::new();
        buf.put_i16(ApiKey::Metadata as i16);
        buf.put_i16(0);
        buf.put_i32(1);
        buf.put_i16(20);
        buf.put_slice(b"short");

        let result = RequestFrame::parse(buf.freeze());
        assert!(matches!(
            result,
            Err(ProtocolError::Truncated { needed: 20, available: 5 })
        ));
    }

    #[test]
    fn test_response_frame_parse() {
        let mut buf = BytesMut::new();
        buf.put_i32(1234);
        buf.put_slice(b"payload");

        let frame = ResponseFrame::parse(buf.freeze()).unwrap();
        assert_eq!(frame.correlation_id, 1234);
        assert_eq!(frame.payload, Bytes::from_static(b"payload"));
    }

    #[test]
    fn test_response_frame_too_short() {
        let result = ResponseFrame::parse(Bytes::from_static(&[0, 1]));
        assert!(matches!(result, Err(ProtocolError::Truncated { needed: 4, .. })));
    }
}
