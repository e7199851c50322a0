//! Request and response message bodies
//!
//! Bodies are MessagePack encoded; the framing around them lives in
//! [`frame`](crate::frame) and [`codec`](crate::codec).

use crate::ProtocolError;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Replica id sent by clients that are not brokers themselves
pub const NON_BROKER_REPLICA_ID: i32 = -1;

/// Numeric identifier of each RPC kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum ApiKey {
    /// Append messages to partitions
    Produce = 0,
    /// Read messages from partitions
    Fetch = 1,
    /// Look up offsets by time
    Offset = 2,
    /// Cluster and topic metadata
    Metadata = 3,
    /// Commit consumer group offsets
    OffsetCommit = 8,
    /// Read committed consumer group offsets
    OffsetFetch = 9,
    /// Locate a consumer group's coordinator
    ConsumerMetadata = 10,
}

impl TryFrom<i16> for ApiKey {
    type Error = ProtocolError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Produce),
            1 => Ok(Self::Fetch),
            2 => Ok(Self::Offset),
            3 => Ok(Self::Metadata),
            8 => Ok(Self::OffsetCommit),
            9 => Ok(Self::OffsetFetch),
            10 => Ok(Self::ConsumerMetadata),
            other => Err(ProtocolError::UnknownApiKey(other)),
        }
    }
}

/// Acknowledgement levels for produce requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
#[repr(i16)]
pub enum RequiredAcks {
    /// Broker sends no response at all
    NoAck = 0,
    /// Respond once the leader has written the messages
    Leader = 1,
    /// Respond once all in-sync replicas have the messages
    All = -1,
}

impl From<RequiredAcks> for i16 {
    fn from(acks: RequiredAcks) -> Self {
        acks as i16
    }
}

impl TryFrom<i16> for RequiredAcks {
    type Error = ProtocolError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NoAck),
            1 => Ok(Self::Leader),
            -1 => Ok(Self::All),
            other => Err(ProtocolError::InvalidRequiredAcks(other)),
        }
    }
}

/// A typed request body that can be sent over a connection
pub trait BrokerRequest: Serialize + DeserializeOwned {
    /// Response type the broker answers with
    type Response: BrokerResponse;

    /// RPC this request invokes
    const API_KEY: ApiKey;

    /// Body layout version
    const API_VERSION: i16 = 0;

    /// Whether the broker will answer this particular request
    fn expects_response(&self) -> bool {
        true
    }

    /// Encode the request body
    fn encode_body(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(rmp_serde::to_vec_named(self)?))
    }

    /// Decode a request body, as a broker would
    fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        Ok(rmp_serde::from_slice(body)?)
    }
}

/// A typed response body
pub trait BrokerResponse: Serialize + DeserializeOwned {
    /// Decode a response payload
    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(rmp_serde::from_slice(payload)?)
    }

    /// Encode the response body, as a broker would
    fn encode_body(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(rmp_serde::to_vec_named(self)?))
    }
}

macro_rules! impl_request {
    ($req:ty => $resp:ty, $key:expr) => {
        impl BrokerResponse for $resp {}

        impl BrokerRequest for $req {
            type Response = $resp;
            const API_KEY: ApiKey = $key;
        }
    };
}

/// Request for broker and topic metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRequest {
    /// Topics to describe; empty means all topics
    pub topics: Vec<String>,
}

/// Broker address as advertised in metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerInfo {
    /// Broker node id
    pub node_id: i32,
    /// Advertised host
    pub host: String,
    /// Advertised port
    pub port: i32,
}

/// Partition layout inside a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    /// Per-partition error code
    pub error_code: i16,
    /// Partition id
    pub partition: i32,
    /// Node id of the leader
    pub leader: i32,
    /// All replicas
    pub replicas: Vec<i32>,
    /// In-sync replicas
    pub isrs: Vec<i32>,
}

/// Topic description returned by metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    /// Per-topic error code
    pub error_code: i16,
    /// Topic name
    pub name: String,
    /// Partitions of the topic
    pub partitions: Vec<PartitionMetadata>,
}

/// Response to [`MetadataRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResponse {
    /// Known brokers
    pub brokers: Vec<BrokerInfo>,
    /// Described topics
    pub topics: Vec<TopicMetadata>,
}

impl_request!(MetadataRequest => MetadataResponse, ApiKey::Metadata);

/// Single message carried by produce and fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Offset assigned by the broker; ignored on produce
    pub offset: i64,
    /// Optional key
    pub key: Option<Bytes>,
    /// Message value
    pub value: Bytes,
}

impl Message {
    /// Create a message for producing
    pub fn new(key: Option<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            offset: 0,
            key,
            value: value.into(),
        }
    }
}

/// Messages destined for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducePartition {
    /// Partition id
    pub partition: i32,
    /// Messages to append
    pub messages: Vec<Message>,
}

/// Messages destined for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceTopic {
    /// Topic name
    pub name: String,
    /// Per-partition payloads
    pub partitions: Vec<ProducePartition>,
}

/// Request to append messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceRequest {
    /// Acknowledgement level; [`RequiredAcks::NoAck`] gets no response
    pub required_acks: RequiredAcks,
    /// How long the broker may wait for acknowledgements
    pub timeout_ms: i32,
    /// Payloads by topic
    pub topics: Vec<ProduceTopic>,
}

/// Per-partition produce outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducePartitionResponse {
    /// Partition id
    pub partition: i32,
    /// Error code, 0 on success
    pub error_code: i16,
    /// Offset of the first appended message
    pub offset: i64,
}

/// Per-topic produce outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceTopicResponse {
    /// Topic name
    pub name: String,
    /// Per-partition results
    pub partitions: Vec<ProducePartitionResponse>,
}

/// Response to [`ProduceRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceResponse {
    /// Results by topic
    pub topics: Vec<ProduceTopicResponse>,
}

impl BrokerResponse for ProduceResponse {}

impl BrokerRequest for ProduceRequest {
    type Response = ProduceResponse;
    const API_KEY: ApiKey = ApiKey::Produce;

    fn expects_response(&self) -> bool {
        self.required_acks != RequiredAcks::NoAck
    }
}

/// Fetch position for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPartition {
    /// Partition id
    pub partition: i32,
    /// First offset to return
    pub fetch_offset: i64,
    /// Upper bound on returned bytes
    pub max_bytes: i32,
}

/// Fetch positions for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTopic {
    /// Topic name
    pub name: String,
    /// Partitions to read
    pub partitions: Vec<FetchPartition>,
}

/// Request to read messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Longest time the broker may block waiting for `min_bytes`
    pub max_wait_ms: i32,
    /// Minimum amount of data to accumulate before answering
    pub min_bytes: i32,
    /// Partitions to read by topic
    pub topics: Vec<FetchTopic>,
}

/// Messages read from one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPartitionResponse {
    /// Partition id
    pub partition: i32,
    /// Error code, 0 on success
    pub error_code: i16,
    /// Offset of the last committed message plus one
    pub high_water_mark: i64,
    /// Messages starting at the requested offset
    pub messages: Vec<Message>,
}

/// Messages read from one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTopicResponse {
    /// Topic name
    pub name: String,
    /// Per-partition messages
    pub partitions: Vec<FetchPartitionResponse>,
}

/// Response to [`FetchRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// Messages by topic
    pub topics: Vec<FetchTopicResponse>,
}

impl_request!(FetchRequest => FetchResponse, ApiKey::Fetch);

/// Offset lookup for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPartition {
    /// Partition id
    pub partition: i32,
    /// Timestamp in ms, or -1 for latest and -2 for earliest
    pub time_ms: i64,
    /// Maximum number of offsets to return
    pub max_offsets: i32,
}

/// Offset lookups for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetTopic {
    /// Topic name
    pub name: String,
    /// Partitions to look up
    pub partitions: Vec<OffsetPartition>,
}

/// Request for offsets by time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRequest {
    /// Always overwritten with [`NON_BROKER_REPLICA_ID`] when sent through a connection
    pub replica_id: i32,
    /// Lookups by topic
    pub topics: Vec<OffsetTopic>,
}

/// Offsets found for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPartitionResponse {
    /// Partition id
    pub partition: i32,
    /// Error code, 0 on success
    pub error_code: i16,
    /// Matching offsets, newest first
    pub offsets: Vec<i64>,
}

/// Offsets found for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetTopicResponse {
    /// Topic name
    pub name: String,
    /// Per-partition offsets
    pub partitions: Vec<OffsetPartitionResponse>,
}

/// Response to [`OffsetRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetResponse {
    /// Offsets by topic
    pub topics: Vec<OffsetTopicResponse>,
}

impl_request!(OffsetRequest => OffsetResponse, ApiKey::Offset);

/// Request to locate a consumer group's coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerMetadataRequest {
    /// Consumer group name
    pub consumer_group: String,
}

/// Response to [`ConsumerMetadataRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerMetadataResponse {
    /// Error code, 0 on success
    pub error_code: i16,
    /// Coordinator node id
    pub coordinator_id: i32,
    /// Coordinator host
    pub coordinator_host: String,
    /// Coordinator port
    pub coordinator_port: i32,
}

impl_request!(ConsumerMetadataRequest => ConsumerMetadataResponse, ApiKey::ConsumerMetadata);

/// Offset to commit for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitPartition {
    /// Partition id
    pub partition: i32,
    /// Offset to store
    pub offset: i64,
    /// Free-form metadata stored with the offset
    pub metadata: String,
}

/// Offsets to commit for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitTopic {
    /// Topic name
    pub name: String,
    /// Partitions to commit
    pub partitions: Vec<OffsetCommitPartition>,
}

/// Request to commit consumer group offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitRequest {
    /// Consumer group name
    pub consumer_group: String,
    /// Offsets by topic
    pub topics: Vec<OffsetCommitTopic>,
}

/// Commit outcome for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitPartitionResponse {
    /// Partition id
    pub partition: i32,
    /// Error code, 0 on success
    pub error_code: i16,
}

/// Commit outcome for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitTopicResponse {
    /// Topic name
    pub name: String,
    /// Per-partition outcome
    pub partitions: Vec<OffsetCommitPartitionResponse>,
}

/// Response to [`OffsetCommitRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitResponse {
    /// Outcome by topic
    pub topics: Vec<OffsetCommitTopicResponse>,
}

impl_request!(OffsetCommitRequest => OffsetCommitResponse, ApiKey::OffsetCommit);

/// Partitions whose committed offsets should be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetFetchTopic {
    /// Topic name
    pub name: String,
    /// Partition ids
    pub partitions: Vec<i32>,
}

/// Request for committed consumer group offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetFetchRequest {
    /// Consumer group name
    pub consumer_group: String,
    /// Partitions by topic
    pub topics: Vec<OffsetFetchTopic>,
}

/// Committed offset of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetFetchPartitionResponse {
    /// Partition id
    pub partition: i32,
    /// Committed offset, -1 if none
    pub offset: i64,
    /// Metadata stored with the offset
    pub metadata: String,
    /// Error code, 0 on success
    pub error_code: i16,
}

/// Committed offsets of one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetFetchTopicResponse {
    /// Topic name
    pub name: String,
    /// Per-partition offsets
    pub partitions: Vec<OffsetFetchPartitionResponse>,
}

/// Response to [`OffsetFetchRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetFetchResponse {
    /// Offsets by topic
    pub topics: Vec<OffsetFetchTopicResponse>,
}

impl_request!(OffsetFetchRequest => OffsetFetchResponse, ApiKey::OffsetFetch);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_values() {
        for key in [
            ApiKey::Produce,
            ApiKey::Fetch,
            ApiKey::Offset,
            ApiKey::Metadata,
            ApiKey::OffsetCommit,
            ApiKey::OffsetFetch,
            ApiKey::ConsumerMetadata,
        ] {
            assert_eq!(ApiKey::try_from(key as i16).unwrap(), key);
        }
        assert!(matches!(ApiKey::try_from(4), Err(ProtocolError::UnknownApiKey(4))));
    }

    #[test]
    fn test_produce_acks_decide_response() {
        let mut req = ProduceRequest {
            required_acks: RequiredAcks::NoAck,
            timeout_ms: 1000,
            topics: vec![],
        };
        assert!(!req.expects_response());

        req.required_acks = RequiredAcks::Leader;
        assert!(req.expects_response());

        req.required_acks = RequiredAcks::All;
        assert!(req.expects_response());
    }

    #[test]
    fn test_required_acks_wire_values() {
        assert_eq!(i16::from(RequiredAcks::NoAck), 0);
        assert_eq!(i16::from(RequiredAcks::Leader), 1);
        assert_eq!(i16::from(RequiredAcks::All), -1);
        assert_eq!(RequiredAcks::try_from(-1).unwrap(), RequiredAcks::All);
        assert!(matches!(
            RequiredAcks::try_from(2),
            Err(ProtocolError::InvalidRequiredAcks(2))
        ));
    }

    #[test]
    fn test_required_acks_encoded_as_integer() {
        let req = ProduceRequest {
            required_acks: RequiredAcks::All,
            timeout_ms: 500,
            topics: vec![],
        };
        let body = req.encode_body().unwrap();
        assert_eq!(ProduceRequest::decode_body(&body).unwrap(), req);

        // Same body with the level swapped for an integer-typed field
        #[derive(Deserialize)]
        struct RawProduce {
            required_acks: i16,
        }
        let raw: RawProduce = rmp_serde::from_slice(&body).unwrap();
        assert_eq!(raw.required_acks, -1);
    }

    #[test]
    fn test_unknown_required_acks_rejected() {
        #[derive(Serialize)]
        struct RawProduce {
            required_acks: i16,
            timeout_ms: i32,
            topics: Vec<ProduceTopic>,
        }
        let body = rmp_serde::to_vec_named(&RawProduce {
            required_acks: 7,
            timeout_ms: 0,
            topics: vec![],
        })
        .unwrap();

        let result = ProduceRequest::decode_body(&body);
        assert!(matches!(result, Err(ProtocolError::Serialization(_))));
    }

    #[test]
    fn test_other_requests_expect_response() {
        assert!(MetadataRequest::default().expects_response());
        assert!(ConsumerMetadataRequest {
            consumer_group: "group".to_string()
        }
        .expects_response());
    }

    #[test]
    fn test_fetch_response_body() {
        let resp = FetchResponse {
            topics: vec![FetchTopicResponse {
                name: "events".to_string(),
                partitions: vec![FetchPartitionResponse {
                    partition: 0,
                    error_code: 0,
                    high_water_mark: 12,
                    messages: vec![Message {
                        offset: 11,
                        key: Some(Bytes::from("k")),
                        value: Bytes::from("v"),
                    }],
                }],
            }],
        };

        let body = resp.encode_body().unwrap();
        assert_eq!(FetchResponse::decode(&body).unwrap(), resp);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = MetadataResponse::decode(&[0xc1, 0xc1, 0xc1]);
        assert!(matches!(result, Err(ProtocolError::Serialization(_))));
    }
}
