//! Multiplexing demo against an in-process broker
//!
//! Starts a tiny broker on a local TCP port that answers metadata requests in
//! reverse order, then issues several requests concurrently over one
//! connection and shows each caller still gets its own answer.
//!
//! Run with `RUST_LOG=debug cargo run --example local_broker`.

use brokerlink::proto::message::{
    MetadataRequest, MetadataResponse, ProduceRequest, TopicMetadata,
};
use brokerlink::proto::{BrokerRequest, BrokerResponse, FrameCodec, RequestFrame, ResponseFrame};
use brokerlink::{Connection, ConnectionConfig};
use std::error::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

const BATCH: usize = 4;

async fn serve(mut stream: TcpStream) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut codec = FrameCodec::new();
    let mut batch = Vec::new();

    while let Some(raw) = codec.read_frame(&mut stream).await? {
        let request = RequestFrame::parse(raw)?;
        if request.header.api_key != MetadataRequest::API_KEY {
            // Anything else is taken as a produce without acks
            continue;
        }
        batch.push(request);

        if batch.len() == BATCH {
            for request in batch.drain(..).rev() {
                let body = MetadataRequest::decode_body(&request.body)?;
                let response = MetadataResponse {
                    brokers: vec![],
                    topics: body
                        .topics
                        .into_iter()
                        .map(|name| TopicMetadata {
                            error_code: 0,
                            name,
                            partitions: vec![],
                        })
                        .collect(),
                };
                let frame = ResponseFrame::new(request.header.correlation_id, response.encode_body()?);
                stream.write_all(&codec.encode_response(&frame)?).await?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Err(e) = serve(stream).await {
                eprintln!("broker error: {}", e);
            }
        }
    });

    let connection = Connection::connect(&addr, ConnectionConfig::default().with_client_id("demo")).await?;
    println!("Connected to local broker at {}", addr);

    let mut calls = Vec::new();
    for i in 0..BATCH {
        let client = connection.clone();
        calls.push(tokio::spawn(async move {
            let topic = format!("topic-{}", i);
            let response = client
                .metadata(&MetadataRequest {
                    topics: vec![topic.clone()],
                })
                .await;
            (topic, response)
        }));
    }

    for call in calls {
        let (topic, response) = call.await?;
        let response = response?;
        println!("asked for {:<8} got {}", topic, response.topics[0].name);
    }

    let acked = connection
        .produce(&ProduceRequest {
            required_acks: brokerlink::proto::RequiredAcks::NoAck,
            timeout_ms: 1000,
            topics: vec![],
        })
        .await?;
    println!("fire-and-forget produce returned {:?}", acked);

    println!("stats: {:?}", connection.stats());
    println!("closed: {}", connection.close().await);
    Ok(())
}
