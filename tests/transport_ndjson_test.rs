//! NDJSON transport integration tests (SPEC_FULL §4.1, §10.4).
//!
//! Exercises `NdjsonTransport` over a real `tokio::io::duplex` pair rather
//! than stdio, so a test can act as "the peer" on both ends.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use tokio_util::sync::CancellationToken;

use cowgnition::error::CowGnitionError;
use cowgnition::transport::ndjson::NdjsonTransport;
use cowgnition::transport::{Transport, MAX_MESSAGE_BYTES};

fn no_cancel() -> CancellationToken {
    CancellationToken::new()
}

fn build_pair() -> (
    NdjsonTransport<tokio::io::DuplexStream, tokio::io::DuplexStream>,
    tokio::io::DuplexStream,
    tokio::io::DuplexStream,
) {
    let (peer_write, transport_read) = tokio::io::duplex(4 * 1024 * 1024);
    let (transport_write, peer_read) = tokio::io::duplex(4 * 1024 * 1024);
    let transport = NdjsonTransport::new(transport_read, transport_write);
    (transport, peer_write, peer_read)
}

#[tokio::test]
async fn read_message_decodes_one_ndjson_line() {
    let (transport, mut peer_write, _peer_read) = build_pair();

    let line = format!("{}\n", json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
    peer_write.write_all(line.as_bytes()).await.unwrap();

    let message = transport.read_message(&no_cancel()).await.unwrap();
    assert_eq!(message["method"], "ping");
    assert_eq!(message["id"], 1);
}

#[tokio::test]
async fn write_message_round_trips_through_the_peer() {
    let (transport, _peer_write, mut peer_read) = build_pair();

    let outgoing = json!({"jsonrpc": "2.0", "id": 2, "result": {"ok": true}});
    transport.write_message(&outgoing, &no_cancel()).await.unwrap();

    let mut buf = vec![0u8; 1024];
    let n = peer_read.read(&mut buf).await.unwrap();
    let line = String::from_utf8(buf[..n].to_vec()).unwrap();
    let decoded: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(decoded, outgoing);
}

#[tokio::test]
async fn close_is_idempotent_and_unblocks_pending_reads() {
    let (transport, _peer_write, _peer_read) = build_pair();
    let transport = Arc::new(transport);

    transport.close().await.unwrap();
    transport.close().await.unwrap();

    let result = transport.read_message(&no_cancel()).await;
    assert!(matches!(result, Err(CowGnitionError::Transport(_))));
}

#[tokio::test]
async fn oversized_message_is_rejected() {
    let (transport, mut peer_write, _peer_read) = build_pair();

    let huge_string = "x".repeat(MAX_MESSAGE_BYTES + 16);
    let line = format!("{}\n", json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": huge_string}));
    peer_write.write_all(line.as_bytes()).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), transport.read_message(&no_cancel()))
        .await
        .expect("read_message should not hang on an oversized frame");
    assert!(result.is_err());
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let (transport, mut peer_write, _peer_read) = build_pair();
    peer_write.write_all(b"{not valid json}\n").await.unwrap();

    let result = transport.read_message(&no_cancel()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn caller_supplied_cancellation_aborts_a_pending_read_through_the_trait() {
    // Nothing ever arrives on `peer_write`, so this would hang forever
    // without an independently-driven cancellation (invariant 3).
    let (transport, _peer_write, _peer_read) = build_pair();
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let cancellation = CancellationToken::new();
    let canceller = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), transport.read_message(&cancellation))
        .await
        .expect("read_message must return once cancellation fires, not hang");
    assert!(result.is_err());
}
