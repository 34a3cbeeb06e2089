//! Stream transport behavior between two live nodes.

mod common;

use std::time::Duration;

use common::{config, spawn_node, TestNode};

use swap_node::radio::channel_hub;

/// Read exactly `n` bytes from a node's stream, with a deadline.
async fn read_exact(node: &TestNode, n: usize) -> Vec<u8> {
    let stream = node.handle.stream();
    tokio::time::timeout(Duration::from_secs(5), async move {
        let mut collected = Vec::with_capacity(n);
        let mut buf = [0u8; 64];
        while collected.len() < n {
            let read = stream.read(&mut buf).await;
            collected.extend_from_slice(&buf[..read]);
        }
        collected
    })
    .await
    .expect("timed out reading stream")
}

#[tokio::test]
async fn test_short_message_delivered() {
    let hub = channel_hub();
    let a = spawn_node(&hub, config(1));
    let b = spawn_node(&hub, config(2));

    a.handle.stream().write(b"hello swap").await;
    // Below a full chunk: the auto-flush timer sends it.
    let received = read_exact(&b, 10).await;
    assert_eq!(received, b"hello swap");
}

#[tokio::test]
async fn test_multi_chunk_transfer_in_order() {
    let hub = channel_hub();
    let a = spawn_node(&hub, config(1));
    let b = spawn_node(&hub, config(2));

    // More than two chunks and more than the send buffer.
    let payload: Vec<u8> = (0..200u16).map(|v| (v % 251) as u8).collect();
    let writer = {
        let stream = a.handle.stream();
        let payload = payload.clone();
        tokio::spawn(async move {
            stream.write(&payload).await;
            stream.flush().await;
        })
    };

    let received = read_exact(&b, payload.len()).await;
    assert_eq!(received, payload);
    writer.await.unwrap();
}

#[tokio::test]
async fn test_lost_chunk_recovered_by_peer_status() {
    let hub = channel_hub();
    let a = spawn_node(&hub, config(1));
    let b = spawn_node(&hub, config(2));

    // Lose the first transmission of A's chunk.
    a.loss.drop_next(1);
    a.handle.stream().write(b"resend me").await;
    a.handle.stream().flush().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(b.handle.stream().available(), 0, "first transmission lost");

    // B sends a byte of its own; its Status carries a stale ack, which
    // makes A retransmit the lost chunk.
    b.handle.stream().write(&[0xEE]).await;
    b.handle.stream().flush().await;

    let received = read_exact(&b, 9).await;
    assert_eq!(received, b"resend me");
    let received = read_exact(&a, 1).await;
    assert_eq!(received, vec![0xEE]);
}

#[tokio::test]
async fn test_write_backpressure_blocks_until_acknowledged() {
    let hub = channel_hub();
    let a = spawn_node(&hub, config(1));
    let b = spawn_node(&hub, config(2));

    // Take B off the air so nothing gets acknowledged.
    b.handle.sleep_for(Duration::from_millis(500)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let payload = vec![0x42u8; 100];
    let writer = {
        let stream = a.handle.stream();
        let payload = payload.clone();
        tokio::spawn(async move { stream.write(&payload).await })
    };

    // 100 bytes cannot fit the 64-byte send buffer; with no peer the
    // writer must stay blocked, and no byte may be dropped.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!writer.is_finished(), "writer should be blocked");

    // B wakes and nudges the stream; retransmission drains the backlog and
    // the writer completes.
    tokio::time::sleep(Duration::from_millis(400)).await;
    b.handle.stream().write(&[0x01]).await;
    b.handle.stream().flush().await;

    tokio::time::timeout(Duration::from_secs(5), writer)
        .await
        .expect("writer should unblock")
        .unwrap();

    let received = read_exact(&b, payload.len()).await;
    assert_eq!(received, payload);
}

#[tokio::test]
async fn test_duplex_streams_do_not_interfere() {
    let hub = channel_hub();
    let a = spawn_node(&hub, config(1));
    let b = spawn_node(&hub, config(2));

    let to_b: Vec<u8> = (0..80).collect();
    let to_a: Vec<u8> = (100..180).collect();

    let writer_a = {
        let stream = a.handle.stream();
        let data = to_b.clone();
        tokio::spawn(async move {
            stream.write(&data).await;
            stream.flush().await;
        })
    };
    let writer_b = {
        let stream = b.handle.stream();
        let data = to_a.clone();
        tokio::spawn(async move {
            stream.write(&data).await;
            stream.flush().await;
        })
    };

    let received_b = read_exact(&b, to_b.len()).await;
    let received_a = read_exact(&a, to_a.len()).await;
    assert_eq!(received_b, to_b);
    assert_eq!(received_a, to_a);
    writer_a.await.unwrap();
    writer_b.await.unwrap();
}
