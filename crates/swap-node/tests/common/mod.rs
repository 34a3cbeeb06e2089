//! Shared harness for node integration tests: an in-memory shared channel,
//! node spawning with captured Status/Info callbacks, and timeout helpers.
#![allow(dead_code)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use swap_core::packet::wire::Packet;
use swap_node::radio::{ChannelHub, ChannelRadio, LossControl, Radio, RadioFrame};
use swap_node::{Node, NodeConfig};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Config for a test node: no persistence, fast auto-flush.
pub fn config(address: u8) -> NodeConfig {
    NodeConfig::parse(&format!(
        r#"
[device]
address = {address}
enable_storage = false

[stream]
autoflush_ms = 20
"#
    ))
    .unwrap()
}

/// Config for a test repeater node.
pub fn repeater_config(address: u8, max_hop: u8) -> NodeConfig {
    NodeConfig::parse(&format!(
        r#"
[device]
address = {address}
enable_storage = false

[repeater]
enabled = true
max_hop = {max_hop}
"#
    ))
    .unwrap()
}

pub struct TestNode {
    pub handle: swap_node::NodeHandle,
    pub loss: LossControl,
    pub statuses: mpsc::UnboundedReceiver<Packet>,
    pub infos: mpsc::UnboundedReceiver<Packet>,
    pub task: JoinHandle<()>,
}

/// Spawn a node on the shared channel, capturing its Status/Info callbacks.
pub fn spawn_node(hub: &ChannelHub, config: NodeConfig) -> TestNode {
    let (frames_tx, frames_rx) = mpsc::channel(1024);
    let radio = hub.join(frames_tx);
    let loss = radio.loss_control();
    let mut node = Node::new(config, Box::new(radio), frames_rx).unwrap();

    let (status_tx, statuses) = mpsc::unbounded_channel();
    node.on_status(Box::new(move |p| {
        let _ = status_tx.send(p.clone());
    }));
    let (info_tx, infos) = mpsc::unbounded_channel();
    node.on_info(Box::new(move |p| {
        let _ = info_tx.send(p.clone());
    }));

    let handle = node.handle();
    let task = tokio::spawn(node.run());
    TestNode {
        handle,
        loss,
        statuses,
        infos,
        task,
    }
}

/// A bare radio with address filtering off: sees every frame on the
/// channel, and can inject raw frames.
pub fn sniffer(hub: &ChannelHub) -> (ChannelRadio, mpsc::Receiver<RadioFrame>) {
    let (tx, rx) = mpsc::channel(1024);
    let mut radio = hub.join(tx);
    radio.set_address_check(false);
    // Tune to the default network the test nodes use, so the sniffer hears
    // (and can inject onto) their channel rather than the bare default.
    radio.set_channel(0);
    radio.set_sync_word(0xB547u16.to_be_bytes());
    (radio, rx)
}

/// Receive one captured packet or panic after the timeout.
pub async fn recv_packet(rx: &mut mpsc::UnboundedReceiver<Packet>) -> Packet {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for packet")
        .expect("packet channel closed")
}

/// Drain every frame the sniffer hears within `window`.
pub async fn sniff_window(rx: &mut mpsc::Receiver<RadioFrame>, window: Duration) -> Vec<Packet> {
    let mut packets = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(frame)) => {
                if let Ok(packet) = Packet::parse(&frame.bytes) {
                    packets.push(packet);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    packets
}
