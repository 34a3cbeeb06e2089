//! End-to-end exchanges between nodes on an in-memory shared channel.

mod common;

use std::time::Duration;

use common::{config, recv_packet, repeater_config, sniffer, sniff_window, spawn_node};

use swap_core::constants::{
    Function, REG_DEVICE_ADDR, REG_FREQ_CHANNEL, REG_NETWORK_ID, REG_PRODUCT_CODE, REG_SECU_NONCE,
    REG_SYSTEM_STATE,
};
use swap_core::packet::control::Security;
use swap_core::packet::wire::Packet;
use swap_core::types::{DeviceAddress, Nonce, RegisterId};
use swap_node::radio::{channel_hub, Radio};
use swap_node::NodeConfig;

#[tokio::test]
async fn test_query_returns_register_value() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));
    let _b = spawn_node(&hub, config(2));

    a.handle
        .send_query(DeviceAddress::new(2), RegisterId::new(REG_NETWORK_ID))
        .await;

    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.function, Function::Status);
    assert_eq!(status.src, DeviceAddress::new(2));
    assert_eq!(status.reg_addr, DeviceAddress::new(2));
    assert_eq!(status.reg_id, RegisterId::new(REG_NETWORK_ID));
    assert_eq!(status.value, vec![0xB5, 0x47]);
}

#[tokio::test]
async fn test_command_applies_and_acks() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));
    let _b = spawn_node(&hub, config(2));

    // Spec scenario: A (0x01) commands B (0x02), register 3, payload [0x01].
    a.handle
        .send_command(
            DeviceAddress::new(2),
            RegisterId::new(REG_SYSTEM_STATE),
            vec![0x01],
        )
        .await;

    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.reg_id, RegisterId::new(REG_SYSTEM_STATE));
    assert_eq!(status.value, vec![0x01]);
    assert_eq!(status.src, DeviceAddress::new(2));
}

#[tokio::test]
async fn test_length_mismatch_echoes_unchanged_value() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));
    let _b = spawn_node(&hub, config(2));

    // Network id register is two bytes; send one.
    a.handle
        .send_command(
            DeviceAddress::new(2),
            RegisterId::new(REG_NETWORK_ID),
            vec![0x99],
        )
        .await;

    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.reg_id, RegisterId::new(REG_NETWORK_ID));
    // The unchanged value, not the attempted one.
    assert_eq!(status.value, vec![0xB5, 0x47]);
}

#[tokio::test]
async fn test_anti_replay_resync_and_retry() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));

    let secured: NodeConfig = NodeConfig::parse(
        r#"
[device]
address = 2
security = 1
enable_storage = false
"#,
    )
    .unwrap();
    let _b = spawn_node(&hub, secured);

    // Command with an arbitrary wrong nonce: B must not apply it and must
    // answer with its authoritative nonce.
    a.handle
        .send_command_with_nonce(
            DeviceAddress::new(2),
            RegisterId::new(REG_SYSTEM_STATE),
            vec![0x02],
            Nonce::new(99),
        )
        .await;
    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.reg_id, RegisterId::new(REG_SECU_NONCE));
    let authoritative = status.value[0];

    // Retry with the corrected nonce: applied, and B's nonce register now
    // equals the nonce we sent.
    let corrected = Nonce::new(authoritative).next();
    a.handle
        .send_command_with_nonce(
            DeviceAddress::new(2),
            RegisterId::new(REG_SYSTEM_STATE),
            vec![0x02],
            corrected,
        )
        .await;
    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.reg_id, RegisterId::new(REG_SYSTEM_STATE));
    assert_eq!(status.value, vec![0x02]);

    a.handle
        .send_query(DeviceAddress::new(2), RegisterId::new(REG_SECU_NONCE))
        .await;
    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.value, vec![corrected.as_u8()]);
}

#[tokio::test]
async fn test_broadcast_product_code_query() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));
    let _b = spawn_node(&hub, config(2));

    a.handle
        .send_query(DeviceAddress::BROADCAST, RegisterId::new(REG_PRODUCT_CODE))
        .await;
    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.reg_id, RegisterId::new(REG_PRODUCT_CODE));
    assert_eq!(status.value.len(), 8);
}

#[tokio::test]
async fn test_broadcast_command_is_ignored() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));
    let _b = spawn_node(&hub, config(2));

    a.handle
        .send_command(
            DeviceAddress::BROADCAST,
            RegisterId::new(REG_SYSTEM_STATE),
            vec![0x02],
        )
        .await;

    // No reply; the register is untouched.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(a.statuses.try_recv().is_err());

    a.handle
        .send_query(DeviceAddress::new(2), RegisterId::new(REG_SYSTEM_STATE))
        .await;
    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.value, vec![0x01]);
}

#[tokio::test]
async fn test_channel_change_announces_prior_value_then_resets() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));
    let _b = spawn_node(&hub, config(2));

    a.handle
        .send_command(
            DeviceAddress::new(2),
            RegisterId::new(REG_FREQ_CHANNEL),
            vec![9],
        )
        .await;

    // Info with the pre-change channel arrives before the ack.
    let info = recv_packet(&mut a.infos).await;
    assert_eq!(info.function, Function::Info);
    assert_eq!(info.reg_id, RegisterId::new(REG_FREQ_CHANNEL));
    assert_eq!(info.value, vec![0]);

    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.value, vec![9]);

    // The restart announcement follows, then B leaves the channel.
    let info = recv_packet(&mut a.infos).await;
    assert_eq!(info.reg_id, RegisterId::new(REG_SYSTEM_STATE));
    assert_eq!(info.value, vec![0]);

    a.handle
        .send_query(DeviceAddress::new(2), RegisterId::new(REG_NETWORK_ID))
        .await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(a.statuses.try_recv().is_err(), "B should be on channel 9");
}

#[tokio::test]
async fn test_address_zero_command_rejected() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));
    let _b = spawn_node(&hub, config(2));

    a.handle
        .send_command(
            DeviceAddress::new(2),
            RegisterId::new(REG_DEVICE_ADDR),
            vec![0],
        )
        .await;
    // Acknowledged with the unchanged address, and no reset happened.
    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.value, vec![2]);
    assert!(a.infos.try_recv().is_err());
}

#[tokio::test]
async fn test_sleeping_node_misses_traffic_until_wake() {
    let hub = channel_hub();
    let mut a = spawn_node(&hub, config(1));
    let b = spawn_node(&hub, config(2));

    b.handle.sleep_for(Duration::from_millis(400)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    a.handle
        .send_query(DeviceAddress::new(2), RegisterId::new(REG_NETWORK_ID))
        .await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(a.statuses.try_recv().is_err(), "B should be asleep");

    // After the wake, queries get answered again.
    tokio::time::sleep(Duration::from_millis(400)).await;
    a.handle
        .send_query(DeviceAddress::new(2), RegisterId::new(REG_NETWORK_ID))
        .await;
    let status = recv_packet(&mut a.statuses).await;
    assert_eq!(status.value, vec![0xB5, 0x47]);
}

// ====================================================================== //
// Repeater behavior
// ====================================================================== //

#[tokio::test]
async fn test_repeater_forwards_with_rewritten_source_and_hop() {
    let hub = channel_hub();
    let a = spawn_node(&hub, config(1));
    let _r = spawn_node(&hub, repeater_config(0x30, 5));
    let (_inject, mut air) = sniffer(&hub);

    // Command addressed to a node that does not exist; only the repeater
    // reacts.
    a.handle
        .send_command_with_nonce(
            DeviceAddress::new(2),
            RegisterId::new(REG_SYSTEM_STATE),
            vec![0x01],
            Nonce::new(7),
        )
        .await;

    let heard = sniff_window(&mut air, Duration::from_millis(300)).await;
    let originals: Vec<_> = heard
        .iter()
        .filter(|p| p.src == DeviceAddress::new(1))
        .collect();
    let repeats: Vec<_> = heard
        .iter()
        .filter(|p| p.src == DeviceAddress::new(0x30))
        .collect();
    assert_eq!(originals.len(), 1);
    assert_eq!(repeats.len(), 1, "exactly one repeat");
    assert_eq!(repeats[0].control.hop, 1);
    assert_eq!(repeats[0].dest, DeviceAddress::new(2));
    assert_eq!(repeats[0].nonce, Nonce::new(7));
    assert_eq!(repeats[0].value, vec![0x01]);
}

#[tokio::test]
async fn test_repeater_suppresses_duplicate_transaction() {
    let hub = channel_hub();
    let a = spawn_node(&hub, config(1));
    let _r = spawn_node(&hub, repeater_config(0x30, 5));
    let (_inject, mut air) = sniffer(&hub);

    let send = |nonce: u8| {
        let handle = a.handle.clone();
        async move {
            handle
                .send_command_with_nonce(
                    DeviceAddress::new(2),
                    RegisterId::new(REG_SYSTEM_STATE),
                    vec![0x01],
                    Nonce::new(nonce),
                )
                .await;
        }
    };

    // Same transaction twice inside the expiry window: one repeat.
    send(7).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    send(7).await;
    // A fresh nonce is a new transaction: repeated again.
    send(8).await;

    let heard = sniff_window(&mut air, Duration::from_millis(300)).await;
    let repeats: Vec<_> = heard
        .iter()
        .filter(|p| p.src == DeviceAddress::new(0x30))
        .collect();
    assert_eq!(repeats.len(), 2);
    assert_eq!(repeats[0].nonce, Nonce::new(7));
    assert_eq!(repeats[1].nonce, Nonce::new(8));
}

#[tokio::test]
async fn test_repeater_honors_hop_limit() {
    let hub = channel_hub();
    let _r = spawn_node(&hub, repeater_config(0x30, 5));
    let (mut inject, mut air) = sniffer(&hub);

    let mut at_limit = Packet::command(
        DeviceAddress::new(2),
        DeviceAddress::new(9),
        Security::default(),
        Nonce::new(3),
        RegisterId::new(REG_SYSTEM_STATE),
        vec![0x01],
    );
    at_limit.control.hop = 5;
    inject.send(&at_limit.serialize()).unwrap();

    let mut below_limit = at_limit.clone();
    below_limit.control.hop = 4;
    below_limit.nonce = Nonce::new(4);
    inject.send(&below_limit.serialize()).unwrap();

    let heard = sniff_window(&mut air, Duration::from_millis(300)).await;
    let repeats: Vec<_> = heard
        .iter()
        .filter(|p| p.src == DeviceAddress::new(0x30))
        .collect();
    assert_eq!(repeats.len(), 1, "only the below-limit packet is repeated");
    assert_eq!(repeats[0].nonce, Nonce::new(4));
    assert_eq!(repeats[0].control.hop, 5);
}

#[tokio::test]
async fn test_repeater_never_repeats_own_traffic() {
    let hub = channel_hub();
    let a = spawn_node(&hub, config(1));
    let _r = spawn_node(&hub, repeater_config(0x30, 5));
    let (_inject, mut air) = sniffer(&hub);

    // Addressed to the repeater itself: answered, not repeated.
    a.handle
        .send_query(DeviceAddress::new(0x30), RegisterId::new(REG_NETWORK_ID))
        .await;

    let heard = sniff_window(&mut air, Duration::from_millis(300)).await;
    let repeated_queries: Vec<_> = heard
        .iter()
        .filter(|p| p.src == DeviceAddress::new(0x30) && p.function == Function::Query)
        .collect();
    assert!(repeated_queries.is_empty());
    // The query reply did go out.
    assert!(heard
        .iter()
        .any(|p| p.src == DeviceAddress::new(0x30) && p.function == Function::Status));
}
