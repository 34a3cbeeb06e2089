//! The standard register set shared by every SWAP device.
//!
//! Ids 0..=10 are the standard block; the stream transport register is the
//! first custom id. The critical registers (channel, network id, device
//! address) broadcast their pre-change value before committing, then ask
//! for a full device reset, so peers can track the transition instead of
//! losing the node mid-update.

use swap_core::constants::{
    SystemState, REG_DEVICE_ADDR, REG_FIRST_CUSTOM, REG_FREQ_CHANNEL, REG_NETWORK_ID,
    REG_SECU_OPTION, REG_TX_INTERVAL,
};
use swap_core::types::RegisterId;
use swap_transport::registers::{RegisterTable, SetDecision};
use swap_transport::stream::STREAM_REG_LEN;

use crate::storage::DeviceSettings;

/// Register id of the stream transport register.
pub const REG_STREAM: u8 = REG_FIRST_CUSTOM;

/// Manufacturer id baked into the product code register.
pub const MANUFACTURER_ID: u32 = 0x0000_0001;

/// Product id baked into the product code register.
pub const PRODUCT_ID: u32 = 0x0000_0001;

/// Hardware version reported by the version register.
pub const HARDWARE_VERSION: u32 = 0x0000_0100;

/// Firmware version reported by the version register.
pub const FIRMWARE_VERSION: u32 = 0x0000_0100;

fn read_only() -> SetDecision {
    SetDecision::reject()
}

/// Build the register table for this device class, seeded from the
/// persisted settings. Registration order is the wire contract; do not
/// reorder.
pub fn build_register_table(settings: &DeviceSettings) -> RegisterTable {
    let mut table = RegisterTable::new();

    // 0: product code (manufacturer + product id).
    let mut product = Vec::with_capacity(8);
    product.extend_from_slice(&MANUFACTURER_ID.to_be_bytes());
    product.extend_from_slice(&PRODUCT_ID.to_be_bytes());
    table.register(product, None, Some(Box::new(|_, _| read_only())));

    // 1: hardware version.
    table.register(
        HARDWARE_VERSION.to_be_bytes().to_vec(),
        None,
        Some(Box::new(|_, _| read_only())),
    );

    // 2: firmware version.
    table.register(
        FIRMWARE_VERSION.to_be_bytes().to_vec(),
        None,
        Some(Box::new(|_, _| read_only())),
    );

    // 3: system state. Commanding Restart resets the node.
    table.register(
        vec![SystemState::RxOn as u8],
        None,
        Some(Box::new(|_, incoming| {
            match SystemState::from_u8(incoming[0]) {
                Some(SystemState::Restart) => SetDecision {
                    accept: true,
                    announce_prior: false,
                    reset: true,
                },
                Some(_) => SetDecision::accept(),
                None => SetDecision::reject(),
            }
        })),
    );

    // 4: frequency channel. Critical: announce, apply, reset.
    table.register(
        vec![settings.channel],
        None,
        Some(Box::new(|current, incoming| {
            if incoming == current {
                SetDecision::reject()
            } else {
                SetDecision {
                    accept: true,
                    announce_prior: true,
                    reset: true,
                }
            }
        })),
    );

    // 5: security option. Announced, applied without reset.
    table.register(
        vec![settings.security],
        None,
        Some(Box::new(|current, incoming| {
            if incoming == current {
                SetDecision::reject()
            } else {
                SetDecision {
                    accept: true,
                    announce_prior: true,
                    reset: false,
                }
            }
        })),
    );

    // 6: security password (not implemented yet).
    table.register(vec![0], None, None);

    // 7: security nonce, mirrored from the dispatcher's anti-replay latch.
    table.register(vec![0], None, None);

    // 8: network id. Critical: announce, apply, reset.
    table.register(
        settings.network_id.to_vec(),
        None,
        Some(Box::new(|current, incoming| {
            if incoming == current {
                SetDecision::reject()
            } else {
                SetDecision {
                    accept: true,
                    announce_prior: true,
                    reset: true,
                }
            }
        })),
    );

    // 9: device address. Address 0 is broadcast and never a device.
    table.register(
        vec![settings.address],
        None,
        Some(Box::new(|current, incoming| {
            if incoming[0] == 0 || incoming == current {
                SetDecision::reject()
            } else {
                SetDecision {
                    accept: true,
                    announce_prior: true,
                    reset: true,
                }
            }
        })),
    );

    // 10: transmission interval (stream auto-flush period, milliseconds).
    table.register(settings.tx_interval.to_be_bytes().to_vec(), None, None);

    // 11: stream transport register.
    let stream_id = table.register(vec![0; STREAM_REG_LEN], None, None);
    debug_assert_eq!(stream_id, RegisterId::new(REG_STREAM));

    table
}

/// Read the persisted settings back out of the register table, after
/// commands may have rewritten them.
pub fn settings_from_table(table: &RegisterTable) -> DeviceSettings {
    let byte = |id: u8| {
        table
            .value(RegisterId::new(id))
            .and_then(|v| v.first().copied())
            .unwrap_or(0)
    };
    let network_id = table
        .value(RegisterId::new(REG_NETWORK_ID))
        .map(|v| [v[0], v[1]])
        .unwrap_or([0, 0]);
    let tx_interval = table
        .value(RegisterId::new(REG_TX_INTERVAL))
        .map(|v| ((v[0] as u16) << 8) | v[1] as u16)
        .unwrap_or(0);

    DeviceSettings {
        address: byte(REG_DEVICE_ADDR),
        channel: byte(REG_FREQ_CHANNEL),
        security: byte(REG_SECU_OPTION),
        network_id,
        tx_interval,
    }
}
