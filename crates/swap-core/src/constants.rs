//! Protocol constants and enumerations for the SWAP protocol.

use crate::error::PacketError;

/// Maximum raw frame size the radio will carry.
pub const MTU: usize = 61;

/// Fixed SWAP header: dest, src, control, nonce, function, reg_addr, reg_id.
pub const SWAP_HEADER_SIZE: usize = 7;

/// Maximum register value length in a single frame.
pub const SWAP_VALUE_MAX: usize = MTU - SWAP_HEADER_SIZE;

// Standard register ids, common to every SWAP device. Assignment order is
// wire compatibility: these numbers never change.
pub const REG_PRODUCT_CODE: u8 = 0;
pub const REG_HW_VERSION: u8 = 1;
pub const REG_FW_VERSION: u8 = 2;
pub const REG_SYSTEM_STATE: u8 = 3;
pub const REG_FREQ_CHANNEL: u8 = 4;
pub const REG_SECU_OPTION: u8 = 5;
pub const REG_SECU_PASSWORD: u8 = 6;
pub const REG_SECU_NONCE: u8 = 7;
pub const REG_NETWORK_ID: u8 = 8;
pub const REG_DEVICE_ADDR: u8 = 9;
pub const REG_TX_INTERVAL: u8 = 10;

/// First register id available to device-specific registers.
pub const REG_FIRST_CUSTOM: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Function {
    /// Write a register on the destination node.
    Command = 0,
    /// Ask the destination node for a register value.
    Query = 1,
    /// Unsolicited broadcast of a register value.
    Info = 2,
    /// Register value carried in reply to a Command/Query, or as a stream
    /// acknowledgement.
    Status = 3,
}

impl Function {
    pub fn from_u8(v: u8) -> Result<Self, PacketError> {
        match v {
            0 => Ok(Function::Command),
            1 => Ok(Function::Query),
            2 => Ok(Function::Info),
            3 => Ok(Function::Status),
            _ => Err(PacketError::InvalidFunction(v)),
        }
    }
}

/// Values carried by the system-state register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SystemState {
    Restart = 0,
    RxOn = 1,
    RxOff = 2,
    Sync = 3,
}

impl SystemState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SystemState::Restart),
            1 => Some(SystemState::RxOn),
            2 => Some(SystemState::RxOff),
            3 => Some(SystemState::Sync),
            _ => None,
        }
    }
}
