//! Raw SWAP frame parsing and serialization.
//!
//! A frame is a 7-byte header followed by the register value:
//! `dest, src, control, nonce, function, reg_addr, reg_id, value...`.
//! Query frames carry no value; every other function carries at least one
//! value byte. Frame integrity (CRC) is the radio driver's responsibility
//! and is reported out of band, so there is no checksum here.

extern crate alloc;
use alloc::vec::Vec;

use crate::constants::{Function, MTU, SWAP_HEADER_SIZE, SWAP_VALUE_MAX};
use crate::error::PacketError;
use crate::packet::control::{Control, Security};
use crate::types::{DeviceAddress, Nonce, RegisterId};

/// A decoded SWAP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub dest: DeviceAddress,
    pub src: DeviceAddress,
    pub control: Control,
    pub nonce: Nonce,
    pub function: Function,
    /// Address of the node owning the register. Equals `src` (status/info)
    /// or `dest` (command/query) on networks without data recording.
    pub reg_addr: DeviceAddress,
    pub reg_id: RegisterId,
    pub value: Vec<u8>,
}

impl Packet {
    /// Parse a raw frame received from the radio.
    pub fn parse(raw: &[u8]) -> Result<Self, PacketError> {
        if raw.len() < SWAP_HEADER_SIZE {
            return Err(PacketError::TooShort {
                min: SWAP_HEADER_SIZE,
                actual: raw.len(),
            });
        }
        if raw.len() > MTU {
            return Err(PacketError::ValueTooLong {
                max: SWAP_VALUE_MAX,
                actual: raw.len() - SWAP_HEADER_SIZE,
            });
        }

        let function = Function::from_u8(raw[4])?;

        // Queries carry no value; everything else carries the register value.
        if function != Function::Query && raw.len() < SWAP_HEADER_SIZE + 1 {
            return Err(PacketError::TooShort {
                min: SWAP_HEADER_SIZE + 1,
                actual: raw.len(),
            });
        }

        Ok(Packet {
            dest: DeviceAddress::new(raw[0]),
            src: DeviceAddress::new(raw[1]),
            control: Control::from_byte(raw[2]),
            nonce: Nonce::new(raw[3]),
            function,
            reg_addr: DeviceAddress::new(raw[5]),
            reg_id: RegisterId::new(raw[6]),
            value: raw[SWAP_HEADER_SIZE..].to_vec(),
        })
    }

    /// Serialize the packet back to wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(SWAP_HEADER_SIZE + self.value.len());
        result.push(self.dest.as_u8());
        result.push(self.src.as_u8());
        result.push(self.control.to_byte());
        result.push(self.nonce.as_u8());
        result.push(self.function as u8);
        result.push(self.reg_addr.as_u8());
        result.push(self.reg_id.as_u8());
        result.extend_from_slice(&self.value);
        result
    }

    /// Build a Command writing `value` into a register on `dest`.
    pub fn command(
        dest: DeviceAddress,
        src: DeviceAddress,
        security: Security,
        nonce: Nonce,
        reg_id: RegisterId,
        value: Vec<u8>,
    ) -> Self {
        Packet {
            dest,
            src,
            control: Control { hop: 0, security },
            nonce,
            function: Function::Command,
            reg_addr: dest,
            reg_id,
            value,
        }
    }

    /// Build a Query asking `dest` for a register value.
    pub fn query(
        dest: DeviceAddress,
        src: DeviceAddress,
        security: Security,
        nonce: Nonce,
        reg_id: RegisterId,
    ) -> Self {
        Packet {
            dest,
            src,
            control: Control { hop: 0, security },
            nonce,
            function: Function::Query,
            reg_addr: dest,
            reg_id,
            value: Vec::new(),
        }
    }

    /// Build a broadcast Status carrying one of our register values.
    pub fn status(
        src: DeviceAddress,
        security: Security,
        nonce: Nonce,
        reg_id: RegisterId,
        value: Vec<u8>,
    ) -> Self {
        Packet {
            dest: DeviceAddress::BROADCAST,
            src,
            control: Control { hop: 0, security },
            nonce,
            function: Function::Status,
            reg_addr: src,
            reg_id,
            value,
        }
    }

    /// Build a broadcast Info announcing one of our register values.
    pub fn info(
        src: DeviceAddress,
        security: Security,
        nonce: Nonce,
        reg_id: RegisterId,
        value: Vec<u8>,
    ) -> Self {
        Packet {
            dest: DeviceAddress::BROADCAST,
            src,
            control: Control { hop: 0, security },
            nonce,
            function: Function::Info,
            reg_addr: src,
            reg_id,
            value,
        }
    }
}
