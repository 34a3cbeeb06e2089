//! Wire-level building blocks for the SWAP protocol.
//!
//! SWAP is a register-oriented application protocol for low-power wireless
//! nodes sharing a sub-GHz channel. This crate covers the parts every node
//! agrees on at the byte level: the packet layout, the function codes, the
//! hop/security control byte, and the newtype wrappers for protocol fields.
//! Everything stateful (register tables, dispatch, repeating, streams) lives
//! in `swap-transport`.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod constants;
pub mod error;
pub mod packet;
pub mod types;

pub use constants::{Function, SystemState, MTU, SWAP_HEADER_SIZE, SWAP_VALUE_MAX};
pub use error::PacketError;
pub use packet::control::{Control, Security};
pub use packet::wire::Packet;
pub use types::{DeviceAddress, Nonce, RegisterId};
