//! Newtype wrappers for SWAP protocol fields.
//!
//! Addresses, register ids and nonces are all single bytes on the wire;
//! these types keep them from being mixed up in signatures.

use core::fmt;

/// A one-byte device address. Address 0 is reserved for broadcast.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct DeviceAddress(pub(crate) u8);

impl DeviceAddress {
    /// The reserved broadcast address.
    pub const BROADCAST: DeviceAddress = DeviceAddress(0);

    pub const fn new(addr: u8) -> Self {
        Self(addr)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    pub const fn is_broadcast(&self) -> bool {
        self.0 == 0
    }
}

impl From<u8> for DeviceAddress {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceAddress(0x{:02x})", self.0)
    }
}

/// Index into a node's register table. Stable for the life of the device
/// class: reordering ids breaks wire compatibility.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct RegisterId(pub(crate) u8);

impl RegisterId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl From<u8> for RegisterId {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegisterId({})", self.0)
    }
}

/// Per-node cyclic anti-replay counter, one byte, wrapping.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct Nonce(pub(crate) u8);

impl Nonce {
    pub const fn new(v: u8) -> Self {
        Self(v)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    /// The next nonce in the cycle.
    pub const fn next(&self) -> Nonce {
        Nonce(self.0.wrapping_add(1))
    }
}

impl From<u8> for Nonce {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.0)
    }
}
