//! The receive state machine: validate an inbound frame and route it.
//!
//! A frame flows: radio → CRC gate → parse → address/nonce/length
//! validation → register operation or event delivery. Every locally
//! originated reply carries a freshly incremented transmit nonce. All
//! failure modes resolve to a drop or a corrective reply here; nothing
//! escalates (the network is lossy by design).

use swap_core::constants::{Function, REG_SECU_NONCE};
use swap_core::packet::control::Security;
use swap_core::packet::wire::Packet;
use swap_core::types::{DeviceAddress, Nonce, RegisterId};

use crate::error::RegisterError;
use crate::registers::RegisterTable;

/// A Status or Info packet surfaced to the application layer (stream
/// transport, observers). The dispatcher never mutates registers for these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketEvent {
    Status(Packet),
    Info(Packet),
}

/// Why an inbound frame produced no register operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// CRC failure or malformed frame.
    Framing,
    /// Broadcast Command, or broadcast Query to anything but the product
    /// code register.
    Addressing,
    /// Frame addressed to another node.
    NotForUs,
    /// `reg_addr` does not match the destination (data recording is
    /// unsupported).
    RegAddrMismatch,
    /// `reg_id` does not resolve to a known register.
    UnknownRegister,
    /// Anti-replay nonce mismatch; the corrective Status was queued.
    NonceMismatch,
    /// Local policy requires encrypted frames and this one is plaintext.
    EncryptionRequired,
    /// Command value length differs from the register length; the Status
    /// echo was queued.
    LengthMismatch,
}

/// Everything the caller must do after one inbound frame.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Packets to transmit, in order.
    pub replies: Vec<Packet>,
    /// Status/Info to hand to registered callbacks.
    pub event: Option<PacketEvent>,
    /// A critical register change requires a full device reset after the
    /// replies have gone out.
    pub reset: bool,
    /// Set when the frame was not applied, for observability.
    pub rejected: Option<DropReason>,
}

impl DispatchOutcome {
    fn drop(reason: DropReason) -> Self {
        DispatchOutcome {
            rejected: Some(reason),
            ..Default::default()
        }
    }
}

/// Receive state machine plus the node's protocol identity.
///
/// Owns the register table, the outbound nonce counter and the anti-replay
/// latch. The anti-replay latch is what the nonce register exposes: the
/// last accepted command nonce, which a sender reads to resynchronize.
pub struct Dispatcher {
    registers: RegisterTable,
    address: DeviceAddress,
    security: Security,
    tx_nonce: Nonce,
    last_rx_nonce: Nonce,
}

impl Dispatcher {
    pub fn new(registers: RegisterTable, address: DeviceAddress, security: Security) -> Self {
        let mut dispatcher = Self {
            registers,
            address,
            security,
            tx_nonce: Nonce::new(0),
            last_rx_nonce: Nonce::new(0),
        };
        dispatcher.mirror_nonce_register();
        dispatcher
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn security(&self) -> Security {
        self.security
    }

    pub fn set_security(&mut self, security: Security) {
        self.security = security;
    }

    pub fn registers(&self) -> &RegisterTable {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterTable {
        &mut self.registers
    }

    /// Last accepted anti-replay nonce (the nonce register value).
    pub fn last_rx_nonce(&self) -> Nonce {
        self.last_rx_nonce
    }

    /// Allocate the nonce for the next locally originated packet.
    pub fn next_nonce(&mut self) -> Nonce {
        self.tx_nonce = self.tx_nonce.next();
        self.tx_nonce
    }

    /// Build a broadcast Status for one of our registers.
    pub fn make_status(&mut self, reg_id: RegisterId, value: Vec<u8>) -> Packet {
        let nonce = self.next_nonce();
        Packet::status(self.address, self.security, nonce, reg_id, value)
    }

    /// Build a broadcast Info for one of our registers.
    pub fn make_info(&mut self, reg_id: RegisterId, value: Vec<u8>) -> Packet {
        let nonce = self.next_nonce();
        Packet::info(self.address, self.security, nonce, reg_id, value)
    }

    /// Process one received frame.
    pub fn handle(&mut self, raw: &[u8], crc_ok: bool) -> DispatchOutcome {
        if !crc_ok {
            tracing::trace!("dropping frame with bad CRC");
            return DispatchOutcome::drop(DropReason::Framing);
        }
        let packet = match Packet::parse(raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::trace!(error = %e, "dropping malformed frame");
                return DispatchOutcome::drop(DropReason::Framing);
            }
        };
        self.handle_packet(&packet)
    }

    /// Process one decoded packet.
    pub fn handle_packet(&mut self, packet: &Packet) -> DispatchOutcome {
        match packet.function {
            Function::Command => self.dispatch_command(packet),
            Function::Query => self.dispatch_query(packet),
            Function::Status => DispatchOutcome {
                event: Some(PacketEvent::Status(packet.clone())),
                ..Default::default()
            },
            Function::Info => DispatchOutcome {
                event: Some(PacketEvent::Info(packet.clone())),
                ..Default::default()
            },
        }
    }

    fn dispatch_command(&mut self, packet: &Packet) -> DispatchOutcome {
        // Broadcasted commands are not allowed.
        if packet.dest.is_broadcast() {
            tracing::debug!(src = %packet.src, "dropping broadcast command");
            return DispatchOutcome::drop(DropReason::Addressing);
        }
        if packet.dest != self.address {
            return DispatchOutcome::drop(DropReason::NotForUs);
        }
        if packet.reg_addr != packet.dest {
            tracing::debug!(
                reg_addr = %packet.reg_addr,
                dest = %packet.dest,
                "dropping command with relayed register address"
            );
            return DispatchOutcome::drop(DropReason::RegAddrMismatch);
        }
        if self.registers.get(packet.reg_id).is_none() {
            tracing::debug!(reg_id = %packet.reg_id, "dropping command for unknown register");
            return DispatchOutcome::drop(DropReason::UnknownRegister);
        }

        // Anti-replay: a secured command must carry the nonce right after
        // the last one we accepted. On mismatch, answer with the
        // authoritative nonce so the sender can resynchronize.
        if self.security.anti_replay {
            let expected = self.last_rx_nonce.next();
            if packet.nonce != expected {
                tracing::debug!(
                    got = %packet.nonce,
                    expected = %expected,
                    "command nonce mismatch, replying with nonce register"
                );
                let nonce_value = self
                    .registers
                    .value(RegisterId::new(REG_SECU_NONCE))
                    .map(<[u8]>::to_vec)
                    .unwrap_or_else(|| vec![self.last_rx_nonce.as_u8()]);
                let reply = self.make_status(RegisterId::new(REG_SECU_NONCE), nonce_value);
                return DispatchOutcome {
                    replies: vec![reply],
                    rejected: Some(DropReason::NonceMismatch),
                    ..Default::default()
                };
            }
        }

        // Local policy may require encrypted frames.
        if self.security.encrypted && !packet.control.security.encrypted {
            tracing::debug!(src = %packet.src, "dropping plaintext command, encryption required");
            return DispatchOutcome::drop(DropReason::EncryptionRequired);
        }

        // The command is acceptable; latch its nonce before applying.
        if self.security.anti_replay {
            self.last_rx_nonce = packet.nonce;
            self.mirror_nonce_register();
        }

        match self.registers.set_value(packet.reg_id, &packet.value) {
            Ok(effects) => {
                let mut replies = Vec::new();
                if let Some(prior) = effects.announce_prior {
                    replies.push(self.make_info(packet.reg_id, prior));
                }
                let current = self
                    .registers
                    .value(packet.reg_id)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default();
                replies.push(self.make_status(packet.reg_id, current));
                DispatchOutcome {
                    replies,
                    reset: effects.reset,
                    ..Default::default()
                }
            }
            Err(RegisterError::LengthMismatch { expected, actual, .. }) => {
                // Never truncate: echo the unchanged value instead.
                tracing::debug!(
                    reg_id = %packet.reg_id,
                    expected,
                    actual,
                    "command length mismatch, echoing current value"
                );
                let current = self
                    .registers
                    .value(packet.reg_id)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default();
                let reply = self.make_status(packet.reg_id, current);
                DispatchOutcome {
                    replies: vec![reply],
                    rejected: Some(DropReason::LengthMismatch),
                    ..Default::default()
                }
            }
            Err(RegisterError::Unknown(_)) => DispatchOutcome::drop(DropReason::UnknownRegister),
        }
    }

    fn dispatch_query(&mut self, packet: &Packet) -> DispatchOutcome {
        if packet.dest.is_broadcast() {
            // Only the product code register may be queried by broadcast,
            // for network discovery.
            if packet.reg_id != RegisterId::new(swap_core::constants::REG_PRODUCT_CODE) {
                return DispatchOutcome::drop(DropReason::Addressing);
            }
        } else {
            if packet.dest != self.address {
                return DispatchOutcome::drop(DropReason::NotForUs);
            }
            if packet.reg_addr != packet.dest {
                return DispatchOutcome::drop(DropReason::RegAddrMismatch);
            }
        }

        match self.registers.update_value(packet.reg_id) {
            Ok(value) => {
                let value = value.to_vec();
                let reply = self.make_status(packet.reg_id, value);
                DispatchOutcome {
                    replies: vec![reply],
                    ..Default::default()
                }
            }
            Err(_) => {
                tracing::debug!(reg_id = %packet.reg_id, "dropping query for unknown register");
                DispatchOutcome::drop(DropReason::UnknownRegister)
            }
        }
    }

    /// Mirror the anti-replay latch into the nonce register so queries see
    /// the authoritative value.
    fn mirror_nonce_register(&mut self) {
        let _ = self
            .registers
            .mirror(RegisterId::new(REG_SECU_NONCE), &[self.last_rx_nonce.as_u8()]);
    }
}
