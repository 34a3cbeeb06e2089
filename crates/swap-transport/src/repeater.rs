//! Multi-hop repeating with duplicate-transaction suppression.
//!
//! Hop-bounded flooding: every packet not addressed to this node is
//! re-transmitted with the source rewritten to our address and the hop
//! count incremented, unless an identical logical transaction was already
//! repeated inside the expiry window. The dedup key is
//! `(reg_addr, function, nonce)` with a *different* source address — the
//! same transaction re-heard from another relay is a duplicate, not a new
//! flood wave. A fixed-depth ring bounds memory; duplicates arriving after
//! the window are repeated again, an accepted tradeoff.

use std::collections::VecDeque;

use swap_core::constants::Function;
use swap_core::packet::wire::Packet;
use swap_core::types::{DeviceAddress, Nonce};

/// Transaction history depth.
pub const TABLE_DEPTH: usize = 10;

/// How long a recorded transaction suppresses duplicates, in milliseconds.
pub const EXPIRY_MS: u64 = 2_000;

/// Delay before re-transmitting a repeat, to reduce collision probability
/// on the shared channel. Applied by the caller.
pub const TX_DELAY_MS: u64 = 2;

/// One repeated transaction: enough to recognize the same logical exchange
/// arriving again through a different path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TransactionRecord {
    timestamp_ms: u64,
    function: Function,
    src: DeviceAddress,
    nonce: Nonce,
    reg_addr: DeviceAddress,
}

/// The repeater state machine. Decides, never transmits.
pub struct Repeater {
    own_address: DeviceAddress,
    max_hop: u8,
    enabled: bool,
    /// Newest-first ring of the latest repeated transactions.
    transactions: VecDeque<TransactionRecord>,
}

impl Repeater {
    pub fn new(own_address: DeviceAddress, max_hop: u8) -> Self {
        Self {
            own_address,
            max_hop,
            enabled: false,
            transactions: VecDeque::with_capacity(TABLE_DEPTH),
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_hop(&self) -> u8 {
        self.max_hop
    }

    /// Called when the device address changes (the repeater rewrites source
    /// addresses, so it must track it).
    pub fn set_address(&mut self, address: DeviceAddress) {
        self.own_address = address;
    }

    /// Decide whether `packet` should be forwarded.
    ///
    /// Returns the rewritten packet to transmit (source = our address,
    /// hop + 1), or `None` when the packet must not be repeated. The caller
    /// waits [`TX_DELAY_MS`] before transmitting and calls [`record`] only
    /// on successful transmission.
    ///
    /// [`record`]: Repeater::record
    pub fn consider(&self, packet: &Packet, now_ms: u64) -> Option<Packet> {
        if !self.enabled {
            return None;
        }
        // Never repeat traffic addressed to us.
        if packet.dest == self.own_address {
            return None;
        }
        if packet.control.hop >= self.max_hop {
            tracing::trace!(hop = packet.control.hop, "not repeating, hop limit reached");
            return None;
        }
        if self.is_duplicate(packet, now_ms) {
            tracing::trace!(
                src = %packet.src,
                nonce = %packet.nonce,
                "not repeating, duplicate transaction"
            );
            return None;
        }

        let mut forward = packet.clone();
        forward.src = self.own_address;
        forward.control.hop = packet.control.hop + 1;
        Some(forward)
    }

    /// Record a successfully transmitted repeat, evicting the oldest entry
    /// once the ring is full.
    pub fn record(&mut self, packet: &Packet, now_ms: u64) {
        if self.transactions.len() == TABLE_DEPTH {
            self.transactions.pop_back();
        }
        self.transactions.push_front(TransactionRecord {
            timestamp_ms: now_ms,
            function: packet.function,
            src: packet.src,
            nonce: packet.nonce,
            reg_addr: packet.reg_addr,
        });
    }

    fn is_duplicate(&self, packet: &Packet, now_ms: u64) -> bool {
        self.transactions.iter().any(|t| {
            t.reg_addr == packet.reg_addr
                && t.function == packet.function
                && t.src != packet.src
                && t.nonce == packet.nonce
                && now_ms.saturating_sub(t.timestamp_ms) < EXPIRY_MS
        })
    }
}
