//! Reliable byte stream over unreliable single-packet datagrams.
//!
//! Stop-and-wait with a window of one outstanding chunk per direction,
//! multiplexed over Status packets on one dedicated register. The Status
//! value layout is `[received_bytes, received_id, send_id, payload...]`:
//! the first two bytes acknowledge the peer's last chunk, `send_id`
//! identifies our own payload (0 = no payload), and the payload is the
//! chunk itself.
//!
//! Sequence ids are one byte, cyclic, never 0 — 0 is the "no outstanding
//! packet" sentinel. A chunk stays buffered until the peer acknowledges it;
//! an unmatched acknowledgement re-sends the identical chunk (idempotent
//! retransmission). Inbound payloads are accepted partially when the
//! receive buffer is short on space; the unaccepted tail stays with the
//! peer for retransmission.

use swap_core::constants::SWAP_VALUE_MAX;

use crate::error::StreamError;

/// Capacity of each direction's byte buffer.
pub const STREAM_BUFFER_SIZE: usize = 64;

/// Ack/id header bytes at the front of every stream Status value.
pub const STREAM_HEADER_SIZE: usize = 3;

/// Maximum payload bytes per chunk.
pub const STREAM_MAX_DATA: usize = SWAP_VALUE_MAX - 4;

/// Declared length of the stream register.
pub const STREAM_REG_LEN: usize = STREAM_MAX_DATA + STREAM_HEADER_SIZE;

/// A decoded stream Status value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// How many bytes of our outstanding chunk the peer accepted.
    pub received_bytes: u8,
    /// Which of our chunk ids the peer is acknowledging.
    pub received_id: u8,
    /// The peer's chunk id, 0 when the message carries no payload.
    pub send_id: u8,
    /// The peer's chunk payload.
    pub data: Vec<u8>,
}

impl StreamMessage {
    /// Decode a stream Status register value.
    pub fn parse(value: &[u8]) -> Result<Self, StreamError> {
        if value.len() < STREAM_HEADER_SIZE {
            return Err(StreamError::TruncatedStatus(value.len()));
        }
        Ok(StreamMessage {
            received_bytes: value[0],
            received_id: value[1],
            send_id: value[2],
            data: value[STREAM_HEADER_SIZE..].to_vec(),
        })
    }
}

/// Per-endpoint stream state. Pure: every transition returns the Status
/// value to transmit (if any) and the caller does the sending.
pub struct StreamState {
    /// Bytes written but not yet acknowledged by the peer, oldest first.
    send_buf: Vec<u8>,
    /// Length of the chunk currently on the wire (prefix of `send_buf`).
    chunk_len: usize,
    /// Outstanding chunk id, 0 when nothing is in flight.
    send_id: u8,
    /// Last allocated chunk id (cycles 1..=255).
    last_id: u8,
    /// Last inbound chunk id accepted, to recognize retransmits.
    master_id: u8,
    /// Ack fields mirrored into every outgoing Status.
    acked_bytes: u8,
    acked_id: u8,
    /// Delivered-but-unread bytes, circular.
    recv_buf: [u8; STREAM_BUFFER_SIZE],
    recv_pos: usize,
    recv_len: usize,
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            send_buf: Vec::with_capacity(STREAM_BUFFER_SIZE),
            chunk_len: 0,
            send_id: 0,
            last_id: 0,
            master_id: 0,
            acked_bytes: 0,
            acked_id: 0,
            recv_buf: [0; STREAM_BUFFER_SIZE],
            recv_pos: 0,
            recv_len: 0,
        }
    }

    // ------------------------------------------------------------------ //
    // Write path
    // ------------------------------------------------------------------ //

    /// Append as many bytes as fit into the send buffer, returning the
    /// count. Returns 0 when full; the caller is expected to wait for an
    /// acknowledgement to free space rather than drop bytes.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let space = STREAM_BUFFER_SIZE - self.send_buf.len();
        let n = bytes.len().min(space);
        self.send_buf.extend_from_slice(&bytes[..n]);
        n
    }

    /// Free space in the send buffer.
    pub fn writable(&self) -> usize {
        STREAM_BUFFER_SIZE - self.send_buf.len()
    }

    /// Whether enough bytes are queued to fill a whole chunk.
    pub fn chunk_ready(&self) -> bool {
        self.send_buf.len() >= STREAM_MAX_DATA
    }

    /// Whether a chunk is on the wire awaiting acknowledgement.
    pub fn outstanding(&self) -> bool {
        self.send_id != 0
    }

    /// Number of buffered, unacknowledged bytes.
    pub fn pending(&self) -> usize {
        self.send_buf.len()
    }

    /// Start transmitting buffered bytes.
    ///
    /// A no-op while a chunk is unacknowledged: the acknowledgement itself
    /// triggers the next chunk. Returns the Status value to send.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.send_id != 0 || self.send_buf.is_empty() {
            return None;
        }
        self.send_id = self.alloc_id();
        self.chunk_len = self.send_buf.len().min(STREAM_MAX_DATA);
        tracing::trace!(
            id = self.send_id,
            len = self.chunk_len,
            "stream: sending chunk"
        );
        Some(self.status_value())
    }

    // ------------------------------------------------------------------ //
    // Receive path
    // ------------------------------------------------------------------ //

    /// Process an inbound stream Status from the peer.
    ///
    /// Handles the acknowledgement of our outstanding chunk, accepts new
    /// payload into the receive buffer (partially if space is short),
    /// re-acknowledges retransmits, and returns the combined ack +
    /// next-chunk Status value to send back, if any.
    pub fn on_status(&mut self, msg: &StreamMessage) -> Option<Vec<u8>> {
        let mut send = false;

        if self.send_id != 0 {
            if msg.received_id == self.send_id {
                // Our outstanding chunk was acknowledged: discard the
                // accepted prefix and move on to the next chunk, if bytes
                // remain. The peer can only have accepted bytes we actually
                // sent, hence the clamp to the chunk length.
                let acked = (msg.received_bytes as usize).min(self.chunk_len);
                self.send_buf.drain(..acked);
                self.chunk_len = self.send_buf.len().min(STREAM_MAX_DATA);
                if !self.send_buf.is_empty() {
                    self.send_id = self.alloc_id();
                    send = true;
                } else {
                    self.send_id = 0;
                }
            } else {
                // The peer never saw our last transmission: re-send the
                // same chunk unmodified, same id.
                tracing::trace!(
                    acked = msg.received_id,
                    outstanding = self.send_id,
                    "stream: ack mismatch, retransmitting"
                );
                send = true;
            }
        }

        if msg.send_id != 0 {
            if msg.send_id != self.master_id {
                // New payload. Accept what fits; the tail is the peer's to
                // retransmit.
                self.master_id = msg.send_id;
                let accept = msg.data.len().min(STREAM_BUFFER_SIZE - self.recv_len);
                for (i, &byte) in msg.data[..accept].iter().enumerate() {
                    self.recv_buf[(self.recv_pos + self.recv_len + i) % STREAM_BUFFER_SIZE] =
                        byte;
                }
                self.recv_len += accept;
                self.acked_bytes = accept as u8;
                self.acked_id = self.master_id;
                tracing::trace!(
                    id = msg.send_id,
                    offered = msg.data.len(),
                    accept,
                    "stream: accepted payload"
                );
            }
            // A retransmit of a chunk we already accepted is acknowledged
            // again (the previous ack was lost).
            send = true;
        }

        send.then(|| self.status_value())
    }

    // ------------------------------------------------------------------ //
    // Read path
    // ------------------------------------------------------------------ //

    /// Delivered bytes not yet consumed.
    pub fn available(&self) -> usize {
        self.recv_len
    }

    /// Pop the next delivered byte.
    pub fn read(&mut self) -> Option<u8> {
        if self.recv_len == 0 {
            return None;
        }
        let byte = self.recv_buf[self.recv_pos];
        self.recv_pos = (self.recv_pos + 1) % STREAM_BUFFER_SIZE;
        self.recv_len -= 1;
        Some(byte)
    }

    /// Look at the next delivered byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        (self.recv_len > 0).then(|| self.recv_buf[self.recv_pos])
    }

    // ------------------------------------------------------------------ //
    // Internals
    // ------------------------------------------------------------------ //

    /// Next cyclic id, skipping the 0 sentinel.
    fn alloc_id(&mut self) -> u8 {
        self.last_id = self.last_id.wrapping_add(1);
        if self.last_id == 0 {
            self.last_id = 1;
        }
        self.last_id
    }

    /// The register value for the current combined ack + chunk state.
    fn status_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(STREAM_HEADER_SIZE + self.chunk_len);
        value.push(self.acked_bytes);
        value.push(self.acked_id);
        value.push(self.send_id);
        value.extend_from_slice(&self.send_buf[..self.chunk_len]);
        value
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}
