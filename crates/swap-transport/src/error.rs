//! Transport layer error types.

use swap_core::error::PacketError;
use swap_core::types::RegisterId;

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("unknown register: {0}")]
    Unknown(RegisterId),

    #[error("length mismatch on register {id}: expected {expected}, got {actual}")]
    LengthMismatch {
        id: RegisterId,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream status value too short: need at least 3 bytes, got {0}")]
    TruncatedStatus(usize),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
}
