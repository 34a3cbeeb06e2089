//! Error types for the swap-core crate.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    TooShort { min: usize, actual: usize },
    ValueTooLong { max: usize, actual: usize },
    InvalidFunction(u8),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::TooShort { min, actual } => {
                write!(
                    f,
                    "frame too short: need at least {min} bytes, got {actual}"
                )
            }
            PacketError::ValueTooLong { max, actual } => {
                write!(f, "value too long: at most {max} bytes, got {actual}")
            }
            PacketError::InvalidFunction(v) => write!(f, "invalid function code: {v}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PacketError {}
