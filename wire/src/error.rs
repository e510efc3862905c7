//! Framing error types.

use thiserror::Error;

/// Framing errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FramingError {
    /// Outbound message contains the configured delimiter byte
    #[error("message contains the delimiter byte 0x{0:02x}")]
    DelimiterInPayload(u8),

    /// Outbound message exceeds the configured maximum length
    #[error("message length {len} exceeds maximum {max}")]
    TooLong {
        /// Length of the rejected message
        len: usize,
        /// Configured maximum message length
        max: usize,
    },

    /// Inbound buffer grew past the maximum length without a delimiter;
    /// the accumulated bytes were discarded
    #[error("inbound frame exceeds maximum {max}, buffer discarded")]
    Overflow {
        /// Configured maximum message length
        max: usize,
    },
}
