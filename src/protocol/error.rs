//! Error types for the wire codec

use thiserror::Error;

/// Errors raised while decoding an inbound datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The datagram is shorter than the fixed telemetry layout
    #[error("truncated telemetry packet: got {actual} bytes, need {expected}")]
    Truncated { expected: usize, actual: usize },
}
