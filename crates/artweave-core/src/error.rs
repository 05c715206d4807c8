//! Error types for the Art-Net codec

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Art-Net codec error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Port-address out of range or unparseable
    #[error("invalid port-address: {0}")]
    InvalidPortAddress(String),

    /// Datagram does not start with the "Art-Net\0" literal
    #[error("datagram missing Art-Net header")]
    InvalidPrefix,

    /// Datagram shorter than the mandatory region of its opcode
    #[error("truncated datagram: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    /// Opcode this implementation does not handle
    #[error("unsupported opcode: 0x{0:04x}")]
    UnknownOpcode(u16),
}
