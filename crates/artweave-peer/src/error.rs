//! Error types for the peer engine

use artweave_core::PortAddress;
use thiserror::Error;

/// Result type alias for peer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Peer error types
#[derive(Error, Debug)]
pub enum Error {
    /// Codec-level failure surfaced through the API (port-address parsing)
    #[error(transparent)]
    Protocol(#[from] artweave_core::Error),

    /// `set_dmx` on a universe without a local input port
    #[error("not publishing on {0}: no local input port configured")]
    NotPublishing(PortAddress),

    /// `set_dmx` payload that is not a whole universe
    #[error("dmx payload must be 512 bytes, got {0}")]
    DmxSize(usize),

    /// Bootstrap could not resolve a usable IPv4 interface
    #[error("no usable network interface: {0}")]
    InterfaceUnavailable(String),

    /// Socket setup or receive failure
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
