//! Outbound transport seam
//!
//! Everything the engine transmits goes through [`Wire`]. The production
//! implementation wraps the peer's UDP socket; tests and replay tooling
//! substitute recording or loopback wires. Sends are fire-and-forget:
//! Art-Net is at-most-once, so a failed send is logged and dropped rather
//! than retried.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Datagram sink used for all outbound traffic.
pub trait Wire: Send + Sync {
    /// Queue one datagram for `target`. Must not block.
    fn send_to(&self, data: &[u8], target: SocketAddr);
}

/// Production wire over the engine's UDP socket.
pub(crate) struct UdpWire {
    socket: Arc<UdpSocket>,
}

impl UdpWire {
    pub(crate) fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl Wire for UdpWire {
    fn send_to(&self, data: &[u8], target: SocketAddr) {
        match self.socket.try_send_to(data, target) {
            Ok(sent) if sent != data.len() => {
                warn!("short send to {}: {} of {} bytes", target, sent, data.len());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("send to {} failed: {}", target, e);
            }
        }
    }
}

/// Stand-in before a transport is attached; drops everything.
pub(crate) struct NullWire;

impl Wire for NullWire {
    fn send_to(&self, _data: &[u8], target: SocketAddr) {
        debug!("no transport attached, dropping datagram for {}", target);
    }
}
