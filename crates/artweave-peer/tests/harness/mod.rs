//! Shared test harness: in-memory wires standing in for the Art-Net socket.
#![allow(dead_code)]

use artweave_peer::{Peer, PeerConfig, Wire, ARTNET_PORT};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A peer with pinned addresses, so no interface resolution runs.
pub fn make_peer(port_name: &str, unicast_ip: Ipv4Addr, broadcast_ip: Ipv4Addr) -> Peer {
    Peer::new(PeerConfig {
        port_name: port_name.to_string(),
        unicast_ip: Some(unicast_ip),
        broadcast_ip: Some(broadcast_ip),
        ..Default::default()
    })
}

/// Records every datagram sent through it.
pub struct RecordingWire {
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
}

impl RecordingWire {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn take(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().drain(..).collect()
    }
}

impl Wire for RecordingWire {
    fn send_to(&self, data: &[u8], target: SocketAddr) {
        self.sent.lock().push((data.to_vec(), target));
    }
}

/// One queued datagram.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub data: Vec<u8>,
    pub from: SocketAddr,
    pub to: SocketAddr,
}

/// Loopback network linking peers. Sends queue up; [`Network::drain`]
/// delivers them in order — broadcasts to every joined peer (sender
/// included, matching real broadcast sockets), unicasts to the peer bound
/// at the target address. Deliveries can queue further sends, which drain
/// in the same pass.
pub struct Network {
    broadcast_ip: Ipv4Addr,
    inner: Mutex<NetworkInner>,
}

struct NetworkInner {
    pending: VecDeque<Envelope>,
    peers: Vec<(SocketAddr, Peer)>,
}

impl Network {
    pub fn new(broadcast_ip: Ipv4Addr) -> Arc<Self> {
        Arc::new(Self {
            broadcast_ip,
            inner: Mutex::new(NetworkInner {
                pending: VecDeque::new(),
                peers: Vec::new(),
            }),
        })
    }

    /// Bind a peer to `unicast_ip:6454` on this network.
    pub fn join(self: &Arc<Self>, peer: &Peer, unicast_ip: Ipv4Addr) {
        let from = SocketAddr::from((unicast_ip, ARTNET_PORT));
        peer.attach_wire(Arc::new(PeerWire {
            from,
            network: self.clone(),
        }));
        self.inner.lock().peers.push((from, peer.clone()));
    }

    /// Datagrams queued but not yet delivered.
    pub fn pending(&self) -> Vec<Envelope> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    /// Deliver queued datagrams until the network is quiet.
    pub fn drain(&self) {
        loop {
            let envelope = { self.inner.lock().pending.pop_front() };
            let Some(envelope) = envelope else {
                break;
            };
            let peers: Vec<(SocketAddr, Peer)> = self.inner.lock().peers.clone();
            let broadcast = envelope.to.ip() == IpAddr::V4(self.broadcast_ip);
            for (addr, peer) in peers {
                if broadcast || addr == envelope.to {
                    peer.handle_datagram(&envelope.data, envelope.from);
                }
            }
        }
    }
}

struct PeerWire {
    from: SocketAddr,
    network: Arc<Network>,
}

impl Wire for PeerWire {
    fn send_to(&self, data: &[u8], target: SocketAddr) {
        self.network.inner.lock().pending.push_back(Envelope {
            data: data.to_vec(),
            from: self.from,
            to: target,
        });
    }
}
