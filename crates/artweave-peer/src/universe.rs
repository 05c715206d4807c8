//! Universe registry
//!
//! One record per 15-bit port-address referenced anywhere: by local port
//! configuration, by a reply listing the address, or by incoming DMX.
//! Records are created lazily and never destroyed. Publisher and subscriber
//! entries hold node IPs only; the node registry owns the records they
//! point at.

use artweave_core::{PortAddress, DMX_UNIVERSE_SIZE};
use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::time::Instant;

/// Sequence key: concurrent senders to one universe are told apart by
/// (source address, physical input port).
pub type SourceKey = (SocketAddr, u8);

/// One DMX universe and everything known about it.
#[derive(Debug, Clone)]
pub struct Universe {
    pub address: PortAddress,
    /// Most recent frame, fixed at 512 bytes. Short frames overwrite a
    /// prefix and leave the rest untouched.
    pub last_data: [u8; DMX_UNIVERSE_SIZE],
    /// Nodes with an input port bound here, in discovery order.
    pub publishers: Vec<Ipv4Addr>,
    /// Nodes with an output port bound here; DMX fan-out follows this order.
    pub subscribers: Vec<Ipv4Addr>,
    /// Last sequence byte seen per remote source. Exposed for observers;
    /// the engine does not reorder or detect loss.
    pub publisher_seq: HashMap<SourceKey, u8>,
    /// When we last transmitted this universe (rebroadcast bookkeeping).
    pub last_publish: Option<Instant>,
    seq: u8,
}

impl Universe {
    pub(crate) fn new(address: PortAddress) -> Self {
        Self {
            address,
            last_data: [0; DMX_UNIVERSE_SIZE],
            publishers: Vec::new(),
            subscribers: Vec::new(),
            publisher_seq: HashMap::new(),
            last_publish: None,
            seq: 0,
        }
    }

    /// The latched frame.
    pub fn dmx(&self) -> &[u8; DMX_UNIVERSE_SIZE] {
        &self.last_data
    }

    /// Advance the outgoing sequence counter. Cycles 1..=254: zero means
    /// "unsequenced" to receivers and 255 would collide with senders that
    /// wrap early, so neither is ever produced.
    pub(crate) fn next_seq(&mut self) -> u8 {
        self.seq = self.seq % 254 + 1;
        self.seq
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Every universe referenced so far, keyed by port-address.
#[derive(Debug, Default)]
pub(crate) struct UniverseRegistry {
    universes: HashMap<PortAddress, Universe>,
}

impl UniverseRegistry {
    pub(crate) fn get(&self, address: PortAddress) -> Option<&Universe> {
        self.universes.get(&address)
    }

    pub(crate) fn get_mut(&mut self, address: PortAddress) -> Option<&mut Universe> {
        self.universes.get_mut(&address)
    }

    /// Look up or lazily create. The boolean reports creation so the caller
    /// can emit `UniverseDiscovered` exactly once per address.
    pub(crate) fn get_or_create(&mut self, address: PortAddress) -> (&mut Universe, bool) {
        let mut created = false;
        let universe = self.universes.entry(address).or_insert_with(|| {
            created = true;
            Universe::new(address)
        });
        (universe, created)
    }

    pub(crate) fn addresses(&self) -> Vec<PortAddress> {
        let mut addrs: Vec<PortAddress> = self.universes.keys().copied().collect();
        addrs.sort();
        addrs
    }
}
