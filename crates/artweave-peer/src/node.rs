//! Node registry
//!
//! One record per discovered peer, keyed by the IPv4 address the peer
//! reports in its poll-replies. Records are created on first sighting and
//! updated in place afterwards; the registry never evicts (staleness policy
//! belongs to the embedder, which can watch `last_reply`).

use crate::port::Port;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use tokio::time::Instant;

/// A discovered Art-Net node.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub ip: Ipv4Addr,
    pub udp_port: u16,
    pub port_name: String,
    pub long_name: String,
    pub style: u8,
    /// Flat list of every bound port across all pages.
    pub ports: Vec<Port>,
    /// Port pages keyed by bindIndex (1-based; 0 from pre-paging senders).
    pub binds: BTreeMap<u8, Vec<Port>>,
    /// When the last poll-reply from this node arrived.
    #[serde(skip_serializing)]
    pub last_reply: Option<Instant>,
}

impl Node {
    pub(crate) fn new(
        ip: Ipv4Addr,
        udp_port: u16,
        port_name: String,
        long_name: String,
        style: u8,
    ) -> Self {
        Self {
            ip,
            udp_port,
            port_name,
            long_name,
            style,
            ports: Vec::new(),
            binds: BTreeMap::new(),
            last_reply: None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node<{},{}:{}>", self.port_name, self.ip, self.udp_port)
    }
}

/// All nodes seen so far, keyed by reported IP.
#[derive(Debug, Default)]
pub(crate) struct NodeRegistry {
    nodes: HashMap<Ipv4Addr, Node>,
}

impl NodeRegistry {
    pub(crate) fn get(&self, ip: &Ipv4Addr) -> Option<&Node> {
        self.nodes.get(ip)
    }

    pub(crate) fn get_mut(&mut self, ip: &Ipv4Addr) -> Option<&mut Node> {
        self.nodes.get_mut(ip)
    }

    pub(crate) fn insert(&mut self, node: Node) {
        self.nodes.insert(node.ip, node);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
}
