//! Peer lifecycle and public API
//!
//! [`Peer`] is a cheap-clone handle over the engine. `start` resolves the
//! network interface (unless the config pins addresses), binds the shared
//! Art-Net socket and spawns the receive and scheduler tasks; everything
//! else is synchronous calls that serialize on the engine state. Dropping
//! the last handle (or calling [`Peer::shutdown`]) aborts both tasks,
//! closes the socket and ends every event stream.

use crate::engine::{Identity, State};
use crate::events::EventStream;
use crate::iface;
use crate::node::Node;
use crate::port::Port;
use crate::rdm::RdmInterrogator;
use crate::universe::Universe;
use crate::wire::{NullWire, UdpWire, Wire};
use crate::Result;
use artweave_core::{style, PortAddress, ARTNET_PORT, DMX_UNIVERSE_SIZE};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

/// Scheduler cadence.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Longest name accepted for `port_name` (protocol field is 18 bytes,
/// NUL-terminated).
const PORT_NAME_MAX: usize = 17;

/// Longest name accepted for `long_name`.
const LONG_NAME_MAX: usize = 63;

/// Peer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Interface to bind, `None` for automatic selection.
    pub interface: Option<String>,
    /// Skip interface resolution and report this address.
    pub unicast_ip: Option<Ipv4Addr>,
    /// Skip interface resolution and broadcast here.
    pub broadcast_ip: Option<Ipv4Addr>,
    /// Default net switch reported while no ports are configured.
    pub net: u8,
    /// Default sub-net switch reported while no ports are configured.
    pub subnet: u8,
    /// Short node name, at most 17 bytes.
    pub port_name: String,
    /// Long node name, at most 63 bytes; derived from `port_name` when
    /// absent.
    pub long_name: Option<String>,
    /// Style code reported in replies.
    pub style: u8,
    /// Suppress unsolicited replies and the scheduler. Useful for bulk
    /// reconfiguration and for pure observers.
    pub passive: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            interface: None,
            unicast_ip: None,
            broadcast_ip: None,
            net: 0,
            subnet: 0,
            port_name: "artweave".to_string(),
            long_name: None,
            style: style::CONTROLLER,
            passive: false,
        }
    }
}

/// An Art-Net peer.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    wire: RwLock<Option<Arc<dyn Wire>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn wire(&self) -> Arc<dyn Wire> {
        match self.wire.read().clone() {
            Some(wire) => wire,
            None => Arc::new(NullWire),
        }
    }

    fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        let wire = self.wire();
        self.state.lock().handle_datagram(wire.as_ref(), data, from);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Peer {
    pub fn new(config: PeerConfig) -> Self {
        let port_name = clamp_name(&config.port_name, PORT_NAME_MAX);
        let long_name = clamp_name(
            &config
                .long_name
                .unwrap_or_else(|| format!("{} (artweave)", port_name)),
            LONG_NAME_MAX,
        );
        let identity = Identity {
            interface: config.interface,
            port_name,
            long_name,
            style: config.style,
            net: config.net,
            subnet: config.subnet,
            passive: config.passive,
            unicast_ip: config.unicast_ip,
            broadcast_ip: config.broadcast_ip,
            mac: [0x01, 0x22, 0x33, 0x44, 0x55, 0x66],
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new(identity)),
                wire: RwLock::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Bind the Art-Net socket and bring the engine online.
    ///
    /// Resolves the network interface first unless the config pinned both
    /// addresses; failure there is fatal. Spawns the datagram receiver and,
    /// unless passive, the scheduler.
    pub async fn start(&self) -> Result<()> {
        let passive = {
            let mut state = self.inner.state.lock();
            if state.identity.unicast_ip.is_none() || state.identity.broadcast_ip.is_none() {
                let resolved = iface::resolve(state.identity.interface.as_deref())?;
                state.identity.interface = Some(resolved.name);
                state.identity.unicast_ip = Some(resolved.unicast_ip);
                state.identity.broadcast_ip = Some(resolved.broadcast_ip);
                state.identity.mac = resolved.mac;
            }
            state.identity.passive
        };

        let socket = Arc::new(bind_socket()?);
        info!("listening on 0.0.0.0:{}", ARTNET_PORT);
        *self.inner.wire.write() = Some(Arc::new(UdpWire::new(socket.clone())));

        let mut tasks = self.inner.tasks.lock();
        tasks.push(tokio::spawn(receive_loop(
            socket,
            Arc::downgrade(&self.inner),
        )));
        if !passive {
            tasks.push(tokio::spawn(scheduler_loop(Arc::downgrade(&self.inner))));
        }
        Ok(())
    }

    /// Stop the engine: receiver and scheduler are cancelled, the socket is
    /// closed, and event streams end. Idempotent.
    pub fn shutdown(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        *self.inner.wire.write() = None;
    }

    /// Substitute the outbound transport. Intended for tests and replay
    /// tooling; `start` installs the UDP wire itself.
    pub fn attach_wire(&self, wire: Arc<dyn Wire>) {
        *self.inner.wire.write() = Some(wire);
    }

    /// Feed one raw datagram through the engine, as if received from
    /// `from`. This is the receive task's entry point, exposed so replay
    /// tooling and tests can drive the engine without a socket.
    pub fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        self.inner.handle_datagram(data, from);
    }

    /// Broadcast an ArtPoll immediately (the scheduler also does this every
    /// two seconds).
    pub fn send_poll(&self) {
        let wire = self.inner.wire();
        self.inner
            .state
            .lock()
            .send_poll(wire.as_ref(), Instant::now());
    }

    /// Broadcast our poll-reply pages immediately.
    pub fn send_poll_reply(&self) {
        let wire = self.inner.wire();
        self.inner.state.lock().send_poll_reply(wire.as_ref());
    }

    /// Replace the local port on `address`: input publishes, output
    /// subscribes, neither removes. Idempotent; announces the change unless
    /// passive.
    pub fn set_port_config(&self, address: PortAddress, is_input: bool, is_output: bool) {
        let wire = self.inner.wire();
        self.inner
            .state
            .lock()
            .set_port_config(wire.as_ref(), address, is_input, is_output);
    }

    /// Latch a full universe frame and unicast it to every subscriber.
    /// Requires a local input port on `address` and exactly 512 bytes.
    pub fn set_dmx(&self, address: PortAddress, data: &[u8]) -> Result<()> {
        let wire = self.inner.wire();
        self.inner
            .state
            .lock()
            .set_dmx(wire.as_ref(), address, data, Instant::now())
    }

    /// The latched frame for a universe, if it has ever been referenced.
    pub fn get_dmx(&self, address: PortAddress) -> Option<[u8; DMX_UNIVERSE_SIZE]> {
        self.inner
            .state
            .lock()
            .universes
            .get(address)
            .map(|u| u.last_data)
    }

    /// Subscribe to topology and DMX events. Each stream starts now and
    /// drops oldest on overflow; see [`EventStream`].
    pub fn events(&self) -> EventStream {
        self.inner.state.lock().subscribe()
    }

    /// Snapshot of every known node, ordered by IP.
    pub fn nodes(&self) -> Vec<Node> {
        let state = self.inner.state.lock();
        let mut nodes: Vec<Node> = state.nodes.iter().cloned().collect();
        nodes.sort_by_key(|n| n.ip);
        nodes
    }

    /// Snapshot of one node.
    pub fn node(&self, ip: Ipv4Addr) -> Option<Node> {
        self.inner.state.lock().nodes.get(&ip).cloned()
    }

    /// Snapshot of one universe.
    pub fn universe(&self, address: PortAddress) -> Option<Universe> {
        self.inner.state.lock().universes.get(address).cloned()
    }

    /// Every port-address referenced so far, ordered.
    pub fn universes(&self) -> Vec<PortAddress> {
        self.inner.state.lock().universes.addresses()
    }

    /// The local port list.
    pub fn local_ports(&self) -> Vec<Port> {
        self.inner.state.lock().local_ports.clone()
    }

    /// The local bind pages as they will be announced.
    pub fn local_binds(&self) -> BTreeMap<u8, Vec<Port>> {
        self.inner.state.lock().local_binds.clone()
    }

    pub fn port_name(&self) -> String {
        self.inner.state.lock().identity.port_name.clone()
    }

    /// Rename the node; announces unless passive.
    pub fn set_port_name(&self, port_name: &str) {
        let wire = self.inner.wire();
        let port_name = clamp_name(port_name, PORT_NAME_MAX);
        self.inner
            .state
            .lock()
            .set_identity(wire.as_ref(), |identity| identity.port_name = port_name);
    }

    pub fn long_name(&self) -> String {
        self.inner.state.lock().identity.long_name.clone()
    }

    /// Set the descriptive name; announces unless passive.
    pub fn set_long_name(&self, long_name: &str) {
        let wire = self.inner.wire();
        let long_name = clamp_name(long_name, LONG_NAME_MAX);
        self.inner
            .state
            .lock()
            .set_identity(wire.as_ref(), |identity| identity.long_name = long_name);
    }

    pub fn style(&self) -> u8 {
        self.inner.state.lock().identity.style
    }

    /// Change the reported style code; announces unless passive.
    pub fn set_style(&self, style: u8) {
        let wire = self.inner.wire();
        self.inner
            .state
            .lock()
            .set_identity(wire.as_ref(), |identity| identity.style = style);
    }

    pub fn passive(&self) -> bool {
        self.inner.state.lock().identity.passive
    }

    /// Toggle passive mode. Entering it never announces; leaving it does
    /// not announce retroactively. For bulk changes: go passive, mutate,
    /// come back, then call [`Peer::send_poll_reply`].
    pub fn set_passive(&self, passive: bool) {
        self.inner.state.lock().identity.passive = passive;
    }

    /// Install an RDM interrogator; the scheduler polls it every tick.
    pub fn set_rdm_interrogator(&self, rdm: Box<dyn RdmInterrogator>) {
        self.inner.state.lock().rdm = rdm;
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, inner: Weak<Inner>) {
    let mut buf = vec![0u8; 2048];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.handle_datagram(&buf[..len], from);
            }
            Err(e) => {
                // Receive failure is fatal to the engine task; sends are
                // merely logged elsewhere.
                error!("receive failed, stopping engine: {}", e);
                break;
            }
        }
    }
}

async fn scheduler_loop(inner: Weak<Inner>) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let wire = inner.wire();
        inner.state.lock().tick(wire.as_ref(), Instant::now());
    }
}

/// One socket for everything, reusable alongside other Art-Net software on
/// the host, broadcast-capable, nonblocking before tokio takes it over.
fn bind_socket() -> std::io::Result<UdpSocket> {
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, ARTNET_PORT));
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    UdpSocket::from_std(socket.into())
}

/// Truncate to a byte limit without splitting a character.
fn clamp_name(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
