//! Protocol engine
//!
//! All protocol state lives in [`State`]: the node and universe registries,
//! the local port configuration, and the timers. The peer wraps it in a
//! single mutex, so the receive loop, the scheduler and API calls serialize
//! on one owner and the registries never see concurrent mutation.
//!
//! Per-datagram event order is fixed: node discovered/changed first, then
//! port additions/removals, then any universes first referenced by the
//! datagram, then the DMX frame itself.

use crate::events::{Event, EventBus, EventStream};
use crate::node::{Node, NodeRegistry};
use crate::port::{Direction, Media, Port, PortOwner};
use crate::rdm::{NullRdm, RdmInterrogator};
use crate::universe::UniverseRegistry;
use crate::wire::Wire;
use crate::{Error, Result};
use artweave_core::{
    decode, ArtDmx, ArtPacket, ArtPoll, ArtPollReply, PortAddress, ARTNET_PORT,
    DMX_UNIVERSE_SIZE,
};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// OEM code carried in our replies.
const OEM_CODE: u16 = 0x2CD3;

/// ESTA manufacturer code carried in our replies.
const ESTA_CODE: u16 = 0x02AE;

/// Status2 bit 3: this node understands 15-bit port-addresses.
const STATUS2_PORT_ADDR_15BIT: u8 = 0x08;

/// How long between poll broadcasts.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Keepalive rebroadcast cadence for universes we publish.
pub(crate) const PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

/// Who we are on the network.
pub(crate) struct Identity {
    pub(crate) interface: Option<String>,
    pub(crate) port_name: String,
    pub(crate) long_name: String,
    pub(crate) style: u8,
    pub(crate) net: u8,
    pub(crate) subnet: u8,
    pub(crate) passive: bool,
    pub(crate) unicast_ip: Option<Ipv4Addr>,
    pub(crate) broadcast_ip: Option<Ipv4Addr>,
    pub(crate) mac: [u8; 6],
}

/// The engine's single-owner state.
pub(crate) struct State {
    pub(crate) identity: Identity,
    pub(crate) nodes: NodeRegistry,
    pub(crate) universes: UniverseRegistry,
    pub(crate) local_ports: Vec<Port>,
    pub(crate) local_binds: BTreeMap<u8, Vec<Port>>,
    pub(crate) publishing: Vec<PortAddress>,
    pub(crate) events: EventBus,
    pub(crate) rdm: Box<dyn RdmInterrogator>,
    report_counter: u32,
    last_poll: Option<Instant>,
}

impl State {
    pub(crate) fn new(identity: Identity) -> Self {
        Self {
            identity,
            nodes: NodeRegistry::default(),
            universes: UniverseRegistry::default(),
            local_ports: Vec::new(),
            local_binds: BTreeMap::from([(1, Vec::new())]),
            publishing: Vec::new(),
            events: EventBus::new(),
            rdm: Box::new(NullRdm),
            report_counter: 0,
            last_poll: None,
        }
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Feed one received datagram through the engine. Malformed or unknown
    /// traffic is logged and dropped; it never mutates state or emits.
    pub(crate) fn handle_datagram(&mut self, wire: &dyn Wire, data: &[u8], from: SocketAddr) {
        match decode(data) {
            Ok(ArtPacket::Poll(poll)) => self.on_poll(wire, &poll, from),
            Ok(ArtPacket::PollReply(reply)) => self.on_poll_reply(&reply, Instant::now()),
            Ok(ArtPacket::Dmx(dmx)) => self.on_dmx(&dmx, from),
            Err(e) => debug!("dropping datagram from {}: {}", from, e),
        }
    }

    fn on_poll(&mut self, wire: &dyn Wire, poll: &ArtPoll, from: SocketAddr) {
        debug!(
            "poll from {}: ver {} flags {:#04x} priority {:#04x}",
            from, poll.version, poll.flags, poll.priority
        );
        self.send_poll_reply(wire);
    }

    /// Reconcile one reply page into the registries.
    pub(crate) fn on_poll_reply(&mut self, reply: &ArtPollReply, now: Instant) {
        let ip = reply.ip;

        let is_new = self.nodes.get(&ip).is_none();
        let mut changed = false;
        if let Some(node) = self.nodes.get_mut(&ip) {
            changed = node.long_name != reply.long_name
                || node.port_name != reply.port_name
                || node.style != reply.style;
            node.port_name = reply.port_name.clone();
            node.long_name = reply.long_name.clone();
            node.style = reply.style;
            node.udp_port = reply.udp_port;
            node.last_reply = Some(now);
        } else {
            // A node that reports from a new IP is a new node, even if it
            // used to answer from elsewhere.
            let mut node = Node::new(
                ip,
                reply.udp_port,
                reply.port_name.clone(),
                reply.long_name.clone(),
                reply.style,
            );
            node.last_reply = Some(now);
            self.nodes.insert(node);
        }

        // Build the page's new port list, materializing every universe it
        // references.
        let mut created = Vec::new();
        let mut new_ports = Vec::new();
        let base = (((reply.net_switch & 0x7F) as u16) << 8)
            | (((reply.sub_switch & 0x0F) as u16) << 4);
        for slot in 0..4 {
            let port_type = reply.port_types[slot];
            if port_type & 0x80 != 0 {
                if let Ok(address) =
                    PortAddress::new(base | (reply.sw_out[slot] & 0x0F) as u16)
                {
                    if self.universes.get_or_create(address).1 {
                        created.push(address);
                    }
                    new_ports.push(Port {
                        owner: PortOwner::Remote(ip),
                        direction: Direction::Output,
                        media: Media::from_code(port_type),
                        address,
                    });
                }
            }
            if port_type & 0x40 != 0 {
                if let Ok(address) =
                    PortAddress::new(base | (reply.sw_in[slot] & 0x0F) as u16)
                {
                    if self.universes.get_or_create(address).1 {
                        created.push(address);
                    }
                    new_ports.push(Port {
                        owner: PortOwner::Remote(ip),
                        direction: Direction::Input,
                        media: Media::from_code(port_type),
                        address,
                    });
                }
            }
        }

        // Page replacement: the reply's list supersedes whatever this
        // bindIndex held before.
        let mut added = Vec::new();
        let mut removed = Vec::new();
        if let Some(node) = self.nodes.get_mut(&ip) {
            let Node { binds, ports, .. } = node;
            let page = binds.entry(reply.bind_index).or_default();
            for port in &new_ports {
                if !page.contains(port) {
                    page.push(*port);
                    ports.push(*port);
                    added.push(*port);
                }
            }
            for port in page.clone() {
                if !new_ports.contains(&port) {
                    if let Some(i) = page.iter().position(|p| *p == port) {
                        page.remove(i);
                    }
                    if let Some(i) = ports.iter().position(|p| *p == port) {
                        ports.remove(i);
                    }
                    removed.push(port);
                }
            }
        }

        for port in &added {
            if let Some(universe) = self.universes.get_mut(port.address) {
                match port.direction {
                    Direction::Input => universe.publishers.push(ip),
                    Direction::Output => universe.subscribers.push(ip),
                }
            }
        }
        for port in &removed {
            if let Some(universe) = self.universes.get_mut(port.address) {
                let list = match port.direction {
                    Direction::Input => &mut universe.publishers,
                    Direction::Output => &mut universe.subscribers,
                };
                if let Some(i) = list.iter().position(|n| *n == ip) {
                    list.remove(i);
                }
            }
        }

        debug!(
            "reply from {} page {}: +{} -{} ports",
            ip,
            reply.bind_index,
            added.len(),
            removed.len()
        );

        let snapshot = match self.nodes.get(&ip) {
            Some(node) => node.clone(),
            None => return,
        };
        if is_new {
            self.events.emit(Event::NodeDiscovered {
                node: snapshot.clone(),
            });
        } else if changed {
            self.events.emit(Event::NodeChanged {
                node: snapshot.clone(),
            });
        }
        for port in added {
            self.events.emit(Event::NodePortAdded {
                node: snapshot.clone(),
                port,
            });
        }
        for port in removed {
            self.events.emit(Event::NodePortRemoved {
                node: snapshot.clone(),
                port,
            });
        }
        for address in created {
            self.events.emit(Event::UniverseDiscovered { universe: address });
        }
    }

    /// Latch an incoming DMX frame. Frames are accepted regardless of
    /// subscription state; uncooperative broadcasters still count.
    fn on_dmx(&mut self, dmx: &ArtDmx, from: SocketAddr) {
        let address = match dmx.port_address() {
            Ok(address) => address,
            Err(e) => {
                debug!("dropping dmx from {}: {}", from, e);
                return;
            }
        };
        let (universe, created) = self.universes.get_or_create(address);
        if dmx.sequence != 0 {
            // Sequence 0 means the sender does not sequence at all.
            universe
                .publisher_seq
                .insert((from, dmx.physical), dmx.sequence);
        }
        let n = dmx.data.len().min(DMX_UNIVERSE_SIZE);
        universe.last_data[..n].copy_from_slice(&dmx.data[..n]);
        let data = Bytes::copy_from_slice(&universe.last_data);
        if created {
            self.events.emit(Event::UniverseDiscovered { universe: address });
        }
        self.events.emit(Event::UniverseDmx {
            universe: address,
            data,
        });
    }

    /// Broadcast one poll and stamp the cadence timer.
    pub(crate) fn send_poll(&mut self, wire: &dyn Wire, now: Instant) {
        let Some(broadcast_ip) = self.identity.broadcast_ip else {
            return;
        };
        self.last_poll = Some(now);
        self.report_counter = (self.report_counter + 1) % 10000;
        debug!("sending poll to {}", broadcast_ip);
        wire.send_to(
            &ArtPoll::default().encode(),
            SocketAddr::from((broadcast_ip, ARTNET_PORT)),
        );
    }

    /// Broadcast one reply per local bind page. A portless peer still
    /// answers with a single empty page so controllers can see it.
    pub(crate) fn send_poll_reply(&self, wire: &dyn Wire) {
        let (Some(unicast_ip), Some(broadcast_ip)) =
            (self.identity.unicast_ip, self.identity.broadcast_ip)
        else {
            return;
        };
        let target = SocketAddr::from((broadcast_ip, ARTNET_PORT));
        for (bind_index, ports) in &self.local_binds {
            let reply = self.build_reply(*bind_index, ports, unicast_ip);
            debug!("sending poll-reply page {} to {}", bind_index, target);
            wire.send_to(&reply.encode(), target);
        }
    }

    fn build_reply(&self, bind_index: u8, ports: &[Port], unicast_ip: Ipv4Addr) -> ArtPollReply {
        let mut port_types = [0u8; 4];
        let mut sw_in = [0u8; 4];
        let mut sw_out = [0u8; 4];
        // Defaults apply when the page is empty; otherwise the page's ports
        // fix the net/sub-net switches.
        let mut net_switch = self.identity.net;
        let mut sub_switch = self.identity.subnet;
        for (slot, port) in ports.iter().take(4).enumerate() {
            port_types[slot] =
                port.media.code() | if port.is_input() { 0x40 } else { 0x80 };
            let (net, sub_net, universe) = port.address.split();
            net_switch = net;
            sub_switch = sub_net;
            if port.is_input() {
                sw_in[slot] = universe;
            } else {
                sw_out[slot] = universe;
            }
        }
        ArtPollReply {
            ip: unicast_ip,
            udp_port: ARTNET_PORT,
            firmware: 1,
            net_switch,
            sub_switch,
            oem: OEM_CODE,
            esta: ESTA_CODE,
            port_name: self.identity.port_name.clone(),
            long_name: self.identity.long_name.clone(),
            node_report: format!("#0001 [{:04}] Debug OK", self.report_counter),
            num_ports: ports.len().min(4) as u16,
            port_types,
            sw_in,
            sw_out,
            style: self.identity.style,
            mac: self.identity.mac,
            bind_ip: unicast_ip,
            bind_index,
            status2: STATUS2_PORT_ADDR_15BIT,
            ..Default::default()
        }
    }

    /// Transmit a universe to its subscribers and stamp the keepalive.
    fn send_dmx(&mut self, wire: &dyn Wire, address: PortAddress, now: Instant) {
        let Some(universe) = self.universes.get_mut(address) else {
            return;
        };
        universe.last_publish = Some(now);
        let sequence = universe.next_seq();
        let frame = ArtDmx::new(
            address,
            sequence,
            0,
            Bytes::copy_from_slice(&universe.last_data),
        );
        let encoded = frame.encode();
        let subscribers = universe.subscribers.clone();
        debug!(
            "sending dmx for {} to {} subscriber(s)",
            address,
            subscribers.len()
        );
        for ip in subscribers {
            if let Some(node) = self.nodes.get(&ip) {
                wire.send_to(&encoded, SocketAddr::from((ip, node.udp_port)));
            }
        }
    }

    /// Overwrite a published universe and unicast it to every subscriber.
    pub(crate) fn set_dmx(
        &mut self,
        wire: &dyn Wire,
        address: PortAddress,
        data: &[u8],
        now: Instant,
    ) -> Result<()> {
        if data.len() != DMX_UNIVERSE_SIZE {
            return Err(Error::DmxSize(data.len()));
        }
        if !self.publishing.contains(&address) {
            return Err(Error::NotPublishing(address));
        }
        let (universe, created) = self.universes.get_or_create(address);
        universe.last_data.copy_from_slice(data);
        if created {
            self.events.emit(Event::UniverseDiscovered { universe: address });
        }
        self.send_dmx(wire, address, now);
        Ok(())
    }

    /// Replace the local port on a universe. Passing neither direction
    /// removes it. Announces the new configuration unless passive.
    pub(crate) fn set_port_config(
        &mut self,
        wire: &dyn Wire,
        address: PortAddress,
        is_input: bool,
        is_output: bool,
    ) {
        if self.universes.get_or_create(address).1 {
            self.events.emit(Event::UniverseDiscovered { universe: address });
        }

        if let Some(i) = self.local_ports.iter().position(|p| p.address == address) {
            let old = self.local_ports.remove(i);
            info!("removed own port {}", old);
        }
        if is_input || is_output {
            let port = Port {
                owner: PortOwner::Local,
                direction: if is_input {
                    Direction::Input
                } else {
                    Direction::Output
                },
                media: Media::Dmx,
                address,
            };
            self.local_ports.push(port);
            info!("configured own port {}", port);
        }

        // One port per page. Up to four ports sharing a net/sub-net could
        // be packed onto one bindIndex; separate pages keep reconciliation
        // of our own replies trivial.
        self.local_binds = if self.local_ports.is_empty() {
            BTreeMap::from([(1, Vec::new())])
        } else {
            self.local_ports
                .iter()
                .enumerate()
                .map(|(i, port)| ((i + 1) as u8, vec![*port]))
                .collect()
        };

        self.publishing.retain(|a| *a != address);
        if is_input {
            self.publishing.push(address);
        }

        if !self.identity.passive {
            self.send_poll_reply(wire);
        }
    }

    /// Mutate identity fields, announcing the change unless passive.
    pub(crate) fn set_identity<F: FnOnce(&mut Identity)>(&mut self, wire: &dyn Wire, f: F) {
        f(&mut self.identity);
        if !self.identity.passive {
            self.send_poll_reply(wire);
        }
    }

    /// One scheduler step: rebroadcast stale published universes, keep the
    /// poll cadence, and give the RDM interrogator its slice.
    pub(crate) fn tick(&mut self, wire: &dyn Wire, now: Instant) {
        let stale: Vec<PortAddress> = self
            .publishing
            .iter()
            .copied()
            .filter(|address| match self.universes.get(*address) {
                Some(u) => u.last_publish.map_or(true, |t| now - t > PUBLISH_INTERVAL),
                None => false,
            })
            .collect();
        for address in stale {
            self.send_dmx(wire, address, now);
        }
        if self.last_poll.map_or(true, |t| now - t > POLL_INTERVAL) {
            self.send_poll(wire, now);
        }
        self.rdm.poll();
    }
}
