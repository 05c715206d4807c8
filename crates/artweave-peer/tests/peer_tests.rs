//! Two peers on a loopback network: discovery, rename propagation, port
//! reconciliation through their own replies, and DMX unicast.

mod harness;

use artweave_core::PortAddress;
use artweave_peer::{Event, Peer, DMX_UNIVERSE_SIZE};
use harness::{make_peer, Network};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

const BROADCAST: Ipv4Addr = Ipv4Addr::new(10, 10, 10, 255);
const ALPHA_IP: Ipv4Addr = Ipv4Addr::new(10, 10, 10, 10);
const BRAVO_IP: Ipv4Addr = Ipv4Addr::new(10, 10, 10, 2);

fn pair() -> (Arc<Network>, Peer, Peer) {
    harness::init_tracing();
    let network = Network::new(BROADCAST);
    let alpha = make_peer("alpha", ALPHA_IP, BROADCAST);
    let bravo = make_peer("bravo", BRAVO_IP, BROADCAST);
    network.join(&alpha, ALPHA_IP);
    network.join(&bravo, BRAVO_IP);
    (network, alpha, bravo)
}

#[test]
fn test_back_to_back_discovery_rename_and_dmx() {
    let (network, alpha, bravo) = pair();
    let mut events = bravo.events();

    // one poll from alpha; both answer the broadcast, both see both
    alpha.send_poll();
    network.drain();

    assert_eq!(alpha.nodes().len(), 2);
    assert_eq!(bravo.nodes().len(), 2);
    let seen: Vec<String> = alpha.nodes().iter().map(|n| n.to_string()).collect();
    assert_eq!(
        seen,
        [
            "Node<bravo,10.10.10.2:6454>",
            "Node<alpha,10.10.10.10:6454>",
        ]
    );

    assert!(matches!(events.try_recv(), Some(Event::NodeDiscovered { .. })));
    assert!(matches!(events.try_recv(), Some(Event::NodeDiscovered { .. })));
    assert!(events.try_recv().is_none());

    // a renamed peer announces itself exactly once, unsolicited
    bravo.set_port_name("charlie");
    assert_eq!(network.pending().len(), 1);
    network.drain();

    assert_eq!(alpha.node(BRAVO_IP).unwrap().port_name, "charlie");
    assert_eq!(bravo.node(BRAVO_IP).unwrap().port_name, "charlie");
    match events.try_recv() {
        Some(Event::NodeChanged { node }) => assert_eq!(node.port_name, "charlie"),
        other => panic!("expected NodeChanged, got {:?}", other),
    }
    assert!(events.try_recv().is_none());

    // alpha publishes 2:2:2, bravo subscribes
    let universe: PortAddress = "2:2:2".parse().unwrap();
    alpha.set_port_config(universe, true, false);
    bravo.set_port_config(universe, false, true);
    network.drain();

    match events.try_recv() {
        Some(Event::UniverseDiscovered { universe: seen }) => assert_eq!(seen, universe),
        other => panic!("expected UniverseDiscovered, got {:?}", other),
    }
    assert!(matches!(events.try_recv(), Some(Event::NodePortAdded { .. })));
    assert!(matches!(events.try_recv(), Some(Event::NodePortAdded { .. })));
    assert!(events.try_recv().is_none());

    for peer in [&alpha, &bravo] {
        let view = peer.universe(universe).unwrap();
        assert_eq!(view.publishers, vec![ALPHA_IP]);
        assert_eq!(view.subscribers, vec![BRAVO_IP]);
    }

    // one frame, one unicast datagram, straight to bravo
    let mut pattern = [0u8; DMX_UNIVERSE_SIZE];
    pattern[1] = 255;
    alpha.set_dmx(universe, &pattern).unwrap();

    let pending = network.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].to, SocketAddr::from((BRAVO_IP, 6454)));
    network.drain();

    assert_eq!(bravo.get_dmx(universe).unwrap(), pattern);
    match events.try_recv() {
        Some(Event::UniverseDmx { universe: seen, data }) => {
            assert_eq!(seen, universe);
            assert_eq!(data.as_ref(), pattern);
        }
        other => panic!("expected UniverseDmx, got {:?}", other),
    }
    assert!(events.try_recv().is_none());
}

#[test]
fn test_port_config_reconciles_through_own_reply() {
    harness::init_tracing();
    let network = Network::new(BROADCAST);
    let alpha = make_peer("alpha", ALPHA_IP, BROADCAST);
    network.join(&alpha, ALPHA_IP);

    let u107: PortAddress = "1:0:7".parse().unwrap();
    alpha.set_port_config(u107, true, false);
    alpha.send_poll();
    network.drain();

    assert_eq!(alpha.nodes().len(), 1);
    assert_eq!(alpha.local_ports().len(), 1);
    let binds = alpha.local_binds();
    assert_eq!(binds.len(), 1);
    assert_eq!(binds[&1][0].to_string(), "Port<Input,DMX,1:0:7>");

    // the received view of our own announcements matches the config
    let own = alpha.node(ALPHA_IP).unwrap();
    assert_eq!(own.ports.len(), 1);
    assert_eq!(own.ports[0].to_string(), "Port<Input,DMX,1:0:7>");
    assert_eq!(alpha.universes(), vec![u107]);
    assert_eq!(alpha.universe(u107).unwrap().publishers, vec![ALPHA_IP]);
    assert!(alpha.universe(u107).unwrap().subscribers.is_empty());

    // drop the input, pick up an output elsewhere
    let u018: PortAddress = "0:1:8".parse().unwrap();
    alpha.set_port_config(u107, false, false);
    alpha.set_port_config(u018, false, true);
    network.drain();

    assert_eq!(alpha.local_binds()[&1][0].to_string(), "Port<Output,DMX,0:1:8>");
    let own = alpha.node(ALPHA_IP).unwrap();
    assert_eq!(own.ports.len(), 1);
    assert_eq!(own.ports[0].to_string(), "Port<Output,DMX,0:1:8>");

    // fully reconciled off u107: no local port, not a publisher anymore
    assert!(alpha.local_ports().iter().all(|p| p.address != u107));
    assert!(alpha.universe(u107).unwrap().publishers.is_empty());
    assert!(alpha.universe(u107).unwrap().subscribers.is_empty());
    assert!(alpha.universe(u018).unwrap().publishers.is_empty());
    assert_eq!(alpha.universe(u018).unwrap().subscribers, vec![ALPHA_IP]);

    // a second concurrent port lands on its own bind page
    let u019: PortAddress = "0:1:9".parse().unwrap();
    alpha.set_port_config(u019, true, false);
    assert_eq!(alpha.local_binds().len(), 2);
    network.drain();

    assert_eq!(alpha.universe(u018).unwrap().subscribers, vec![ALPHA_IP]);
    assert_eq!(alpha.universe(u019).unwrap().publishers, vec![ALPHA_IP]);
    assert!(alpha.universe(u019).unwrap().subscribers.is_empty());

    // the pages partition the flat port list
    let own = alpha.node(ALPHA_IP).unwrap();
    let mut union: Vec<String> = own.binds.values().flatten().map(|p| p.to_string()).collect();
    let mut flat: Vec<String> = own.ports.iter().map(|p| p.to_string()).collect();
    union.sort();
    flat.sort();
    assert_eq!(union, flat);
    assert_eq!(own.binds.len(), 2);
}

#[test]
fn test_dmx_tx_rx_full_pattern() {
    let (network, alpha, bravo) = pair();

    let universe: PortAddress = "1:0:7".parse().unwrap();
    alpha.set_port_config(universe, true, false);
    bravo.set_port_config(universe, false, true);

    assert_eq!(bravo.get_dmx(universe).unwrap(), [0u8; DMX_UNIVERSE_SIZE]);

    alpha.send_poll();
    network.drain();

    let pattern: Vec<u8> = (0..128u8).cycle().take(DMX_UNIVERSE_SIZE).collect();
    alpha.set_dmx(universe, &pattern).unwrap();
    assert_eq!(network.pending().len(), 1);
    network.drain();

    assert_eq!(bravo.get_dmx(universe).unwrap().as_slice(), &pattern[..]);
}

#[tokio::test]
async fn test_event_stream_ends_with_peer() {
    let peer = make_peer("solo", ALPHA_IP, BROADCAST);
    let mut events = peer.events();

    peer.set_port_config("0:0:1".parse().unwrap(), true, false);
    match events.recv().await {
        Some(Event::UniverseDiscovered { universe }) => assert_eq!(universe.raw(), 1),
        other => panic!("expected UniverseDiscovered, got {:?}", other),
    }

    drop(peer);
    assert!(events.recv().await.is_none());
}
