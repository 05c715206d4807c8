//! Artweave Peer
//!
//! A peer on an Art-Net 4 network: discovers nodes, advertises local
//! ports, tracks who publishes and subscribes to every universe, unicasts
//! locally produced DMX to subscribers, and surfaces topology changes and
//! incoming DMX as events.
//!
//! This crate provides:
//! - The peer engine and lifecycle ([`Peer`], [`PeerConfig`])
//! - Node and universe views ([`Node`], [`Universe`], [`Port`])
//! - The event stream ([`Event`], [`EventStream`])
//! - Network-interface bootstrap ([`iface`])
//! - The outbound transport seam ([`Wire`])
//!
//! ```no_run
//! use artweave_peer::{Peer, PeerConfig};
//!
//! # async fn run() -> artweave_peer::Result<()> {
//! let peer = Peer::new(PeerConfig::default());
//! peer.start().await?;
//! peer.set_port_config("2:2:2".parse()?, true, false);
//!
//! let mut events = peer.events();
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod peer;

pub mod error;
pub mod events;
pub mod iface;
pub mod node;
pub mod port;
pub mod rdm;
pub mod universe;
pub mod wire;

pub use error::{Error, Result};
pub use events::{Event, EventStream};
pub use node::Node;
pub use peer::{Peer, PeerConfig};
pub use port::{Direction, Media, Port, PortOwner};
pub use rdm::{NullRdm, RdmInterrogator, RdmUid};
pub use universe::{SourceKey, Universe};
pub use wire::Wire;

pub use artweave_core::{style, PortAddress, ARTNET_PORT, DMX_UNIVERSE_SIZE};
