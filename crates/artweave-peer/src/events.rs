//! Event fan-out
//!
//! Topology changes and incoming DMX surface to embedders as a stream of
//! [`Event`]s. Fan-out is multi-consumer over a bounded ring: every
//! consumer gets its own cursor, and a consumer that falls behind loses the
//! oldest events and keeps going (bounded drop-oldest — the right trade for
//! 40 Hz DMX streams, where stale frames are worthless). The stream ends
//! when the peer is dropped.

use crate::node::Node;
use crate::port::Port;
use artweave_core::PortAddress;
use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::trace;

/// Buffered events per consumer before drop-oldest kicks in.
const EVENT_BUFFER: usize = 256;

/// Something the peer observed.
#[derive(Debug, Clone)]
pub enum Event {
    /// First poll-reply from a new source IP.
    NodeDiscovered { node: Node },
    /// A known node's portName, longName or style changed.
    NodeChanged { node: Node },
    /// Reserved: the engine never evicts nodes, so this is never produced.
    NodeLost { node: Node },
    /// A reply page listed a port we had not seen.
    NodePortAdded { node: Node, port: Port },
    /// A reply page dropped a port it used to list.
    NodePortRemoved { node: Node, port: Port },
    /// A port-address was referenced for the first time.
    UniverseDiscovered { universe: PortAddress },
    /// A DMX frame landed; `data` is the full 512-byte latch after the
    /// frame was applied.
    UniverseDmx { universe: PortAddress, data: Bytes },
}

/// Sender half owned by the engine.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
        }
    }

    /// Emit to all current consumers. A send with no consumers is not an
    /// error; events are fire-and-forget.
    pub(crate) fn emit(&self, event: Event) {
        trace!("emit {:?}", event);
        let _ = self.tx.send(event);
    }
}

/// One consumer's view of the event stream.
///
/// Obtained from `Peer::events`. Each stream starts at the moment of
/// subscription; it does not replay history.
pub struct EventStream {
    rx: broadcast::Receiver<Event>,
}

impl EventStream {
    /// Wait for the next event. Returns `None` once the peer is gone.
    /// Gaps caused by falling behind are skipped transparently.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("event consumer lagged, dropped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant: the next buffered event, if any.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!("event consumer lagged, dropped {} events", missed);
                }
                Err(_) => return None,
            }
        }
    }
}
