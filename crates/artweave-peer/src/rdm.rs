//! RDM seam
//!
//! The engine does not interrogate RDM fixtures itself. Embedders that
//! care plug an [`RdmInterrogator`] into the peer; the scheduler gives it a
//! slice of every tick, and the engine forwards table-of-devices UIDs and
//! raw responses as they arrive. The default implementation ignores all of
//! it.

/// An RDM unique device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RdmUid(pub [u8; 6]);

/// Hook for RDM device interrogation.
pub trait RdmInterrogator: Send {
    /// A node reported its table of devices.
    fn on_uids(&mut self, _uids: &[RdmUid]) {}

    /// Called from the scheduler tick.
    fn poll(&mut self) {}

    /// A raw RDM response arrived.
    fn on_response(&mut self, _data: &[u8]) {}
}

/// Default interrogator: discovers nothing, asks nothing.
pub struct NullRdm;

impl RdmInterrogator for NullRdm {}
