//! The transport seam between the frame protocol and whatever delivers frames.

use cmdlink_types::error::Result;
use cmdlink_types::message::{PeerHandle, Target};

use crate::codec::Frame;

/// Handle the server is known by on every transport.
pub const SERVER_PEER: PeerHandle = PeerHandle(0);

/// Handle used by a client that has not been told its own id.
pub const UNASSIGNED_PEER: PeerHandle = PeerHandle(u32::MAX);

/// A frame surfaced by the transport, tagged with who sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub sender: PeerHandle,
    pub frame: Frame,
}

/// Connection changes reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(PeerHandle),
    Disconnected(PeerHandle),
}

/// Delivers frames between peers.
///
/// Frames sent to one peer arrive in the order they were sent. Inbound
/// frames are surfaced once, by `drain()`, and never redelivered.
pub trait Transport {
    /// This endpoint's own handle.
    fn local_peer(&self) -> PeerHandle;

    /// Enqueue a frame for delivery.
    fn send(&mut self, target: Target, frame: &Frame) -> Result<()>;

    /// Take every frame that has arrived since the last call.
    fn drain(&mut self) -> Vec<InboundFrame>;

    /// Take connection changes since the last call.
    fn take_peer_events(&mut self) -> Vec<PeerEvent> {
        Vec::new()
    }
}
