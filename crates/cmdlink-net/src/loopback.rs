//! In-process transport connecting peers that share one thread.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use cmdlink_types::error::{CmdlinkError, Result};
use cmdlink_types::message::{PeerHandle, Target};

use crate::codec::Frame;
use crate::transport::{InboundFrame, PeerEvent, SERVER_PEER, Transport};

#[derive(Default)]
struct Inbox {
    frames: VecDeque<InboundFrame>,
    events: Vec<PeerEvent>,
}

#[derive(Default)]
struct Hub {
    inboxes: BTreeMap<PeerHandle, Inbox>,
    next_id: u32,
}

/// A shared in-memory network. Each joined peer gets a [`LoopbackTransport`].
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join as the server, using [`SERVER_PEER`].
    pub fn join_server(&self) -> Result<LoopbackTransport> {
        self.join_as(SERVER_PEER)
    }

    /// Join with the next free handle.
    pub fn join(&self) -> LoopbackTransport {
        let mut hub = self.hub.borrow_mut();
        let mut id = hub.next_id.max(1);
        while hub.inboxes.contains_key(&PeerHandle(id)) {
            id += 1;
        }
        hub.next_id = id + 1;
        drop(hub);
        self.attach(PeerHandle(id))
    }

    /// Join with a specific handle.
    pub fn join_as(&self, peer: PeerHandle) -> Result<LoopbackTransport> {
        if self.hub.borrow().inboxes.contains_key(&peer) {
            return Err(CmdlinkError::Transport(format!("peer {peer} already joined")));
        }
        Ok(self.attach(peer))
    }

    fn attach(&self, peer: PeerHandle) -> LoopbackTransport {
        let mut hub = self.hub.borrow_mut();
        let mut inbox = Inbox::default();
        for (existing, other) in hub.inboxes.iter_mut() {
            other.events.push(PeerEvent::Connected(peer));
            inbox.events.push(PeerEvent::Connected(*existing));
        }
        hub.inboxes.insert(peer, inbox);
        LoopbackTransport {
            local: peer,
            hub: Rc::clone(&self.hub),
        }
    }

    /// Number of joined peers.
    pub fn peer_count(&self) -> usize {
        self.hub.borrow().inboxes.len()
    }
}

/// One peer's view of a [`LoopbackNetwork`]. Leaves the network on drop.
pub struct LoopbackTransport {
    local: PeerHandle,
    hub: Rc<RefCell<Hub>>,
}

impl Transport for LoopbackTransport {
    fn local_peer(&self) -> PeerHandle {
        self.local
    }

    fn send(&mut self, target: Target, frame: &Frame) -> Result<()> {
        let mut hub = self.hub.borrow_mut();
        let inbound = InboundFrame {
            sender: self.local,
            frame: frame.clone(),
        };
        match target {
            Target::Broadcast => {
                for (peer, inbox) in hub.inboxes.iter_mut() {
                    if *peer != self.local {
                        inbox.frames.push_back(inbound.clone());
                    }
                }
            },
            Target::Peer(peer) => {
                let inbox = hub
                    .inboxes
                    .get_mut(&peer)
                    .ok_or_else(|| CmdlinkError::Transport(format!("no such peer {peer}")))?;
                inbox.frames.push_back(inbound);
            },
        }
        Ok(())
    }

    fn drain(&mut self) -> Vec<InboundFrame> {
        self.hub
            .borrow_mut()
            .inboxes
            .get_mut(&self.local)
            .map(|inbox| inbox.frames.drain(..).collect())
            .unwrap_or_default()
    }

    fn take_peer_events(&mut self) -> Vec<PeerEvent> {
        self.hub
            .borrow_mut()
            .inboxes
            .get_mut(&self.local)
            .map(|inbox| std::mem::take(&mut inbox.events))
            .unwrap_or_default()
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        let mut hub = self.hub.borrow_mut();
        hub.inboxes.remove(&self.local);
        for inbox in hub.inboxes.values_mut() {
            inbox.events.push(PeerEvent::Disconnected(self.local));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DataFrame;

    fn frame(n: u32) -> Frame {
        Frame::Data(DataFrame {
            message_number: n,
            start_byte: 0,
            payload: vec![n as u8],
        })
    }

    #[test]
    fn unicast_delivers_in_order() {
        let net = LoopbackNetwork::new();
        let mut server = net.join_server().unwrap();
        let mut client = net.join();
        client.send(Target::Peer(SERVER_PEER), &frame(1)).unwrap();
        client.send(Target::Peer(SERVER_PEER), &frame(2)).unwrap();
        let got = server.drain();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].sender, client.local_peer());
        assert_eq!(got[0].frame.message_number(), 1);
        assert_eq!(got[1].frame.message_number(), 2);
        assert!(server.drain().is_empty());
    }

    #[test]
    fn broadcast_skips_sender() {
        let net = LoopbackNetwork::new();
        let mut server = net.join_server().unwrap();
        let mut a = net.join();
        let mut b = net.join();
        server.send(Target::Broadcast, &frame(3)).unwrap();
        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
        assert!(server.drain().is_empty());
    }

    #[test]
    fn unknown_peer_is_error() {
        let net = LoopbackNetwork::new();
        let mut a = net.join();
        assert!(a.send(Target::Peer(PeerHandle(77)), &frame(1)).is_err());
    }

    #[test]
    fn join_and_leave_events() {
        let net = LoopbackNetwork::new();
        let mut server = net.join_server().unwrap();
        let mut client = net.join();
        let id = client.local_peer();
        assert_eq!(server.take_peer_events(), vec![PeerEvent::Connected(id)]);
        assert_eq!(client.take_peer_events(), vec![PeerEvent::Connected(SERVER_PEER)]);
        drop(client);
        assert_eq!(server.take_peer_events(), vec![PeerEvent::Disconnected(id)]);
        assert_eq!(net.peer_count(), 1);
    }

    #[test]
    fn duplicate_join_rejected() {
        let net = LoopbackNetwork::new();
        let _server = net.join_server().unwrap();
        assert!(net.join_server().is_err());
    }

    #[test]
    fn join_assigns_distinct_handles() {
        let net = LoopbackNetwork::new();
        let a = net.join();
        let b = net.join();
        assert_ne!(a.local_peer(), b.local_peer());
        assert_ne!(a.local_peer(), SERVER_PEER);
    }
}
