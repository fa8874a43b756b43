//! Frame transport over non-blocking TCP.
//!
//! Records are written back to back, each prefixed with its kind byte (see
//! [`crate::wire`]). Both ends are polled from the main loop and never block.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use cmdlink_types::error::{CmdlinkError, Result};
use cmdlink_types::message::{PeerHandle, Target};

use crate::codec::Frame;
use crate::transport::{InboundFrame, PeerEvent, SERVER_PEER, Transport, UNASSIGNED_PEER};
use crate::wire;

/// Maximum simultaneous client connections.
const DEFAULT_MAX_PEERS: usize = 32;

/// Unsent bytes allowed to pile up for one peer before it is dropped.
const MAX_PENDING_WRITE: usize = 256 * 1024;

/// One TCP connection with its partial read and pending write buffers.
struct Connection {
    stream: TcpStream,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    closed: bool,
}

impl Connection {
    fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buf: Vec::with_capacity(256),
            write_buf: Vec::new(),
            closed: false,
        })
    }

    /// Read everything available and return the complete frames.
    fn read_frames(&mut self) -> Vec<Frame> {
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.closed = true;
                    break;
                },
                Ok(n) => self.read_buf.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("read error: {e}");
                    self.closed = true;
                    break;
                },
            }
        }
        let mut frames = Vec::new();
        if let Err(e) = wire::take_records(&mut self.read_buf, &mut frames) {
            log::warn!("{e}; closing connection");
            self.closed = true;
        }
        frames
    }

    fn queue(&mut self, bytes: &[u8]) {
        if self.closed {
            return;
        }
        self.write_buf.extend_from_slice(bytes);
        if self.write_buf.len() > MAX_PENDING_WRITE {
            log::warn!("peer is not reading; closing connection");
            self.closed = true;
            return;
        }
        self.flush();
    }

    fn flush(&mut self) {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    self.closed = true;
                    return;
                },
                Ok(n) => {
                    self.write_buf.drain(..n);
                },
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("write error: {e}");
                    self.closed = true;
                    return;
                },
            }
        }
    }
}

fn encode(frame: &Frame) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(1 + wire::DATA_RECORD_LEN);
    wire::write_record(frame, &mut bytes)?;
    Ok(bytes)
}

/// Server side: accepts clients and assigns each a [`PeerHandle`].
pub struct TcpServerTransport {
    listener: TcpListener,
    peers: Vec<(PeerHandle, Connection)>,
    next_id: u32,
    max_peers: usize,
    events: Vec<PeerEvent>,
}

impl TcpServerTransport {
    /// Listen on all interfaces at `port` (0 picks a free port).
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        log::info!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            peers: Vec::new(),
            next_id: 1,
            max_peers: DEFAULT_MAX_PEERS,
            events: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of connected clients.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.peers.len() >= self.max_peers {
                        log::warn!("rejecting {addr}: connection limit reached");
                        continue;
                    }
                    match Connection::new(stream) {
                        Ok(conn) => {
                            let peer = PeerHandle(self.next_id);
                            self.next_id = self.next_id.wrapping_add(1).max(1);
                            log::info!("peer {peer} connected from {addr}");
                            self.peers.push((peer, conn));
                            self.events.push(PeerEvent::Connected(peer));
                        },
                        Err(e) => log::warn!("could not configure {addr}: {e}"),
                    }
                },
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("accept error: {e}");
                    break;
                },
            }
        }
    }

    fn remove_closed(&mut self) {
        let events = &mut self.events;
        self.peers.retain(|(peer, conn)| {
            if conn.closed {
                log::info!("peer {peer} disconnected");
                events.push(PeerEvent::Disconnected(*peer));
            }
            !conn.closed
        });
    }
}

impl Transport for TcpServerTransport {
    fn local_peer(&self) -> PeerHandle {
        SERVER_PEER
    }

    fn send(&mut self, target: Target, frame: &Frame) -> Result<()> {
        let bytes = encode(frame)?;
        match target {
            Target::Broadcast => {
                for (_, conn) in &mut self.peers {
                    conn.queue(&bytes);
                }
            },
            Target::Peer(peer) => {
                let (_, conn) = self
                    .peers
                    .iter_mut()
                    .find(|(p, _)| *p == peer)
                    .ok_or_else(|| CmdlinkError::Transport(format!("no such peer {peer}")))?;
                conn.queue(&bytes);
            },
        }
        Ok(())
    }

    fn drain(&mut self) -> Vec<InboundFrame> {
        self.accept_pending();
        let mut inbound = Vec::new();
        for (peer, conn) in &mut self.peers {
            conn.flush();
            for frame in conn.read_frames() {
                inbound.push(InboundFrame {
                    sender: *peer,
                    frame,
                });
            }
        }
        self.remove_closed();
        inbound
    }

    fn take_peer_events(&mut self) -> Vec<PeerEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Client side: a single connection to the server.
pub struct TcpClientTransport {
    conn: Connection,
    reported_close: bool,
    events: Vec<PeerEvent>,
}

impl TcpClientTransport {
    pub fn connect(address: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((address, port))?;
        log::info!("Connected to {address}:{port}");
        Ok(Self {
            conn: Connection::new(stream)?,
            reported_close: false,
            events: vec![PeerEvent::Connected(SERVER_PEER)],
        })
    }

    pub fn is_connected(&self) -> bool {
        !self.conn.closed
    }
}

impl Transport for TcpClientTransport {
    fn local_peer(&self) -> PeerHandle {
        UNASSIGNED_PEER
    }

    fn send(&mut self, _target: Target, frame: &Frame) -> Result<()> {
        if self.conn.closed {
            return Err(CmdlinkError::Transport("not connected".to_string()));
        }
        let bytes = encode(frame)?;
        self.conn.queue(&bytes);
        Ok(())
    }

    fn drain(&mut self) -> Vec<InboundFrame> {
        self.conn.flush();
        let frames = self
            .conn
            .read_frames()
            .into_iter()
            .map(|frame| InboundFrame {
                sender: SERVER_PEER,
                frame,
            })
            .collect();
        if self.conn.closed && !self.reported_close {
            self.reported_close = true;
            log::info!("server closed the connection");
            self.events.push(PeerEvent::Disconnected(SERVER_PEER));
        }
        frames
    }

    fn take_peer_events(&mut self) -> Vec<PeerEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::codec::{DataFrame, MessageHeader, MetaFrame};
    use cmdlink_types::message::{MessageFlags, MessageType, Status};

    fn poll_until<T: Transport>(transport: &mut T, want: usize) -> Vec<InboundFrame> {
        let mut got = Vec::new();
        for _ in 0..200 {
            got.extend(transport.drain());
            if got.len() >= want {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        got
    }

    #[test]
    fn client_server_exchange() {
        let mut server = TcpServerTransport::bind(0).unwrap();
        let port = server.local_addr().unwrap().port();
        let mut client = TcpClientTransport::connect("127.0.0.1", port).unwrap();

        let meta = Frame::Meta(MetaFrame {
            message_number: 1,
            total_size: 5,
            header: MessageHeader::new(MessageType::Command, Status::None, MessageFlags::NONE),
        });
        let data = Frame::Data(DataFrame {
            message_number: 1,
            start_byte: 0,
            payload: b"/help".to_vec(),
        });
        client.send(Target::Peer(SERVER_PEER), &meta).unwrap();
        client.send(Target::Peer(SERVER_PEER), &data).unwrap();

        let got = poll_until(&mut server, 2);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].frame, meta);
        let peer = got[0].sender;
        assert_ne!(peer, SERVER_PEER);
        assert_eq!(
            server.take_peer_events(),
            vec![PeerEvent::Connected(peer)]
        );

        server.send(Target::Peer(peer), &meta).unwrap();
        let back = poll_until(&mut client, 1);
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].sender, SERVER_PEER);
        assert_eq!(back[0].frame, meta);
    }

    #[test]
    fn send_to_unknown_peer_fails() {
        let mut server = TcpServerTransport::bind(0).unwrap();
        let frame = Frame::Data(DataFrame {
            message_number: 0,
            start_byte: 0,
            payload: Vec::new(),
        });
        assert!(server.send(Target::Peer(PeerHandle(9)), &frame).is_err());
    }

    #[test]
    fn disconnect_reported() {
        let mut server = TcpServerTransport::bind(0).unwrap();
        let port = server.local_addr().unwrap().port();
        let client = TcpClientTransport::connect("127.0.0.1", port).unwrap();

        let mut connected = None;
        for _ in 0..200 {
            server.drain();
            if let Some(PeerEvent::Connected(p)) = server.take_peer_events().first() {
                connected = Some(*p);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let peer = connected.expect("client never accepted");
        drop(client);

        let mut events = Vec::new();
        for _ in 0..200 {
            server.drain();
            events.extend(server.take_peer_events());
            if !events.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(events, vec![PeerEvent::Disconnected(peer)]);
        assert_eq!(server.peer_count(), 0);
    }
}
