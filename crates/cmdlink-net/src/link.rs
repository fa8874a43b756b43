//! Per-endpoint frame state: outbound numbering, reassembly, receive queue.

use cmdlink_types::config::NetworkConfig;
use cmdlink_types::error::{CmdlinkError, Result};
use cmdlink_types::message::{Message, PeerHandle, Target};

use crate::codec::{Frame, MessageHeader, fragment};
use crate::queue::ReceiveQueue;
use crate::reassembly::ReassemblyTable;
use crate::transport::{InboundFrame, Transport};

/// Largest message the wire's signed 32-bit size field can announce.
pub const MAX_MESSAGE_BYTES: usize = i32::MAX as usize;

/// Frame-level endpoint owned by a server or client node.
///
/// Call [`FrameLink::poll`] (or [`FrameLink::on_tick`] with frames pulled
/// from the transport) once per tick. Every frame is consumed exactly once;
/// finished messages come back in arrival order.
pub struct FrameLink {
    reassembly: ReassemblyTable,
    queue: ReceiveQueue,
    next_message_number: u32,
    /// Ticks before an unfinished assembly is dropped (0 = never).
    stale_after_ticks: u64,
}

impl FrameLink {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            reassembly: ReassemblyTable::new(),
            queue: ReceiveQueue::new(config.queue_capacity),
            next_message_number: 0,
            stale_after_ticks: config.stale_assembly_ticks,
        }
    }

    /// Fragment `text` and hand every frame to the transport.
    ///
    /// Returns the message number used.
    pub fn submit_outbound(
        &mut self,
        transport: &mut dyn Transport,
        text: &str,
        header: MessageHeader,
        target: Target,
    ) -> Result<u32> {
        if text.len() > MAX_MESSAGE_BYTES {
            return Err(CmdlinkError::Protocol(format!(
                "message of {} bytes is too large to announce",
                text.len()
            )));
        }
        let number = self.next_message_number;
        // Stay inside the wire's non-negative i32 range.
        self.next_message_number = (number + 1) % (i32::MAX as u32);

        let (meta, data) = fragment(text, number, header);
        log::trace!(
            "sending message {number} ({} bytes, {} frames) to {target:?}",
            meta.total_size,
            data.len()
        );
        transport.send(target, &Frame::Meta(meta))?;
        for frame in data {
            transport.send(target, &Frame::Data(frame))?;
        }
        Ok(number)
    }

    /// Consume this tick's frames and return every message finished so far.
    pub fn on_tick(&mut self, inbound: Vec<InboundFrame>) -> Vec<Message> {
        self.reassembly.advance_tick();
        for frame in inbound {
            if let Some(message) = self.reassembly.accept(frame) {
                self.queue.push(message);
            }
        }
        if self.stale_after_ticks > 0 {
            self.reassembly.expire_stale(self.stale_after_ticks);
        }
        std::iter::from_fn(|| self.queue.try_pop()).collect()
    }

    /// Drain the transport and run [`FrameLink::on_tick`].
    pub fn poll(&mut self, transport: &mut dyn Transport) -> Vec<Message> {
        let inbound = transport.drain();
        self.on_tick(inbound)
    }

    /// Drop partial messages from a peer that disconnected.
    pub fn forget_peer(&mut self, peer: PeerHandle) {
        let dropped = self.reassembly.forget_peer(peer);
        if dropped > 0 {
            log::debug!("dropped {dropped} partial messages from {peer}");
        }
    }

    /// Messages currently mid-assembly.
    pub fn in_flight(&self) -> usize {
        self.reassembly.len()
    }
}

impl Default for FrameLink {
    fn default() -> Self {
        Self::new(&NetworkConfig::default())
    }
}
