//! Reassembly of fragmented messages.
//!
//! Each `(sender, message number)` moves through
//! `Absent -> Assembling -> Complete (removed)`. Protocol violations are
//! logged and the offending frame is dropped without touching any other
//! in-flight message.

use std::collections::HashMap;

use cmdlink_types::error::{CmdlinkError, Result};
use cmdlink_types::message::{Message, PeerHandle};

use crate::codec::{DataFrame, Frame, MessageHeader, MetaFrame, defragment};
use crate::transport::InboundFrame;

/// A message whose meta frame has arrived but whose body is incomplete.
struct InFlightAssembly {
    buffer: Vec<u8>,
    header: MessageHeader,
    /// Tick on which the meta frame arrived.
    started_tick: u64,
}

/// In-flight assemblies keyed by sender and message number.
#[derive(Default)]
pub struct ReassemblyTable {
    in_flight: HashMap<(PeerHandle, u32), InFlightAssembly>,
    tick: u64,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently being assembled.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Whether a message from `sender` is mid-assembly.
    pub fn is_assembling(&self, sender: PeerHandle, message_number: u32) -> bool {
        self.in_flight.contains_key(&(sender, message_number))
    }

    /// Consume one inbound frame. Violations are logged and the frame is
    /// discarded; a finished message is returned.
    pub fn accept(&mut self, inbound: InboundFrame) -> Option<Message> {
        let result = match inbound.frame {
            Frame::Meta(meta) => self.accept_meta(inbound.sender, meta).map(|()| None),
            Frame::Data(data) => self.accept_data(inbound.sender, data),
        };
        match result {
            Ok(message) => message,
            Err(e) => {
                log::warn!("{e}; frame from {} discarded", inbound.sender);
                None
            },
        }
    }

    /// Start assembling a message. The first meta frame for a number wins.
    pub fn accept_meta(&mut self, sender: PeerHandle, meta: MetaFrame) -> Result<()> {
        let key = (sender, meta.message_number);
        if self.in_flight.contains_key(&key) {
            return Err(CmdlinkError::Protocol(format!(
                "duplicate meta frame for message {}",
                meta.message_number
            )));
        }
        log::trace!(
            "assembling message {} from {sender}: {} bytes",
            meta.message_number,
            meta.total_size
        );
        self.in_flight.insert(
            key,
            InFlightAssembly {
                buffer: vec![0u8; meta.total_size as usize],
                header: meta.header,
                started_tick: self.tick,
            },
        );
        Ok(())
    }

    /// Copy a data frame into its assembly, returning the message once the
    /// frame's range reaches the declared total size.
    pub fn accept_data(&mut self, sender: PeerHandle, data: DataFrame) -> Result<Option<Message>> {
        let key = (sender, data.message_number);
        let Some(assembly) = self.in_flight.get_mut(&key) else {
            return Err(CmdlinkError::Protocol(format!(
                "data frame for unknown message {}",
                data.message_number
            )));
        };

        let total = assembly.buffer.len();
        let start = data.start_byte as usize;
        if start > total {
            return Err(CmdlinkError::Protocol(format!(
                "data frame for message {} starts at {start}, past its {total} bytes",
                data.message_number
            )));
        }

        let copied = defragment(&mut assembly.buffer, &data);
        if start + copied < total {
            return Ok(None);
        }

        // Completion is positional: the frame reaching the end finishes it.
        let Some(assembly) = self.in_flight.remove(&key) else {
            return Ok(None);
        };
        let text = match String::from_utf8(assembly.buffer) {
            Ok(text) => text,
            Err(e) => {
                log::warn!(
                    "message {} from {sender} is not valid UTF-8; decoding lossily",
                    data.message_number
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            },
        };
        log::debug!("message {} from {sender} complete", data.message_number);
        Ok(Some(Message {
            text,
            sender,
            message_type: assembly.header.message_type,
            status: assembly.header.status,
            flags: assembly.header.flags,
        }))
    }

    /// Advance the table's tick counter used for expiry.
    pub fn advance_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    /// Drop assemblies that have waited at least `max_age_ticks` ticks.
    /// Returns how many were dropped.
    pub fn expire_stale(&mut self, max_age_ticks: u64) -> usize {
        let now = self.tick;
        let before = self.in_flight.len();
        self.in_flight.retain(|(sender, number), assembly| {
            let keep = now.wrapping_sub(assembly.started_tick) < max_age_ticks;
            if !keep {
                log::warn!("message {number} from {sender} never completed; dropped");
            }
            keep
        });
        before - self.in_flight.len()
    }

    /// Forget every assembly from a peer that went away.
    pub fn forget_peer(&mut self, peer: PeerHandle) -> usize {
        let before = self.in_flight.len();
        self.in_flight.retain(|(sender, _), _| *sender != peer);
        before - self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use cmdlink_types::message::{MessageFlags, MessageType, Status};

    use super::*;
    use crate::codec::fragment;

    const PEER: PeerHandle = PeerHandle(1);

    fn header() -> MessageHeader {
        MessageHeader::new(MessageType::Command, Status::Info, MessageFlags::USER_WANTS_HINTS)
    }

    fn inbound(frame: Frame) -> InboundFrame {
        InboundFrame {
            sender: PEER,
            frame,
        }
    }

    fn feed(table: &mut ReassemblyTable, text: &str, number: u32) -> Vec<Message> {
        let (meta, frames) = fragment(text, number, header());
        let mut done = Vec::new();
        done.extend(table.accept(inbound(Frame::Meta(meta))));
        for frame in frames {
            done.extend(table.accept(inbound(Frame::Data(frame))));
        }
        done
    }

    #[test]
    fn reassembles_multi_frame_message() {
        let mut table = ReassemblyTable::new();
        let text = "/say ".to_string() + &"long ".repeat(40);
        let done = feed(&mut table, &text, 1);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].text, text);
        assert_eq!(done[0].sender, PEER);
        assert_eq!(done[0].message_type, MessageType::Command);
        assert_eq!(done[0].status, Status::Info);
        assert!(done[0].wants_hints());
        assert!(table.is_empty());
    }

    #[test]
    fn empty_message_completes() {
        let mut table = ReassemblyTable::new();
        let done = feed(&mut table, "", 2);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].text, "");
    }

    #[test]
    fn incomplete_message_stays_in_flight() {
        let mut table = ReassemblyTable::new();
        let (meta, frames) = fragment(&"a".repeat(100), 3, header());
        assert!(table.accept(inbound(Frame::Meta(meta))).is_none());
        assert!(table.accept(inbound(Frame::Data(frames[0].clone()))).is_none());
        assert!(table.is_assembling(PEER, 3));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_meta_keeps_first() {
        let mut table = ReassemblyTable::new();
        let (first_meta, first_frames) = fragment("first message", 4, header());
        let (second_meta, _) = fragment("a different and longer message", 4, header());

        table.accept_meta(PEER, first_meta).unwrap();
        let err = table.accept_meta(PEER, second_meta.clone()).unwrap_err();
        assert!(matches!(err, CmdlinkError::Protocol(_)));
        assert!(table.accept(inbound(Frame::Meta(second_meta))).is_none());

        let mut done = Vec::new();
        for frame in first_frames {
            done.extend(table.accept(inbound(Frame::Data(frame))));
        }
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].text, "first message");
        assert!(table.is_empty());
    }

    #[test]
    fn orphan_data_frame_is_discarded() {
        let mut table = ReassemblyTable::new();
        let (_, frames) = fragment("orphan", 5, header());
        let err = table.accept_data(PEER, frames[0].clone()).unwrap_err();
        assert!(matches!(err, CmdlinkError::Protocol(_)));
        assert!(table.accept(inbound(Frame::Data(frames[0].clone()))).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn orphan_does_not_disturb_other_assemblies() {
        let mut table = ReassemblyTable::new();
        let (meta, frames) = fragment("survivor", 6, header());
        table.accept(inbound(Frame::Meta(meta)));
        let (_, stray) = fragment("stray", 99, header());
        assert!(table.accept(inbound(Frame::Data(stray[0].clone()))).is_none());
        let done = table.accept(inbound(Frame::Data(frames[0].clone())));
        assert_eq!(done.map(|m| m.text).as_deref(), Some("survivor"));
    }

    #[test]
    fn same_number_from_different_peers_is_independent() {
        let mut table = ReassemblyTable::new();
        let other = PeerHandle(2);
        let (meta_a, frames_a) = fragment("from one", 7, header());
        let (meta_b, frames_b) = fragment("from two", 7, header());
        table.accept_meta(PEER, meta_a).unwrap();
        table.accept_meta(other, meta_b).unwrap();
        let b = table.accept_data(other, frames_b[0].clone()).unwrap().unwrap();
        let a = table.accept_data(PEER, frames_a[0].clone()).unwrap().unwrap();
        assert_eq!(a.text, "from one");
        assert_eq!(b.text, "from two");
    }

    #[test]
    fn padded_wire_payload_is_trimmed() {
        let mut table = ReassemblyTable::new();
        let (meta, frames) = fragment("short", 8, header());
        table.accept_meta(PEER, meta).unwrap();
        let mut padded = frames[0].clone();
        padded.payload.resize(64, 0);
        let done = table.accept_data(PEER, padded).unwrap().unwrap();
        assert_eq!(done.text, "short");
    }

    #[test]
    fn start_past_end_is_violation() {
        let mut table = ReassemblyTable::new();
        let (meta, _) = fragment("tiny", 9, header());
        table.accept_meta(PEER, meta).unwrap();
        let bogus = DataFrame {
            message_number: 9,
            start_byte: 100,
            payload: vec![1],
        };
        assert!(table.accept_data(PEER, bogus).is_err());
        assert!(table.is_assembling(PEER, 9));
    }

    #[test]
    fn tail_frame_completes_positionally() {
        // Out-of-order delivery: the tail frame finishes the message even
        // though the head has not arrived.
        let mut table = ReassemblyTable::new();
        let text = "h".repeat(64) + "tail";
        let (meta, frames) = fragment(&text, 10, header());
        table.accept_meta(PEER, meta).unwrap();
        let done = table.accept_data(PEER, frames[1].clone()).unwrap().unwrap();
        assert!(done.text.starts_with('\0'));
        assert!(done.text.ends_with("tail"));
        assert!(!table.is_assembling(PEER, 10));
    }

    #[test]
    fn invalid_utf8_decoded_lossily() {
        let mut table = ReassemblyTable::new();
        let meta = MetaFrame {
            message_number: 11,
            total_size: 2,
            header: header(),
        };
        table.accept_meta(PEER, meta).unwrap();
        let data = DataFrame {
            message_number: 11,
            start_byte: 0,
            payload: vec![0xFF, b'a'],
        };
        let done = table.accept_data(PEER, data).unwrap().unwrap();
        assert_eq!(done.text, "\u{FFFD}a");
    }

    #[test]
    fn number_reusable_after_completion() {
        let mut table = ReassemblyTable::new();
        assert_eq!(feed(&mut table, "one", 12).len(), 1);
        assert_eq!(feed(&mut table, "two", 12)[0].text, "two");
    }

    #[test]
    fn expire_stale_drops_old_assemblies() {
        let mut table = ReassemblyTable::new();
        let (meta, _) = fragment(&"z".repeat(90), 13, header());
        table.accept_meta(PEER, meta).unwrap();
        table.advance_tick();
        assert_eq!(table.expire_stale(3), 0);
        table.advance_tick();
        table.advance_tick();
        assert_eq!(table.expire_stale(3), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn forget_peer_removes_only_that_peer() {
        let mut table = ReassemblyTable::new();
        let (meta, _) = fragment(&"z".repeat(90), 14, header());
        table.accept_meta(PEER, meta.clone()).unwrap();
        table.accept_meta(PeerHandle(5), meta).unwrap();
        assert_eq!(table.forget_peer(PEER), 1);
        assert!(table.is_assembling(PeerHandle(5), 14));
    }
}
