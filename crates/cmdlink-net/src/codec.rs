//! Splitting text into frames and copying frames back into a buffer.

use cmdlink_types::message::{MessageFlags, MessageType, Status};

/// Maximum payload bytes carried by one data frame.
pub const CHUNK_SIZE: usize = 64;

/// Envelope fields announced by a meta frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub status: Status,
    pub flags: MessageFlags,
}

impl MessageHeader {
    pub fn new(message_type: MessageType, status: Status, flags: MessageFlags) -> Self {
        Self {
            message_type,
            status,
            flags,
        }
    }
}

/// Announces a fragmented message and its total byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaFrame {
    pub message_number: u32,
    pub total_size: u32,
    pub header: MessageHeader,
}

/// One chunk of a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub message_number: u32,
    /// Offset of this chunk in the reconstructed buffer.
    pub start_byte: u32,
    pub payload: Vec<u8>,
}

impl DataFrame {
    /// One past the last byte this frame writes.
    pub fn end_byte(&self) -> u64 {
        u64::from(self.start_byte) + self.payload.len() as u64
    }
}

/// Either kind of frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Meta(MetaFrame),
    Data(DataFrame),
}

impl Frame {
    pub fn message_number(&self) -> u32 {
        match self {
            Frame::Meta(m) => m.message_number,
            Frame::Data(d) => d.message_number,
        }
    }
}

/// Split `text` into a meta frame and [`CHUNK_SIZE`]-byte data frames.
///
/// Always yields at least one data frame, so an empty string still
/// produces a frame that completes reassembly. The caller keeps the text
/// shorter than `i32::MAX` bytes (see [`crate::FrameLink::submit_outbound`]).
pub fn fragment(text: &str, message_number: u32, header: MessageHeader) -> (MetaFrame, Vec<DataFrame>) {
    fragment_with_chunk_size(text, message_number, header, CHUNK_SIZE)
}

/// [`fragment`] with an explicit chunk size, clamped to `1..=CHUNK_SIZE`.
pub fn fragment_with_chunk_size(
    text: &str,
    message_number: u32,
    header: MessageHeader,
    chunk_size: usize,
) -> (MetaFrame, Vec<DataFrame>) {
    let chunk_size = chunk_size.clamp(1, CHUNK_SIZE);
    let bytes = text.as_bytes();

    let meta = MetaFrame {
        message_number,
        total_size: bytes.len() as u32,
        header,
    };

    let frames = if bytes.is_empty() {
        vec![DataFrame {
            message_number,
            start_byte: 0,
            payload: Vec::new(),
        }]
    } else {
        bytes
            .chunks(chunk_size)
            .enumerate()
            .map(|(index, chunk)| DataFrame {
                message_number,
                start_byte: (index * chunk_size) as u32,
                payload: chunk.to_vec(),
            })
            .collect()
    };

    (meta, frames)
}

/// Copy a frame's payload into `buffer` at its start offset.
///
/// Bytes that would land past the end of `buffer` are dropped. Returns the
/// number of bytes copied.
pub fn defragment(buffer: &mut [u8], frame: &DataFrame) -> usize {
    let start = frame.start_byte as usize;
    if start >= buffer.len() {
        return 0;
    }
    let len = frame.payload.len().min(buffer.len() - start);
    buffer[start..start + len].copy_from_slice(&frame.payload[..len]);
    len
}
