//! Fixed-layout wire records.
//!
//! Meta record (11 bytes):
//! ```text
//! +0   message number (i32 LE)
//! +4   total size (i32 LE)
//! +8   message type (u8, 0..=3)
//! +9   status (u8, 0..=4)
//! +10  flags (u8 bitset)
//! ```
//!
//! Data record (72 bytes):
//! ```text
//! +0   message number (i32 LE)
//! +4   payload (64 bytes, zero padded)
//! +68  start byte (i32 LE)
//! ```
//!
//! Byte-stream transports prefix each record with one kind byte.

use cmdlink_types::error::{CmdlinkError, Result};
use cmdlink_types::message::{MessageFlags, MessageType, Status};

use crate::codec::{CHUNK_SIZE, DataFrame, Frame, MessageHeader, MetaFrame};

pub const META_RECORD_LEN: usize = 11;
pub const DATA_RECORD_LEN: usize = 4 + CHUNK_SIZE + 4;

pub const KIND_META: u8 = 0x01;
pub const KIND_DATA: u8 = 0x02;

fn to_i32(value: u32, field: &str) -> Result<[u8; 4]> {
    i32::try_from(value)
        .map(i32::to_le_bytes)
        .map_err(|_| CmdlinkError::Wire(format!("{field} {value} exceeds i32 range")))
}

fn read_u32(bytes: &[u8], field: &str) -> Result<u32> {
    let raw: [u8; 4] = bytes[..4]
        .try_into()
        .map_err(|_| CmdlinkError::Wire(format!("truncated {field}")))?;
    let value = i32::from_le_bytes(raw);
    u32::try_from(value).map_err(|_| CmdlinkError::Wire(format!("negative {field} {value}")))
}

impl MetaFrame {
    pub fn encode(&self) -> Result<[u8; META_RECORD_LEN]> {
        let mut out = [0u8; META_RECORD_LEN];
        out[0..4].copy_from_slice(&to_i32(self.message_number, "message number")?);
        out[4..8].copy_from_slice(&to_i32(self.total_size, "total size")?);
        out[8] = self.header.message_type as u8;
        out[9] = self.header.status as u8;
        out[10] = self.header.flags.bits();
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < META_RECORD_LEN {
            return Err(CmdlinkError::Wire(format!(
                "meta record too short: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            message_number: read_u32(&bytes[0..4], "message number")?,
            total_size: read_u32(&bytes[4..8], "total size")?,
            header: MessageHeader {
                message_type: MessageType::try_from(bytes[8])?,
                status: Status::try_from(bytes[9])?,
                flags: MessageFlags::from_bits_truncate(bytes[10]),
            },
        })
    }
}

impl DataFrame {
    pub fn encode(&self) -> Result<[u8; DATA_RECORD_LEN]> {
        if self.payload.len() > CHUNK_SIZE {
            return Err(CmdlinkError::Wire(format!(
                "payload of {} bytes exceeds {CHUNK_SIZE}",
                self.payload.len()
            )));
        }
        let mut out = [0u8; DATA_RECORD_LEN];
        out[0..4].copy_from_slice(&to_i32(self.message_number, "message number")?);
        out[4..4 + self.payload.len()].copy_from_slice(&self.payload);
        out[4 + CHUNK_SIZE..].copy_from_slice(&to_i32(self.start_byte, "start byte")?);
        Ok(out)
    }

    /// Decode a data record. The payload keeps all 64 bytes; only the
    /// receiver knows how many are meaningful.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DATA_RECORD_LEN {
            return Err(CmdlinkError::Wire(format!(
                "data record too short: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            message_number: read_u32(&bytes[0..4], "message number")?,
            payload: bytes[4..4 + CHUNK_SIZE].to_vec(),
            start_byte: read_u32(&bytes[4 + CHUNK_SIZE..DATA_RECORD_LEN], "start byte")?,
        })
    }
}

/// Record length following a kind byte, if the kind is known.
pub fn record_len(kind: u8) -> Option<usize> {
    match kind {
        KIND_META => Some(META_RECORD_LEN),
        KIND_DATA => Some(DATA_RECORD_LEN),
        _ => None,
    }
}

/// Append a kind-tagged record for `frame` to `out`.
pub fn write_record(frame: &Frame, out: &mut Vec<u8>) -> Result<()> {
    match frame {
        Frame::Meta(meta) => {
            out.push(KIND_META);
            out.extend_from_slice(&meta.encode()?);
        },
        Frame::Data(data) => {
            out.push(KIND_DATA);
            out.extend_from_slice(&data.encode()?);
        },
    }
    Ok(())
}

/// Move every complete kind-tagged record from the front of `buf` into
/// `frames`.
///
/// A trailing partial record stays in `buf` for the next read. An unknown
/// kind byte or an undecodable record means the stream is out of sync and
/// is returned as an error; records before it are still delivered and
/// removed from `buf`.
pub fn take_records(buf: &mut Vec<u8>, frames: &mut Vec<Frame>) -> Result<()> {
    let mut pos = 0;
    let result = loop {
        match next_record(&buf[pos..]) {
            Ok(Some((frame, used))) => {
                frames.push(frame);
                pos += used;
            },
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    buf.drain(..pos);
    result
}

/// Decode the record at the front of `bytes` and its length including the
/// kind byte, or `None` if it is not complete yet.
fn next_record(bytes: &[u8]) -> Result<Option<(Frame, usize)>> {
    let Some(&kind) = bytes.first() else {
        return Ok(None);
    };
    let len = record_len(kind)
        .ok_or_else(|| CmdlinkError::Wire(format!("unknown record kind {kind:#04x}")))?;
    let Some(body) = bytes.get(1..1 + len) else {
        return Ok(None);
    };
    let frame = if kind == KIND_META {
        Frame::Meta(MetaFrame::decode(body)?)
    } else {
        Frame::Data(DataFrame::decode(body)?)
    };
    Ok(Some((frame, 1 + len)))
}
