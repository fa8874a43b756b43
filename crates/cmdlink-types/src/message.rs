//! Message envelope types shared by the frame layer and the command layer.

use std::fmt;

use crate::error::{CmdlinkError, Result};

/// Identifies a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(pub u32);

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where an outbound message is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every peer except the sender.
    Broadcast,
    /// A single peer.
    Peer(PeerHandle),
}

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// A command line the receiver should try to run.
    Command = 0,
    /// A command the client resolved to a server-side handler.
    RelayCommand = 1,
    /// Output of a command, sent back to its invoker.
    Response = 2,
    /// Plain chat text.
    ChatMessage = 3,
}

impl TryFrom<u8> for MessageType {
    type Error = CmdlinkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Command),
            1 => Ok(Self::RelayCommand),
            2 => Ok(Self::Response),
            3 => Ok(Self::ChatMessage),
            _ => Err(CmdlinkError::Wire(format!("unknown message type {value}"))),
        }
    }
}

/// Severity attached to a message or command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Status {
    #[default]
    None = 0,
    Info = 1,
    Hint = 2,
    Warning = 3,
    Error = 4,
}

impl TryFrom<u8> for Status {
    type Error = CmdlinkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Info),
            2 => Ok(Self::Hint),
            3 => Ok(Self::Warning),
            4 => Ok(Self::Error),
            _ => Err(CmdlinkError::Wire(format!("unknown status {value}"))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::None => "",
            Status::Info => "info",
            Status::Hint => "hint",
            Status::Warning => "warning",
            Status::Error => "error",
        };
        f.write_str(label)
    }
}

/// Per-message option bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageFlags(u8);

impl MessageFlags {
    pub const NONE: Self = Self(0);
    /// The invoking user wants a hint appended to failed commands.
    pub const USER_WANTS_HINTS: Self = Self(0b0000_0001);
    /// The message was typed at the local console rather than received.
    pub const SENT_FROM_CONSOLE: Self = Self(0b0000_0010);

    const KNOWN: u8 = 0b0000_0011;

    /// Build from raw bits, dropping bits this version does not know.
    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::KNOWN)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for MessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A fully reassembled message with its envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub sender: PeerHandle,
    pub message_type: MessageType,
    pub status: Status,
    pub flags: MessageFlags,
}

impl Message {
    /// Whether the sender asked for hints on failure.
    pub fn wants_hints(&self) -> bool {
        self.flags.contains(MessageFlags::USER_WANTS_HINTS)
    }
}
