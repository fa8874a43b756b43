//! Error types for cmdlink.

use std::io;

/// Errors produced by cmdlink.
#[derive(Debug, thiserror::Error)]
pub enum CmdlinkError {
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("wire error: {0}")]
    Wire(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("registration refused: {0}")]
    Registration(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CmdlinkError>;
