//! Foundation types for cmdlink.
//!
//! This crate contains the types shared by every cmdlink crate: the message
//! envelope (type, status, flags, sender), peer addressing, configuration,
//! and the error type.

pub mod config;
pub mod error;
pub mod message;
