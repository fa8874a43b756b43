//! Command layer.
//!
//! Handlers implement [`ServerCommand`] or [`ClientCommand`] and are
//! registered under one or more trigger names. Nodes parse `/command` lines
//! out of reassembled messages, resolve a handler, check permissions, and
//! dispatch; output travels back through the frame layer.

mod builtins;
mod dispatch;
mod interpreter;
mod node;
mod parse;
mod permission;

/// `help` output built from a registry, and registration of the other
/// built-in commands (who, permit, say, echo).
pub use builtins::{help_output, register_builtins};
/// Runs handlers and converts failures into error output.
pub use dispatch::CommandDispatcher;
/// Handler traits, command output, and the registry that resolves triggers.
pub use interpreter::{
    ClientCommand, CommandOutput, CommandPair, CommandRegistry, Environment, HandlerRole, Role,
    ServerCommand,
};
/// Role-specific message routing.
pub use node::{ClientNode, ServerNode};
/// Splitting `/trigger args...` lines.
pub use parse::{COMMAND_PREFIX, ParsedCommand, parse_command_line};
/// Peer admin levels and the permission check run before server commands.
pub use permission::{PeerDirectory, PeerTable, PermissionGuard};
