//! Command traits and the registry that resolves trigger names to handlers.

use std::any::TypeId;

use cmdlink_types::config::PermissionSettings;
use cmdlink_types::error::{CmdlinkError, Result};
use cmdlink_types::message::{PeerHandle, Status};

use crate::permission::PeerTable;

/// One line of command output with its severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Status,
    pub text: String,
}

impl CommandOutput {
    pub fn new(status: Status, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }

    /// Plain output with no status.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Status::None, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Status::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Status::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Status::Error, text)
    }

    pub fn hint(text: impl Into<String>) -> Self {
        Self::new(Status::Hint, text)
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

/// Mutable state a command may touch while it runs.
pub struct Environment<'a> {
    /// Connected peers. Only present on the server.
    pub peers: Option<&'a mut PeerTable>,
    /// Permission settings of this node.
    pub permissions: &'a mut PermissionSettings,
    /// Text to broadcast to every peer once the command finishes.
    pub announcements: Vec<String>,
}

impl<'a> Environment<'a> {
    pub fn new(permissions: &'a mut PermissionSettings) -> Self {
        Self {
            peers: None,
            permissions,
            announcements: Vec::new(),
        }
    }
}

/// A command that runs on the server on behalf of a sender.
pub trait ServerCommand {
    /// Trigger names. The first one is canonical.
    fn names(&self) -> &[&str];

    /// One-line description for `help`.
    fn description(&self) -> &str;

    /// Usage string (e.g. "permit <command> <on|off|clear>").
    fn usage(&self) -> &str;

    fn execute(
        &self,
        args: &[String],
        sender: PeerHandle,
        env: &mut Environment<'_>,
    ) -> Result<CommandOutput>;
}

/// A command that runs locally on the client.
pub trait ClientCommand {
    /// Trigger names. The first one is canonical.
    fn names(&self) -> &[&str];

    /// One-line description for `help`.
    fn description(&self) -> &str;

    /// Usage string.
    fn usage(&self) -> &str;

    fn execute(&self, args: &[String], env: &mut Environment<'_>) -> Result<CommandOutput>;
}

/// Which side runs a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// A registered handler, tagged with its role at registration time.
pub enum HandlerRole {
    Server(Box<dyn ServerCommand>),
    Client(Box<dyn ClientCommand>),
}

impl HandlerRole {
    pub fn role(&self) -> Role {
        match self {
            HandlerRole::Server(_) => Role::Server,
            HandlerRole::Client(_) => Role::Client,
        }
    }

    pub fn names(&self) -> &[&str] {
        match self {
            HandlerRole::Server(h) => h.names(),
            HandlerRole::Client(h) => h.names(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            HandlerRole::Server(h) => h.description(),
            HandlerRole::Client(h) => h.description(),
        }
    }

    pub fn usage(&self) -> &str {
        match self {
            HandlerRole::Server(h) => h.usage(),
            HandlerRole::Client(h) => h.usage(),
        }
    }
}

/// A handler plus the name of the extension that registered it.
pub struct CommandPair {
    handler: HandlerRole,
    owner: String,
    type_id: TypeId,
}

impl CommandPair {
    pub fn handler(&self) -> &HandlerRole {
        &self.handler
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn role(&self) -> Role {
        self.handler.role()
    }

    pub fn is_server_role(&self) -> bool {
        self.role() == Role::Server
    }

    /// The first trigger name.
    pub fn canonical_name(&self) -> &str {
        self.handler.names().first().copied().unwrap_or_default()
    }

    /// Whether any trigger name equals `word`, ignoring case.
    pub fn matches(&self, word: &str) -> bool {
        let word = word.to_lowercase();
        self.handler
            .names()
            .iter()
            .any(|name| name.to_lowercase() == word)
    }

    fn matches_prefix(&self, prefix: &str) -> bool {
        self.handler
            .names()
            .iter()
            .any(|name| name.to_lowercase().starts_with(prefix))
    }
}

/// Registered handlers in registration order.
///
/// Several handlers may claim the same trigger name; the first registered
/// wins on lookup.
#[derive(Default)]
pub struct CommandRegistry {
    pairs: Vec<CommandPair>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server-side handler on behalf of `owner`.
    pub fn register_server<H: ServerCommand + 'static>(&mut self, handler: H, owner: &str) -> Result<()> {
        self.insert(HandlerRole::Server(Box::new(handler)), TypeId::of::<H>(), owner)
    }

    /// Register a client-side handler on behalf of `owner`.
    pub fn register_client<H: ClientCommand + 'static>(&mut self, handler: H, owner: &str) -> Result<()> {
        self.insert(HandlerRole::Client(Box::new(handler)), TypeId::of::<H>(), owner)
    }

    fn insert(&mut self, handler: HandlerRole, type_id: TypeId, owner: &str) -> Result<()> {
        if handler.names().is_empty() {
            log::warn!("{owner} tried to register a command with no trigger names; ignored");
            return Err(CmdlinkError::Registration(format!(
                "command from {owner} has no trigger names"
            )));
        }
        log::debug!(
            "registered {:?} command '{}' from {owner}",
            handler.role(),
            handler.names()[0]
        );
        self.pairs.push(CommandPair {
            handler,
            owner: owner.to_string(),
            type_id,
        });
        Ok(())
    }

    /// Remove every handler of concrete type `H`. Returns how many were removed.
    pub fn unregister<H: 'static>(&mut self) -> usize {
        let id = TypeId::of::<H>();
        let before = self.pairs.len();
        self.pairs.retain(|p| p.type_id != id);
        before - self.pairs.len()
    }

    /// Remove every handler registered by `owner`.
    pub fn unregister_owner(&mut self, owner: &str) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|p| p.owner != owner);
        before - self.pairs.len()
    }

    /// Resolve a trigger word, ignoring case.
    pub fn lookup(&self, trigger: &str) -> Option<&CommandPair> {
        self.pairs.iter().find(|p| p.matches(trigger))
    }

    /// Every handler of `role` with a trigger name starting with `prefix`.
    pub fn list_matching(&self, prefix: &str, role: Role) -> Vec<&CommandPair> {
        let prefix = prefix.to_lowercase();
        self.pairs
            .iter()
            .filter(|p| p.role() == role && p.matches_prefix(&prefix))
            .collect()
    }

    /// All handlers, sorted by canonical name.
    pub fn list(&self) -> Vec<&CommandPair> {
        let mut pairs: Vec<&CommandPair> = self.pairs.iter().collect();
        pairs.sort_by_key(|p| p.canonical_name().to_lowercase());
        pairs
    }

    /// Trigger names (all synonyms) starting with `partial`, for completion.
    pub fn completions(&self, partial: &str) -> Vec<String> {
        let lower = partial.to_lowercase();
        let mut names: Vec<String> = self
            .pairs
            .iter()
            .flat_map(|p| p.handler.names().iter())
            .map(|n| n.to_lowercase())
            .filter(|n| n.starts_with(&lower))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
