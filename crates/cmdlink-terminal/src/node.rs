//! Server and client nodes: route reassembled messages to commands.
//!
//! A node owns its frame link, registry, and permission state. Each call
//! to `tick()` drains the transport, handles every finished message, and
//! sends any responses before returning.

use cmdlink_net::{FrameLink, MessageHeader, PeerEvent, SERVER_PEER, Transport};
use cmdlink_types::config::{CmdlinkConfig, PermissionSettings};
use cmdlink_types::error::Result;
use cmdlink_types::message::{Message, MessageFlags, MessageType, PeerHandle, Status, Target};

use crate::builtins::{help_output, register_builtins};
use crate::dispatch::CommandDispatcher;
use crate::interpreter::{CommandOutput, CommandRegistry, Environment};
use crate::parse::parse_command_line;
use crate::permission::{PeerTable, PermissionGuard};

fn submit(
    link: &mut FrameLink,
    transport: &mut dyn Transport,
    text: &str,
    header: MessageHeader,
    target: Target,
) {
    if let Err(e) = link.submit_outbound(transport, text, header, target) {
        log::warn!("could not send to {target:?}: {e}");
    }
}

fn unknown_command(trigger: &str) -> CommandOutput {
    CommandOutput::error(format!("Unknown command: {trigger}"))
}

/// Output of one server-side command run.
struct CommandRun {
    outputs: Vec<CommandOutput>,
    announcements: Vec<String>,
}

impl CommandRun {
    fn single(output: CommandOutput) -> Self {
        Self {
            outputs: vec![output],
            announcements: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// The authoritative side. Runs server commands for connected peers.
pub struct ServerNode {
    link: FrameLink,
    registry: CommandRegistry,
    guard: PermissionGuard,
    dispatcher: CommandDispatcher,
    peers: PeerTable,
    default_admin_level: u8,
}

impl ServerNode {
    pub fn new(config: &CmdlinkConfig) -> Self {
        let mut peers = PeerTable::new();
        peers.set_guest_mode(config.session.guest_mode);
        Self {
            link: FrameLink::new(&config.network),
            registry: CommandRegistry::new(),
            guard: PermissionGuard::new(config.permissions.clone()),
            dispatcher: CommandDispatcher::new(),
            peers,
            default_admin_level: config.session.default_admin_level,
        }
    }

    /// A server with the built-in commands registered.
    pub fn with_builtins(config: &CmdlinkConfig) -> Result<Self> {
        let mut node = Self::new(config);
        register_builtins(&mut node.registry)?;
        Ok(node)
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut PeerTable {
        &mut self.peers
    }

    pub fn permissions(&self) -> &PermissionSettings {
        self.guard.settings()
    }

    pub fn permissions_mut(&mut self) -> &mut PermissionSettings {
        self.guard.settings_mut()
    }

    /// Whether `sender` may run `command` right now.
    pub fn is_authorized(&self, sender: PeerHandle, command: &str) -> bool {
        self.guard.is_authorized(sender, command, &self.peers)
    }

    /// Process one tick. Returns lines for the server console.
    ///
    /// Transports may accept connections while draining, so peer events are
    /// read after the drain. Joins apply before this tick's messages are
    /// handled and departures after, so a peer's frames from the tick it
    /// connects or leaves are still attributed to a known sender.
    pub fn tick(&mut self, transport: &mut dyn Transport) -> Vec<CommandOutput> {
        let inbound = transport.drain();
        let mut departed = Vec::new();
        for event in transport.take_peer_events() {
            match event {
                PeerEvent::Connected(peer) => {
                    log::info!("peer {peer} joined (admin level {})", self.default_admin_level);
                    self.peers.add(peer, self.default_admin_level);
                },
                PeerEvent::Disconnected(peer) => departed.push(peer),
            }
        }

        let mut console = Vec::new();
        for message in self.link.on_tick(inbound) {
            self.handle_message(transport, message, &mut console);
        }

        for peer in departed {
            log::info!("peer {peer} left");
            self.peers.remove(peer);
            self.link.forget_peer(peer);
        }
        console
    }

    /// Handle a line typed at the server console.
    ///
    /// Console commands run as the server itself and skip the permission
    /// check. Other text is broadcast as chat.
    pub fn console_input(&mut self, transport: &mut dyn Transport, line: &str) -> Vec<CommandOutput> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        if parse_command_line(line).is_none() {
            let text = format!("[server] {line}");
            self.send(transport, &text, MessageType::ChatMessage, Status::None, Target::Broadcast);
            return vec![CommandOutput::text(text)];
        }

        let message = Message {
            text: line.to_string(),
            sender: transport.local_peer(),
            message_type: MessageType::Command,
            status: Status::None,
            flags: MessageFlags::SENT_FROM_CONSOLE | MessageFlags::USER_WANTS_HINTS,
        };
        let run = self.run_command(&message, true);
        let mut console = run.outputs;
        self.announce(transport, run.announcements, &mut console);
        console
    }

    /// Ask a client to run one of its client-side commands.
    pub fn send_command(&mut self, transport: &mut dyn Transport, peer: PeerHandle, line: &str) {
        self.send(transport, line, MessageType::Command, Status::None, Target::Peer(peer));
    }

    fn handle_message(
        &mut self,
        transport: &mut dyn Transport,
        message: Message,
        console: &mut Vec<CommandOutput>,
    ) {
        match message.message_type {
            MessageType::Command | MessageType::RelayCommand => {
                log::info!("command from {}: {}", message.sender, message.text);
                let run = self.run_command(&message, false);
                for output in &run.outputs {
                    self.send(
                        transport,
                        &output.text,
                        MessageType::Response,
                        output.status,
                        Target::Peer(message.sender),
                    );
                }
                self.announce(transport, run.announcements, console);
            },
            MessageType::ChatMessage => {
                let line = format!("{}: {}", message.sender, message.text);
                self.send(transport, &line, MessageType::ChatMessage, message.status, Target::Broadcast);
                console.push(CommandOutput::new(message.status, line));
            },
            MessageType::Response => {
                log::debug!("ignoring response from {}", message.sender);
            },
        }
    }

    fn run_command(&mut self, message: &Message, trusted: bool) -> CommandRun {
        let Some(parsed) = parse_command_line(&message.text) else {
            return CommandRun::single(CommandOutput::error("Not a command."));
        };
        if parsed.trigger == "help" {
            return CommandRun::single(help_output(&self.registry, &parsed.args));
        }

        // Client-only handlers do not exist as far as the server is concerned.
        let Some(pair) = self
            .registry
            .lookup(&parsed.trigger)
            .filter(|p| p.is_server_role())
        else {
            return CommandRun::single(unknown_command(&parsed.trigger));
        };

        let name = pair.canonical_name();
        if !trusted && let Err(e) = self.guard.authorize(message.sender, name, &self.peers) {
            log::info!("{e}");
            return CommandRun::single(CommandOutput::error(format!(
                "Not enough permissions to run {name}"
            )));
        }

        let mut env = Environment {
            peers: Some(&mut self.peers),
            permissions: self.guard.settings_mut(),
            announcements: Vec::new(),
        };
        let outputs = self.dispatcher.execute(pair, message, &parsed.args, &mut env);
        CommandRun {
            outputs,
            announcements: env.announcements,
        }
    }

    fn announce(
        &mut self,
        transport: &mut dyn Transport,
        announcements: Vec<String>,
        console: &mut Vec<CommandOutput>,
    ) {
        for text in announcements {
            let text = format!("[announcement] {text}");
            self.send(transport, &text, MessageType::ChatMessage, Status::Info, Target::Broadcast);
            console.push(CommandOutput::info(text));
        }
    }

    fn send(
        &mut self,
        transport: &mut dyn Transport,
        text: &str,
        message_type: MessageType,
        status: Status,
        target: Target,
    ) {
        let header = MessageHeader::new(message_type, status, MessageFlags::NONE);
        submit(&mut self.link, transport, text, header, target);
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The user-facing side. Runs client commands locally and relays the rest.
pub struct ClientNode {
    link: FrameLink,
    registry: CommandRegistry,
    dispatcher: CommandDispatcher,
    permissions: PermissionSettings,
    wants_hints: bool,
    connected: bool,
}

impl ClientNode {
    pub fn new(config: &CmdlinkConfig) -> Self {
        Self {
            link: FrameLink::new(&config.network),
            registry: CommandRegistry::new(),
            dispatcher: CommandDispatcher::new(),
            permissions: config.permissions.clone(),
            wants_hints: true,
            connected: false,
        }
    }

    /// A client with the built-in commands registered. The client needs
    /// the server-side entries too, to know what to relay.
    pub fn with_builtins(config: &CmdlinkConfig) -> Result<Self> {
        let mut node = Self::new(config);
        register_builtins(&mut node.registry)?;
        Ok(node)
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn permissions_mut(&mut self) -> &mut PermissionSettings {
        &mut self.permissions
    }

    /// Whether failed commands should be followed by a hint.
    pub fn set_wants_hints(&mut self, wants_hints: bool) {
        self.wants_hints = wants_hints;
    }

    /// Whether the transport has reported the server as reachable.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Completions for a partially typed `/command`.
    pub fn completions(&self, partial: &str) -> Vec<String> {
        let partial = partial.trim_start().strip_prefix('/').unwrap_or(partial);
        self.registry
            .completions(partial)
            .into_iter()
            .map(|name| format!("/{name}"))
            .collect()
    }

    fn hint_flags(&self) -> MessageFlags {
        if self.wants_hints {
            MessageFlags::USER_WANTS_HINTS
        } else {
            MessageFlags::NONE
        }
    }

    /// Handle a line typed by the user. Returns output to show locally.
    pub fn input(&mut self, transport: &mut dyn Transport, line: &str) -> Vec<CommandOutput> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        let flags = self.hint_flags();
        let to_server = Target::Peer(SERVER_PEER);

        let Some(parsed) = parse_command_line(line) else {
            let header = MessageHeader::new(MessageType::ChatMessage, Status::None, flags);
            submit(&mut self.link, transport, line, header, to_server);
            return Vec::new();
        };
        if parsed.trigger == "help" {
            return vec![help_output(&self.registry, &parsed.args)];
        }

        match self.registry.lookup(&parsed.trigger) {
            Some(pair) if pair.is_server_role() => {
                log::debug!("relaying /{} to the server", parsed.trigger);
                let header = MessageHeader::new(MessageType::RelayCommand, Status::None, flags);
                submit(&mut self.link, transport, line, header, to_server);
                Vec::new()
            },
            Some(pair) => {
                let message = Message {
                    text: line.to_string(),
                    sender: transport.local_peer(),
                    message_type: MessageType::Command,
                    status: Status::None,
                    flags: flags | MessageFlags::SENT_FROM_CONSOLE,
                };
                let mut env = Environment::new(&mut self.permissions);
                self.dispatcher
                    .execute(pair, &message, &parsed.args, &mut env)
            },
            None if self.permissions.allow_unknown_client_commands => {
                log::debug!("forwarding unknown /{} to the server", parsed.trigger);
                let header = MessageHeader::new(MessageType::Command, Status::None, flags);
                submit(&mut self.link, transport, line, header, to_server);
                Vec::new()
            },
            None => vec![unknown_command(&parsed.trigger)],
        }
    }

    /// Process one tick. Returns output to show locally.
    ///
    /// Messages that arrived before the server went away are shown ahead of
    /// the disconnect warning.
    pub fn tick(&mut self, transport: &mut dyn Transport) -> Vec<CommandOutput> {
        let inbound = transport.drain();
        let events = transport.take_peer_events();
        if events.contains(&PeerEvent::Connected(SERVER_PEER)) {
            self.connected = true;
        }

        let mut shown = Vec::new();
        for message in self.link.on_tick(inbound) {
            match message.message_type {
                MessageType::Response | MessageType::ChatMessage => {
                    shown.push(CommandOutput::new(message.status, message.text));
                },
                MessageType::Command | MessageType::RelayCommand => {
                    shown.extend(self.run_pushed(&message));
                },
            }
        }

        if events.contains(&PeerEvent::Disconnected(SERVER_PEER)) {
            self.connected = false;
            self.link.forget_peer(SERVER_PEER);
            shown.push(CommandOutput::warning("Disconnected from server."));
        }
        shown
    }

    /// Run a client command the server asked for.
    fn run_pushed(&mut self, message: &Message) -> Vec<CommandOutput> {
        let Some(parsed) = parse_command_line(&message.text) else {
            log::warn!("server sent a command without a prefix: {}", message.text);
            return Vec::new();
        };
        match self.registry.lookup(&parsed.trigger) {
            Some(pair) if !pair.is_server_role() => {
                let mut env = Environment::new(&mut self.permissions);
                self.dispatcher
                    .execute(pair, message, &parsed.args, &mut env)
            },
            _ => {
                log::warn!("server asked for unknown client command /{}", parsed.trigger);
                Vec::new()
            },
        }
    }
}
