//! Built-in commands.

use cmdlink_types::error::{CmdlinkError, Result};
use cmdlink_types::message::PeerHandle;

use crate::interpreter::{
    ClientCommand, CommandOutput, CommandRegistry, Environment, Role, ServerCommand,
};
use crate::permission::PeerDirectory;

/// Owner name for everything registered here.
pub const BUILTIN_OWNER: &str = "builtin";

/// Register all built-in commands into a registry.
pub fn register_builtins(reg: &mut CommandRegistry) -> Result<()> {
    reg.register_server(WhoCmd, BUILTIN_OWNER)?;
    reg.register_server(PermitCmd, BUILTIN_OWNER)?;
    reg.register_server(SayCmd, BUILTIN_OWNER)?;
    reg.register_client(EchoCmd, BUILTIN_OWNER)?;
    Ok(())
}

/// Output of `help`: all commands, or the usage of one.
///
/// `help` needs the registry itself, so nodes intercept it instead of
/// registering it as a handler.
pub fn help_output(reg: &CommandRegistry, args: &[String]) -> CommandOutput {
    if let Some(name) = args.first() {
        return match reg.lookup(name) {
            Some(pair) => {
                let handler = pair.handler();
                let mut text = format!("{}\nUsage: /{}", handler.description(), handler.usage());
                if handler.names().len() > 1 {
                    text.push_str(&format!("\nAliases: {}", handler.names()[1..].join(", ")));
                }
                CommandOutput::info(text)
            },
            None => CommandOutput::error(format!("Unknown command: {name}")),
        };
    }

    let mut lines = vec!["Available commands:".to_string()];
    for pair in reg.list() {
        let side = match pair.role() {
            Role::Server => " (server)",
            Role::Client => "",
        };
        lines.push(format!(
            "  /{:<12} {}{side}",
            pair.canonical_name(),
            pair.handler().description()
        ));
    }
    lines.push("  /help        Show this list, or /help <command> for usage".to_string());
    CommandOutput::info(lines.join("\n"))
}

// ---------------------------------------------------------------------------
// who
// ---------------------------------------------------------------------------

struct WhoCmd;
impl ServerCommand for WhoCmd {
    fn names(&self) -> &[&str] {
        &["who", "players"]
    }
    fn description(&self) -> &str {
        "List connected peers"
    }
    fn usage(&self) -> &str {
        "who"
    }
    fn execute(
        &self,
        _args: &[String],
        sender: PeerHandle,
        env: &mut Environment<'_>,
    ) -> Result<CommandOutput> {
        let peers = env
            .peers
            .as_deref()
            .ok_or_else(|| CmdlinkError::Command("peer table unavailable".to_string()))?;
        if peers.is_empty() {
            return Ok(CommandOutput::text("No peers connected."));
        }
        let mut lines = Vec::with_capacity(peers.len() + 1);
        if peers.guest_mode() {
            lines.push("Guest mode is on.".to_string());
        }
        for (peer, level) in peers.iter() {
            let you = if peer == sender { " (you)" } else { "" };
            lines.push(format!("{peer}  admin level {level}{you}"));
        }
        Ok(CommandOutput::text(lines.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// permit
// ---------------------------------------------------------------------------

struct PermitCmd;
impl ServerCommand for PermitCmd {
    fn names(&self) -> &[&str] {
        &["permit"]
    }
    fn description(&self) -> &str {
        "Allow or deny a command for non-admin users"
    }
    fn usage(&self) -> &str {
        "permit <command> <on|off|clear>"
    }
    fn execute(
        &self,
        args: &[String],
        _sender: PeerHandle,
        env: &mut Environment<'_>,
    ) -> Result<CommandOutput> {
        let [command, setting] = args else {
            if args.is_empty() {
                let entries = env.permissions.entries();
                if entries.is_empty() {
                    return Ok(CommandOutput::text("No per-command permissions recorded."));
                }
                let lines: Vec<String> = entries
                    .iter()
                    .map(|(name, allowed)| {
                        format!("{name}: {}", if *allowed { "on" } else { "off" })
                    })
                    .collect();
                return Ok(CommandOutput::text(lines.join("\n")));
            }
            return Ok(CommandOutput::error("Usage: /permit <command> <on|off|clear>"));
        };
        let command = command.to_lowercase();
        match setting.to_lowercase().as_str() {
            "on" => {
                env.permissions.set_command_allowed(&command, true);
                log::info!("users may now run '{command}'");
                Ok(CommandOutput::info(format!("Users may now run /{command}.")))
            },
            "off" => {
                env.permissions.set_command_allowed(&command, false);
                log::info!("users may no longer run '{command}'");
                Ok(CommandOutput::info(format!("Users may no longer run /{command}.")))
            },
            "clear" => {
                env.permissions.clear_command(&command);
                Ok(CommandOutput::info(format!(
                    "Cleared /{command}; users are denied by default."
                )))
            },
            other => Ok(CommandOutput::error(format!(
                "Unknown setting '{other}', expected on, off or clear"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// say
// ---------------------------------------------------------------------------

struct SayCmd;
impl ServerCommand for SayCmd {
    fn names(&self) -> &[&str] {
        &["say", "announce"]
    }
    fn description(&self) -> &str {
        "Broadcast an announcement to everyone"
    }
    fn usage(&self) -> &str {
        "say <text>"
    }
    fn execute(
        &self,
        args: &[String],
        _sender: PeerHandle,
        env: &mut Environment<'_>,
    ) -> Result<CommandOutput> {
        if args.is_empty() {
            return Ok(CommandOutput::error("Nothing to say."));
        }
        env.announcements.push(args.join(" "));
        Ok(CommandOutput::text("Announced."))
    }
}

// ---------------------------------------------------------------------------
// echo
// ---------------------------------------------------------------------------

struct EchoCmd;
impl ClientCommand for EchoCmd {
    fn names(&self) -> &[&str] {
        &["echo"]
    }
    fn description(&self) -> &str {
        "Print the arguments locally"
    }
    fn usage(&self) -> &str {
        "echo [text...]"
    }
    fn execute(&self, args: &[String], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::text(args.join(" ")))
    }
}
