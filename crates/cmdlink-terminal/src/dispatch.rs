//! Running a resolved handler and shaping its output.

use cmdlink_types::message::Message;

use crate::interpreter::{CommandOutput, CommandPair, Environment, HandlerRole};

/// Characters users copy from usage text by mistake.
const BRACKET_CHARS: [char; 4] = ['{', '}', '[', ']'];

/// Executes handlers. Handler errors never escape; they become one
/// error output, optionally followed by a hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Run `pair` for `message` with the parsed `args`.
    ///
    /// Always returns the handler's output (or a generic error in its
    /// place). When that output is an error and the message asked for
    /// hints, one hint follows it.
    pub fn execute(
        &self,
        pair: &CommandPair,
        message: &Message,
        args: &[String],
        env: &mut Environment<'_>,
    ) -> Vec<CommandOutput> {
        let name = pair.canonical_name();
        let result = match pair.handler() {
            HandlerRole::Server(handler) => handler.execute(args, message.sender, env),
            HandlerRole::Client(handler) => handler.execute(args, env),
        };

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                log::error!(
                    "command '{name}' ({}) from {} failed: {e}",
                    pair.owner(),
                    message.sender
                );
                CommandOutput::error(format!("Error executing command {name}"))
            },
        };

        let wants_hint = output.is_error() && message.wants_hints();
        let mut outputs = vec![output];
        if wants_hint {
            outputs.push(hint_for(&message.text, name));
        }
        outputs
    }
}

fn hint_for(raw_input: &str, name: &str) -> CommandOutput {
    if raw_input.contains(BRACKET_CHARS) {
        CommandOutput::hint(
            "Brackets in usage text only mark arguments; type the values without { } or [ ].",
        )
    } else {
        CommandOutput::hint(format!("Type /help {name} to see how to use this command."))
    }
}
