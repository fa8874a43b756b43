//! Recognising command lines.

/// Lines starting with this are command invocations.
pub const COMMAND_PREFIX: char = '/';

/// A command line split into its trigger and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased trigger name.
    pub trigger: String,
    pub args: Vec<String>,
}

/// Parse `/trigger arg1 arg2 ...`.
///
/// Returns `None` for text without the prefix or with nothing after it.
pub fn parse_command_line(text: &str) -> Option<ParsedCommand> {
    let rest = text.trim_start().strip_prefix(COMMAND_PREFIX)?;
    let mut tokens = rest.split_whitespace();
    let trigger = tokens.next()?.to_lowercase();
    Some(ParsedCommand {
        trigger,
        args: tokens.map(str::to_string).collect(),
    })
}
