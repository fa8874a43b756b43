//! Terminal input and output.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};

use cmdlink_terminal::CommandOutput;
use cmdlink_types::message::Status;

/// Read stdin lines on a background thread.
///
/// The channel disconnects when stdin closes.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                },
                Err(e) => {
                    log::warn!("stdin read failed: {e}");
                    break;
                },
            }
        }
    });
    rx
}

/// One output as shown on the terminal.
pub fn render(output: &CommandOutput) -> String {
    match output.status {
        Status::None => output.text.clone(),
        status => output
            .text
            .lines()
            .map(|line| format!("[{status}] {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn print_all(prefix: &str, outputs: &[CommandOutput]) {
    for output in outputs {
        for line in render(output).lines() {
            println!("{prefix}{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_unmarked() {
        assert_eq!(render(&CommandOutput::text("hi")), "hi");
    }

    #[test]
    fn status_marks_every_line() {
        let out = CommandOutput::error("one\ntwo");
        let shown = render(&out);
        let lines: Vec<&str> = shown.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with('[')));
        assert!(lines[1].ends_with("two"));
    }
}
