//! cmdlink entry point.
//!
//! `cmdlink server` hosts commands over TCP, `cmdlink client <host> [port]`
//! connects to one, and `cmdlink demo` runs a scripted server and client
//! over the in-process loopback transport. Type `/quit` to leave.

mod console;
mod demo;

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use cmdlink_net::{TcpClientTransport, TcpServerTransport};
use cmdlink_terminal::{ClientNode, ServerNode};
use cmdlink_types::config::CmdlinkConfig;

/// Delay between ticks in the interactive loops.
const TICK: Duration = Duration::from_millis(50);

/// Config file picked up from the working directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "cmdlink.toml";

const USAGE: &str = "usage: cmdlink server [--config <path>]\n       \
                     cmdlink client <host> [port] [--config <path>]\n       \
                     cmdlink demo";

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Server {
        config: Option<PathBuf>,
    },
    Client {
        host: String,
        port: Option<u16>,
        config: Option<PathBuf>,
    },
    Demo,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Mode> {
    let mut config = None;
    let mut positional = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config needs a path\n{USAGE}"),
            },
            _ => positional.push(arg),
        }
    }

    match positional.first().map(String::as_str) {
        Some("server") if positional.len() == 1 => Ok(Mode::Server { config }),
        Some("client") if (2..=3).contains(&positional.len()) => {
            let port = match positional.get(2) {
                Some(p) => Some(p.parse().with_context(|| format!("invalid port '{p}'"))?),
                None => None,
            };
            Ok(Mode::Client {
                host: positional[1].clone(),
                port,
                config,
            })
        },
        Some("demo") | None => Ok(Mode::Demo),
        _ => bail!("{USAGE}"),
    }
}

fn load_config(path: Option<&Path>) -> Result<CmdlinkConfig> {
    if let Some(path) = path {
        return CmdlinkConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }
    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if fallback.exists() {
        return Ok(CmdlinkConfig::load(fallback)?);
    }
    log::info!("No {DEFAULT_CONFIG_FILE} found, using defaults");
    Ok(CmdlinkConfig::default())
}

/// What the console produced since the last tick.
#[derive(Debug, PartialEq, Eq)]
struct ConsoleBatch {
    /// Lines to handle, in typing order.
    lines: Vec<String>,
    /// The user typed `/quit`. Lines after it are dropped.
    quit: bool,
    /// stdin is closed; no more lines will arrive.
    closed: bool,
}

fn pending_lines(input: &Receiver<String>) -> ConsoleBatch {
    let mut batch = ConsoleBatch {
        lines: Vec::new(),
        quit: false,
        closed: false,
    };
    loop {
        match input.try_recv() {
            Ok(line) if line.trim() == "/quit" => {
                batch.quit = true;
                return batch;
            },
            Ok(line) => batch.lines.push(line),
            Err(TryRecvError::Empty) => return batch,
            Err(TryRecvError::Disconnected) => {
                batch.closed = true;
                return batch;
            },
        }
    }
}

fn run_server(config: &CmdlinkConfig) -> Result<()> {
    let mut transport = TcpServerTransport::bind(config.network.port)?;
    let mut node = ServerNode::with_builtins(config)?;
    log::info!("Server listening on {}", transport.local_addr()?);

    // Without a console (stdin closed) the server keeps serving peers.
    let mut input = Some(console::spawn_stdin_reader());
    loop {
        console::print_all("", &node.tick(&mut transport));
        if let Some(rx) = &input {
            let batch = pending_lines(rx);
            for line in &batch.lines {
                console::print_all("", &node.console_input(&mut transport, line));
            }
            if batch.quit {
                log::info!("Server shutting down");
                return Ok(());
            }
            if batch.closed {
                log::info!("Console closed; serving without it");
                input = None;
            }
        }
        std::thread::sleep(TICK);
    }
}

fn run_client(host: &str, port: u16, config: &CmdlinkConfig) -> Result<()> {
    let mut transport = TcpClientTransport::connect(host, port)
        .with_context(|| format!("could not connect to {host}:{port}"))?;
    let mut node = ClientNode::with_builtins(config)?;
    log::info!("Connected to {host}:{port}");

    let input = console::spawn_stdin_reader();
    loop {
        console::print_all("", &node.tick(&mut transport));
        if !transport.is_connected() {
            log::info!("Server closed the connection");
            return Ok(());
        }
        let batch = pending_lines(&input);
        for line in &batch.lines {
            console::print_all("", &node.input(&mut transport, line));
        }
        if batch.quit || batch.closed {
            // Flush what the last lines queued and show any reply already in.
            console::print_all("", &node.tick(&mut transport));
            return Ok(());
        }
        std::thread::sleep(TICK);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match parse_args(std::env::args().skip(1))? {
        Mode::Server { config } => {
            let config = load_config(config.as_deref())?;
            run_server(&config)
        },
        Mode::Client { host, port, config } => {
            let config = load_config(config.as_deref())?;
            let port = port.unwrap_or(config.network.port);
            run_client(&host, port, &config)
        },
        Mode::Demo => demo::run(&CmdlinkConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Mode> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_args_runs_demo() {
        assert_eq!(parse(&[]).unwrap(), Mode::Demo);
        assert_eq!(parse(&["demo"]).unwrap(), Mode::Demo);
    }

    #[test]
    fn server_with_config() {
        assert_eq!(
            parse(&["server", "--config", "my.toml"]).unwrap(),
            Mode::Server {
                config: Some(PathBuf::from("my.toml"))
            }
        );
    }

    #[test]
    fn client_with_and_without_port() {
        assert_eq!(
            parse(&["client", "example.org"]).unwrap(),
            Mode::Client {
                host: "example.org".into(),
                port: None,
                config: None
            }
        );
        assert_eq!(
            parse(&["-c", "x.toml", "client", "127.0.0.1", "9000"]).unwrap(),
            Mode::Client {
                host: "127.0.0.1".into(),
                port: Some(9000),
                config: Some(PathBuf::from("x.toml"))
            }
        );
    }

    #[test]
    fn bad_args_rejected() {
        assert!(parse(&["client"]).is_err());
        assert!(parse(&["client", "host", "notaport"]).is_err());
        assert!(parse(&["server", "extra"]).is_err());
        assert!(parse(&["server", "--config"]).is_err());
        assert!(parse(&["dance"]).is_err());
    }

    #[test]
    fn quit_ends_input() {
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send("hello".to_string()).unwrap();
        let batch = pending_lines(&rx);
        assert_eq!(batch.lines, vec!["hello".to_string()]);
        assert!(!batch.quit && !batch.closed);
        assert!(pending_lines(&rx).lines.is_empty());
        tx.send(" /quit ".to_string()).unwrap();
        assert!(pending_lines(&rx).quit);
    }

    #[test]
    fn lines_before_quit_are_kept() {
        let (tx, rx) = std::sync::mpsc::channel();
        for line in ["/say bye", "/quit", "never sent"] {
            tx.send(line.to_string()).unwrap();
        }
        let batch = pending_lines(&rx);
        assert_eq!(batch.lines, vec!["/say bye".to_string()]);
        assert!(batch.quit);
    }

    #[test]
    fn closed_stdin_is_reported_after_remaining_lines() {
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send("last".to_string()).unwrap();
        drop(tx);
        let batch = pending_lines(&rx);
        assert_eq!(batch.lines, vec!["last".to_string()]);
        assert!(batch.closed);
        assert!(!batch.quit);
    }

    #[test]
    fn explicit_missing_config_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/cmdlink.toml"))).is_err());
    }
}
