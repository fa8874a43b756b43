//! Scripted session over the loopback transport.

use anyhow::Result;

use cmdlink_net::LoopbackNetwork;
use cmdlink_terminal::{ClientNode, ServerNode};
use cmdlink_types::config::CmdlinkConfig;

use crate::console::print_all;

enum Line {
    Client(&'static str),
    Server(&'static str),
}

const SCRIPT: &[Line] = &[
    Line::Client("/help"),
    Line::Client("/echo local commands never leave the client"),
    Line::Client("/who"),
    Line::Client("hello everyone"),
    Line::Client("/permit say on"),
    Line::Server("/permit say on"),
    Line::Client("/say the server restarts in five minutes"),
    Line::Client("/permit {say} off"),
    Line::Client("/frobnicate"),
];

pub fn run(config: &CmdlinkConfig) -> Result<()> {
    let net = LoopbackNetwork::new();
    let mut server_t = net.join_server()?;
    let mut client_t = net.join();
    let mut server = ServerNode::with_builtins(config)?;
    let mut client = ClientNode::with_builtins(config)?;
    log::info!("Demo: server and one client on a loopback network");

    print_all("server| ", &server.tick(&mut server_t));
    for line in SCRIPT {
        match line {
            Line::Client(text) => {
                println!("client> {text}");
                print_all("client| ", &client.input(&mut client_t, text));
            },
            Line::Server(text) => {
                println!("server> {text}");
                print_all("server| ", &server.console_input(&mut server_t, text));
            },
        }
        print_all("server| ", &server.tick(&mut server_t));
        print_all("client| ", &client.tick(&mut client_t));
    }
    Ok(())
}
