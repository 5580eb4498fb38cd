use std::time::Duration;

use clap::Parser;

use crate::engine::executor::{ExecutorKind, DEFAULT_CLIENT_REQUEST, DEFAULT_PROPOSAL_VALUE};
use crate::engine::{EditOp, RunRequest, ServerConfig, SimConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stepwise algorithm and consensus simulator", long_about = None)]
pub struct Cli {
    /// Host the WebSocket and HTTP servers bind to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port for WebSocket clients.
    #[arg(long, default_value_t = 8082)]
    pub ws_port: u16,

    /// Port for the dashboard and JSON API.
    #[arg(long, default_value_t = 8081)]
    pub http_port: u16,

    /// Directory with the dashboard's static files.
    #[arg(long, default_value = "web")]
    pub static_dir: String,

    /// Delay between executor steps in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,

    /// Run only the console, without WebSocket or HTTP servers.
    #[arg(long)]
    pub no_server: bool,
}

impl Cli {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            ws_port: self.ws_port,
            http_port: self.http_port,
            static_dir: self.static_dir.clone(),
        }
    }

    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            step_delay: Duration::from_millis(self.delay_ms),
            ..SimConfig::default()
        }
    }
}

pub const CONSOLE_HELP: &str = "\
Commands:
  run dijkstra <start> <target>   - Shortest path on the graph
  run prim <start>                - Minimum spanning tree from a node
  run kruskal                     - Minimum spanning tree by edge order
  run dfs | run bfs               - Maze search from start to end
  run paxos [round|auto] [value]  - One Paxos proposal
  run pbft [request]              - One PBFT client request
  edit <json>                     - Apply an edit, e.g. {\"op\":\"toggle_wall\",\"row\":3,\"col\":4}
  cancel                          - Stop the running executor
  reset                           - Cancel and restore all models
  speed <ms>                      - Delay between steps
  status                          - Show controller status
  trace                           - Print the step log
  help                            - Show this help message
  quit                            - Exit";

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Run(RunRequest),
    Edit(EditOp),
    Cancel,
    Reset,
    Speed(Duration),
    Status,
    Trace,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => Err("empty command".to_string()),
            ["run", kind, args @ ..] => parse_run(kind, args).map(ConsoleCommand::Run),
            ["run"] => Err("Usage: run <executor> [args]".to_string()),
            ["edit", ..] => {
                let json = line.trim_start().trim_start_matches("edit").trim();
                serde_json::from_str(json)
                    .map(ConsoleCommand::Edit)
                    .map_err(|e| format!("invalid edit: {e}"))
            }
            ["cancel"] => Ok(ConsoleCommand::Cancel),
            ["reset"] => Ok(ConsoleCommand::Reset),
            ["speed", ms] => ms
                .parse::<u64>()
                .map(|ms| ConsoleCommand::Speed(Duration::from_millis(ms)))
                .map_err(|_| format!("invalid delay '{ms}'")),
            ["speed", ..] => Err("Usage: speed <ms>".to_string()),
            ["status"] => Ok(ConsoleCommand::Status),
            ["trace"] => Ok(ConsoleCommand::Trace),
            ["help"] => Ok(ConsoleCommand::Help),
            ["quit"] | ["exit"] => Ok(ConsoleCommand::Quit),
            [cmd, ..] => Err(format!(
                "Unknown command: '{cmd}'. Type 'help' for available commands."
            )),
        }
    }
}

fn parse_run(kind: &str, args: &[&str]) -> Result<RunRequest, String> {
    let kind: ExecutorKind = kind.parse()?;
    match (kind, args) {
        (ExecutorKind::Dijkstra, [start, target]) => Ok(RunRequest::Dijkstra {
            start: start.to_string(),
            target: target.to_string(),
        }),
        (ExecutorKind::Dijkstra, _) => Err("Usage: run dijkstra <start> <target>".to_string()),
        (ExecutorKind::Prim, [start]) => Ok(RunRequest::Prim {
            start: start.to_string(),
        }),
        (ExecutorKind::Prim, _) => Err("Usage: run prim <start>".to_string()),
        (ExecutorKind::Kruskal, []) => Ok(RunRequest::Kruskal),
        (ExecutorKind::Dfs, []) => Ok(RunRequest::Dfs),
        (ExecutorKind::Bfs, []) => Ok(RunRequest::Bfs),
        (ExecutorKind::Kruskal | ExecutorKind::Dfs | ExecutorKind::Bfs, _) => {
            Err(format!("{kind} takes no arguments"))
        }
        (ExecutorKind::Paxos, args) => {
            let round = match args.first() {
                None | Some(&"auto") => None,
                Some(round) => Some(
                    round
                        .parse::<u64>()
                        .map_err(|_| format!("invalid round '{round}'"))?,
                ),
            };
            let value = match args.get(1..) {
                Some(rest) if !rest.is_empty() => rest.join(" "),
                _ => DEFAULT_PROPOSAL_VALUE.to_string(),
            };
            Ok(RunRequest::Paxos { round, value })
        }
        (ExecutorKind::Pbft, args) => {
            let request = if args.is_empty() {
                DEFAULT_CLIENT_REQUEST.to_string()
            } else {
                args.join(" ")
            };
            Ok(RunRequest::Pbft { request })
        }
    }
}
