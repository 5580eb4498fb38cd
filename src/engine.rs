/// Typed errors for rejected commands and invalid edits
pub mod error;

/// Append-only step log shared by every executor
pub mod trace;

/// Executor trait, run parameters and run reports
pub mod executor;

/// Weighted undirected graph model
pub mod graph;

/// Disjoint-set forest used by Kruskal
pub mod union_find;

/// Maze grid model
pub mod grid;

/// Graph executors
pub mod dijkstra;
pub mod kruskal;
pub mod prim;

/// Depth-first and breadth-first maze search
pub mod search;

/// Protocol messages exchanged by the consensus simulators
pub mod message;

/// Consensus simulators
pub mod paxos;
pub mod pbft;

/// Controller settings and server configuration
pub mod config;

/// Observation events broadcast to dashboards
pub mod events;

/// Step controller and async driver
pub mod simulation;

/// WebSocket and HTTP servers for the dashboard
pub mod websocket;


/// Driver and controller scenarios
#[cfg(test)]
pub mod integration_tests;

// Re-export commonly used types for convenience
pub use config::{ServerConfig, SimConfig};
pub use events::EventBroadcaster;
pub use executor::{RunReport, RunRequest};
pub use simulation::{EditOp, Simulator, SimulatorHandle};
pub use websocket::spawn_servers;
