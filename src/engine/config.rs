use std::time::Duration;

/// Delay presets offered for graph and consensus runs, in milliseconds
pub const GRAPH_SPEED_PRESETS_MS: [u64; 3] = [2000, 1000, 500];
/// Delay presets offered for maze searches, in milliseconds
pub const MAZE_SPEED_PRESETS_MS: [u64; 4] = [100, 50, 10, 1];

/// Settings for the step controller
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Delay between executor steps
    pub step_delay: Duration,
    /// Buffer size of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(GRAPH_SPEED_PRESETS_MS[1]),
            event_capacity: 1000,
        }
    }
}

/// Configuration for the WebSocket and HTTP servers
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port for WebSocket connections
    pub ws_port: u16,
    /// Port for the HTTP dashboard and JSON API
    pub http_port: u16,
    /// Directory served as the dashboard
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ws_port: 8082,
            http_port: 8081,
            static_dir: "web".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }
}
