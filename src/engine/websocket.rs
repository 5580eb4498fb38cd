//! WebSocket and HTTP servers for driving the simulator from a browser dashboard.
//! The WebSocket server streams simulator events and accepts JSON commands; the
//! HTTP server serves the static dashboard and a small JSON API.
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, error, info, warn};
use warp::Filter;

use crate::engine::config::{ServerConfig, GRAPH_SPEED_PRESETS_MS, MAZE_SPEED_PRESETS_MS};
use crate::engine::events::{EventBroadcaster, SimEvent};
use crate::engine::executor::RunRequest;
use crate::engine::simulation::{EditOp, SimulatorHandle};

type WsSink = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

/// WebSocket server for streaming simulator events to web clients
#[derive(Debug)]
pub struct WebSocketServer {
    config: ServerConfig,
    event_broadcaster: EventBroadcaster,
    simulator: SimulatorHandle,
}

impl WebSocketServer {
    pub fn new(
        config: ServerConfig,
        event_broadcaster: EventBroadcaster,
        simulator: SimulatorHandle,
    ) -> Self {
        Self {
            config,
            event_broadcaster,
            simulator,
        }
    }

    /// Starts the WebSocket server and begins accepting connections
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.config.ws_addr();
        let listener = TcpListener::bind(&addr).await?;

        info!("🌐 WebSocket server starting on {}", addr);

        while let Ok((stream, peer_addr)) = listener.accept().await {
            info!("🔗 New WebSocket connection from {}", peer_addr);

            let event_broadcaster = self.event_broadcaster.clone();
            let simulator = self.simulator.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_websocket_connection(stream, event_broadcaster, simulator).await {
                    error!("WebSocket connection error for {}: {}", peer_addr, e);
                }
                info!("🔌 WebSocket connection closed for {}", peer_addr);
            });
        }

        Ok(())
    }
}

/// Handles a single WebSocket connection
async fn handle_websocket_connection(
    stream: TcpStream,
    event_broadcaster: EventBroadcaster,
    simulator: SimulatorHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    let ws_stream = accept_async(stream).await?;
    info!("✅ WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut event_receiver = event_broadcaster.subscribe();
    let observers = event_broadcaster.receiver_count();
    debug!(observers, "subscribed to simulator events");

    let welcome_msg = welcome_message(observers);
    if let Err(e) = ws_sender.send(Message::Text(welcome_msg.to_string())).await {
        warn!("Failed to send welcome message: {}", e);
    }

    // Late joiners start from the current state rather than an empty canvas
    let snapshot = snapshot_response(&simulator).await;
    if let Err(e) = ws_sender.send(Message::Text(snapshot.to_string())).await {
        warn!("Failed to send initial snapshot: {}", e);
    }

    loop {
        tokio::select! {
            ws_msg = ws_receiver.next() => {
                match ws_msg {
                    Some(Ok(msg)) => {
                        if let Err(e) = handle_client_message(msg, &mut ws_sender, &simulator).await {
                            error!("Error handling client message: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket message error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket connection closed by client");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(sim_event) => {
                        if let Err(e) = send_event_to_client(&sim_event, &mut ws_sender).await {
                            error!("Error sending event to client: {}", e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Event broadcast channel closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Clients can resync with get_snapshot
                        warn!("Client lagged behind, missed {} events", missed);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Handles incoming frames from WebSocket clients
async fn handle_client_message(
    message: Message,
    ws_sender: &mut WsSink,
    simulator: &SimulatorHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    match message {
        Message::Text(text) => {
            debug!("Received text message from client: {}", text);

            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(command) => {
                    let response = handle_client_command(command, simulator).await;
                    ws_sender.send(Message::Text(response.to_string())).await?;
                }
                Err(_) => warn!("Invalid JSON received from client: {}", text),
            }
        }
        Message::Binary(data) => {
            debug!("Received binary message from client: {} bytes", data.len());
        }
        Message::Ping(data) => {
            ws_sender.send(Message::Pong(data)).await?;
        }
        Message::Pong(_) => {}
        Message::Close(_) => {
            info!("Received close message from client");
            return Err("Client requested close".into());
        }
        Message::Frame(_) => {}
    }

    Ok(())
}

/// Executes a JSON command against the simulator and builds the JSON reply.
///
/// Commands are objects with a `type` field: `ping`, `get_snapshot`, `run`
/// (plus [`RunRequest`] fields), `edit` (plus [`EditOp`] fields), `set_speed`
/// (`delay_ms`), `cancel` and `reset`.
pub async fn handle_client_command(
    command: serde_json::Value,
    simulator: &SimulatorHandle,
) -> serde_json::Value {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let Some(cmd_type) = command.get("type").and_then(|v| v.as_str()) else {
        return serde_json::json!({
            "type": "error",
            "message": "Missing command type",
            "timestamp": timestamp
        });
    };

    match cmd_type {
        "ping" => serde_json::json!({
            "type": "pong",
            "timestamp": timestamp
        }),
        "get_snapshot" => snapshot_response(simulator).await,
        "run" => {
            let request = match serde_json::from_value::<RunRequest>(command.clone()) {
                Ok(request) => request,
                Err(e) => return rejected("run", e.to_string()),
            };
            let executor = request.kind();
            match simulator.run(request).await {
                Ok(_driver) => {
                    info!("📤 WebSocket client started {}", executor);
                    serde_json::json!({
                        "type": "run_started",
                        "executor": executor,
                        "success": true,
                        "timestamp": timestamp
                    })
                }
                Err(e) => rejected("run", e.to_string()),
            }
        }
        "edit" => {
            let op = match serde_json::from_value::<EditOp>(command.clone()) {
                Ok(op) => op,
                Err(e) => return rejected("edit", e.to_string()),
            };
            match simulator.edit(op).await {
                Ok(()) => serde_json::json!({
                    "type": "edit_applied",
                    "success": true,
                    "timestamp": timestamp
                }),
                Err(e) => rejected("edit", e.to_string()),
            }
        }
        "set_speed" => match command.get("delay_ms").and_then(|v| v.as_u64()) {
            Some(delay_ms) => {
                simulator.set_speed(Duration::from_millis(delay_ms)).await;
                serde_json::json!({
                    "type": "speed_changed",
                    "delay_ms": delay_ms,
                    "success": true,
                    "timestamp": timestamp
                })
            }
            None => rejected("set_speed", "Missing delay_ms parameter"),
        },
        "cancel" => {
            let report = simulator.cancel().await;
            serde_json::json!({
                "type": "cancelled",
                "success": report.is_some(),
                "report": report,
                "timestamp": timestamp
            })
        }
        "reset" => {
            simulator.reset().await;
            info!("🔄 WebSocket client reset the simulator");
            serde_json::json!({
                "type": "reset",
                "success": true,
                "timestamp": timestamp
            })
        }
        other => {
            warn!("Unknown command type: {}", other);
            serde_json::json!({
                "type": "error",
                "message": format!("Unknown command type: {other}"),
                "timestamp": timestamp
            })
        }
    }
}

fn rejected(command: &str, error: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "type": "command_rejected",
        "command": command,
        "success": false,
        "error": error.into(),
        "timestamp": chrono::Utc::now().timestamp_millis()
    })
}

/// First message a client receives: observer count and the dashboard's speed presets
fn welcome_message(observers: usize) -> serde_json::Value {
    serde_json::json!({
        "type": "connected",
        "message": "Connected to algorithm simulator",
        "observers": observers,
        "speed_presets": {
            "graph_ms": GRAPH_SPEED_PRESETS_MS,
            "maze_ms": MAZE_SPEED_PRESETS_MS
        },
        "timestamp": chrono::Utc::now().timestamp_millis()
    })
}

async fn snapshot_response(simulator: &SimulatorHandle) -> serde_json::Value {
    serde_json::json!({
        "type": "snapshot",
        "snapshot": simulator.snapshot().await,
        "timestamp": chrono::Utc::now().timestamp_millis()
    })
}

/// Sends a simulator event to a WebSocket client
async fn send_event_to_client(
    event: &SimEvent,
    ws_sender: &mut WsSink,
) -> Result<(), Box<dyn std::error::Error>> {
    let json_event = serde_json::to_string(event)?;
    ws_sender.send(Message::Text(json_event)).await?;
    Ok(())
}

/// HTTP server for the static dashboard and the JSON API
#[derive(Debug)]
pub struct HttpServer {
    config: ServerConfig,
    simulator: SimulatorHandle,
}

impl HttpServer {
    pub fn new(config: ServerConfig, simulator: SimulatorHandle) -> Self {
        Self { config, simulator }
    }

    /// Starts the HTTP server
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        let static_dir = self.config.static_dir.clone();
        let http_port = self.config.http_port;
        let host = self.config.host.clone();

        info!("🌐 HTTP server starting on {}:{}", host, http_port);
        info!("📁 Serving static files from: {}", static_dir);

        let index_path = format!("{}/index.html", static_dir);
        let index = warp::path::end().and(warp::fs::file(index_path));
        let static_files = warp::fs::dir(static_dir).with(warp::log("http"));

        let simulator = self.simulator.clone();
        let with_simulator = warp::any().map(move || simulator.clone());

        let api_snapshot = warp::path!("api" / "snapshot")
            .and(warp::get())
            .and(with_simulator.clone())
            .then(|simulator: SimulatorHandle| async move {
                warp::reply::json(&simulator.snapshot().await)
            });

        let websocket_port = self.config.ws_port;
        let api_status = warp::path!("api" / "status")
            .and(warp::get())
            .and(with_simulator)
            .then(move |simulator: SimulatorHandle| async move {
                let sim = simulator.lock().await;
                warp::reply::json(&serde_json::json!({
                    "status": "running",
                    "executor": sim.running_kind(),
                    "busy": sim.is_running(),
                    "generation": sim.generation(),
                    "delay_ms": sim.delay().as_millis() as u64,
                    "websocket_port": websocket_port,
                    "timestamp": chrono::Utc::now().timestamp_millis()
                }))
            });

        let routes = api_snapshot
            .or(api_status)
            .or(index)
            .or(static_files)
            .with(
                warp::cors()
                    .allow_any_origin()
                    .allow_headers(vec!["content-type"])
                    .allow_methods(vec!["GET", "POST"]),
            );

        let addr: std::net::SocketAddr = format!("{}:{}", host, http_port).parse()?;
        warp::serve(routes).run(addr).await;

        Ok(())
    }
}

/// Spawns both the WebSocket and HTTP servers
pub fn spawn_servers(
    config: ServerConfig,
    event_broadcaster: EventBroadcaster,
    simulator: SimulatorHandle,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let ws_config = config.clone();
    let ws_simulator = simulator.clone();

    let ws_handle = tokio::spawn(async move {
        let server = WebSocketServer::new(ws_config, event_broadcaster, ws_simulator);
        if let Err(e) = server.start().await {
            error!("WebSocket server error: {}", e);
        }
    });

    let http_handle = tokio::spawn(async move {
        let http_server = HttpServer::new(config, simulator);
        if let Err(e) = http_server.start().await {
            error!("HTTP server error: {}", e);
        }
    });

    (ws_handle, http_handle)
}
