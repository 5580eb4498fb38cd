mod cli;
mod engine;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use cli::{Cli, ConsoleCommand, CONSOLE_HELP};
use engine::{spawn_servers, EventBroadcaster, Simulator, SimulatorHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("algo_sim=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!("🚀 Algorithm simulator starting...");

    let sim_config = cli.sim_config();
    let (event_broadcaster, _) = EventBroadcaster::new(sim_config.event_capacity);
    let simulator =
        SimulatorHandle::new(Simulator::new(&sim_config).with_events(event_broadcaster.clone()));

    let servers = if cli.no_server {
        info!("🖥️ Console only, servers disabled");
        None
    } else {
        let server_config = cli.server_config();
        info!("   WebSocket: ws://{}", server_config.ws_addr());
        info!(
            "   Dashboard: http://{}:{}",
            server_config.host, server_config.http_port
        );
        Some(spawn_servers(
            server_config,
            event_broadcaster,
            simulator.clone(),
        ))
    };

    println!("\n=== Algorithm Simulator Console ===");
    println!("{CONSOLE_HELP}");
    println!("===================================\n");

    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        warn!("🛑 Received Ctrl+C, initiating graceful shutdown...");
    };

    let console = run_console(simulator.clone(), servers.is_some());

    tokio::select! {
        _ = shutdown_signal => {
            warn!("🚨 Shutdown signal received");
        }
        _ = console => {
            warn!("🏁 Console completed");
        }
    }

    simulator.cancel().await;
    if let Some((ws_handle, http_handle)) = servers {
        ws_handle.abort();
        http_handle.abort();
        info!("🌐 WebSocket and HTTP servers shut down");
    }

    info!("✅ Algorithm simulator stopped");
    Ok(())
}

/// Reads console commands from stdin until `quit` or EOF
async fn run_console(simulator: SimulatorHandle, serving: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match ConsoleCommand::parse(&line) {
                    Ok(ConsoleCommand::Quit) => {
                        warn!("🔚 Exiting...");
                        break;
                    }
                    Ok(command) => execute(command, &simulator).await,
                    Err(message) => println!("{message}"),
                }
            }
            Ok(None) => {
                if !serving {
                    break;
                }
                // Keep the servers up for the dashboard
                warn!("📜 EOF reached, continuing in background mode for visualization...");
                warn!("💡 Use Ctrl+C to shutdown");
                std::future::pending::<()>().await;
            }
            Err(e) => {
                error!("Error reading input: {}", e);
                break;
            }
        }
    }
}

async fn execute(command: ConsoleCommand, simulator: &SimulatorHandle) {
    match command {
        ConsoleCommand::Run(request) => {
            let kind = request.kind();
            let printed = simulator.lock().await.trace().len();
            match simulator.run(request).await {
                Ok(driver) => {
                    info!("▶️ {} started", kind);
                    let sim = simulator.clone();
                    tokio::spawn(async move {
                        print_report(driver.await.ok().flatten(), &sim, printed).await;
                    });
                }
                Err(e) => println!("❌ {e}"),
            }
        }
        ConsoleCommand::Edit(op) => match simulator.edit(op).await {
            Ok(()) => println!("✓ Edit applied"),
            Err(e) => println!("❌ {e}"),
        },
        ConsoleCommand::Cancel => match simulator.cancel().await {
            Some(report) => println!("⏹️ {} cancelled", report.executor),
            None => println!("Nothing is running"),
        },
        ConsoleCommand::Reset => {
            simulator.reset().await;
            println!("🔄 Models restored and trace cleared");
        }
        ConsoleCommand::Speed(delay) => {
            simulator.set_speed(delay).await;
            println!("⏱️ Step delay set to {} ms", delay.as_millis());
        }
        ConsoleCommand::Status => {
            let sim = simulator.lock().await;
            println!("📊 Simulator Status:");
            match sim.running_kind() {
                Some(kind) => println!("   Running: {kind}"),
                None => println!("   Running: idle"),
            }
            println!("   Step delay: {} ms", sim.delay().as_millis());
            println!("   Trace lines: {}", sim.trace().len());
            if let Some(report) = sim.last_report() {
                println!("   Last run: {} → {:?}", report.executor, report.outcome);
            }
        }
        ConsoleCommand::Trace => {
            let sim = simulator.lock().await;
            for entry in sim.trace().entries() {
                println!("{:>4}  {}", entry.seq, entry.line);
            }
        }
        ConsoleCommand::Help => println!("{CONSOLE_HELP}"),
        ConsoleCommand::Quit => {}
    }
}

async fn print_report(
    report: Option<engine::RunReport>,
    simulator: &SimulatorHandle,
    from: usize,
) {
    let sim = simulator.lock().await;
    for entry in sim.trace().since(from) {
        println!("  {}", entry.line);
    }
    match report {
        Some(report) => println!("🏁 {} finished: {:?}", report.executor, report.outcome),
        None => println!("⏹️ Run did not finish"),
    }
}
