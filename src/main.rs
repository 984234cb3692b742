//! Lockstep Coordinator
//!
//! Binds a WebSocket listener and runs the room-based lockstep
//! coordinator described in `lib.rs`.

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lockstep_coordinator::config::Cli;
use lockstep_coordinator::network::GameServer;
use lockstep_coordinator::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set tracing subscriber");

    let cli = Cli::parse();
    let config = cli.into_server_config();

    info!("lockstep-coordinator v{}", VERSION);
    info!("binding {} (tick rate {} Hz)", config.bind_addr, config.tick_rate);

    let server = GameServer::new(config);
    server.run().await?;
    Ok(())
}
