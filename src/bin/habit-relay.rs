#![forbid(unsafe_code)]
//! Withdrawal relay: serves `POST /withdraw` in front of the token network

use clap::Parser;
use habitstake::amount::from_f64;
use habitstake::cli::init_tracing;
use habitstake::config::load_config_from;
use habitstake::relay::{run_relay_server, RelayState, ReserveConnector};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
    /// Overrides `relay.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config_from(&cli.config)?;
    let relay = config.relay;
    let port = cli.port.unwrap_or(relay.port);

    info!("Connecting to {} backend node(s)", relay.endpoints.len());
    let connector = ReserveConnector::new(from_f64(relay.reserve)?);
    let state = RelayState::connect(
        &connector,
        &relay.endpoints,
        relay.connect_attempts,
        Duration::from_millis(relay.connect_backoff_ms),
    )
    .await;

    run_relay_server(state, port).await
}
