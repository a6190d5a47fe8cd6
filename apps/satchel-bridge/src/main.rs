mod config;
mod discovery;
mod http;
mod latch;
mod link;
mod supervisor;

use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::BridgeConfig;
use crate::http::BridgeState;
use crate::latch::ButtonLatch;
use crate::link::SerialConnector;
use crate::supervisor::{BridgeStatus, Supervisor};

/// Serial-to-HTTP bridge for the helper's hardware button.
#[derive(Debug, Parser)]
#[command(name = "satchel-bridge")]
struct Cli {
    /// HTTP port to listen on (overrides SATCHEL_BRIDGE_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Serial port address to use, skipping discovery.
    #[arg(long)]
    serial_port: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = BridgeConfig::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(serial_port) = cli.serial_port {
        config.serial_address = Some(serial_port);
    }

    let latch = Arc::new(ButtonLatch::new());
    let status = Arc::new(BridgeStatus::default());
    let connector = Arc::new(SerialConnector::new(config.baud));

    let supervisor = Supervisor::new(connector, config.clone(), latch.clone(), status.clone());
    tokio::spawn(supervisor.run());

    let state = BridgeState {
        latch,
        status,
        started: Instant::now(),
    };
    let app = Router::new()
        .route("/button-state", get(http::button_state))
        .route("/test", get(http::test_status))
        .route("/health", get(http::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("bridge listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
