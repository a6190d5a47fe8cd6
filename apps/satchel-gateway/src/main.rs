mod audit;
mod config;
mod handlers;

use clap::Parser;
use tracing::info;

use crate::config::GatewayConfig;
use crate::handlers::AppState;

/// Stateless backend: credential issuance, activation codes, diagnostics.
#[derive(Debug, Parser)]
#[command(name = "satchel-gateway")]
struct Cli {
    /// HTTP port to listen on (overrides SATCHEL_GATEWAY_PORT).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = GatewayConfig::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if config.provider_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; /session will refuse requests");
    }

    let port = config.port;
    let app = handlers::router(AppState::new(config));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("gateway listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
