//! `aisled` — the HTTP front of the recommendation gateway.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aisle_config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "aisled", about = "Conversational product recommendation gateway")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
    /// Optional TOML config; environment variables still take precedence.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::from_env(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone())),
        )
        .init();

    let state = state::AppState::build(&config);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(bind = %args.bind, model = %config.llm.model, "aisled listening");
    axum::serve(listener, app).await?;
    Ok(())
}
