use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::info;

use greenfelt_server::config::ServerConfig;
use greenfelt_server::coordinator::Coordinator;
use greenfelt_server::store::MemoryStore;
use greenfelt_server::ws::{healthz, ws_handler, AppState};

#[derive(Parser)]
#[command(name = "greenfelt-server", about = "Real-time multi-table card-game service")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 9240)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = ServerConfig::from_env();
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(store, config);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(AppState { coordinator });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid listen addr")?;
    info!(%addr, "greenfelt server listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
