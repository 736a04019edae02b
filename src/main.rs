use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use docent_backend::core::config::{AppPaths, Config};
use docent_backend::logging;
use docent_backend::server;
use docent_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    let config = Config::load(&paths);
    logging::init(&paths);

    let command = env::args().nth(1).unwrap_or_else(|| "serve".to_string());
    match command.as_str() {
        "ingest" => ingest(config, paths).await,
        "serve" => serve(config, paths).await,
        other => anyhow::bail!("unknown command: {} (expected `serve` or `ingest`)", other),
    }
}

/// Rebuilds the index from the document directory and exits.
async fn ingest(config: Config, paths: AppPaths) -> anyhow::Result<()> {
    let state = AppState::initialize(config, paths).await?;
    let chunks = state
        .service
        .rebuild()
        .await
        .context("Failed to build the document index")?;
    println!("Indexed {} chunks", chunks);
    Ok(())
}

async fn serve(config: Config, paths: AppPaths) -> anyhow::Result<()> {
    let port = config.server.port;
    let state = AppState::initialize(config, paths).await?;

    // A server with no index cannot answer anything; fail loudly now
    // rather than on the first query.
    state
        .service
        .ensure_ready()
        .await
        .context("Index not ready")?;

    let bind_addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
