use std::sync::Arc;

use analysis_server::analysis::AnalysisSettings;
use analysis_server::config::ServerConfig;
use analysis_server::routes;
use analysis_server::stockfish::StockfishEngine;

use anyhow::Context;
use axum::{routing::get, Extension, Router};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();

    tracing::info!(path = %config.stockfish_path, "Starting Stockfish...");
    let engine = StockfishEngine::new(&config.stockfish_path)
        .await
        .context("Stockfish not found, set STOCKFISH_PATH")?;
    let engine = Arc::new(Mutex::new(engine));

    let state = routes::ws::EngineState {
        engine: engine.clone(),
        settings: AnalysisSettings {
            multipv: config.multipv,
            depth: config.search_depth,
        },
    };

    let app = Router::new()
        .route("/", get(routes::ws::ws_handler))
        .route("/health", get(routes::health_check))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Analysis server running on ws://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    engine.lock().await.quit().await;
    Ok(())
}
