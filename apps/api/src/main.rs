mod builder;
mod config;
mod db;
mod errors;
mod evidence;
mod llm_client;
mod models;
mod quality;
mod rewrite;
mod routes;
mod state;
mod store;
mod text;
mod variants;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgRecordStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Builder API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and the record store
    let db = create_pool(&config.database_url).await?;
    let store = PgRecordStore::new(db);
    store.ensure_schema().await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let state = AppState::new(Arc::new(store), Arc::new(llm), config.clone());

    let autosave = state
        .sessions
        .spawn_autosave(config.pipeline.autosave_interval);
    info!(
        "Session auto-save every {}s",
        config.pipeline.autosave_interval.as_secs()
    );

    let sessions = state.sessions.clone();
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    autosave.abort();
    info!("Flushing {} unsaved sessions", sessions.dirty_count());
    let report = sessions.flush_dirty().await;
    if report.failed > 0 {
        warn!("{} sessions could not be saved on shutdown", report.failed);
    }
    info!("Shutdown complete ({} sessions flushed)", report.saved);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
