mod backend;
mod config;
mod drafts;
mod errors;
mod preview;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend::BackendClient;
use crate::config::Config;
use crate::drafts::DraftStore;
use crate::preview::{Coordinator, CoordinatorSettings};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume preview sidecar v{}", env!("CARGO_PKG_VERSION"));

    let backend = BackendClient::new(config.backend_url.clone(), config.backend_timeout)?;
    info!("Backend client initialized ({})", config.backend_url);

    // The shell collapses its side panel once the first preview lands.
    let collapse_panel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&collapse_panel);
    let coordinator = Coordinator::new(
        Arc::new(backend.clone()),
        CoordinatorSettings {
            debounce: config.debounce,
            preview_dir: config.preview_dir.clone(),
        },
        Some(Arc::new(move || flag.store(true, Ordering::SeqCst))),
    );
    info!(
        "Preview coordinator ready (debounce {}ms, images in {})",
        config.debounce.as_millis(),
        config.preview_dir.display()
    );

    // Restore the last draft so the shell reopens where it left off
    let drafts = DraftStore::new(config.draft_path.clone());
    if let Some(draft) = drafts.load().await {
        info!("Restoring draft from {}", drafts.path().display());
        if !coordinator.schedule_compile(draft.resume_data, draft.template_id) {
            info!("Saved draft has nothing to compile");
        }
    }

    let state = AppState {
        coordinator: coordinator.clone(),
        backend,
        drafts,
        config: config.clone(),
        collapse_panel,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // the shell loads from file:// and a dev server

    let addr: SocketAddr = format!("127.0.0.1:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.teardown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
