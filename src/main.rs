mod config;
mod errors;
mod models;
mod remote;
mod routes;
mod service;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::remote::{DocumentService, HttpDocumentService};
use crate::service::session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_chat_client=debug,tower_http=debug".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;

    // ── Document service ──────────────────────────────────────────────────────
    let remote = HttpDocumentService::new(&config)?;
    match remote.health().await {
        Ok(()) => info!("Document service reachable at {}", config.api_base_url),
        Err(e) => warn!("Document service at {} is not reachable yet: {e}", config.api_base_url),
    }
    let session = Session::new(Arc::new(remote));

    // ── Router ────────────────────────────────────────────────────────────────
    let app = routes::router(session, &config);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
