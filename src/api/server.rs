use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info};

use super::{services, state::AppState};

/// Room for multipart boundaries and form fields on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Build the API router over a ready application state
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes().saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/api/fetch", post(services::trigger_fetch))
        .route("/api/fetch/status/{job_id}", get(services::fetch_status))
        .route("/api/upload", post(services::upload_file))
        .route(
            "/api/upload/{upload_id}/preview",
            get(services::preview_upload),
        )
        .route("/api/import", post(services::trigger_import))
        .route("/api/import/status/{job_id}", get(services::import_status))
        .route("/api/jobs", get(services::list_jobs))
        .route(
            "/api/performance/{profile_id}/summary",
            get(services::performance_summary),
        )
        .route(
            "/api/performance/{profile_id}/keywords",
            get(services::keyword_performance),
        )
        .route(
            "/api/performance/{profile_id}/trends",
            get(services::performance_trends),
        )
        .route(
            "/api/performance/{profile_id}/sources",
            get(services::data_sources),
        )
        .route("/api/health", get(services::health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        // gzip request bodies are inflated before reaching the handlers
        .layer(RequestDecompressionLayer::new())
}

/// Serve `app` on `address` until Ctrl+C or SIGTERM
pub async fn serve(address: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "adsync API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
