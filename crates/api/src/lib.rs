//! `api` crate — HTTP REST API layer.
//!
//! Exposes:
//!   POST   /api/v1/automations
//!   GET    /api/v1/automations
//!   GET    /api/v1/automations/:id
//!   DELETE /api/v1/automations/:id
//!   POST   /api/v1/automations/:id/run
//!   POST   /api/v1/webhook/:id
//!   GET    /api/v1/executions/:id

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use db::{AutomationStore, ExecutionLogStore};
use engine::AutomationExecutor;

pub mod error;
pub mod handlers;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub automations: Arc<dyn AutomationStore>,
    pub logs: Arc<dyn ExecutionLogStore>,
    pub executor: Arc<AutomationExecutor>,
}

pub fn router(state: AppState) -> Router {
    use handlers::{automations, executions, webhooks};

    Router::new()
        .route("/api/v1/automations", post(automations::create).get(automations::list))
        .route("/api/v1/automations/:id", get(automations::get).delete(automations::delete))
        .route("/api/v1/automations/:id/run", post(automations::run))
        .route("/api/v1/webhook/:id", post(webhooks::handle_webhook))
        .route("/api/v1/executions/:id", get(executions::get))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` resolves.
pub async fn serve(
    bind: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
