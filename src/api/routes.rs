//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::agent::{CursorAgent, ModelCatalog, ModelPinning};
use crate::config::Config;

use super::auth;
use super::chat;
use super::types::ApiError;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub agent: CursorAgent,
    /// `--list-models` cache
    pub models: ModelCatalog,
    /// Last explicitly requested model
    pub pinning: ModelPinning,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            agent: CursorAgent::from_config(&config),
            models: ModelCatalog::default(),
            pinning: ModelPinning::new(config.strict_model, config.default_model.clone()),
            config,
        }
    }
}

/// Build the router. Authentication runs before routing, so unknown paths
/// also answer 401 when a token is required.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health).fallback(not_found))
        .route("/v1/models", get(chat::list_models).fallback(not_found))
        .route(
            "/v1/chat/completions",
            post(chat::chat_completions).fallback(not_found),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    if !config.auth_required() {
        tracing::warn!("CURSOR_BRIDGE_API_KEY not set; the bridge accepts unauthenticated requests");
    }
    let state = Arc::new(AppState::new(config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "agent_bin": config.agent_bin,
        "workspace": config.workspace.to_string_lossy(),
        "mode": config.mode,
        "default_model": config.default_model,
        "strict_model": config.strict_model,
        "pinned_model": state.pinning.pinned().await,
        "force": config.force,
        "approve_mcps": config.approve_mcps,
        "timeout_ms": config.timeout.as_millis() as u64,
        "auth_required": config.auth_required(),
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
