use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::manager::SessionManager;

/// Maximum request body size (pairing payloads and messages are small).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: SessionManager,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64, max_connections: usize) -> Router {
    let api_v1 = Router::new()
        .route("/tenants/{tenant_id}/session", post(handlers::v1::start_session))
        .route("/tenants/{tenant_id}/pairing", get(handlers::v1::get_pairing))
        .route("/tenants/{tenant_id}/join", post(handlers::v1::join_group))
        .route("/tenants/{tenant_id}/messages", post(handlers::v1::send_message))
        .route("/tenants/{tenant_id}/schedule", post(handlers::v1::schedule_send))
        .route("/history", get(handlers::v1::list_history))
        .route("/status", get(handlers::v1::global_status))
        .with_state(state.clone())
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(max_connections));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .with_state(state)
        .nest("/api/v1", api_v1)
}
