//! Audit history HTTP handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::api::{AuditRecordView, HistoryResponse};
use crate::handlers::problem_details;
use crate::server::AppState;

/// GET /api/v1/history
///
/// All audit records, newest first. Each request is a fresh snapshot query.
pub async fn list_history(State(state): State<AppState>) -> Response {
    match state.manager.history().await {
        Ok(records) => {
            let records = records
                .into_iter()
                .map(|r| AuditRecordView {
                    id: r.id,
                    tenant_id: r.tenant_id,
                    destination: r.destination,
                    body: r.body,
                    created_at: r.created_at.to_rfc3339(),
                })
                .collect();
            (StatusCode::OK, Json(HistoryResponse { records })).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to read audit history");
            problem_details::from_gateway_error(&e)
        }
    }
}
