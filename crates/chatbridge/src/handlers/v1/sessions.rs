//! Session management HTTP handlers.

use axum::Json;
use axum::extract::{Path as PathExtract, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::api::{
    GlobalStatusResponse, JoinGroupRequest, JoinGroupResponse, PairingResponse, ReportedState,
    ScheduleRequest, ScheduleResponse, SendMessageRequest, SendMessageResponse,
    StartSessionResponse,
};
use crate::handlers::problem_details;
use crate::server::AppState;

/// POST /api/v1/tenants/{tenant_id}/session
///
/// Idempotent: a second start for the same tenant returns the existing
/// session's status unchanged.
pub async fn start_session(
    State(state): State<AppState>,
    PathExtract(tenant_id): PathExtract<String>,
) -> Response {
    match state.manager.start(&tenant_id).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(StartSessionResponse {
                tenant_id: snapshot.tenant_id,
                state: snapshot.state,
                has_pairing_image: snapshot.pairing_image.is_some(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(tenant_id = %tenant_id, error = %e, "failed to start session");
            problem_details::from_gateway_error(&e)
        }
    }
}

/// GET /api/v1/tenants/{tenant_id}/pairing
///
/// Unknown tenants get a benign `not_started` body rather than an error, so
/// frontends can poll before calling start.
pub async fn get_pairing(
    State(state): State<AppState>,
    PathExtract(tenant_id): PathExtract<String>,
) -> Response {
    match state.manager.pairing(&tenant_id).await {
        Ok(Some(snapshot)) => (
            StatusCode::OK,
            Json(PairingResponse {
                pairing_image: snapshot.pairing_image,
                state: snapshot.state.into(),
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::OK,
            Json(PairingResponse {
                pairing_image: None,
                state: ReportedState::NotStarted,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(tenant_id = %tenant_id, error = %e, "failed to read pairing state");
            problem_details::from_gateway_error(&e)
        }
    }
}

/// GET /api/v1/status
///
/// Reports the state of one arbitrarily-chosen tracked session (`offline`
/// when none exist). Not an aggregate over tenants.
pub async fn global_status(State(state): State<AppState>) -> Json<GlobalStatusResponse> {
    let (status, tenants) = state.manager.global_status().await;
    Json(GlobalStatusResponse {
        status: status.map_or(ReportedState::Offline, ReportedState::from),
        tenants,
    })
}

/// POST /api/v1/tenants/{tenant_id}/join
pub async fn join_group(
    State(state): State<AppState>,
    PathExtract(tenant_id): PathExtract<String>,
    Json(req): Json<JoinGroupRequest>,
) -> Response {
    match state
        .manager
        .join_by_invite(&tenant_id, &req.invite_link)
        .await
    {
        Ok(group_id) => (StatusCode::OK, Json(JoinGroupResponse { group_id })).into_response(),
        Err(e) => {
            error!(tenant_id = %tenant_id, error = %e, "failed to join group");
            problem_details::from_gateway_error(&e)
        }
    }
}

/// POST /api/v1/tenants/{tenant_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    PathExtract(tenant_id): PathExtract<String>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    match state
        .manager
        .send(&tenant_id, &req.destination, &req.body)
        .await
    {
        Ok(record) => (
            StatusCode::OK,
            Json(SendMessageResponse {
                record_id: record.id,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(tenant_id = %tenant_id, error = %e, "failed to send message");
            problem_details::from_gateway_error(&e)
        }
    }
}

/// POST /api/v1/tenants/{tenant_id}/schedule
pub async fn schedule_send(
    State(state): State<AppState>,
    PathExtract(tenant_id): PathExtract<String>,
    Json(req): Json<ScheduleRequest>,
) -> Response {
    match state
        .manager
        .schedule(&tenant_id, &req.destination, &req.body, req.interval_ms)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ScheduleResponse {
                replaced: outcome.replaced,
                interval_ms: outcome.interval.as_millis() as u64,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(tenant_id = %tenant_id, error = %e, "failed to install schedule");
            problem_details::from_gateway_error(&e)
        }
    }
}
