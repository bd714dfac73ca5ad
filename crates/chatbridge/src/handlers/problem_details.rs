//! RFC 7807-style problem responses.
//!
//! Every caller-facing failure maps to a JSON body carrying the HTTP status,
//! a human-readable detail, and the machine-readable failure kind.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::manager::GatewayError;

#[derive(Serialize)]
struct ProblemDetails {
    status: u16,
    title: String,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

fn problem(status: StatusCode, detail: impl Into<String>, kind: Option<&'static str>) -> Response {
    let body = ProblemDetails {
        status: status.as_u16(),
        title: status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string(),
        detail: detail.into(),
        kind,
    };
    (status, Json(body)).into_response()
}

/// Map a [`GatewayError`] onto its response.
pub fn from_gateway_error(err: &GatewayError) -> Response {
    let status = match err {
        GatewayError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::SessionNotReady(_) => StatusCode::CONFLICT,
        GatewayError::InvalidInterval(_) => StatusCode::BAD_REQUEST,
        GatewayError::DownstreamSend(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Persistence(_) | GatewayError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    problem(status, err.to_string(), Some(err.kind()))
}
