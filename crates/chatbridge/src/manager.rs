//! Session manager orchestration.
//!
//! `SessionManager` is the single entry point for the request-handling
//! boundary: it owns the registry, validates inputs, and maps internal
//! session errors onto the caller-facing [`GatewayError`] taxonomy.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::error;

use crate::api::SessionState;
use crate::session::{SessionError, SessionHandle, SessionRegistry, StatusSnapshot};
use crate::store::{AuditRecord, HistoryStore, StoreError};

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Caller-facing failures.
///
/// Every operation the gateway exposes fails with one of these kinds; none
/// are retried automatically (the recurring schedule swallows per-tick
/// failures instead of surfacing them).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no session for tenant '{0}'")]
    SessionNotFound(String),

    #[error("session is not ready (state: {0})")]
    SessionNotReady(SessionState),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("downstream send failed: {0}")]
    DownstreamSend(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Machine-readable failure kind, carried in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::SessionNotFound(_) => "session_not_found",
            GatewayError::SessionNotReady(_) => "session_not_ready",
            GatewayError::InvalidInterval(_) => "invalid_interval",
            GatewayError::DownstreamSend(_) => "downstream_send_failure",
            GatewayError::Persistence(_) => "persistence_failure",
            GatewayError::Internal(_) => "internal",
        }
    }
}

impl From<SessionError> for GatewayError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotReady(state) => GatewayError::SessionNotReady(state),
            SessionError::Downstream(detail) => GatewayError::DownstreamSend(detail),
            SessionError::Persistence(detail) => GatewayError::Persistence(detail),
            SessionError::ActorShutdown => {
                GatewayError::Internal("session actor has shut down".to_string())
            }
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Persistence(detail) => GatewayError::Persistence(detail),
        }
    }
}

// ============================================================================
// Session Manager
// ============================================================================

/// Outcome of installing a recurring send.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleOutcome {
    /// Whether a previously active schedule was cancelled and replaced.
    pub replaced: bool,
    pub interval: Duration,
}

/// Orchestrates sessions, dispatch, and the audit log.
#[derive(Clone)]
pub struct SessionManager {
    registry: SessionRegistry,
    history: Arc<dyn HistoryStore>,
    min_interval: Duration,
}

impl SessionManager {
    pub fn new(
        registry: SessionRegistry,
        history: Arc<dyn HistoryStore>,
        min_interval: Duration,
    ) -> Self {
        Self {
            registry,
            history,
            min_interval,
        }
    }

    /// Idempotently ensure a session exists and return its current status.
    ///
    /// Does not block on the session reaching `ready`; the snapshot may
    /// still say `starting`.
    pub async fn start(&self, tenant_id: &str) -> Result<StatusSnapshot, GatewayError> {
        let handle = self.registry.get_or_create(tenant_id).map_err(|e| {
            error!(tenant_id = %tenant_id, error = %e, "failed to create automation client");
            GatewayError::Internal(format!("failed to start automation client: {e}"))
        })?;

        Ok(handle.snapshot().await?)
    }

    /// Current pairing artifact and state, or `None` for unknown tenants.
    ///
    /// Unknown tenants are a benign condition here so that callers can poll
    /// before calling start.
    pub async fn pairing(&self, tenant_id: &str) -> Result<Option<StatusSnapshot>, GatewayError> {
        match self.registry.get(tenant_id) {
            Some(handle) => Ok(Some(handle.snapshot().await?)),
            None => Ok(None),
        }
    }

    /// State of one arbitrarily-chosen tracked session (`None` when the
    /// gateway tracks nothing), plus all tracked tenant ids.
    ///
    /// This is NOT aggregate health across tenants; the single-session
    /// semantics are part of the documented contract.
    pub async fn global_status(&self) -> (Option<SessionState>, Vec<String>) {
        let tenants = self.registry.list();
        let state = match self.registry.first() {
            Some(handle) => handle.snapshot().await.ok().map(|s| s.state),
            None => None,
        };
        (state, tenants)
    }

    /// Join a group through the tenant's session.
    ///
    /// The invite code is the trailing path segment of `invite_link`; the
    /// rest of the link's structure is not validated.
    pub async fn join_by_invite(
        &self,
        tenant_id: &str,
        invite_link: &str,
    ) -> Result<String, GatewayError> {
        let handle = self.lookup(tenant_id)?;
        let code = invite_code(invite_link);
        Ok(handle.join_invite(code).await?)
    }

    /// Dispatch a message now and record it in the audit log.
    pub async fn send(
        &self,
        tenant_id: &str,
        destination: &str,
        body: &str,
    ) -> Result<AuditRecord, GatewayError> {
        let handle = self.lookup(tenant_id)?;
        Ok(handle.send(destination, body).await?)
    }

    /// Install a recurring send for the tenant, replacing any existing one.
    ///
    /// Readiness is checked at install time only; later ticks that find the
    /// session not ready are skipped, not surfaced.
    pub async fn schedule(
        &self,
        tenant_id: &str,
        destination: &str,
        body: &str,
        interval_ms: i64,
    ) -> Result<ScheduleOutcome, GatewayError> {
        let handle = self.lookup(tenant_id)?;
        let interval = self.validate_interval(interval_ms)?;
        let replaced = handle.schedule(destination, body, interval).await?;
        Ok(ScheduleOutcome { replaced, interval })
    }

    /// All audit records, descending by id.
    pub async fn history(&self) -> Result<Vec<AuditRecord>, GatewayError> {
        Ok(self.history.list_all().await?)
    }

    /// Number of tracked sessions.
    pub fn tracked_sessions(&self) -> usize {
        self.registry.len()
    }

    fn lookup(&self, tenant_id: &str) -> Result<SessionHandle, GatewayError> {
        self.registry
            .get(tenant_id)
            .ok_or_else(|| GatewayError::SessionNotFound(tenant_id.to_string()))
    }

    fn validate_interval(&self, interval_ms: i64) -> Result<Duration, GatewayError> {
        let min_ms = self.min_interval.as_millis() as i64;
        if interval_ms <= 0 {
            return Err(GatewayError::InvalidInterval(format!(
                "interval must be positive, got {interval_ms} ms"
            )));
        }
        if interval_ms % min_ms != 0 {
            return Err(GatewayError::InvalidInterval(format!(
                "interval must be a multiple of {min_ms} ms, got {interval_ms} ms"
            )));
        }
        Ok(Duration::from_millis(interval_ms as u64))
    }
}

/// Extract the invite code: the trailing `/`-separated segment of the link.
fn invite_code(invite_link: &str) -> &str {
    invite_link.rsplit('/').next().unwrap_or(invite_link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_code_takes_trailing_segment() {
        assert_eq!(invite_code("https://chat.example/invite/ABC123"), "ABC123");
        assert_eq!(invite_code("ABC123"), "ABC123");
        assert_eq!(invite_code("https://chat.example/invite/"), "");
    }

    #[test]
    fn gateway_error_kinds_are_stable() {
        assert_eq!(
            GatewayError::SessionNotFound("u1".to_string()).kind(),
            "session_not_found"
        );
        assert_eq!(
            GatewayError::SessionNotReady(SessionState::Starting).kind(),
            "session_not_ready"
        );
        assert_eq!(
            GatewayError::InvalidInterval("x".to_string()).kind(),
            "invalid_interval"
        );
    }

    #[test]
    fn session_errors_map_onto_taxonomy() {
        let err: GatewayError = SessionError::NotReady(SessionState::Disconnected).into();
        assert!(matches!(
            err,
            GatewayError::SessionNotReady(SessionState::Disconnected)
        ));

        let err: GatewayError = SessionError::Downstream("boom".to_string()).into();
        assert!(matches!(err, GatewayError::DownstreamSend(_)));
    }
}
