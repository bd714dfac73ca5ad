//! Shared API types used by the HTTP handlers and clients.
//!
//! These types define the contract between server and client.
//! Changes here affect both sides, preventing silent drift.

use serde::{Deserialize, Serialize};

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle state of a tenant session.
///
/// Driven exclusively by events from the automation driver; see
/// [`crate::session`] for the transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Driver created, initialization still in flight.
    Starting,
    /// A pairing challenge was issued; waiting for the device to scan it.
    AwaitingPairing,
    /// Paired and able to dispatch messages.
    Ready,
    /// The messaging network dropped the connection.
    Disconnected,
    /// Authentication was rejected. Terminal: pairing again requires a
    /// fresh tenant identifier.
    AuthFailed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Starting => write!(f, "starting"),
            SessionState::AwaitingPairing => write!(f, "awaiting_pairing"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::AuthFailed => write!(f, "auth_failed"),
        }
    }
}

/// Session state as reported to callers, including the pseudo-states used
/// when the gateway is not tracking the tenant at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedState {
    /// No session exists for the queried tenant.
    NotStarted,
    /// The gateway is not tracking any session (global status only).
    Offline,
    Starting,
    AwaitingPairing,
    Ready,
    Disconnected,
    AuthFailed,
}

impl From<SessionState> for ReportedState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Starting => ReportedState::Starting,
            SessionState::AwaitingPairing => ReportedState::AwaitingPairing,
            SessionState::Ready => ReportedState::Ready,
            SessionState::Disconnected => ReportedState::Disconnected,
            SessionState::AuthFailed => ReportedState::AuthFailed,
        }
    }
}

// ============================================================================
// Session Operations
// ============================================================================

/// Response for starting (or re-requesting) a tenant session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub tenant_id: String,
    pub state: SessionState,
    /// Whether a pairing artifact is currently available for this session.
    pub has_pairing_image: bool,
}

/// Response for querying the pairing artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingResponse {
    /// Rendered pairing artifact, if one has been issued.
    #[serde(default)]
    pub pairing_image: Option<String>,
    pub state: ReportedState,
}

/// Response for the gateway-wide status endpoint.
///
/// `status` reports the state of one arbitrarily-chosen tracked session
/// (`offline` when none exist). It is NOT an aggregate over tenants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStatusResponse {
    pub status: ReportedState,
    pub tenants: Vec<String>,
}

/// Request to join a group by invite link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGroupRequest {
    pub invite_link: String,
}

/// Response for a successful group join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGroupResponse {
    pub group_id: String,
}

/// Request to send a message immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub destination: String,
    pub body: String,
}

/// Response for a dispatched message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// Audit record id assigned to the dispatched message.
    pub record_id: i64,
}

/// Request to install a recurring send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub destination: String,
    pub body: String,
    /// Interval between sends in milliseconds. Must be a positive multiple
    /// of the configured minimum granularity.
    pub interval_ms: i64,
}

/// Response for a installed recurring send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    /// Whether a previously active schedule was cancelled and replaced.
    pub replaced: bool,
    pub interval_ms: u64,
}

// ============================================================================
// Audit History
// ============================================================================

/// One audit record in history responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecordView {
    pub id: i64,
    pub tenant_id: String,
    pub destination: String,
    pub body: String,
    pub created_at: String,
}

/// Response for listing the audit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub records: Vec<AuditRecordView>,
}
