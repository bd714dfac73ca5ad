//! Session actor command protocol, configuration, and error types.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::api::SessionState;
use crate::client::AutomationClient;
use crate::pairing::PairingRenderer;
use crate::store::{AuditRecord, HistoryStore};

// ============================================================================
// Session Command
// ============================================================================

/// Commands that can be sent to a session actor.
pub enum SessionCommand {
    /// Dispatch a message now: validate readiness, send, append audit.
    Send {
        destination: String,
        body: String,
        reply: oneshot::Sender<Result<AuditRecord, SessionError>>,
    },

    /// Install a recurring send, replacing any active schedule.
    ///
    /// Replies with `true` when a previous schedule was cancelled.
    Schedule {
        destination: String,
        body: String,
        interval: Duration,
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },

    /// Join a group by invite code, replying with the joined group id.
    JoinInvite {
        code: String,
        reply: oneshot::Sender<Result<String, SessionError>>,
    },

    /// Read a point-in-time view of the session. Never blocks on the
    /// driver; the state may change between read and use.
    Snapshot {
        reply: oneshot::Sender<StatusSnapshot>,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The actor has shut down.
    #[error("session actor has shut down")]
    ActorShutdown,

    /// The session exists but is not paired and ready.
    #[error("session is not ready (state: {0})")]
    NotReady(SessionState),

    /// The automation client failed the network call.
    #[error("downstream send failed: {0}")]
    Downstream(String),

    /// The audit write failed after the send already went out.
    #[error("audit write failed: {0}")]
    Persistence(String),
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of a session (returned by `Snapshot`).
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub tenant_id: String,
    pub state: SessionState,
    pub pairing_image: Option<String>,
    pub has_schedule: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for spawning a new actor.
pub struct ActorConfig {
    pub tenant_id: String,
    pub client: Arc<dyn AutomationClient>,
    pub renderer: Arc<dyn PairingRenderer>,
    pub history: Arc<dyn HistoryStore>,
}

// ============================================================================
// Constants
// ============================================================================

/// Channel capacity for commands.
pub const COMMAND_CAPACITY: usize = 64;

/// Channel capacity for driver events.
pub const EVENT_CAPACITY: usize = 64;
