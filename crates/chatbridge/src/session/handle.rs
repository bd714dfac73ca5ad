//! Session handle for communicating with a session actor.
//!
//! `SessionHandle` is a thin wrapper around an `mpsc::Sender<SessionCommand>`.
//! It provides async methods for all session operations and is cheap to clone.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::store::AuditRecord;

use super::actor_types::{SessionCommand, SessionError, StatusSnapshot};

/// Handle for interacting with a session actor.
///
/// Cheap to clone (just an `Arc` inside the `mpsc::Sender`). All methods
/// communicate with the actor via message passing.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    tenant_id: String,
}

impl SessionHandle {
    /// Create a new handle from a command sender.
    pub(crate) fn new(tx: mpsc::Sender<SessionCommand>, tenant_id: String) -> Self {
        Self { tx, tenant_id }
    }

    /// Get the tenant id.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Dispatch a message now and record it in the audit log.
    pub async fn send(
        &self,
        destination: &str,
        body: &str,
    ) -> Result<AuditRecord, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Send {
                destination: destination.to_string(),
                body: body.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ActorShutdown)?;

        reply_rx.await.map_err(|_| SessionError::ActorShutdown)?
    }

    /// Install a recurring send, replacing any active schedule.
    ///
    /// Returns `true` when a previous schedule was cancelled.
    pub async fn schedule(
        &self,
        destination: &str,
        body: &str,
        interval: Duration,
    ) -> Result<bool, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Schedule {
                destination: destination.to_string(),
                body: body.to_string(),
                interval,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ActorShutdown)?;

        reply_rx.await.map_err(|_| SessionError::ActorShutdown)?
    }

    /// Join a group by invite code, returning the joined group's identifier.
    pub async fn join_invite(&self, code: &str) -> Result<String, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::JoinInvite {
                code: code.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ActorShutdown)?;

        reply_rx.await.map_err(|_| SessionError::ActorShutdown)?
    }

    /// Get a point-in-time view of the session.
    pub async fn snapshot(&self) -> Result<StatusSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| SessionError::ActorShutdown)?;

        reply_rx.await.map_err(|_| SessionError::ActorShutdown)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}
