//! Per-session actor for serialized state mutations.
//!
//! Each tenant session gets a dedicated actor task that owns the automation
//! client, the pairing state, and the recurring schedule. Commands from
//! callers and lifecycle events from the driver arrive on channels and are
//! processed one at a time, so session fields need no locks even though the
//! driver emits events concurrently with inbound operations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use chatbridge_driver_protocol::DriverEvent;

use crate::api::SessionState;
use crate::client::AutomationClient;
use crate::pairing::PairingRenderer;
use crate::store::{AuditRecord, HistoryStore};

use super::actor_types::{
    ActorConfig, COMMAND_CAPACITY, SessionCommand, SessionError, StatusSnapshot,
};
use super::dispatch::ScheduleTick;

// ============================================================================
// Session Actor
// ============================================================================

/// Per-tenant actor that owns session state and handles mutations.
pub struct SessionActor {
    // Identity
    tenant_id: String,

    // State
    state: SessionState,
    pairing_image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    // Collaborators
    client: Arc<dyn AutomationClient>,
    renderer: Arc<dyn PairingRenderer>,
    history: Arc<dyn HistoryStore>,

    /// Cancel handle for the active recurring send. Dropping it stops the
    /// tick loop; at most one schedule exists per session.
    schedule: Option<oneshot::Sender<()>>,

    /// Published state for non-blocking snapshot reads by tick tasks.
    state_tx: watch::Sender<SessionState>,

    // Communication
    command_rx: mpsc::Receiver<SessionCommand>,
    event_rx: mpsc::Receiver<DriverEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// `event_rx` is the receiving half of the channel the automation client
    /// pushes lifecycle events into. Returns the command sender and a
    /// JoinHandle for the actor task.
    pub fn spawn(
        config: ActorConfig,
        event_rx: mpsc::Receiver<DriverEvent>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (mpsc::Sender<SessionCommand>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, _) = watch::channel(SessionState::Starting);
        let now = Utc::now();

        let actor = Self {
            tenant_id: config.tenant_id,
            state: SessionState::Starting,
            pairing_image: None,
            created_at: now,
            updated_at: now,
            client: config.client,
            renderer: config.renderer,
            history: config.history,
            schedule: None,
            state_tx,
            command_rx: rx,
            event_rx,
            shutdown_rx,
        };

        let handle = tokio::spawn(actor.run());
        (tx, handle)
    }

    /// Main actor loop.
    async fn run(mut self) {
        debug!(tenant_id = %self.tenant_id, "session actor started");

        // Kick off the driver's connection attempt. Completion arrives as
        // lifecycle events, so a failure here only means the command could
        // not be queued.
        if let Err(e) = self.client.initialize().await {
            warn!(
                tenant_id = %self.tenant_id,
                error = %e,
                "failed to start driver initialization"
            );
        }

        self.command_loop().await;

        // Dropping the cancel handle stops the tick loop; no tick starts
        // after the actor has stopped.
        self.schedule = None;

        debug!(tenant_id = %self.tenant_id, "session actor stopped");
    }

    /// Process commands and driver events until shutdown.
    async fn command_loop(&mut self) {
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        debug!(tenant_id = %self.tenant_id, "session actor received shutdown signal");
                        break;
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!(tenant_id = %self.tenant_id, "all handles dropped, shutting down");
                            break;
                        }
                    }
                }

                evt = self.event_rx.recv(), if events_open => {
                    match evt {
                        Some(event) => self.handle_event(event),
                        None => {
                            debug!(tenant_id = %self.tenant_id, "driver event channel closed");
                            events_open = false;
                        }
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Send {
                destination,
                body,
                reply,
            } => {
                let result = self.dispatch(&destination, &body).await;
                let _ = reply.send(result);
            }

            SessionCommand::Schedule {
                destination,
                body,
                interval,
                reply,
            } => {
                let result = self.install_schedule(destination, body, interval);
                let _ = reply.send(result);
            }

            SessionCommand::JoinInvite { code, reply } => {
                let result = self.join_invite(&code).await;
                let _ = reply.send(result);
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(StatusSnapshot {
                    tenant_id: self.tenant_id.clone(),
                    state: self.state,
                    pairing_image: self.pairing_image.clone(),
                    has_schedule: self.schedule.is_some(),
                    created_at: self.created_at,
                    updated_at: self.updated_at,
                });
            }
        }
    }

    /// Send a message and record it, as one logical operation.
    ///
    /// Readiness is validated here, in the same command execution as the
    /// send, so the state cannot change in between. The audit row is written
    /// only when the client call returned without error; an audit failure
    /// does not undo the already-attempted send.
    async fn dispatch(
        &mut self,
        destination: &str,
        body: &str,
    ) -> Result<AuditRecord, SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::NotReady(self.state));
        }

        self.client
            .send_message(destination, body)
            .await
            .map_err(|e| SessionError::Downstream(e.to_string()))?;

        let record = self
            .history
            .append(&self.tenant_id, destination, body)
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;

        self.updated_at = Utc::now();
        Ok(record)
    }

    /// Install a recurring send, cancelling any active schedule first.
    ///
    /// The old cancel handle is dropped strictly before the new tick task is
    /// spawned, so two schedules never race.
    fn install_schedule(
        &mut self,
        destination: String,
        body: String,
        interval: Duration,
    ) -> Result<bool, SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::NotReady(self.state));
        }

        let replaced = self.schedule.take().is_some();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let tick = ScheduleTick {
            tenant_id: self.tenant_id.clone(),
            destination,
            body,
            interval,
            client: self.client.clone(),
            history: self.history.clone(),
            state_rx: self.state_tx.subscribe(),
        };
        tokio::spawn(tick.run(cancel_rx));

        self.schedule = Some(cancel_tx);
        self.updated_at = Utc::now();

        info!(
            tenant_id = %self.tenant_id,
            interval_ms = interval.as_millis() as u64,
            replaced,
            "recurring send installed"
        );

        Ok(replaced)
    }

    async fn join_invite(&mut self, code: &str) -> Result<String, SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::NotReady(self.state));
        }

        let group_id = self
            .client
            .accept_invite(code)
            .await
            .map_err(|e| SessionError::Downstream(e.to_string()))?;

        self.updated_at = Utc::now();
        Ok(group_id)
    }

    // ------------------------------------------------------------------------
    // Driver Events
    // ------------------------------------------------------------------------

    fn handle_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::PairingChallenge { payload } => match self.renderer.render(&payload) {
                Ok(image) => {
                    self.pairing_image = Some(image);
                    self.set_state(SessionState::AwaitingPairing);
                    info!(tenant_id = %self.tenant_id, "pairing challenge issued");
                }
                Err(e) => {
                    // State and the previous artifact stay as they were.
                    warn!(
                        tenant_id = %self.tenant_id,
                        error = %e,
                        "failed to render pairing artifact"
                    );
                }
            },

            DriverEvent::Ready => {
                self.set_state(SessionState::Ready);
                info!(tenant_id = %self.tenant_id, "session ready");
            }

            DriverEvent::Disconnected { reason } => {
                // The stale artifact stays visible for diagnostics.
                self.set_state(SessionState::Disconnected);
                warn!(tenant_id = %self.tenant_id, reason = %reason, "session disconnected");
            }

            DriverEvent::AuthFailure => {
                self.set_state(SessionState::AuthFailed);
                warn!(
                    tenant_id = %self.tenant_id,
                    "authentication failed, session is terminal"
                );
            }

            DriverEvent::CommandOk { request_id, .. }
            | DriverEvent::CommandError { request_id, .. } => {
                // Completions are consumed by the client, not the session.
                debug!(
                    tenant_id = %self.tenant_id,
                    request_id = %request_id,
                    "ignoring stray command completion"
                );
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.updated_at = Utc::now();
        self.state_tx.send_replace(state);
    }
}
