//! Automation client boundary.
//!
//! The automation client is the gateway's handle to the external messaging
//! network for one tenant. Its internals (typically a headless browser
//! steered by a driver process) are opaque: the gateway only issues the
//! three calls below and consumes the lifecycle events the client pushes
//! into the session's event channel.

mod subprocess;

pub use subprocess::{SubprocessClient, SubprocessClientFactory};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use chatbridge_driver_protocol::DriverEvent;

/// Errors from automation client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to spawn driver process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("driver unavailable: {0}")]
    Unavailable(String),

    #[error("driver rejected command ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("timed out waiting for driver response")]
    Timeout,
}

/// Per-tenant handle to the external messaging network.
///
/// Exclusively owned by one session; created once and never replaced while
/// the session exists. Lifecycle events are delivered out-of-band through
/// the event channel handed to the factory at creation.
#[async_trait]
pub trait AutomationClient: Send + Sync {
    /// Begin connecting to the messaging network.
    ///
    /// Fire-and-forget: completion is signalled through lifecycle events,
    /// not through this call.
    async fn initialize(&self) -> Result<(), ClientError>;

    /// Send a text message to a destination chat or group.
    async fn send_message(&self, destination: &str, body: &str) -> Result<(), ClientError>;

    /// Join a group by invite code, returning the joined group's identifier.
    async fn accept_invite(&self, code: &str) -> Result<String, ClientError>;
}

/// Builds one automation client per tenant.
///
/// `events` is the session's event channel; the client must push its
/// lifecycle events (`pairing_challenge`, `ready`, `disconnected`,
/// `auth_failure`) into it for as long as it lives.
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        tenant_id: &str,
        events: mpsc::Sender<DriverEvent>,
    ) -> Result<Arc<dyn AutomationClient>, ClientError>;
}
