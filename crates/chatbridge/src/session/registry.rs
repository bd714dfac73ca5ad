//! Session registry for managing actor lifecycles.
//!
//! The registry is responsible for:
//! - Creating session actors, exactly one per tenant (idempotent)
//! - Looking up existing sessions
//! - Graceful shutdown of all actors

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::{ClientError, ClientFactory};
use crate::pairing::PairingRenderer;
use crate::store::HistoryStore;

use super::actor::SessionActor;
use super::actor_types::{ActorConfig, EVENT_CAPACITY};
use super::handle::SessionHandle;

// ============================================================================
// Session Registry
// ============================================================================

/// Registry of live tenant sessions.
///
/// Thread-safe and cheap to clone. Sessions live for the process lifetime;
/// there is no per-tenant teardown operation.
#[derive(Clone)]
pub struct SessionRegistry {
    /// Session handles by tenant id.
    handles: Arc<DashMap<String, SessionHandle>>,
    /// Actor task handles for graceful shutdown.
    task_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    /// Builds one automation client per tenant.
    factory: Arc<dyn ClientFactory>,
    /// Renders pairing challenge payloads.
    renderer: Arc<dyn PairingRenderer>,
    /// Audit log shared by all sessions.
    history: Arc<dyn HistoryStore>,
    /// Shutdown signal sender.
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// Shutdown signal receiver (cloned for each actor).
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionRegistry {
    /// Create a new session registry.
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        renderer: Arc<dyn PairingRenderer>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            handles: Arc::new(DashMap::new()),
            task_handles: Arc::new(Mutex::new(Vec::new())),
            factory,
            renderer,
            history,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    // ------------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------------

    /// Return the session for `tenant_id`, creating it on first request.
    ///
    /// Idempotent: an existing session is returned unchanged, with no side
    /// effects. Creation runs under the map entry lock, so two concurrent
    /// first requests for the same tenant still produce exactly one client.
    pub fn get_or_create(&self, tenant_id: &str) -> Result<SessionHandle, ClientError> {
        match self.handles.entry(tenant_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (evt_tx, evt_rx) = mpsc::channel(EVENT_CAPACITY);
                let client = self.factory.create(tenant_id, evt_tx)?;

                let config = ActorConfig {
                    tenant_id: tenant_id.to_string(),
                    client,
                    renderer: self.renderer.clone(),
                    history: self.history.clone(),
                };
                let (tx, task_handle) = SessionActor::spawn(config, evt_rx, self.shutdown_rx.clone());
                let handle = SessionHandle::new(tx, tenant_id.to_string());

                entry.insert(handle.clone());

                let mut guard = self.task_handles.lock().expect("task handle lock poisoned");
                guard.retain(|h| !h.is_finished());
                guard.push(task_handle);

                info!(tenant_id = %tenant_id, "session created");
                Ok(handle)
            }
        }
    }

    /// Get a session handle by tenant id.
    pub fn get(&self, tenant_id: &str) -> Option<SessionHandle> {
        self.handles.get(tenant_id).map(|r| r.clone())
    }

    /// Check if a session exists.
    pub fn contains(&self, tenant_id: &str) -> bool {
        self.handles.contains_key(tenant_id)
    }

    /// List all tracked tenant ids.
    pub fn list(&self) -> Vec<String> {
        self.handles.iter().map(|entry| entry.key().clone()).collect()
    }

    /// One arbitrarily-chosen tracked session, if any.
    ///
    /// Backs the global status endpoint, which reports the state of a single
    /// session rather than an aggregate. Iteration order is unspecified.
    pub fn first(&self) -> Option<SessionHandle> {
        self.handles.iter().next().map(|entry| entry.value().clone())
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Gracefully shut down all session actors.
    ///
    /// Sends the shutdown signal and waits for the actors to stop; each
    /// actor drops its schedule on the way out, so no tick fires afterwards.
    pub async fn shutdown(&self) {
        info!("shutting down session registry");

        if self.shutdown_tx.send(true).is_err() {
            warn!("failed to send shutdown signal");
            return;
        }

        let task_handles = {
            let mut guard = self.task_handles.lock().expect("task handle lock poisoned");
            std::mem::take(&mut *guard)
        };

        for task_handle in task_handles {
            if let Err(e) = task_handle.await {
                warn!(error = ?e, "actor task panicked during shutdown");
            }
        }

        info!("session registry shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AutomationClient;
    use crate::pairing::DataUrlRenderer;
    use crate::store::SqliteHistoryStore;
    use async_trait::async_trait;
    use chatbridge_driver_protocol::DriverEvent;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullClient;

    #[async_trait]
    impl AutomationClient for NullClient {
        async fn initialize(&self) -> Result<(), ClientError> {
            Ok(())
        }

        async fn send_message(&self, _destination: &str, _body: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn accept_invite(&self, code: &str) -> Result<String, ClientError> {
            Ok(code.to_string())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
        events: Mutex<HashMap<String, mpsc::Sender<DriverEvent>>>,
    }

    impl ClientFactory for CountingFactory {
        fn create(
            &self,
            tenant_id: &str,
            events: mpsc::Sender<DriverEvent>,
        ) -> Result<Arc<dyn AutomationClient>, ClientError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            self.events
                .lock()
                .unwrap()
                .insert(tenant_id.to_string(), events);
            Ok(Arc::new(NullClient))
        }
    }

    fn test_registry() -> (SessionRegistry, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory::default());
        let history = Arc::new(SqliteHistoryStore::open_in_memory().unwrap());
        let registry =
            SessionRegistry::new(factory.clone(), Arc::new(DataUrlRenderer), history);
        (registry, factory)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (registry, factory) = test_registry();

        let first = registry.get_or_create("u1").unwrap();
        let second = registry.get_or_create("u1").unwrap();

        // No duplicate client was created for the second request.
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(first.tenant_id(), second.tenant_id());
        assert_eq!(registry.len(), 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_tenant() {
        let (registry, _factory) = test_registry();

        assert!(registry.get("unknown").is_none());
        assert!(!registry.contains("unknown"));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn list_returns_all_tenants() {
        let (registry, _factory) = test_registry();

        registry.get_or_create("u1").unwrap();
        registry.get_or_create("u2").unwrap();

        let mut tenants = registry.list();
        tenants.sort();
        assert_eq!(tenants, vec!["u1", "u2"]);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn first_is_none_when_empty() {
        let (registry, _factory) = test_registry();

        assert!(registry.first().is_none());
        assert!(registry.is_empty());

        registry.get_or_create("u1").unwrap();
        assert_eq!(registry.first().unwrap().tenant_id(), "u1");

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_actors() {
        let (registry, _factory) = test_registry();

        let handle = registry.get_or_create("u1").unwrap();
        registry.shutdown().await;

        // The actor is gone; commands fail instead of hanging.
        assert!(handle.snapshot().await.is_err());
    }
}
