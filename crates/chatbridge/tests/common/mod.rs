//! Common test utilities.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::sync::mpsc;

use chatbridge::api::SessionState;
use chatbridge::client::{AutomationClient, ClientError, ClientFactory};
use chatbridge::manager::SessionManager;
use chatbridge::pairing::DataUrlRenderer;
use chatbridge::server::{self, AppState};
use chatbridge::session::SessionRegistry;
use chatbridge::store::SqliteHistoryStore;
use chatbridge_driver_protocol::DriverEvent;

/// In-process automation client standing in for a driver subprocess.
pub struct FakeClient {
    pub sent: Mutex<Vec<(String, String)>>,
    pub invites: Mutex<Vec<String>>,
    pub fail_sends: AtomicBool,
}

impl FakeClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            invites: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        })
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn invites(&self) -> Vec<String> {
        self.invites.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutomationClient for FakeClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn send_message(&self, destination: &str, body: &str) -> Result<(), ClientError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("injected failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), body.to_string()));
        Ok(())
    }

    async fn accept_invite(&self, code: &str) -> Result<String, ClientError> {
        self.invites.lock().unwrap().push(code.to_string());
        Ok(format!("{code}@g.example"))
    }
}

/// Factory tracking every fake client and its event channel by tenant.
#[derive(Default)]
pub struct FakeDriverPool {
    created: AtomicUsize,
    clients: Mutex<HashMap<String, Arc<FakeClient>>>,
    events: Mutex<HashMap<String, mpsc::Sender<DriverEvent>>>,
}

impl FakeDriverPool {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn client(&self, tenant_id: &str) -> Arc<FakeClient> {
        self.clients
            .lock()
            .unwrap()
            .get(tenant_id)
            .expect("no client for tenant")
            .clone()
    }

    /// Inject a driver lifecycle event into the tenant's session.
    pub async fn emit(&self, tenant_id: &str, event: DriverEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .get(tenant_id)
            .expect("no event channel for tenant")
            .clone();
        sender.send(event).await.expect("session event channel closed");
    }
}

impl ClientFactory for FakeDriverPool {
    fn create(
        &self,
        tenant_id: &str,
        events: mpsc::Sender<DriverEvent>,
    ) -> Result<Arc<dyn AutomationClient>, ClientError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let client = FakeClient::new();
        self.clients
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), client.clone());
        self.events
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), events);
        Ok(client)
    }
}

/// A fully wired gateway over fake drivers and an in-memory audit store.
pub struct TestGateway {
    pub manager: SessionManager,
    pub drivers: Arc<FakeDriverPool>,
}

pub fn test_gateway() -> TestGateway {
    let drivers = Arc::new(FakeDriverPool::default());
    let history = Arc::new(SqliteHistoryStore::open_in_memory().unwrap());
    let registry = SessionRegistry::new(
        drivers.clone(),
        Arc::new(DataUrlRenderer),
        history.clone(),
    );
    let manager = SessionManager::new(registry, history, Duration::from_millis(1000));

    TestGateway { manager, drivers }
}

/// Build the HTTP app over a test gateway.
pub fn test_app(gateway: &TestGateway) -> Router {
    server::build_app(
        AppState {
            manager: gateway.manager.clone(),
        },
        30,
        64,
    )
}

/// Let spawned actor tasks run without advancing the (possibly paused) clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Wait until the tenant's session reaches `expected`.
///
/// Yield-based, so it is safe under a paused clock.
pub async fn wait_for_state(manager: &SessionManager, tenant_id: &str, expected: SessionState) {
    for _ in 0..500 {
        if let Ok(Some(snapshot)) = manager.pairing(tenant_id).await {
            if snapshot.state == expected {
                return;
            }
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for tenant '{tenant_id}' to reach state {expected}");
}

/// Start a session and drive it to `ready`.
pub async fn make_ready(gateway: &TestGateway, tenant_id: &str) {
    gateway.manager.start(tenant_id).await.unwrap();
    gateway.drivers.emit(tenant_id, DriverEvent::Ready).await;
    wait_for_state(&gateway.manager, tenant_id, SessionState::Ready).await;
}
