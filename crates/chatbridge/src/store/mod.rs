//! Audit history storage.
//!
//! Every successfully dispatched message (manual or scheduled) is recorded
//! here. A record proves the local dispatch call returned without error; it
//! is not a network-level delivery receipt.

mod sqlite;

pub use sqlite::SqliteHistoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from the audit store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence failure: {0}")]
    Persistence(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One dispatched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Monotonically increasing id assigned by the store.
    pub id: i64,
    pub tenant_id: String,
    pub destination: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit log of dispatched messages.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record one dispatched message.
    ///
    /// Fails with [`StoreError::Persistence`] if the write does not durably
    /// succeed. The already-attempted network send is never rolled back or
    /// retried because of an audit failure.
    async fn append(
        &self,
        tenant_id: &str,
        destination: &str,
        body: &str,
    ) -> StoreResult<AuditRecord>;

    /// All records, descending by id. Each call is a fresh query.
    async fn list_all(&self) -> StoreResult<Vec<AuditRecord>>;
}
