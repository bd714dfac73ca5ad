//! SQLite-backed audit history store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tokio::sync::Mutex;

use super::{AuditRecord, HistoryStore, StoreError, StoreResult};

/// Audit store over a single SQLite connection.
///
/// The connection is shared behind an async mutex: appends from concurrent
/// sessions serialize at the store, and reads see a snapshot taken at query
/// time.
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (creating if necessary) the audit database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(persistence)?;
        Self::bootstrap(conn)
    }

    /// Open an in-memory store. Used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(persistence)?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                destination TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(persistence)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(
        &self,
        tenant_id: &str,
        destination: &str,
        body: &str,
    ) -> StoreResult<AuditRecord> {
        let created_at = Utc::now();
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO history (tenant_id, destination, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![tenant_id, destination, body, created_at.to_rfc3339()],
        )
        .map_err(persistence)?;

        Ok(AuditRecord {
            id: conn.last_insert_rowid(),
            tenant_id: tenant_id.to_string(),
            destination: destination.to_string(),
            body: body.to_string(),
            created_at,
        })
    }

    async fn list_all(&self) -> StoreResult<Vec<AuditRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare(
                "SELECT id, tenant_id, destination, body, created_at
                 FROM history
                 ORDER BY id DESC",
            )
            .map_err(persistence)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(persistence)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, tenant_id, destination, body, created_raw) = row.map_err(persistence)?;
            let created_at = DateTime::parse_from_rfc3339(&created_raw)
                .map_err(|e| {
                    StoreError::Persistence(format!("invalid created_at '{created_raw}': {e}"))
                })?
                .with_timezone(&Utc);

            records.push(AuditRecord {
                id,
                tenant_id,
                destination,
                body,
                created_at,
            });
        }

        Ok(records)
    }
}

fn persistence(err: rusqlite::Error) -> StoreError {
    StoreError::Persistence(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();

        let first = store.append("u1", "g1", "one").await.unwrap();
        let second = store.append("u1", "g1", "two").await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.tenant_id, "u1");
        assert_eq!(first.destination, "g1");
        assert_eq!(first.body, "one");
    }

    #[tokio::test]
    async fn list_all_returns_descending_by_id() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();

        store.append("u1", "g1", "one").await.unwrap();
        store.append("u2", "g2", "two").await.unwrap();
        store.append("u3", "g3", "three").await.unwrap();

        let records = store.list_all().await.unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn list_all_round_trips_timestamps() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();

        let appended = store.append("u1", "g1", "hello").await.unwrap();
        let listed = store.list_all().await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].created_at, appended.created_at);
    }

    #[tokio::test]
    async fn opens_on_disk_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("history.db");

        let store = SqliteHistoryStore::open(&path).unwrap();
        store.append("u1", "g1", "hello").await.unwrap();
        drop(store);

        // Reopen and read back.
        let store = SqliteHistoryStore::open(&path).unwrap();
        let records = store.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].body, "hello");
    }
}
