//! Persistence for agent records.
//!
//! Rows live in the `agents` table created by migration v1. Records are
//! immutable once written: they are only ever inserted or deleted. Listing
//! order is insertion order (SQLite `rowid`), which survives export/import.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// A persisted agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Unique identifier assigned by the runtime, never by callers.
    pub id: String,
    /// Display name. Not unique.
    pub name: String,
    /// Credential issued to the agent.
    pub token: String,
}

/// Insert/delete/select operations on the `agents` table.
#[derive(Clone)]
pub struct AgentStore {
    db: Database,
}

impl AgentStore {
    /// Create a new agent store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new record. A duplicate id fails with a query error.
    #[instrument(skip(self, record), fields(agent_id = %record.id))]
    pub async fn insert(&self, record: AgentRecord) -> StoreResult<()> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO agents (id, name, token) VALUES (?1, ?2, ?3)",
                    rusqlite::params![record.id, record.name, record.token],
                )?;
                debug!(agent_id = %record.id, "agent row inserted");
                Ok(())
            })
            .await
    }

    /// Delete a record, returning `true` if a row was removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        let id = id.to_string();
        self.db
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM agents WHERE id = ?1", rusqlite::params![id])?;
                Ok(deleted > 0)
            })
            .await
    }

    /// Fetch one record by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<AgentRecord>> {
        let id = id.to_string();
        self.db
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT id, name, token FROM agents WHERE id = ?1",
                    rusqlite::params![id],
                    Self::from_row,
                );
                match result {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// All records in insertion order.
    pub async fn list_all(&self) -> StoreResult<Vec<AgentRecord>> {
        self.db.call(Self::scan).await
    }

    /// Row count.
    pub async fn count(&self) -> StoreResult<usize> {
        self.db
            .call(|conn| {
                let c: i64 = conn.query_row("SELECT count(*) FROM agents", [], |row| row.get(0))?;
                Ok(c as usize)
            })
            .await
    }

    /// Synchronous full scan, for callers already holding the connection.
    pub fn scan(conn: &rusqlite::Connection) -> StoreResult<Vec<AgentRecord>> {
        let mut stmt = conn.prepare("SELECT id, name, token FROM agents ORDER BY rowid")?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Map an `id, name, token` row. `NULL` text columns read as empty.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRecord> {
        Ok(AgentRecord {
            id: row.get(0)?,
            name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            token: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn record(id: &str, name: &str) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            name: name.to_string(),
            token: format!("token-{id}"),
        }
    }

    fn setup() -> AgentStore {
        AgentStore::new(Database::open_and_migrate().unwrap())
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = setup();
        store.insert(record("a1", "Eliza")).await.unwrap();

        let fetched = store.get("a1").await.unwrap().unwrap();
        assert_eq!(fetched, record("a1", "Eliza"));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_query_error() {
        let store = setup();
        store.insert(record("a1", "Eliza")).await.unwrap();
        let err = store.insert(record("a1", "Other")).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[tokio::test]
    async fn delete_reports_whether_row_existed() {
        let store = setup();
        store.insert(record("a1", "Eliza")).await.unwrap();

        assert!(store.delete("a1").await.unwrap());
        assert!(!store.delete("a1").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_all_keeps_insertion_order() {
        let store = setup();
        for id in ["z", "a", "m"] {
            store.insert(record(id, "same")).await.unwrap();
        }
        let ids: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn null_columns_read_as_empty() {
        let db = Database::open_and_migrate().unwrap();
        db.execute("INSERT INTO agents (id) VALUES ('bare')", &[]).unwrap();

        let rows = AgentStore::new(db).list_all().await.unwrap();
        assert_eq!(rows[0].name, "");
        assert_eq!(rows[0].token, "");
    }

    #[tokio::test]
    async fn unmigrated_store_fails_with_query_error() {
        let store = AgentStore::new(Database::open_in_memory().unwrap());
        assert!(matches!(
            store.list_all().await,
            Err(StoreError::Query(_))
        ));
    }
}
