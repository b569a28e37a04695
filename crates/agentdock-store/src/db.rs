//! Embedded in-memory SQLite store with whole-image export and import.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>`. The connection always lives in memory; durability comes
//! from exporting the complete database as a byte image ([`Database::export`])
//! and later reopening it from those bytes ([`Database::open`]).

use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::serialize::OwnedData;
use rusqlite::types::Value;
use rusqlite::{Connection, DatabaseName};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Every SQLite database file starts with this 16-byte header string.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Size of the fixed database header at the start of page 1.
const HEADER_LEN: usize = 100;

/// Result of [`Database::execute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names, empty for statements that return no rows.
    pub columns: Vec<String>,
    /// Returned rows, each with one value per column.
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a DML statement (0 for queries).
    pub rows_affected: usize,
}

impl RowSet {
    /// Number of returned rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Thread-safe handle to an in-memory SQLite database.
///
/// Clones share the same connection. Access is serialized by the mutex; the
/// store is not designed for concurrent writers.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Construct a store from an exported image.
    ///
    /// An empty `image` yields a blank store with no tables (run migrations
    /// next). A non-empty `image` must be a complete SQLite database image;
    /// anything else is [`StoreError::ImageCorrupt`].
    pub fn open(image: &[u8]) -> StoreResult<Self> {
        if image.is_empty() {
            return Self::open_in_memory();
        }

        if image.len() < HEADER_LEN || !image.starts_with(SQLITE_HEADER) {
            return Err(StoreError::ImageCorrupt(format!(
                "{} bytes without a SQLite header",
                image.len()
            )));
        }

        let mut conn = Connection::open_in_memory()?;
        conn.deserialize(DatabaseName::Main, owned_copy(image)?, false)
            .map_err(|e| StoreError::ImageCorrupt(format!("deserialize failed: {e}")))?;
        Self::verify_image(&conn)?;
        Self::apply_pragmas(&conn)?;

        info!(bytes = image.len(), "database opened from image");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a blank in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");

        let conn = Connection::open_in_memory()?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a blank in-memory database and apply every migration.
    pub fn open_and_migrate() -> StoreResult<Self> {
        let db = Self::open_in_memory()?;
        db.run_migrations()?;
        Ok(db)
    }

    /// Run all pending schema migrations.
    pub fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        migration::run_all(&conn)
    }

    /// Schema version recorded in the store (0 when untracked).
    pub fn schema_version(&self) -> StoreResult<u32> {
        let conn = self.lock()?;
        migration::current_version(&conn)
    }

    /// Whether a table named `name` exists.
    pub fn has_table(&self, name: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Run one parameterized statement and collect its result.
    ///
    /// Queries return their rows; DML returns the number of affected rows.
    /// A statement naming a missing table or column fails with
    /// [`StoreError::Query`].
    pub fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<RowSet> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        if columns.is_empty() {
            let rows_affected = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
            return Ok(RowSet {
                columns,
                rows: Vec::new(),
                rows_affected,
            });
        }

        let width = columns.len();
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RowSet {
            columns,
            rows,
            rows_affected: 0,
        })
    }

    /// Run a closure against the connection on the current thread.
    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run a closure against the connection on the blocking pool.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count: i64 = db.call(|conn| {
    ///     let count = conn.query_row("SELECT count(*) FROM agents", [], |row| row.get(0))?;
    ///     Ok(count)
    /// }).await?;
    /// ```
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f)).await?
    }

    /// Serialize the complete current state to a byte image.
    ///
    /// The image reopens with [`Database::open`] to identical table content;
    /// its byte layout is not guaranteed stable across runs.
    pub fn export(&self) -> StoreResult<Vec<u8>> {
        let conn = self.lock()?;
        let data = conn.serialize(DatabaseName::Main)?;
        debug!(bytes = data.len(), "database exported");
        Ok(data.to_vec())
    }

    // ── internals ────────────────────────────────────────────────────

    /// A panic while holding the lock leaves SQLite itself consistent (each
    /// statement is atomic), so a poisoned guard is recovered.
    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("connection mutex was poisoned, recovering");
            poisoned.into_inner()
        }))
    }

    /// Per-connection pragmas. Journal and mmap settings do not apply to an
    /// in-memory database.
    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(())
    }

    /// Force SQLite to read the schema and check page structure.
    fn verify_image(conn: &Connection) -> StoreResult<()> {
        let verdict: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| StoreError::ImageCorrupt(format!("integrity check failed: {e}")))?;
        if verdict != "ok" {
            return Err(StoreError::ImageCorrupt(format!(
                "integrity check reported: {verdict}"
            )));
        }
        Ok(())
    }
}

/// Copy `image` into a buffer owned by SQLite's allocator, as
/// `sqlite3_deserialize` requires when it is allowed to resize and free it.
fn owned_copy(image: &[u8]) -> StoreResult<OwnedData> {
    let len = image.len();
    // SAFETY: `sqlite3_malloc64` returns null or a writable block of at least
    // `len` bytes. The block is fully initialized by the copy before being
    // handed to `OwnedData`, which frees it with `sqlite3_free`.
    unsafe {
        let raw = rusqlite::ffi::sqlite3_malloc64(len as u64).cast::<u8>();
        let ptr = NonNull::new(raw)
            .ok_or_else(|| StoreError::ImageCorrupt(format!("cannot allocate {len} bytes")))?;
        std::ptr::copy_nonoverlapping(image.as_ptr(), ptr.as_ptr(), len);
        Ok(OwnedData::from_raw_nonnull(ptr, len))
    }
}

// ── tests ────────────────────────────────────────────────────────────
