//! Snapshot lifecycle controller.
//!
//! [`SnapshotController`] owns the process's only [`Database`] and moves it
//! through an explicit state machine:
//!
//! ```text
//! Uninitialized ──► Migrating ──► Ready ◄──► Checkpointed
//!       │                          ▲
//!       └─────────► Restoring ─────┘
//!
//! any load failure ──► Failed (a later initialize/restore may retry)
//! ```
//!
//! - `initialize()` reads the durable slot. No image means a blank store is
//!   created and migrated; an image means the store is opened from it and
//!   migrations are skipped. Calling it on a ready controller is a no-op.
//! - `checkpoint()` exports the store and writes it to the slot. It never
//!   fails because the store is missing: before the first successful
//!   initialization it logs and returns [`CheckpointOutcome::Skipped`].
//! - `restore()` re-derives the store from the slot unconditionally,
//!   replacing the current handle.
//!
//! Every consumer fetches the store through [`SnapshotController::database`]
//! on each call, so no one holds a handle that a restore has replaced.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentdock_store::{DATABASE_SLOT, Database, SlotStore, StoreError, StoreResult, migration};
use tracing::{debug, error, info, warn};

/// Table a restored image must contain.
const REQUIRED_TABLE: &str = "agents";

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Nothing loaded yet.
    Uninitialized,
    /// Building a fresh store from migrations.
    Migrating,
    /// Opening the store from a durable image.
    Restoring,
    /// Store is live and has changes not yet checkpointed.
    Ready,
    /// Store is live and the durable image matches it.
    Checkpointed,
    /// The last load failed fatally.
    Failed,
}

impl LifecycleState {
    /// Whether the store can serve operations.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::Checkpointed)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Migrating => "migrating",
            Self::Restoring => "restoring",
            Self::Ready => "ready",
            Self::Checkpointed => "checkpointed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a load produced the live store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPath {
    /// `initialize()` found the store already ready and did nothing.
    AlreadyReady,
    /// No durable image existed; a blank store was migrated.
    Migrated,
    /// The store was opened from a durable image.
    Restored {
        /// Schema version recorded inside the image.
        schema_version: u32,
    },
}

/// Result of a checkpoint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// The image was written to the durable slot.
    Written {
        /// Image size.
        bytes: usize,
    },
    /// There was no initialized store to export.
    Skipped,
}

struct Inner {
    state: LifecycleState,
    db: Option<Database>,
}

/// Owner of the live store and its checkpoint/restore protocol.
pub struct SnapshotController {
    slots: Arc<dyn SlotStore>,
    inner: Mutex<Inner>,
    /// Serializes initialize/restore.
    load_lock: tokio::sync::Mutex<()>,
}

impl SnapshotController {
    /// Create an uninitialized controller over `slots`.
    pub fn new(slots: Arc<dyn SlotStore>) -> Self {
        Self {
            slots,
            inner: Mutex::new(Inner {
                state: LifecycleState::Uninitialized,
                db: None,
            }),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.inner().state
    }

    /// The live store, or [`StoreError::StoreNotReady`] naming `operation`.
    pub fn database(&self, operation: &'static str) -> StoreResult<Database> {
        let inner = self.inner();
        match (&inner.db, inner.state.is_ready()) {
            (Some(db), true) => Ok(db.clone()),
            _ => Err(StoreError::StoreNotReady { operation }),
        }
    }

    /// Record that the live store changed. The durable image no longer
    /// matches, so `Checkpointed` drops to `Ready`.
    ///
    /// Call only after a mutation has actually been applied.
    pub fn mark_dirty(&self) {
        let mut inner = self.inner();
        if inner.state == LifecycleState::Checkpointed {
            debug!("live store diverged from durable image");
            inner.state = LifecycleState::Ready;
        }
    }

    /// Bring the store up from the durable slot unless it is already ready.
    pub async fn initialize(&self) -> StoreResult<BootPath> {
        let _guard = self.load_lock.lock().await;
        if self.state().is_ready() {
            debug!("initialize: store already ready");
            return Ok(BootPath::AlreadyReady);
        }
        self.load().await
    }

    /// Re-derive the store from the last durable image.
    ///
    /// With no image in the slot this builds a fresh migrated store, the
    /// same as a first boot.
    pub async fn restore(&self) -> StoreResult<BootPath> {
        let _guard = self.load_lock.lock().await;
        info!(state = %self.state(), "restoring store from durable slot");
        self.load().await
    }

    /// Export the live store into the durable slot.
    pub fn checkpoint(&self) -> StoreResult<CheckpointOutcome> {
        let db = {
            let inner = self.inner();
            match (&inner.db, inner.state.is_ready()) {
                (Some(db), true) => db.clone(),
                _ => {
                    warn!(state = %inner.state, "checkpoint skipped: store not initialized");
                    return Ok(CheckpointOutcome::Skipped);
                }
            }
        };

        let image = db.export()?;
        if let Err(err) = self.slots.put(DATABASE_SLOT, &image) {
            error!(%err, "checkpoint write failed");
            return Err(err);
        }

        let mut inner = self.inner();
        if inner.state == LifecycleState::Ready {
            inner.state = LifecycleState::Checkpointed;
        }
        info!(bytes = image.len(), "checkpoint written");
        Ok(CheckpointOutcome::Written { bytes: image.len() })
    }

    // ── internals ────────────────────────────────────────────────────

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        let mut inner = self.inner();
        debug!(from = %inner.state, to = %state, "lifecycle transition");
        inner.state = state;
    }

    async fn load(&self) -> StoreResult<BootPath> {
        match self.load_store().await {
            Ok((db, path)) => {
                let mut inner = self.inner();
                inner.db = Some(db);
                inner.state = LifecycleState::Ready;
                info!(?path, "store ready");
                Ok(path)
            }
            Err(err) => {
                error!(%err, fatal = err.is_fatal(), "store initialization failed");
                let mut inner = self.inner();
                inner.db = None;
                inner.state = LifecycleState::Failed;
                Err(err)
            }
        }
    }

    async fn load_store(&self) -> StoreResult<(Database, BootPath)> {
        let slots = Arc::clone(&self.slots);
        let image = tokio::task::spawn_blocking(move || slots.get(DATABASE_SLOT)).await??;

        match image {
            None => {
                self.set_state(LifecycleState::Migrating);
                info!("no durable image found, migrating a fresh store");
                let db = tokio::task::spawn_blocking(Database::open_and_migrate).await??;
                Ok((db, BootPath::Migrated))
            }
            Some(bytes) => {
                self.set_state(LifecycleState::Restoring);
                info!(bytes = bytes.len(), "durable image found, restoring");
                let (db, schema_version) =
                    tokio::task::spawn_blocking(move || open_image(&bytes)).await??;
                Ok((db, BootPath::Restored { schema_version }))
            }
        }
    }
}

/// Open a checkpointed image. There is no fallback to migrations: an
/// unusable image is [`StoreError::ImageCorrupt`].
fn open_image(bytes: &[u8]) -> StoreResult<(Database, u32)> {
    let db = Database::open(bytes)?;
    if !db.has_table(REQUIRED_TABLE)? {
        return Err(StoreError::ImageCorrupt(format!(
            "image has no `{REQUIRED_TABLE}` table"
        )));
    }

    let schema_version = db.schema_version()?;
    let latest = migration::latest_version();
    if schema_version != latest {
        // Images are never re-migrated; surface the drift.
        warn!(
            image_version = schema_version,
            latest_version = latest,
            "restored image schema differs from this build"
        );
    }
    Ok((db, schema_version))
}

// ── tests ────────────────────────────────────────────────────────────
