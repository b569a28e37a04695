//! # agentdock-store
//!
//! Storage engine for agentdock.
//!
//! The relational store lives entirely in process memory and is made
//! durable by checkpointing: the whole SQLite database is exported as a byte
//! image into a durable slot that survives the host destroying the process,
//! and imported again after restart.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  AgentStore   (agents table accessor)   │
//! ├─────────────────────────────────────────┤
//! │  Database     (in-memory rusqlite,      │
//! │                export / open(image))    │
//! │  Migrations   (versioned, cold start)   │
//! ├─────────────────────────────────────────┤
//! │  SlotStore    (durable "DATABASE" cell) │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use agentdock_store::{Database, MemorySlotStore, SlotStore, DATABASE_SLOT};
//!
//! let slots = MemorySlotStore::new();
//! let db = Database::open_and_migrate()?;
//! slots.put(DATABASE_SLOT, &db.export()?)?;
//!
//! let image = slots.get(DATABASE_SLOT)?.unwrap_or_default();
//! let restored = Database::open(&image)?;
//! ```

pub mod agent_store;
pub mod db;
pub mod error;
pub mod migration;
pub mod slot;

// ── re-exports ───────────────────────────────────────────────────────

pub use agent_store::{AgentRecord, AgentStore};
pub use db::{Database, RowSet};
pub use error::{StoreError, StoreResult};
pub use rusqlite::types::Value;
pub use slot::{DATABASE_SLOT, FileSlotStore, MemorySlotStore, SlotStore};
