//! In-memory agent registry.
//!
//! The registry maps agent ids to lightweight runtime handles. It is derived
//! from the `agents` table and never authoritative: every entry can be
//! rebuilt from its persisted [`AgentRecord`] plus the configured default
//! provider, which is exactly what [`AgentRegistry::rehydrate`] does after a
//! restore.
//!
//! Internally the registry is backed by [`DashMap`]. Each entry carries a
//! sequence number so listings come back in registration order.
//!
//! # Example
//!
//! ```rust
//! # use agentdock_runtime::registry::{AgentHandle, AgentRegistry};
//! # use agentdock_runtime::ModelProvider;
//! # use agentdock_store::AgentRecord;
//! let registry = AgentRegistry::new();
//! let record = AgentRecord {
//!     id: "a1".into(),
//!     name: "Eliza".into(),
//!     token: "openai-abc".into(),
//! };
//! registry.insert(AgentHandle::from_record(&record, ModelProvider::OpenAi));
//!
//! assert_eq!(registry.ids(), vec!["a1".to_string()]);
//! assert_eq!(registry.get("a1").unwrap().character.name, "Eliza");
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use agentdock_store::AgentRecord;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::credential::ModelProvider;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Persona presented by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Display name.
    pub name: String,
}

/// Runtime handle for a registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHandle {
    /// Agent identifier (primary key of the persisted row).
    pub id: String,
    /// Persona.
    pub character: Character,
    /// Credential for the model provider.
    pub token: String,
    /// Provider the agent's model calls go to.
    pub model_provider: ModelProvider,
    #[serde(skip)]
    seq: u64,
}

impl AgentHandle {
    /// Build a handle from a persisted row.
    ///
    /// The provider is recovered from the token prefix, falling back to
    /// `default_provider`.
    pub fn from_record(record: &AgentRecord, default_provider: ModelProvider) -> Self {
        Self {
            id: record.id.clone(),
            character: Character {
                name: record.name.clone(),
            },
            token: record.token.clone(),
            model_provider: ModelProvider::from_token(&record.token).unwrap_or(default_provider),
            seq: 0,
        }
    }

    /// The persisted form of this handle.
    pub fn to_record(&self) -> AgentRecord {
        AgentRecord {
            id: self.id.clone(),
            name: self.character.name.clone(),
            token: self.token.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent agent index backed by [`DashMap`].
///
/// The registry is cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    inner: Arc<DashMap<String, AgentHandle>>,
    next_seq: Arc<AtomicU64>,
}

impl AgentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle, replacing any entry with the same id.
    pub fn insert(&self, mut handle: AgentHandle) {
        handle.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(agent_id = %handle.id, "registry entry added");
        self.inner.insert(handle.id.clone(), handle);
    }

    /// Remove an entry, returning it if it existed.
    pub fn remove(&self, id: &str) -> Option<AgentHandle> {
        let removed = self.inner.remove(id).map(|(_, handle)| handle);
        if removed.is_some() {
            tracing::debug!(agent_id = %id, "registry entry removed");
        }
        removed
    }

    /// Snapshot of one entry.
    pub fn get(&self, id: &str) -> Option<AgentHandle> {
        self.inner.get(id).map(|entry| entry.value().clone())
    }

    /// Earliest-registered entry whose name matches `name`, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<AgentHandle> {
        let wanted = name.to_lowercase();
        self.inner
            .iter()
            .filter(|e| e.value().character.name.to_lowercase() == wanted)
            .min_by_key(|e| e.value().seq)
            .map(|e| e.value().clone())
    }

    /// Whether an entry exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    /// All ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.list_all().into_iter().map(|h| h.id).collect()
    }

    /// All handles in registration order.
    pub fn list_all(&self) -> Vec<AgentHandle> {
        let mut handles: Vec<AgentHandle> = self.inner.iter().map(|e| e.value().clone()).collect();
        handles.sort_by_key(|h| h.seq);
        handles
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Replace the whole index with handles built from `records`, keeping
    /// their order.
    pub fn rehydrate(&self, records: &[AgentRecord], default_provider: ModelProvider) {
        self.inner.clear();
        for record in records {
            self.insert(AgentHandle::from_record(record, default_provider));
        }
        tracing::info!(agents = records.len(), "registry rehydrated");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, token: &str) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            name: name.to_string(),
            token: token.to_string(),
        }
    }

    fn handle(id: &str, name: &str) -> AgentHandle {
        AgentHandle::from_record(&record(id, name, "openai-x"), ModelProvider::OpenAi)
    }

    #[test]
    fn insert_and_get() {
        let registry = AgentRegistry::new();
        registry.insert(handle("a", "Ada"));

        let got = registry.get("a").expect("entry should exist");
        assert_eq!(got.character.name, "Ada");
        assert_eq!(got.model_provider, ModelProvider::OpenAi);
        assert!(registry.contains("a"));
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn ids_follow_insertion_order() {
        let registry = AgentRegistry::new();
        for id in ["z", "a", "m", "b"] {
            registry.insert(handle(id, id));
        }
        assert_eq!(registry.ids(), vec!["z", "a", "m", "b"]);

        registry.remove("a");
        assert_eq!(registry.ids(), vec!["z", "m", "b"]);
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn remove_reports_presence() {
        let registry = AgentRegistry::new();
        registry.insert(handle("a", "Ada"));
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn find_by_name_is_case_insensitive_and_earliest() {
        let registry = AgentRegistry::new();
        registry.insert(handle("first", "Eliza"));
        registry.insert(handle("second", "ELIZA"));

        assert_eq!(registry.find_by_name("eliza").unwrap().id, "first");
        assert!(registry.find_by_name("nobody").is_none());
    }

    #[test]
    fn rehydrate_replaces_contents() {
        let registry = AgentRegistry::new();
        registry.insert(handle("stale", "Old"));

        registry.rehydrate(
            &[
                record("b", "Bee", "llama_local-q"),
                record("a", "Ay", "legacy-token"),
            ],
            ModelProvider::OpenAi,
        );

        assert_eq!(registry.ids(), vec!["b", "a"]);
        assert!(!registry.contains("stale"));
        assert_eq!(
            registry.get("b").unwrap().model_provider,
            ModelProvider::LlamaLocal
        );
        // Unknown prefix falls back to the default provider.
        assert_eq!(registry.get("a").unwrap().model_provider, ModelProvider::OpenAi);
    }

    #[test]
    fn handle_round_trips_record() {
        let original = record("id", "Name", "openai-tok");
        let handle = AgentHandle::from_record(&original, ModelProvider::LlamaLocal);
        assert_eq!(handle.to_record(), original);
    }
}
