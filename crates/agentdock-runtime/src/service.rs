//! The agent service: the narrow interface external collaborators call.
//!
//! [`AgentService`] ties the [`SnapshotController`] to the [`AgentRegistry`]
//! and exposes the host-facing operations:
//!
//! | Operation | Effect |
//! |---|---|
//! | [`initialize`](AgentService::initialize) | load the store (migrate or restore), rebuild the registry |
//! | [`on_suspend`](AgentService::on_suspend) | checkpoint the store into the durable slot |
//! | [`on_resume`](AgentService::on_resume) | restore the store from the slot, rebuild the registry |
//! | [`register_agent`](AgentService::register_agent) | insert a row, mirror it into the registry |
//! | [`unregister_agent`](AgentService::unregister_agent) | delete a row, drop it from the registry |
//! | [`list_agents`](AgentService::list_agents) | ids from the registry, in registration order |
//!
//! Mutations and loads are serialized by a write gate, so the registry and
//! the `agents` table never diverge between operations.

use std::sync::Arc;

use agentdock_store::{AgentRecord, AgentStore, SlotStore, StoreError, StoreResult};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::credential;
use crate::lifecycle::{BootPath, CheckpointOutcome, LifecycleState, SnapshotController};
use crate::registry::{AgentHandle, AgentRegistry};

/// Host-facing agent management service.
pub struct AgentService {
    controller: SnapshotController,
    registry: AgentRegistry,
    config: RuntimeConfig,
    write_gate: tokio::sync::Mutex<()>,
}

impl AgentService {
    /// Create an uninitialized service over the host's durable slots.
    pub fn new(slots: Arc<dyn SlotStore>, config: RuntimeConfig) -> Self {
        Self {
            controller: SnapshotController::new(slots),
            registry: AgentRegistry::new(),
            config,
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.controller.state()
    }

    /// The in-memory registry.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ── lifecycle ────────────────────────────────────────────────────

    /// Load the store and rebuild the registry from it.
    ///
    /// Safe to call more than once; a ready service returns
    /// [`BootPath::AlreadyReady`] without touching the registry.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> StoreResult<BootPath> {
        let _gate = self.write_gate.lock().await;
        let path = self.controller.initialize().await?;
        if path != BootPath::AlreadyReady {
            self.rehydrate().await?;
        }
        Ok(path)
    }

    /// Start [`initialize`](Self::initialize) in the background.
    ///
    /// Failures are logged, not returned. Callers that need the store must
    /// still be prepared for [`StoreError::StoreNotReady`].
    pub fn spawn_initialize(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = service.initialize().await {
                error!(%err, fatal = err.is_fatal(), "background initialization failed");
            }
        })
    }

    /// Suspend hook: checkpoint the store into the durable slot.
    ///
    /// Synchronous so it completes before the host finalizes suspension.
    pub fn on_suspend(&self) -> StoreResult<CheckpointOutcome> {
        info!(state = %self.state(), "suspend requested");
        self.controller.checkpoint()
    }

    /// Resume hook: restore the store from the durable slot and rebuild the
    /// registry. Returns the number of agents restored.
    #[instrument(skip(self))]
    pub async fn on_resume(&self) -> StoreResult<usize> {
        let _gate = self.write_gate.lock().await;
        if let Err(err) = self.controller.restore().await {
            self.registry.clear();
            return Err(err);
        }
        self.rehydrate().await
    }

    // ── agents ───────────────────────────────────────────────────────

    /// Register a new agent named `name` and return its generated id.
    ///
    /// Names are not unique keys: registering the same name twice yields
    /// two agents.
    #[instrument(skip(self))]
    pub async fn register_agent(&self, name: &str) -> StoreResult<String> {
        let _gate = self.write_gate.lock().await;
        let name = self.validate_name(name)?;
        let db = self.controller.database("register agent")?;

        let provider = self.config.default_provider;
        let record = AgentRecord {
            id: Uuid::now_v7().to_string(),
            name,
            token: credential::issue_token(provider)?,
        };

        AgentStore::new(db).insert(record.clone()).await?;
        self.controller.mark_dirty();
        self.registry.insert(AgentHandle::from_record(&record, provider));

        info!(agent_id = %record.id, name = %record.name, %provider, "agent registered");
        Ok(record.id)
    }

    /// Remove the agent `id`. Returns `true` if a row was deleted and
    /// `false` if no such agent existed.
    #[instrument(skip(self))]
    pub async fn unregister_agent(&self, id: &str) -> StoreResult<bool> {
        let _gate = self.write_gate.lock().await;
        let db = self.controller.database("unregister agent")?;

        let existed = AgentStore::new(db).delete(id).await?;
        self.registry.remove(id);

        if existed {
            self.controller.mark_dirty();
            info!(agent_id = %id, "agent unregistered");
        } else {
            info!(agent_id = %id, "unregister: agent did not exist");
        }
        Ok(existed)
    }

    /// Ids of all registered agents, in registration order.
    ///
    /// Served from the in-memory registry, not a store scan.
    pub fn list_agents(&self) -> StoreResult<Vec<String>> {
        self.controller.database("list agents")?;
        Ok(self.registry.ids())
    }

    /// All registry handles, in registration order.
    pub fn list_handles(&self) -> StoreResult<Vec<AgentHandle>> {
        self.controller.database("list agents")?;
        Ok(self.registry.list_all())
    }

    /// Look up an agent by id, falling back to a case-insensitive name match.
    pub fn resolve(&self, id_or_name: &str) -> StoreResult<Option<AgentHandle>> {
        self.controller.database("resolve agent")?;
        Ok(self
            .registry
            .get(id_or_name)
            .or_else(|| self.registry.find_by_name(id_or_name)))
    }

    /// The persisted record for `id`, read from the store.
    pub async fn agent(&self, id: &str) -> StoreResult<Option<AgentRecord>> {
        let db = self.controller.database("read agent")?;
        AgentStore::new(db).get(id).await
    }

    /// Ids present in the store, by a fresh scan.
    pub async fn persisted_ids(&self) -> StoreResult<Vec<String>> {
        let db = self.controller.database("scan agents")?;
        let records = AgentStore::new(db).list_all().await?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    // ── internals ────────────────────────────────────────────────────

    async fn rehydrate(&self) -> StoreResult<usize> {
        let db = self.controller.database("rehydrate registry")?;
        let records = AgentStore::new(db).list_all().await?;
        self.registry.rehydrate(&records, self.config.default_provider);
        Ok(records.len())
    }

    fn validate_name(&self, name: &str) -> StoreResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidArgument(
                "agent name must not be empty".into(),
            ));
        }
        if name.chars().count() > self.config.max_name_len {
            return Err(StoreError::InvalidArgument(format!(
                "agent name longer than {} characters",
                self.config.max_name_len
            )));
        }
        Ok(name.to_string())
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::ModelProvider;
    use agentdock_store::MemorySlotStore;

    async fn ready_service() -> AgentService {
        let service = AgentService::new(Arc::new(MemorySlotStore::new()), RuntimeConfig::default());
        service.initialize().await.unwrap();
        service
    }

    #[tokio::test]
    async fn operations_before_initialize_fail_fast() {
        let service = AgentService::new(Arc::new(MemorySlotStore::new()), RuntimeConfig::default());

        assert!(matches!(
            service.register_agent("Eliza").await,
            Err(StoreError::StoreNotReady { .. })
        ));
        assert!(matches!(
            service.unregister_agent("x").await,
            Err(StoreError::StoreNotReady { .. })
        ));
        assert!(matches!(
            service.list_agents(),
            Err(StoreError::StoreNotReady { .. })
        ));
    }

    #[tokio::test]
    async fn register_mirrors_into_registry() {
        let service = ready_service().await;
        let id = service.register_agent("  Eliza ").await.unwrap();

        let handle = service.resolve(&id).unwrap().unwrap();
        assert_eq!(handle.character.name, "Eliza");
        assert_eq!(handle.model_provider, ModelProvider::OpenAi);

        let record = service.agent(&id).await.unwrap().unwrap();
        assert_eq!(record.token, handle.token);
        assert!(record.token.starts_with("openai-"));
    }

    #[tokio::test]
    async fn configured_provider_is_used() {
        let service = AgentService::new(
            Arc::new(MemorySlotStore::new()),
            RuntimeConfig::new().with_default_provider(ModelProvider::LlamaLocal),
        );
        service.initialize().await.unwrap();

        let id = service.register_agent("Local").await.unwrap();
        let handle = service.resolve(&id).unwrap().unwrap();
        assert_eq!(handle.model_provider, ModelProvider::LlamaLocal);
        assert!(handle.token.starts_with("llama_local-"));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let service = AgentService::new(
            Arc::new(MemorySlotStore::new()),
            RuntimeConfig::new().with_max_name_len(4),
        );
        service.initialize().await.unwrap();

        assert!(matches!(
            service.register_agent("   ").await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.register_agent("toolong").await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(service.list_agents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_falls_back_to_name() {
        let service = ready_service().await;
        let id = service.register_agent("Trader").await.unwrap();

        assert_eq!(service.resolve("trader").unwrap().unwrap().id, id);
        assert!(service.resolve("nobody").unwrap().is_none());
    }

    #[tokio::test]
    async fn no_op_mutations_keep_checkpoint_clean() {
        let service = ready_service().await;
        service.register_agent("A").await.unwrap();
        service.on_suspend().unwrap();
        assert_eq!(service.state(), LifecycleState::Checkpointed);

        assert!(!service.unregister_agent("no-such-agent").await.unwrap());
        assert_eq!(service.state(), LifecycleState::Checkpointed);

        assert!(service.register_agent("   ").await.is_err());
        assert_eq!(service.state(), LifecycleState::Checkpointed);
    }

    #[tokio::test]
    async fn applied_mutations_mark_store_dirty() {
        let service = ready_service().await;
        let id = service.register_agent("A").await.unwrap();
        service.on_suspend().unwrap();

        assert!(service.unregister_agent(&id).await.unwrap());
        assert_eq!(service.state(), LifecycleState::Ready);

        service.on_suspend().unwrap();
        service.register_agent("B").await.unwrap();
        assert_eq!(service.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn list_handles_follow_registration_order() {
        let service = ready_service().await;
        let a = service.register_agent("A").await.unwrap();
        let b = service.register_agent("B").await.unwrap();

        let handles = service.list_handles().unwrap();
        let ids: Vec<_> = handles.iter().map(|h| h.id.clone()).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(handles[1].character.name, "B");
        assert_eq!(service.config().default_provider, ModelProvider::OpenAi);
    }

    #[tokio::test]
    async fn persisted_ids_match_registry() {
        let service = ready_service().await;
        let a = service.register_agent("A").await.unwrap();
        let b = service.register_agent("B").await.unwrap();
        service.unregister_agent(&a).await.unwrap();

        assert_eq!(service.persisted_ids().await.unwrap(), vec![b.clone()]);
        assert_eq!(service.list_agents().unwrap(), vec![b]);
    }
}
