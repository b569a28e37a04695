//! agentdock agent runtime.
//!
//! This crate turns the storage primitives of `agentdock-store` into a
//! process that survives being destroyed and restarted by its host:
//!
//! - **[`lifecycle`]** -- [`SnapshotController`], the state machine that
//!   migrates or restores the store at boot, checkpoints it before suspend,
//!   and restores it after resume.
//! - **[`registry`]** -- [`AgentRegistry`], an in-memory index of agent
//!   handles backed by [`dashmap::DashMap`], rebuilt from the store after
//!   every load.
//! - **[`service`]** -- [`AgentService`], the narrow interface the host and
//!   the HTTP layer call (`initialize`, `on_suspend`, `on_resume`,
//!   `register_agent`, `unregister_agent`, `list_agents`).
//! - **[`credential`]** -- model providers and token issuing.
//! - **[`config`]** -- [`RuntimeConfig`].
//!
//! There is no process-wide global: the host owns one [`AgentService`]
//! (typically in an `Arc`) and passes it to every collaborator.

pub mod config;
pub mod credential;
pub mod lifecycle;
pub mod registry;
pub mod service;

pub use config::RuntimeConfig;
pub use credential::ModelProvider;
pub use lifecycle::{BootPath, CheckpointOutcome, LifecycleState, SnapshotController};
pub use registry::{AgentHandle, AgentRegistry, Character};
pub use service::AgentService;
