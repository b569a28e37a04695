//! Runtime configuration.
//!
//! [`RuntimeConfig`] controls how new agents are provisioned. Defaults are
//! provided via the [`Default`] implementation, and a builder-style API lets
//! callers customise individual fields. The struct deserializes from the
//! `[runtime]` table of the application config file; missing keys keep
//! their defaults.

use serde::Deserialize;

use crate::credential::ModelProvider;

/// Settings for the agent runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Provider assigned to newly registered agents, and to rehydrated
    /// agents whose token carries no recognizable provider prefix.
    ///
    /// Default: **openai**.
    pub default_provider: ModelProvider,

    /// Longest accepted agent name, in characters.
    ///
    /// Default: **256**.
    pub max_name_len: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_provider: ModelProvider::OpenAi,
            max_name_len: 256,
        }
    }
}

impl RuntimeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider for new agents.
    pub fn with_default_provider(mut self, provider: ModelProvider) -> Self {
        self.default_provider = provider;
        self
    }

    /// Set the maximum agent name length.
    pub fn with_max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.default_provider, ModelProvider::OpenAi);
        assert_eq!(cfg.max_name_len, 256);
        assert_eq!(cfg, RuntimeConfig::new());
    }

    #[test]
    fn builder_chaining() {
        let cfg = RuntimeConfig::new()
            .with_default_provider(ModelProvider::LlamaLocal)
            .with_max_name_len(16);
        assert_eq!(cfg.default_provider, ModelProvider::LlamaLocal);
        assert_eq!(cfg.max_name_len, 16);
    }
}
