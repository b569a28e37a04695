//! Application configuration.
//!
//! Read from a TOML file (default `config/agentdock.toml`). A missing file
//! means defaults; a malformed file is an error. Environment variables
//! override the file:
//!
//! - `AGENTDOCK_DATA_DIR` -- data directory
//! - `AGENTDOCK_LOG` -- default log filter (`RUST_LOG` still wins)
//!
//! ```toml
//! data_dir = "data"
//! log_level = "info"
//!
//! [runtime]
//! default_provider = "openai"
//! max_name_len = 256
//! ```

use std::path::{Path, PathBuf};

use agentdock_runtime::RuntimeConfig;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Settings for one agentdock process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the durable slot files.
    pub data_dir: PathBuf,
    /// Default `tracing` filter.
    pub log_level: String,
    /// Agent runtime settings.
    pub runtime: RuntimeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse TOML content.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides looked up through `var`.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("AGENTDOCK_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = var("AGENTDOCK_LOG").filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
    }

    /// Directory for the durable slot files.
    pub fn slot_dir(&self) -> PathBuf {
        self.data_dir.join("slots")
    }
}
