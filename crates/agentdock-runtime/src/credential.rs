//! Model providers and agent credentials.
//!
//! Every agent is issued a token for its model provider at registration.
//! Tokens have the form `<provider>-<random>` where `<random>` is 24 bytes
//! from the system CSPRNG, URL-safe base64 encoded. The provider prefix lets
//! a registry entry recover its provider from the persisted token alone.

use std::fmt;
use std::str::FromStr;

use agentdock_store::{StoreError, StoreResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

/// Random bytes per token.
const TOKEN_ENTROPY_BYTES: usize = 24;

/// Backend an agent's model calls are routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelProvider {
    /// Hosted OpenAI models.
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// A locally served Llama model.
    #[serde(rename = "llama_local")]
    LlamaLocal,
}

impl ModelProvider {
    /// Stable slug used in tokens and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::LlamaLocal => "llama_local",
        }
    }

    /// Recover the provider from a token's prefix.
    pub fn from_token(token: &str) -> Option<Self> {
        let (prefix, _) = token.split_once('-')?;
        prefix.parse().ok()
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelProvider {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "llama_local" => Ok(Self::LlamaLocal),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown model provider: {other}"
            ))),
        }
    }
}

/// Issue a fresh credential for `provider`.
pub fn issue_token(provider: ModelProvider) -> StoreResult<String> {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| StoreError::InvalidArgument("failed to generate random token".into()))?;
    Ok(format!("{provider}-{}", URL_SAFE_NO_PAD.encode(bytes)))
}
