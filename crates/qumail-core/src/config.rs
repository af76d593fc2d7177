//! Orchestrator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use qumail_crypto::aead::AeadAlgorithm;

/// Default time budget for one directory or QKD call
pub const DEFAULT_EXTERNAL_CALL_TIMEOUT_MS: u64 = 10_000;

/// Encryption orchestrator configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// AEAD used for levels 2 and 3
    pub aead: AeadAlgorithm,
    /// Time budget for each directory lookup or QKD fetch, in milliseconds
    pub external_call_timeout_ms: u64,
    /// Largest plaintext accepted by `encrypt`
    pub max_message_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            aead: AeadAlgorithm::default(),
            external_call_timeout_ms: DEFAULT_EXTERNAL_CALL_TIMEOUT_MS,
            max_message_size: qumail_crypto::MAX_MESSAGE_SIZE,
        }
    }
}

impl OrchestratorConfig {
    /// Use a specific AEAD algorithm
    pub fn with_aead(mut self, aead: AeadAlgorithm) -> Self {
        self.aead = aead;
        self
    }

    /// Get the external call timeout as Duration
    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_millis(self.external_call_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.external_call_timeout_ms == 0 {
            return Err("external_call_timeout_ms must be > 0".to_string());
        }
        if self.max_message_size == 0 {
            return Err("max_message_size must be > 0".to_string());
        }
        if self.max_message_size > qumail_crypto::MAX_MESSAGE_SIZE {
            return Err(format!(
                "max_message_size must be <= {}",
                qumail_crypto::MAX_MESSAGE_SIZE
            ));
        }
        Ok(())
    }
}
