//! Encryption orchestrator
//!
//! Entry point for callers. Picks the [`CipherScheme`] for the requested
//! level, runs it against the injected directory, QKD link and key store, and
//! returns either a complete envelope or an error, never a partial result.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use qumail_crypto::kem::PublicKey;

use crate::cancel::CallOptions;
use crate::config::OrchestratorConfig;
use crate::directory::{normalize_identity, DirectoryClient};
use crate::envelope::EncryptedEnvelope;
use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::level::SecurityLevel;
use crate::payload::MessagePayload;
use crate::qkd::QkdClient;
use crate::scheme::{CipherScheme, SchemeContext};

/// What to encrypt for whom
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptRequest {
    /// Protection level, always explicit
    pub level: SecurityLevel,
    /// Recipient identity, required for level 3
    pub recipient: Option<String>,
    /// QKD session for levels 1 and 2; a fresh one is allocated when `None`
    pub session_id: Option<String>,
}

impl EncryptRequest {
    /// Request at `level` with no recipient or session
    pub fn new(level: SecurityLevel) -> Self {
        Self {
            level,
            recipient: None,
            session_id: None,
        }
    }

    /// Level 3 request for `recipient`
    pub fn post_quantum(recipient: impl Into<String>) -> Self {
        Self::new(SecurityLevel::PostQuantum).to(recipient)
    }

    /// Set the recipient
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Use an agreed QKD session
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Multi-level encryption orchestrator for one local identity
pub struct Orchestrator {
    config: OrchestratorConfig,
    directory: Arc<dyn DirectoryClient>,
    qkd: Arc<dyn QkdClient>,
    key_store: Arc<KeyStore>,
    local_identity: String,
}

impl Orchestrator {
    /// Create an orchestrator acting as `local_identity`
    pub fn new(
        config: OrchestratorConfig,
        directory: Arc<dyn DirectoryClient>,
        qkd: Arc<dyn QkdClient>,
        key_store: Arc<KeyStore>,
        local_identity: &str,
    ) -> Result<Self> {
        config.validate().map_err(Error::InvalidRequest)?;

        let local_identity = normalize_identity(local_identity);
        if local_identity.is_empty() {
            return Err(Error::InvalidRequest("local identity must not be empty".into()));
        }

        info!(identity = %local_identity, aead = %config.aead, "orchestrator ready");
        Ok(Self {
            config,
            directory,
            qkd,
            key_store,
            local_identity,
        })
    }

    /// Identity whose key pair opens level 3 envelopes
    pub fn local_identity(&self) -> &str {
        &self.local_identity
    }

    /// Active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Key store in use
    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Make sure the local identity has a key pair and return its public key
    pub async fn ensure_local_key_pair(&self) -> Result<PublicKey> {
        let key_store = Arc::clone(&self.key_store);
        let identity = self.local_identity.clone();
        let key_pair =
            tokio::task::spawn_blocking(move || key_store.get_or_create_key_pair(&identity))
                .await??;
        Ok(key_pair.public_key)
    }

    fn context<'a>(&'a self, options: &'a CallOptions) -> SchemeContext<'a> {
        SchemeContext {
            config: &self.config,
            directory: self.directory.as_ref(),
            qkd: self.qkd.as_ref(),
            key_store: &self.key_store,
            local_identity: &self.local_identity,
            options,
        }
    }

    /// Encrypt `plaintext` as requested
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        request: &EncryptRequest,
        options: &CallOptions,
    ) -> Result<EncryptedEnvelope> {
        if plaintext.len() > self.config.max_message_size {
            return Err(Error::MessageTooLarge {
                size: plaintext.len(),
                max: self.config.max_message_size,
            });
        }
        options.check()?;

        let started = Instant::now();
        let scheme = CipherScheme::from(request.level);
        let envelope = scheme.seal(&self.context(options), plaintext, request).await?;
        envelope.validate()?;

        debug!(
            level = request.level.as_u8(),
            plaintext_len = plaintext.len(),
            ciphertext_len = envelope.ciphertext.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "message encrypted"
        );
        Ok(envelope)
    }

    /// Decrypt an envelope addressed to the local identity or a shared session
    pub async fn decrypt(&self, envelope: &EncryptedEnvelope, options: &CallOptions) -> Result<Vec<u8>> {
        envelope.validate()?;
        if envelope.ciphertext.len() > self.config.max_message_size {
            return Err(Error::MessageTooLarge {
                size: envelope.ciphertext.len(),
                max: self.config.max_message_size,
            });
        }
        options.check()?;

        let started = Instant::now();
        let scheme = CipherScheme::from(envelope.level);
        let plaintext = scheme.open(&self.context(options), envelope).await?;

        debug!(
            level = envelope.level.as_u8(),
            plaintext_len = plaintext.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "message decrypted"
        );
        Ok(plaintext)
    }

    /// Encrypt a mail-style payload
    pub async fn encrypt_payload(
        &self,
        payload: &MessagePayload,
        request: &EncryptRequest,
        options: &CallOptions,
    ) -> Result<EncryptedEnvelope> {
        let bytes = zeroize::Zeroizing::new(payload.to_bytes()?);
        self.encrypt(&bytes, request, options).await
    }

    /// Decrypt an envelope carrying a [`MessagePayload`]
    pub async fn decrypt_payload(
        &self,
        envelope: &EncryptedEnvelope,
        options: &CallOptions,
    ) -> Result<MessagePayload> {
        let bytes = zeroize::Zeroizing::new(self.decrypt(envelope, options).await?);
        MessagePayload::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::keystore::StorageKey;
    use crate::qkd::SimulatedQkdNetwork;

    fn orchestrator(config: OrchestratorConfig, identity: &str) -> Result<Orchestrator> {
        let network = SimulatedQkdNetwork::new();
        Orchestrator::new(
            config,
            Arc::new(MemoryDirectory::new()),
            Arc::new(network.endpoint(identity)),
            Arc::new(KeyStore::in_memory(StorageKey::from_bytes([5; 32]))),
            identity,
        )
    }

    #[test]
    fn test_request_builders() {
        let request = EncryptRequest::post_quantum("bob@example.com");
        assert_eq!(request.level, SecurityLevel::PostQuantum);
        assert_eq!(request.recipient.as_deref(), Some("bob@example.com"));

        let request = EncryptRequest::new(SecurityLevel::QuantumAes).with_session("s1");
        assert_eq!(request.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(orchestrator(OrchestratorConfig::default(), "  ").is_err());

        let config = OrchestratorConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            orchestrator(config, "alice@example.com"),
            Err(Error::InvalidRequest(_))
        ));

        let ok = orchestrator(OrchestratorConfig::default(), " Alice@Example.com").unwrap();
        assert_eq!(ok.local_identity(), "alice@example.com");
    }

    #[tokio::test]
    async fn test_level3_without_recipient_is_invalid() {
        let orch = orchestrator(OrchestratorConfig::default(), "alice").unwrap();
        let err = orch
            .encrypt(b"x", &EncryptRequest::new(SecurityLevel::PostQuantum), &CallOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
