//! Cipher schemes, one per security level
//!
//! | Level | Key source | Cipher |
//! |-------|------------|--------|
//! | 1 | QKD material, message length | one-time pad |
//! | 2 | QKD material, 32 bytes, through HKDF | AEAD |
//! | 3 | Kyber-512 encapsulation to the recipient, through HKDF | AEAD |
//! | 4 | none | none |

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use qumail_crypto::aead::{Aead, AeadAlgorithm};
use qumail_crypto::kdf::{derive_symmetric_key, domain};
use qumail_crypto::kem::{self, Ciphertext};
use qumail_crypto::keys::{SharedSecret, SymmetricKey};
use qumail_crypto::otp;

use crate::cancel::CallOptions;
use crate::config::OrchestratorConfig;
use crate::directory::{normalize_identity, DirectoryClient};
use crate::envelope::{associated_data_for, EncryptedEnvelope};
use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::level::SecurityLevel;
use crate::orchestrator::EncryptRequest;
use crate::qkd::{QkdClient, QkdKeyMaterial};

/// QKD material drawn for a level 2 key
const QUANTUM_AES_MATERIAL_SIZE: usize = 32;

/// Collaborators available to a scheme for one call
pub(crate) struct SchemeContext<'a> {
    pub config: &'a OrchestratorConfig,
    pub directory: &'a dyn DirectoryClient,
    pub qkd: &'a dyn QkdClient,
    pub key_store: &'a Arc<KeyStore>,
    pub local_identity: &'a str,
    pub options: &'a CallOptions,
}

impl SchemeContext<'_> {
    async fn fetch_qkd(&self, session_id: &str, length: usize) -> Result<QkdKeyMaterial> {
        let material = self
            .options
            .guard(
                "qkd fetch",
                self.config.external_call_timeout(),
                self.qkd.fetch_key(session_id, length),
            )
            .await?;

        if material.len() != length {
            return Err(Error::QkdUnavailable(format!(
                "session {} delivered {} bytes, {} requested",
                session_id,
                material.len(),
                length
            )));
        }
        Ok(material)
    }
}

/// Encryption scheme selected by a [`SecurityLevel`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherScheme {
    /// Level 1
    QuantumOtp,
    /// Level 2
    QuantumAes,
    /// Level 3
    PostQuantum,
    /// Level 4
    Plaintext,
}

impl From<SecurityLevel> for CipherScheme {
    fn from(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::QuantumOtp => CipherScheme::QuantumOtp,
            SecurityLevel::QuantumAes => CipherScheme::QuantumAes,
            SecurityLevel::PostQuantum => CipherScheme::PostQuantum,
            SecurityLevel::Plaintext => CipherScheme::Plaintext,
        }
    }
}

impl CipherScheme {
    /// Level this scheme implements
    pub fn level(&self) -> SecurityLevel {
        match self {
            CipherScheme::QuantumOtp => SecurityLevel::QuantumOtp,
            CipherScheme::QuantumAes => SecurityLevel::QuantumAes,
            CipherScheme::PostQuantum => SecurityLevel::PostQuantum,
            CipherScheme::Plaintext => SecurityLevel::Plaintext,
        }
    }

    pub(crate) async fn seal(
        &self,
        ctx: &SchemeContext<'_>,
        plaintext: &[u8],
        request: &EncryptRequest,
    ) -> Result<EncryptedEnvelope> {
        match self {
            CipherScheme::QuantumOtp => {
                let session_id = session_id_for(request)?;
                let material = ctx.fetch_qkd(&session_id, plaintext.len()).await?;
                let ciphertext = otp::apply(material.into_otp_key(), plaintext)?;
                Ok(EncryptedEnvelope::one_time_pad(session_id, ciphertext))
            }
            CipherScheme::QuantumAes => {
                let session_id = session_id_for(request)?;
                let material = ctx.fetch_qkd(&session_id, QUANTUM_AES_MATERIAL_SIZE).await?;
                let key = quantum_aes_key(&material, &session_id)?;

                let aead = ctx.config.aead;
                let aad = associated_data_for(self.level(), Some(&session_id), aead, None);
                let payload = Aead::with_algorithm(aead).encrypt(&key, plaintext, &aad)?;
                Ok(EncryptedEnvelope::sealed(self.level(), session_id, aead, None, payload))
            }
            CipherScheme::PostQuantum => {
                let recipient = request
                    .recipient
                    .as_deref()
                    .map(normalize_identity)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| Error::InvalidRequest("level 3 requires a recipient".into()))?;

                let entry = ctx
                    .options
                    .guard(
                        "directory lookup",
                        ctx.config.external_call_timeout(),
                        ctx.directory.lookup(&recipient),
                    )
                    .await?;
                let public_key = entry.public_key()?;
                ctx.options.check()?;

                let encapsulated =
                    tokio::task::spawn_blocking(move || kem::encapsulate(&public_key)).await??;
                let kem_ciphertext = encapsulated.kem_ciphertext.into_bytes();
                let key = post_quantum_key(&encapsulated.shared_secret, &recipient, &kem_ciphertext)?;

                let aead = ctx.config.aead;
                let aad = associated_data_for(self.level(), Some(&recipient), aead, Some(&kem_ciphertext));
                let payload = Aead::with_algorithm(aead).encrypt(&key, plaintext, &aad)?;
                Ok(EncryptedEnvelope::sealed(
                    self.level(),
                    recipient,
                    aead,
                    Some(kem_ciphertext),
                    payload,
                ))
            }
            CipherScheme::Plaintext => Ok(EncryptedEnvelope::plaintext(plaintext.to_vec())),
        }
    }

    pub(crate) async fn open(
        &self,
        ctx: &SchemeContext<'_>,
        envelope: &EncryptedEnvelope,
    ) -> Result<Vec<u8>> {
        match self {
            CipherScheme::QuantumOtp => {
                let session_id = envelope.require_key_id()?;
                let material = ctx.fetch_qkd(session_id, envelope.ciphertext.len()).await?;
                Ok(otp::apply(material.into_otp_key(), &envelope.ciphertext)?)
            }
            CipherScheme::QuantumAes => {
                let session_id = envelope.require_key_id()?;
                let material = ctx.fetch_qkd(session_id, QUANTUM_AES_MATERIAL_SIZE).await?;
                let key = quantum_aes_key(&material, session_id)?;
                open_aead(&key, envelope)
            }
            CipherScheme::PostQuantum => {
                let recipient = envelope.require_key_id()?;
                let kem_bytes = envelope
                    .kem_ciphertext
                    .as_deref()
                    .ok_or_else(|| Error::MalformedEnvelope("missing kem_ciphertext".into()))?;
                let kem_ciphertext = Ciphertext::from_bytes(kem_bytes)?;

                let key_store = Arc::clone(ctx.key_store);
                let identity = ctx.local_identity.to_string();
                let shared_secret = tokio::task::spawn_blocking(move || -> Result<SharedSecret> {
                    let secret_key = key_store.get_secret_key(&identity)?;
                    Ok(kem::decapsulate(&secret_key, &kem_ciphertext)?)
                })
                .await??;

                let key = post_quantum_key(&shared_secret, recipient, kem_bytes)?;
                open_aead(&key, envelope)
            }
            CipherScheme::Plaintext => Ok(envelope.ciphertext.clone()),
        }
    }
}

fn session_id_for(request: &EncryptRequest) -> Result<String> {
    match &request.session_id {
        Some(id) if id.trim().is_empty() => {
            Err(Error::InvalidRequest("QKD session id must not be blank".into()))
        }
        Some(id) => Ok(id.clone()),
        None => {
            let id = Uuid::new_v4().to_string();
            debug!(session_id = %id, "allocated QKD session");
            Ok(id)
        }
    }
}

fn quantum_aes_key(material: &QkdKeyMaterial, session_id: &str) -> Result<SymmetricKey> {
    Ok(derive_symmetric_key(
        material.as_bytes(),
        domain::LEVEL2,
        &[session_id.as_bytes()],
    )?)
}

fn post_quantum_key(
    shared_secret: &SharedSecret,
    recipient: &str,
    kem_ciphertext: &[u8],
) -> Result<SymmetricKey> {
    Ok(derive_symmetric_key(
        shared_secret.as_bytes(),
        domain::LEVEL3,
        &[recipient.as_bytes(), kem_ciphertext],
    )?)
}

fn open_aead(key: &SymmetricKey, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
    let (nonce, tag) = match (envelope.nonce.as_deref(), envelope.tag.as_deref()) {
        (Some(nonce), Some(tag)) => (nonce, tag),
        _ => return Err(Error::MalformedEnvelope("missing nonce or tag".into())),
    };
    let aead: AeadAlgorithm = envelope.aead_algorithm();
    Ok(Aead::with_algorithm(aead).decrypt(
        key,
        nonce,
        &envelope.ciphertext,
        tag,
        &envelope.associated_data(),
    )?)
}
