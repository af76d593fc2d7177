//! Envelope codec
//!
//! JSON wire format shared by all levels. Byte fields are base64, absent
//! fields are omitted, and unknown fields, versions or levels are rejected.
//! Validation runs on both encode and decode so an envelope that violates the
//! per-level field rules never reaches a cipher.

use serde::{Deserialize, Serialize};
use tracing::warn;

use qumail_crypto::aead::{AeadAlgorithm, SealedPayload, NONCE_SIZE, TAG_SIZE};
use qumail_crypto::kem::CIPHERTEXT_SIZE;

use crate::base64_serde;
use crate::error::{Error, Result};
use crate::level::SecurityLevel;

/// Current envelope version
pub const ENVELOPE_VERSION: &str = "qumail/1";

/// On-wire encrypted message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedEnvelope {
    /// Format version
    pub version: String,
    /// Protection level
    pub level: SecurityLevel,
    /// Kyber-512 ciphertext (level 3)
    #[serde(default, with = "base64_serde::option", skip_serializing_if = "Option::is_none")]
    pub kem_ciphertext: Option<Vec<u8>>,
    /// AEAD nonce (levels 2 and 3)
    #[serde(default, with = "base64_serde::option", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Vec<u8>>,
    /// Ciphertext, or the message itself at level 4
    #[serde(with = "base64_serde")]
    pub ciphertext: Vec<u8>,
    /// AEAD tag (levels 2 and 3)
    #[serde(default, with = "base64_serde::option", skip_serializing_if = "Option::is_none")]
    pub tag: Option<Vec<u8>>,
    /// QKD session id (levels 1 and 2) or recipient identity (level 3)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// AEAD algorithm (levels 2 and 3, AES-256-GCM when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aead: Option<AeadAlgorithm>,
}

impl EncryptedEnvelope {
    /// Level 4 envelope: the message travels unprotected
    pub fn plaintext(message: Vec<u8>) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            level: SecurityLevel::Plaintext,
            kem_ciphertext: None,
            nonce: None,
            ciphertext: message,
            tag: None,
            key_id: None,
            aead: None,
        }
    }

    /// Level 1 envelope
    pub fn one_time_pad(session_id: impl Into<String>, ciphertext: Vec<u8>) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            level: SecurityLevel::QuantumOtp,
            kem_ciphertext: None,
            nonce: None,
            ciphertext,
            tag: None,
            key_id: Some(session_id.into()),
            aead: None,
        }
    }

    /// Level 2 or 3 envelope around an AEAD output
    pub fn sealed(
        level: SecurityLevel,
        key_id: impl Into<String>,
        aead: AeadAlgorithm,
        kem_ciphertext: Option<Vec<u8>>,
        payload: SealedPayload,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            level,
            kem_ciphertext,
            nonce: Some(payload.nonce.to_vec()),
            ciphertext: payload.ciphertext,
            tag: Some(payload.tag.to_vec()),
            key_id: Some(key_id.into()),
            aead: Some(aead),
        }
    }

    /// AEAD algorithm in effect for levels 2 and 3
    pub fn aead_algorithm(&self) -> AeadAlgorithm {
        self.aead.unwrap_or_default()
    }

    /// Key id, required for levels 1 to 3
    pub fn require_key_id(&self) -> Result<&str> {
        self.key_id
            .as_deref()
            .ok_or_else(|| Error::MalformedEnvelope(format!("level {} requires key_id", self.level)))
    }

    /// Canonical header bytes bound into the AEAD tag
    pub fn associated_data(&self) -> Vec<u8> {
        associated_data_for(
            self.level,
            self.key_id.as_deref(),
            self.aead_algorithm(),
            self.kem_ciphertext.as_deref(),
        )
    }

    /// Check version and the per-level field rules
    pub fn validate(&self) -> Result<()> {
        if self.version != ENVELOPE_VERSION {
            return Err(Error::MalformedEnvelope(format!(
                "unsupported version {}",
                self.version
            )));
        }

        let level = self.level;
        let expect_absent = |present: bool, field: &str| -> Result<()> {
            if present {
                Err(Error::MalformedEnvelope(format!(
                    "field {} not allowed at level {}",
                    field,
                    level.as_u8()
                )))
            } else {
                Ok(())
            }
        };

        match level {
            SecurityLevel::Plaintext => {
                expect_absent(self.kem_ciphertext.is_some(), "kem_ciphertext")?;
                expect_absent(self.nonce.is_some(), "nonce")?;
                expect_absent(self.tag.is_some(), "tag")?;
                expect_absent(self.key_id.is_some(), "key_id")?;
                expect_absent(self.aead.is_some(), "aead")?;
            }
            SecurityLevel::QuantumOtp => {
                self.check_key_id()?;
                expect_absent(self.kem_ciphertext.is_some(), "kem_ciphertext")?;
                expect_absent(self.nonce.is_some(), "nonce")?;
                expect_absent(self.tag.is_some(), "tag")?;
                expect_absent(self.aead.is_some(), "aead")?;
            }
            SecurityLevel::QuantumAes => {
                self.check_key_id()?;
                self.check_nonce_and_tag()?;
                expect_absent(self.kem_ciphertext.is_some(), "kem_ciphertext")?;
            }
            SecurityLevel::PostQuantum => {
                self.check_key_id()?;
                self.check_nonce_and_tag()?;
                check_len("kem_ciphertext", self.kem_ciphertext.as_deref(), CIPHERTEXT_SIZE)?;
            }
        }
        Ok(())
    }

    fn check_key_id(&self) -> Result<()> {
        match self.key_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(()),
            _ => Err(Error::MalformedEnvelope(format!(
                "level {} requires key_id",
                self.level.as_u8()
            ))),
        }
    }

    fn check_nonce_and_tag(&self) -> Result<()> {
        check_len("nonce", self.nonce.as_deref(), NONCE_SIZE)?;
        check_len("tag", self.tag.as_deref(), TAG_SIZE)
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        self.validate()?;
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        decode(json.as_bytes())
    }
}

fn check_len(field: &str, value: Option<&[u8]>, expected: usize) -> Result<()> {
    match value {
        Some(bytes) if bytes.len() == expected => Ok(()),
        Some(bytes) => Err(Error::MalformedEnvelope(format!(
            "{} must be {} bytes, got {}",
            field,
            expected,
            bytes.len()
        ))),
        None => Err(Error::MalformedEnvelope(format!("missing {}", field))),
    }
}

/// Header bytes bound into the AEAD tag, computed before the payload exists
///
/// Each variable-length field is prefixed with its length as a big-endian
/// u32.
pub fn associated_data_for(
    level: SecurityLevel,
    key_id: Option<&str>,
    aead: AeadAlgorithm,
    kem_ciphertext: Option<&[u8]>,
) -> Vec<u8> {
    fn push(out: &mut Vec<u8>, bytes: &[u8]) {
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(bytes);
    }

    let mut out = Vec::with_capacity(64 + kem_ciphertext.map_or(0, <[u8]>::len));
    push(&mut out, ENVELOPE_VERSION.as_bytes());
    out.push(level.as_u8());
    push(&mut out, key_id.unwrap_or_default().as_bytes());
    push(&mut out, aead.as_str().as_bytes());
    push(&mut out, kem_ciphertext.unwrap_or_default());
    out
}

/// Serialize an envelope to JSON bytes
pub fn encode(envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
    envelope.validate()?;
    Ok(serde_json::to_vec(envelope)?)
}

/// Parse and validate JSON bytes
pub fn decode(bytes: &[u8]) -> Result<EncryptedEnvelope> {
    let envelope: EncryptedEnvelope = serde_json::from_slice(bytes).map_err(|e| {
        warn!(error = %e, "rejected envelope");
        Error::MalformedEnvelope(e.to_string())
    })?;

    if let Err(e) = envelope.validate() {
        warn!(level = envelope.level.as_u8(), error = %e, "rejected envelope");
        return Err(e);
    }
    Ok(envelope)
}
