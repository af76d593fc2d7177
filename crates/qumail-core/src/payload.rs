//! Mail-style message payload
//!
//! A body plus named attachments, serialized as JSON with base64 attachment
//! content. The orchestrator encrypts the serialized bytes like any other
//! plaintext.

use serde::{Deserialize, Serialize};

use crate::base64_serde;
use crate::error::{Error, Result};

/// File attached to a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name as given by the sender
    pub filename: String,
    /// Raw content
    #[serde(with = "base64_serde")]
    pub content: Vec<u8>,
}

/// Message body and attachments
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Text body
    pub body: String,
    /// Attachments
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessagePayload {
    /// Create a payload with a text body
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    /// Add an attachment
    pub fn with_attachment(mut self, filename: impl Into<String>, content: Vec<u8>) -> Self {
        self.attachments.push(Attachment {
            filename: filename.into(),
            content,
        });
        self
    }

    /// Total attachment size in bytes
    pub fn attachments_size(&self) -> usize {
        self.attachments.iter().map(|a| a.content.len()).sum()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Serialization(format!("invalid message payload: {}", e)))
    }
}
