//! Public key directory interface
//!
//! The directory maps an identity (an email address) to its published
//! Kyber-512 public key. Entries are returned as raw bytes; callers validate
//! them with [`DirectoryEntry::public_key`] before encapsulating.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use qumail_crypto::kem::PublicKey;

use crate::error::{Error, Result};

/// Canonical form of an identity: trimmed and lowercased
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// One directory record
#[derive(Clone, Debug)]
pub struct DirectoryEntry {
    /// Normalized identity
    pub identity: String,
    /// Published key bytes, unvalidated
    pub public_key: Vec<u8>,
    /// When the entry was fetched
    pub fetched_at: DateTime<Utc>,
}

impl DirectoryEntry {
    /// Validate the published bytes as a Kyber-512 public key
    pub fn public_key(&self) -> Result<PublicKey> {
        Ok(PublicKey::from_bytes(&self.public_key)?)
    }
}

/// Lookup of recipient public keys
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetch the entry for `identity`; a miss is [`Error::KeyNotFound`]
    async fn lookup(&self, identity: &str) -> Result<DirectoryEntry>;
}

/// In-process directory
pub struct MemoryDirectory {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    delay: Option<Duration>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            delay: None,
        }
    }

    /// Delay every lookup, to exercise caller timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Publish a public key for `identity`, replacing any previous one
    pub fn publish(&self, identity: &str, public_key: &PublicKey) {
        self.publish_raw(identity, public_key.as_bytes().to_vec());
        info!(identity = %normalize_identity(identity), fingerprint = %public_key.fingerprint(), "published public key");
    }

    /// Publish arbitrary bytes without validation
    pub fn publish_raw(&self, identity: &str, bytes: Vec<u8>) {
        self.entries.write().insert(normalize_identity(identity), bytes);
    }

    /// Remove an identity
    pub fn remove(&self, identity: &str) -> bool {
        self.entries.write().remove(&normalize_identity(identity)).is_some()
    }

    /// Number of published identities
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn lookup(&self, identity: &str) -> Result<DirectoryEntry> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let identity = normalize_identity(identity);
        let public_key = self
            .entries
            .read()
            .get(&identity)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(identity.clone()))?;

        debug!(identity = %identity, "directory hit");
        Ok(DirectoryEntry {
            identity,
            public_key,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use qumail_crypto::kem;

    #[tokio::test]
    async fn test_publish_and_lookup_normalized() {
        let directory = MemoryDirectory::new();
        let kp = kem::keypair().unwrap();
        directory.publish("  Bob@Example.com ", &kp.public_key);

        let entry = directory.lookup("bob@example.COM").await.unwrap();
        assert_eq!(entry.identity, "bob@example.com");
        assert_eq!(entry.public_key().unwrap(), kp.public_key);
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_miss_is_key_not_found() {
        let directory = MemoryDirectory::new();
        let err = directory.lookup("nobody@example.com").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::KeyNotFoundFailure);
    }

    #[tokio::test]
    async fn test_malformed_key_is_encapsulation_failure() {
        let directory = MemoryDirectory::new();
        directory.publish_raw("mallory@example.com", vec![0u8; 12]);

        let entry = directory.lookup("mallory@example.com").await.unwrap();
        assert_eq!(entry.public_key().unwrap_err().kind(), FailureKind::EncapsulationFailure);
    }

    #[test]
    fn test_remove() {
        let directory = MemoryDirectory::new();
        directory.publish_raw("a@b.c", vec![1]);
        assert!(directory.remove("A@B.C"));
        assert!(!directory.remove("a@b.c"));
        assert!(directory.is_empty());
    }
}
