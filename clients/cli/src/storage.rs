//! Local storage for CLI client
//!
//! One sled database holds the key store, a local public key directory and a
//! QKD simulator pool, so several identities on one machine can exchange
//! messages at every level.

use async_trait::async_trait;
use chrono::Utc;
use sled::{Db, Tree};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

use qumail_core::directory::normalize_identity;
use qumail_core::error::{Error, Result};
use qumail_core::keystore::{KeyStore, SledBackend, StorageKey};
use qumail_core::{DirectoryClient, DirectoryEntry, QkdClient, QkdKeyMaterial, QkdSession};
use qumail_crypto::kem::PublicKey;

const STORAGE_KEY_FILE: &str = "storage.key";
const DIRECTORY_TREE: &str = "directory";
const QKD_SESSION_TREE: &str = "qkd_sessions";
const CLAIM_ATTEMPTS: usize = 8;

/// Local storage for CLI
pub struct LocalStorage {
    db: Db,
    root: PathBuf,
}

impl LocalStorage {
    /// Open storage at path
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let db = sled::open(root.join("db"))?;
        Ok(Self { db, root })
    }

    /// Load the at-rest key, creating it on first use
    pub fn storage_key(&self) -> anyhow::Result<StorageKey> {
        let path = self.root.join(STORAGE_KEY_FILE);
        if path.exists() {
            let bytes = Zeroizing::new(std::fs::read(&path)?);
            return Ok(StorageKey::from_slice(&bytes)?);
        }

        let key = StorageKey::generate()?;
        write_private(&path, key.as_bytes())?;
        info!(path = %path.display(), "created storage key");
        Ok(key)
    }

    /// Key store over this database
    pub fn key_store(&self) -> anyhow::Result<KeyStore> {
        let backend = SledBackend::with_db(&self.db)?;
        Ok(KeyStore::new(std::sync::Arc::new(backend), self.storage_key()?))
    }

    /// Local public key directory
    pub fn directory(&self) -> anyhow::Result<SledDirectory> {
        Ok(SledDirectory {
            tree: self.db.open_tree(DIRECTORY_TREE)?,
        })
    }

    /// QKD simulator endpoint for `party`
    pub fn qkd_endpoint(&self, party: &str) -> anyhow::Result<SledQkdEndpoint> {
        Ok(SledQkdEndpoint {
            party: normalize_identity(party),
            sessions: self.db.open_tree(QKD_SESSION_TREE)?,
        })
    }
}

/// Create `path` readable by the owner only
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Public key directory persisted in a sled tree
pub struct SledDirectory {
    tree: Tree,
}

impl SledDirectory {
    /// Publish `public_key` for `identity`, replacing any previous entry
    pub fn publish(&self, identity: &str, public_key: &PublicKey) -> Result<()> {
        let identity = normalize_identity(identity);
        self.tree.insert(identity.as_bytes(), public_key.as_bytes())?;
        self.tree.flush()?;
        info!(identity = %identity, fingerprint = %public_key.fingerprint(), "published public key");
        Ok(())
    }

    /// Remove `identity`; returns whether it was listed
    pub fn remove(&self, identity: &str) -> Result<bool> {
        let removed = self.tree.remove(normalize_identity(identity))?.is_some();
        self.tree.flush()?;
        Ok(removed)
    }

    /// All listed identities with their key fingerprints
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        self.tree
            .iter()
            .map(|entry| -> Result<(String, String)> {
                let (key, value) = entry?;
                let identity = String::from_utf8_lossy(&key).to_string();
                let fingerprint = PublicKey::from_bytes(&value)
                    .map(|pk| pk.fingerprint())
                    .unwrap_or_else(|_| "invalid key".to_string());
                Ok((identity, fingerprint))
            })
            .collect()
    }
}

#[async_trait]
impl DirectoryClient for SledDirectory {
    async fn lookup(&self, identity: &str) -> Result<DirectoryEntry> {
        let identity = normalize_identity(identity);
        let public_key = self
            .tree
            .get(identity.as_bytes())?
            .ok_or_else(|| Error::KeyNotFound(identity.clone()))?
            .to_vec();

        Ok(DirectoryEntry {
            identity,
            public_key,
            fetched_at: Utc::now(),
        })
    }
}

/// QKD simulator shared by every identity using the same storage
///
/// The first fetch of a session fills it from the OS RNG; each of its two
/// ends may then read it once, after which the stored material is replaced
/// by a retired marker. Every update is a compare-and-swap on the session
/// record.
pub struct SledQkdEndpoint {
    party: String,
    sessions: Tree,
}

#[async_trait]
impl QkdClient for SledQkdEndpoint {
    async fn fetch_key(&self, session_id: &str, length: usize) -> Result<QkdKeyMaterial> {
        for _ in 0..CLAIM_ATTEMPTS {
            let current = self.sessions.get(session_id)?;
            let mut session = match &current {
                Some(bytes) => bincode::deserialize::<QkdSession>(bytes)?,
                None => QkdSession::generate(length)?,
            };
            let material = session.claim(session_id, &self.party, length)?;
            let updated = Zeroizing::new(bincode::serialize(&session)?);

            match self
                .sessions
                .compare_and_swap(session_id, current.as_ref(), Some(updated.as_slice()))?
            {
                Ok(()) => {
                    self.sessions.flush()?;
                    debug!(party = %self.party, session_id, length, "QKD key delivered");
                    return Ok(material);
                }
                Err(_) => debug!(party = %self.party, session_id, "QKD session changed, retrying"),
            }
        }

        Err(Error::QkdUnavailable(format!(
            "session {} is contended",
            session_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qumail_core::keystore::STORAGE_KEY_SIZE;
    use qumail_core::FailureKind;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_storage_key_is_stable() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();

        let first = storage.storage_key().unwrap();
        let second = storage.storage_key().unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        let on_disk = std::fs::metadata(dir.path().join(STORAGE_KEY_FILE)).unwrap();
        assert_eq!(on_disk.len(), STORAGE_KEY_SIZE as u64);
    }

    #[tokio::test]
    async fn test_directory_publish_lookup_remove() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let directory = storage.directory().unwrap();
        let key_store = storage.key_store().unwrap();

        let kp = key_store.get_or_create_key_pair("bob@example.com").unwrap();
        directory.publish("Bob@Example.com", &kp.public_key).unwrap();

        let entry = directory.lookup("bob@example.com").await.unwrap();
        assert_eq!(entry.public_key().unwrap(), kp.public_key);
        assert_eq!(directory.list().unwrap().len(), 1);

        assert!(directory.remove("bob@example.com").unwrap());
        let err = directory.lookup("bob@example.com").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::KeyNotFoundFailure);
    }

    #[cfg(unix)]
    #[test]
    fn test_storage_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.storage_key().unwrap();

        let mode = std::fs::metadata(dir.path().join(STORAGE_KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_qkd_endpoint_single_use_per_party() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let alice = storage.qkd_endpoint("alice").unwrap();
        let bob = storage.qkd_endpoint("bob").unwrap();

        let a = alice.fetch_key("s1", 24).await.unwrap();
        let err = alice.fetch_key("s1", 24).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::KeyExhaustedFailure);

        let err = bob.fetch_key("s1", 8).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unavailable);

        let b = bob.fetch_key("s1", 24).await.unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[tokio::test]
    async fn test_qkd_session_retired_after_both_ends() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let alice = storage.qkd_endpoint("alice").unwrap();

        alice.fetch_key("s1", 24).await.unwrap();
        storage.qkd_endpoint("bob").unwrap().fetch_key("s1", 24).await.unwrap();

        let stored = alice.sessions.get("s1").unwrap().unwrap();
        let session: QkdSession = bincode::deserialize(&stored).unwrap();
        assert!(session.is_retired());
        assert!(format!("{:?}", session).contains("len: 0"));

        let err = storage
            .qkd_endpoint("carol")
            .unwrap()
            .fetch_key("s1", 24)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::KeyExhaustedFailure);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_qkd_concurrent_fetches_by_one_party() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let endpoint = Arc::new(storage.qkd_endpoint("alice").unwrap());

        for round in 0..50 {
            let session_id = format!("race-{}", round);
            let barrier = Arc::new(tokio::sync::Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let endpoint = Arc::clone(&endpoint);
                    let barrier = Arc::clone(&barrier);
                    let session_id = session_id.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        endpoint.fetch_key(&session_id, 16).await
                    })
                })
                .collect();

            let mut delivered = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => delivered += 1,
                    Err(e) => assert_eq!(e.kind(), FailureKind::KeyExhaustedFailure),
                }
            }
            assert_eq!(delivered, 1, "round {}", round);
        }
    }
}
