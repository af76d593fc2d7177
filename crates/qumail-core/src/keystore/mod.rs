//! Local KEM key pairs at rest
//!
//! Each identity owns one Kyber-512 key pair. The secret key is sealed with
//! AES-256-GCM under a per-identity key derived from the caller's
//! [`StorageKey`], with the identity and algorithm bound as associated data,
//! so a record moved to another identity fails to open. Creation, rotation
//! and deletion are serialized per identity; distinct identities proceed in
//! parallel.

mod backend;
mod sled_backend;

pub use backend::{KeyStoreBackend, MemoryBackend};
pub use sled_backend::SledBackend;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use qumail_crypto::aead::{Aead, AeadAlgorithm, TAG_SIZE};
use qumail_crypto::kdf::{derive_symmetric_key, domain};
use qumail_crypto::kem::{self, KemAlgorithm, KeyPair, PublicKey, SecretKey};
use qumail_crypto::keys::SymmetricKey;

use crate::directory::normalize_identity;
use crate::error::{Error, Result};

/// Size of the at-rest master key
pub const STORAGE_KEY_SIZE: usize = 32;

/// Master key protecting records at rest, supplied by the caller
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct StorageKey([u8; STORAGE_KEY_SIZE]);

impl StorageKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; STORAGE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice, checking the length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; STORAGE_KEY_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidRequest(format!(
                "storage key must be {} bytes, got {}",
                STORAGE_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Generate a fresh random key
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; STORAGE_KEY_SIZE];
        OsRng.try_fill_bytes(&mut bytes).map_err(qumail_crypto::CryptoError::from)?;
        Ok(Self(bytes))
    }

    /// Key bytes
    pub fn as_bytes(&self) -> &[u8; STORAGE_KEY_SIZE] {
        &self.0
    }

    fn record_key(&self, identity: &str) -> Result<SymmetricKey> {
        Ok(derive_symmetric_key(&self.0, domain::KEYSTORE, &[identity.as_bytes()])?)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StorageKey([REDACTED])")
    }
}

/// Persisted form of one key pair
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyStoreRecord {
    /// Owning identity (normalized)
    pub identity: String,
    /// KEM algorithm
    pub algorithm: KemAlgorithm,
    /// Public key bytes
    pub public_key: Vec<u8>,
    /// Sealed secret key: ciphertext followed by the tag
    pub encrypted_secret_key: Vec<u8>,
    /// AEAD nonce
    pub nonce: Vec<u8>,
    /// Creation time of the key pair
    pub created_at: DateTime<Utc>,
}

fn record_aad(identity: &str, algorithm: KemAlgorithm) -> Vec<u8> {
    let mut aad = Vec::with_capacity(identity.len() + 16);
    aad.extend_from_slice(identity.as_bytes());
    aad.push(0);
    aad.extend_from_slice(algorithm.as_str().as_bytes());
    aad
}

/// Key store service
pub struct KeyStore {
    backend: Arc<dyn KeyStoreBackend>,
    storage_key: StorageKey,
    locks: DashMap<String, Arc<Mutex<()>>>,
    cipher: Aead,
}

impl KeyStore {
    /// Create a key store over `backend`
    pub fn new(backend: Arc<dyn KeyStoreBackend>, storage_key: StorageKey) -> Self {
        Self {
            backend,
            storage_key,
            locks: DashMap::new(),
            cipher: Aead::with_algorithm(AeadAlgorithm::Aes256Gcm),
        }
    }

    /// Key store backed by memory only
    pub fn in_memory(storage_key: StorageKey) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), storage_key)
    }

    fn lock_for(&self, identity: &str) -> Arc<Mutex<()>> {
        self.locks.entry(identity.to_string()).or_default().clone()
    }

    /// Return the stored key pair for `identity`, creating it on first use
    pub fn get_or_create_key_pair(&self, identity: &str) -> Result<KeyPair> {
        let identity = normalize_identity(identity);
        let lock = self.lock_for(&identity);
        let _guard = lock.lock();

        if let Some(bytes) = self.backend.load(&identity)? {
            debug!(identity = %identity, "loaded key pair");
            return self.open_record(&identity, &bytes);
        }

        let key_pair = kem::keypair()?;
        self.persist(&identity, &key_pair)?;
        info!(identity = %identity, fingerprint = %key_pair.public_key.fingerprint(), "created key pair");
        Ok(key_pair)
    }

    /// Replace the key pair for `identity`
    ///
    /// The new record replaces the old one in a single store, so a failed
    /// write leaves the previous pair in place. An identity without a record
    /// simply gets its first pair.
    pub fn rotate(&self, identity: &str) -> Result<KeyPair> {
        let identity = normalize_identity(identity);
        let lock = self.lock_for(&identity);
        let _guard = lock.lock();

        let key_pair = kem::keypair()?;
        self.persist(&identity, &key_pair)?;

        info!(identity = %identity, fingerprint = %key_pair.public_key.fingerprint(), "rotated key pair");
        Ok(key_pair)
    }

    /// Decrypt the stored secret key for `identity`
    pub fn get_secret_key(&self, identity: &str) -> Result<SecretKey> {
        let identity = normalize_identity(identity);
        if self.backend.load(&identity)?.is_none() {
            return Err(Error::KeyNotFound(identity));
        }

        let lock = self.lock_for(&identity);
        let _guard = lock.lock();

        let bytes = self
            .backend
            .load(&identity)?
            .ok_or_else(|| Error::KeyNotFound(identity.clone()))?;
        let key_pair = self.open_record(&identity, &bytes)?;
        Ok(key_pair.secret_key)
    }

    /// Public key for `identity`, if it has a record
    ///
    /// Reads the cleartext public key without opening the sealed secret.
    pub fn public_key(&self, identity: &str) -> Result<Option<PublicKey>> {
        let identity = normalize_identity(identity);
        let Some(bytes) = self.backend.load(&identity)? else {
            return Ok(None);
        };
        let record = self.decode_record(&identity, &bytes)?;
        PublicKey::from_bytes(&record.public_key)
            .map(Some)
            .map_err(|_| self.corruption(&identity, "invalid public key"))
    }

    /// Remove the key pair for `identity`, zero-overwriting it first
    pub fn delete(&self, identity: &str) -> Result<bool> {
        let identity = normalize_identity(identity);
        let lock = self.lock_for(&identity);
        let _guard = lock.lock();

        self.backend.wipe(&identity)?;
        let removed = self.backend.remove(&identity)?;
        if removed {
            info!(identity = %identity, "deleted key pair");
        }

        // Only this call holds the lock: the map entry and `lock`.
        self.locks
            .remove_if(&identity, |_, entry| Arc::strong_count(entry) == 2);
        Ok(removed)
    }

    /// Identities with a stored key pair
    pub fn identities(&self) -> Result<Vec<String>> {
        self.backend.identities()
    }

    fn persist(&self, identity: &str, key_pair: &KeyPair) -> Result<()> {
        let record = self.seal_record(identity, key_pair)?;
        let bytes = bincode::serialize(&record)?;
        self.backend.store(identity, bytes)
    }

    fn seal_record(&self, identity: &str, key_pair: &KeyPair) -> Result<KeyStoreRecord> {
        let key = self.storage_key.record_key(identity)?;
        let aad = record_aad(identity, key_pair.algorithm);
        let sealed = self
            .cipher
            .encrypt(&key, key_pair.secret_key.as_bytes(), &aad)?;

        let mut encrypted_secret_key = sealed.ciphertext;
        encrypted_secret_key.extend_from_slice(&sealed.tag);

        Ok(KeyStoreRecord {
            identity: identity.to_string(),
            algorithm: key_pair.algorithm,
            public_key: key_pair.public_key.as_bytes().to_vec(),
            encrypted_secret_key,
            nonce: sealed.nonce.to_vec(),
            created_at: key_pair.created_at,
        })
    }

    fn decode_record(&self, identity: &str, bytes: &[u8]) -> Result<KeyStoreRecord> {
        let record: KeyStoreRecord = bincode::deserialize(bytes)
            .map_err(|_| self.corruption(identity, "undecodable record"))?;
        if record.identity != identity {
            return Err(self.corruption(identity, "record belongs to another identity"));
        }
        Ok(record)
    }

    fn open_record(&self, identity: &str, bytes: &[u8]) -> Result<KeyPair> {
        let record = self.decode_record(identity, bytes)?;

        let sealed = &record.encrypted_secret_key;
        if sealed.len() < TAG_SIZE {
            return Err(self.corruption(identity, "truncated secret key"));
        }
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let key = self.storage_key.record_key(identity)?;
        let aad = record_aad(identity, record.algorithm);
        let secret = Zeroizing::new(
            self.cipher
                .decrypt(&key, &record.nonce, ciphertext, tag, &aad)
                .map_err(|_| self.corruption(identity, "secret key failed authentication"))?,
        );

        let secret_key = SecretKey::from_bytes(&secret)
            .map_err(|_| self.corruption(identity, "invalid secret key"))?;
        let key_pair = KeyPair::from_secret_key(secret_key, record.created_at)
            .map_err(|_| self.corruption(identity, "invalid embedded public key"))?;

        if key_pair.public_key.as_bytes() != record.public_key.as_slice() {
            return Err(self.corruption(identity, "public key does not match secret key"));
        }
        Ok(key_pair)
    }

    fn corruption(&self, identity: &str, reason: &str) -> Error {
        warn!(identity, reason, "key store record unreadable");
        Error::StoreCorruption(identity.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn store() -> KeyStore {
        KeyStore::in_memory(StorageKey::from_bytes([0x42; STORAGE_KEY_SIZE]))
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let ks = store();
        let first = ks.get_or_create_key_pair("alice@example.com").unwrap();
        let second = ks.get_or_create_key_pair(" Alice@Example.com").unwrap();

        assert_eq!(first.public_key, second.public_key);
        assert_eq!(first.secret_key.as_bytes(), second.secret_key.as_bytes());
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(ks.identities().unwrap(), vec!["alice@example.com".to_string()]);
    }

    #[test]
    fn test_rotate_replaces_pair() {
        let ks = store();
        let old = ks.get_or_create_key_pair("alice").unwrap();
        let new = ks.rotate("alice").unwrap();
        assert_ne!(old.public_key, new.public_key);

        let current = ks.get_or_create_key_pair("alice").unwrap();
        assert_eq!(current.public_key, new.public_key);
        assert_eq!(ks.public_key("alice").unwrap(), Some(new.public_key));
    }

    #[test]
    fn test_secret_key_and_missing_identity() {
        let ks = store();
        let kp = ks.get_or_create_key_pair("alice").unwrap();
        let sk = ks.get_secret_key("alice").unwrap();
        assert_eq!(sk.as_bytes(), kp.secret_key.as_bytes());

        let err = ks.get_secret_key("bob").unwrap_err();
        assert_eq!(err.kind(), FailureKind::KeyNotFoundFailure);
        assert_eq!(ks.public_key("bob").unwrap(), None);
    }

    #[test]
    fn test_delete() {
        let ks = store();
        ks.get_or_create_key_pair("alice").unwrap();
        assert!(ks.delete("alice").unwrap());
        assert!(!ks.delete("alice").unwrap());
        assert!(matches!(ks.get_secret_key("alice"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_lock_entries_do_not_accumulate() {
        let ks = store();
        for i in 0..16 {
            let _ = ks.get_secret_key(&format!("stranger-{}@example.com", i));
        }
        assert!(ks.locks.is_empty());

        ks.get_or_create_key_pair("alice").unwrap();
        ks.get_secret_key("alice").unwrap();
        assert_eq!(ks.locks.len(), 1);

        ks.delete("alice").unwrap();
        assert!(ks.locks.is_empty());
    }

    /// Memory backend whose writes can be switched off
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_writes: AtomicBool,
    }

    impl KeyStoreBackend for FlakyBackend {
        fn load(&self, identity: &str) -> Result<Option<Vec<u8>>> {
            self.inner.load(identity)
        }

        fn store(&self, identity: &str, record: Vec<u8>) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".into()));
            }
            self.inner.store(identity, record)
        }

        fn wipe(&self, identity: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".into()));
            }
            self.inner.wipe(identity)
        }

        fn remove(&self, identity: &str) -> Result<bool> {
            self.inner.remove(identity)
        }

        fn identities(&self) -> Result<Vec<String>> {
            self.inner.identities()
        }
    }

    #[test]
    fn test_failed_rotation_keeps_old_pair() {
        let backend = Arc::new(FlakyBackend::default());
        let ks = KeyStore::new(backend.clone(), StorageKey::from_bytes([6; 32]));
        let old = ks.get_or_create_key_pair("alice").unwrap();

        backend.fail_writes.store(true, Ordering::SeqCst);
        let err = ks.rotate("alice").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unavailable);

        let sk = ks.get_secret_key("alice").unwrap();
        assert_eq!(sk.as_bytes(), old.secret_key.as_bytes());
        assert_eq!(ks.public_key("alice").unwrap(), Some(old.public_key));

        backend.fail_writes.store(false, Ordering::SeqCst);
        let new = ks.rotate("alice").unwrap();
        assert_eq!(ks.public_key("alice").unwrap(), Some(new.public_key));
    }

    #[test]
    fn test_wrong_storage_key_is_corruption() {
        let backend: Arc<dyn KeyStoreBackend> = Arc::new(MemoryBackend::new());
        let writer = KeyStore::new(Arc::clone(&backend), StorageKey::from_bytes([1; 32]));
        writer.get_or_create_key_pair("alice").unwrap();

        let reader = KeyStore::new(backend, StorageKey::from_bytes([2; 32]));
        let err = reader.get_secret_key("alice").unwrap_err();
        assert_eq!(err.kind(), FailureKind::StoreCorruptionFailure);
    }

    #[test]
    fn test_tampered_and_wiped_records_are_corruption() {
        let backend = Arc::new(MemoryBackend::new());
        let ks = KeyStore::new(backend.clone(), StorageKey::from_bytes([3; 32]));
        ks.get_or_create_key_pair("alice").unwrap();

        let bytes = backend.load("alice").unwrap().unwrap();
        let mut record: KeyStoreRecord = bincode::deserialize(&bytes).unwrap();
        record.encrypted_secret_key[10] ^= 0x01;
        backend.store("alice", bincode::serialize(&record).unwrap()).unwrap();
        assert!(matches!(ks.get_secret_key("alice"), Err(Error::StoreCorruption(_))));

        backend.wipe("alice").unwrap();
        assert!(matches!(ks.get_secret_key("alice"), Err(Error::StoreCorruption(_))));
        assert!(matches!(ks.get_or_create_key_pair("alice"), Err(Error::StoreCorruption(_))));

        // rotation recovers
        ks.rotate("alice").unwrap();
        assert!(ks.get_secret_key("alice").is_ok());
    }

    #[test]
    fn test_record_bound_to_identity() {
        let backend = Arc::new(MemoryBackend::new());
        let ks = KeyStore::new(backend.clone(), StorageKey::from_bytes([4; 32]));
        ks.get_or_create_key_pair("alice").unwrap();

        let alice_record = backend.load("alice").unwrap().unwrap();
        backend.store("mallory", alice_record).unwrap();
        assert!(matches!(ks.get_secret_key("mallory"), Err(Error::StoreCorruption(_))));
    }

    #[test]
    fn test_concurrent_creation_yields_one_pair() {
        let ks = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ks = Arc::clone(&ks);
                thread::spawn(move || {
                    ks.get_or_create_key_pair("carol@example.com")
                        .unwrap()
                        .public_key
                })
            })
            .collect();

        let keys: Vec<PublicKey> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_storage_key_from_slice() {
        assert!(StorageKey::from_slice(&[0u8; 31]).is_err());
        assert!(StorageKey::from_slice(&[0u8; 32]).is_ok());
        assert_eq!(format!("{:?}", StorageKey::generate().unwrap()), "StorageKey([REDACTED])");
    }
}
