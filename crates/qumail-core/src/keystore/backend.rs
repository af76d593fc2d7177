//! Key store backends

use parking_lot::RwLock;
use std::collections::HashMap;
use zeroize::Zeroize;

use crate::error::Result;

/// Byte-level persistence for sealed key records
///
/// Backends never see plaintext secret keys; records arrive already sealed.
pub trait KeyStoreBackend: Send + Sync {
    /// Load the record for `identity`
    fn load(&self, identity: &str) -> Result<Option<Vec<u8>>>;

    /// Store (or replace) the record for `identity`
    fn store(&self, identity: &str, record: Vec<u8>) -> Result<()>;

    /// Overwrite the stored record with zeros of the same length
    fn wipe(&self, identity: &str) -> Result<()>;

    /// Remove the record; returns whether one existed
    fn remove(&self, identity: &str) -> Result<bool>;

    /// All identities with a record
    fn identities(&self) -> Result<Vec<String>>;
}

/// In-memory backend (for testing and ephemeral sessions)
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStoreBackend for MemoryBackend {
    fn load(&self, identity: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().get(identity).cloned())
    }

    fn store(&self, identity: &str, record: Vec<u8>) -> Result<()> {
        if let Some(mut old) = self.records.write().insert(identity.to_string(), record) {
            old.zeroize();
        }
        Ok(())
    }

    fn wipe(&self, identity: &str) -> Result<()> {
        if let Some(record) = self.records.write().get_mut(identity) {
            record.iter_mut().for_each(|b| *b = 0);
        }
        Ok(())
    }

    fn remove(&self, identity: &str) -> Result<bool> {
        match self.records.write().remove(identity) {
            Some(mut record) => {
                record.zeroize();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn identities(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl Drop for MemoryBackend {
    fn drop(&mut self) {
        for record in self.records.get_mut().values_mut() {
            record.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        backend.store("bob", vec![1, 2, 3]).unwrap();
        assert_eq!(backend.load("bob").unwrap(), Some(vec![1, 2, 3]));

        backend.wipe("bob").unwrap();
        assert_eq!(backend.load("bob").unwrap(), Some(vec![0, 0, 0]));

        assert_eq!(backend.identities().unwrap(), vec!["bob".to_string()]);
        assert!(backend.remove("bob").unwrap());
        assert!(!backend.remove("bob").unwrap());
        assert_eq!(backend.load("bob").unwrap(), None);
    }
}
