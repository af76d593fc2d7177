//! Sled-based persistent key store backend

use std::path::Path;
use tracing::debug;

use super::backend::KeyStoreBackend;
use crate::error::{Error, Result};

const TREE_NAME: &str = "keystore";

/// Key records in a sled tree
pub struct SledBackend {
    tree: sled::Tree,
}

impl SledBackend {
    /// Open or create a database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::with_db(&db)
    }

    /// Use the key store tree of an already open database
    pub fn with_db(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { tree })
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}

impl KeyStoreBackend for SledBackend {
    fn load(&self, identity: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(identity)?.map(|v| v.to_vec()))
    }

    fn store(&self, identity: &str, record: Vec<u8>) -> Result<()> {
        self.tree.insert(identity, record)?;
        self.flush()?;
        debug!(identity, "stored key record");
        Ok(())
    }

    fn wipe(&self, identity: &str) -> Result<()> {
        if let Some(existing) = self.tree.get(identity)? {
            self.tree.insert(identity, vec![0u8; existing.len()])?;
            self.flush()?;
        }
        Ok(())
    }

    fn remove(&self, identity: &str) -> Result<bool> {
        self.wipe(identity)?;
        let removed = self.tree.remove(identity)?.is_some();
        self.flush()?;
        Ok(removed)
    }

    fn identities(&self) -> Result<Vec<String>> {
        self.tree
            .iter()
            .keys()
            .map(|key| {
                let key = key?;
                String::from_utf8(key.to_vec())
                    .map_err(|e| Error::Storage(format!("invalid identity key: {}", e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sled_backend_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys");

        {
            let backend = SledBackend::open(&path).unwrap();
            backend.store("alice", vec![9; 16]).unwrap();
            backend.store("bob", vec![8; 16]).unwrap();
        }

        let backend = SledBackend::open(&path).unwrap();
        assert_eq!(backend.load("alice").unwrap(), Some(vec![9; 16]));
        assert_eq!(backend.identities().unwrap(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn test_sled_wipe_and_remove() {
        let dir = TempDir::new().unwrap();
        let backend = SledBackend::open(dir.path().join("keys")).unwrap();

        backend.store("alice", vec![7; 4]).unwrap();
        backend.wipe("alice").unwrap();
        assert_eq!(backend.load("alice").unwrap(), Some(vec![0; 4]));

        assert!(backend.remove("alice").unwrap());
        assert_eq!(backend.load("alice").unwrap(), None);
        assert!(!backend.remove("alice").unwrap());
    }
}
