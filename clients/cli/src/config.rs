//! CLI configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use qumail_core::{OrchestratorConfig, SecurityLevel};

/// CLI configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Storage path
    pub storage_path: PathBuf,
    /// Local identity (email address)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Level used when `encrypt` is not given one
    pub default_level: SecurityLevel,
    /// Orchestrator settings
    pub orchestrator: OrchestratorConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        let storage_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qumail");

        Self {
            storage_path,
            identity: None,
            default_level: SecurityLevel::PostQuantum,
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load config from file or create default
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: CliConfig = toml::from_str(&content)?;
            config.orchestrator.validate().map_err(anyhow::Error::msg)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qumail_crypto::aead::AeadAlgorithm;
    use tempfile::TempDir;

    #[test]
    fn test_default_written_and_reloaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = CliConfig::load_or_default(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.default_level, SecurityLevel::PostQuantum);

        let mut changed = created.clone();
        changed.identity = Some("alice@example.com".into());
        changed.orchestrator.aead = AeadAlgorithm::ChaCha20Poly1305;
        changed.save(&path).unwrap();

        let loaded = CliConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.identity.as_deref(), Some("alice@example.com"));
        assert_eq!(loaded.orchestrator, changed.orchestrator);
    }

    #[test]
    fn test_partial_file_and_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "default_level = 2\n").unwrap();
        let loaded = CliConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.default_level, SecurityLevel::QuantumAes);

        std::fs::write(&path, "default_level = 9\n").unwrap();
        assert!(CliConfig::load_or_default(&path).is_err());

        std::fs::write(&path, "[orchestrator]\nexternal_call_timeout_ms = 0\n").unwrap();
        assert!(CliConfig::load_or_default(&path).is_err());
    }
}
