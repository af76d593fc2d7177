//! # QuMail Core
//!
//! Multi-level message encryption for QuMail.
//!
//! This crate provides:
//! - Security levels and the cipher scheme behind each
//! - The JSON envelope codec
//! - Directory and QKD client interfaces with in-process implementations
//! - The at-rest key store for local Kyber-512 key pairs
//! - The encryption orchestrator tying them together
//!
//! ## Levels
//!
//! 1. One-time pad keyed by QKD material
//! 2. AEAD keyed by QKD material
//! 3. AEAD keyed by a Kyber-512 encapsulation to the recipient
//! 4. Plaintext, only when chosen explicitly

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod base64_serde;

pub mod cancel;
pub mod config;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod keystore;
pub mod level;
pub mod orchestrator;
pub mod payload;
pub mod qkd;
pub mod scheme;

pub use cancel::{CallOptions, CancelToken};
pub use config::OrchestratorConfig;
pub use directory::{DirectoryClient, DirectoryEntry, MemoryDirectory};
pub use envelope::{EncryptedEnvelope, ENVELOPE_VERSION};
pub use error::{Error, FailureKind, Result};
pub use keystore::{KeyStore, KeyStoreBackend, MemoryBackend, SledBackend, StorageKey};
pub use level::SecurityLevel;
pub use orchestrator::{EncryptRequest, Orchestrator};
pub use payload::{Attachment, MessagePayload};
pub use qkd::{QkdClient, QkdKeyMaterial, QkdSession, SimulatedQkdEndpoint, SimulatedQkdNetwork};
pub use scheme::CipherScheme;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::{CallOptions, CancelToken};
    pub use crate::config::OrchestratorConfig;
    pub use crate::directory::{DirectoryClient, DirectoryEntry};
    pub use crate::envelope::EncryptedEnvelope;
    pub use crate::error::{Error, FailureKind, Result};
    pub use crate::keystore::{KeyStore, StorageKey};
    pub use crate::level::SecurityLevel;
    pub use crate::orchestrator::{EncryptRequest, Orchestrator};
    pub use crate::payload::MessagePayload;
    pub use crate::qkd::{QkdClient, QkdKeyMaterial};
}
