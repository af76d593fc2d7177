//! Error types for QuMail core

use qumail_crypto::CryptoError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
///
/// Messages carry identities, session ids and sizes, never key bytes.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// QKD session already consumed
    #[error("QKD key exhausted for session {0}")]
    KeyExhausted(String),

    /// Directory miss or missing local key pair
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// QKD link unreachable or refused the request
    #[error("QKD unavailable: {0}")]
    QkdUnavailable(String),

    /// Envelope failed codec validation
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Stored key record cannot be read back
    #[error("Key store corruption for {0}")]
    StoreCorruption(String),

    /// Plaintext exceeds the configured maximum
    #[error("Message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge {
        /// Plaintext size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// External call exceeded its time budget
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Request is inconsistent (missing recipient, bad configuration)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure taxonomy exposed to callers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Randomness source failure
    KeyGenerationFailure,
    /// Malformed recipient public key
    EncapsulationFailure,
    /// AEAD tag mismatch
    AuthenticationFailure,
    /// QKD session reused
    KeyExhaustedFailure,
    /// Directory miss or missing local key pair
    KeyNotFoundFailure,
    /// Envelope rejected before any cipher ran
    MalformedEnvelopeFailure,
    /// At-rest record unreadable; the caller must rotate
    StoreCorruptionFailure,
    /// Cancelled or timed out while waiting on an external call
    Cancelled,
    /// External collaborator or storage unavailable
    Unavailable,
    /// Request rejected before any work was done
    InvalidRequest,
    /// Anything else
    Internal,
}

impl FailureKind {
    /// Whether the failure leaves the process unable to continue safely
    pub fn is_fatal(&self) -> bool {
        matches!(self, FailureKind::KeyGenerationFailure)
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Crypto(e) => match e {
                CryptoError::KeyGeneration(_) | CryptoError::RngFailed => {
                    FailureKind::KeyGenerationFailure
                }
                CryptoError::InvalidPublicKey(_) => FailureKind::EncapsulationFailure,
                CryptoError::InvalidSecretKey(_) => FailureKind::StoreCorruptionFailure,
                CryptoError::AuthenticationFailed => FailureKind::AuthenticationFailure,
                CryptoError::InvalidCiphertext { .. }
                | CryptoError::InvalidNonceLength { .. }
                | CryptoError::InvalidTagLength { .. } => FailureKind::MalformedEnvelopeFailure,
                CryptoError::MessageTooLarge { .. } => FailureKind::InvalidRequest,
                CryptoError::OtpKeyLength { .. }
                | CryptoError::InvalidKeyLength { .. }
                | CryptoError::KeyDerivation(_)
                | CryptoError::EncryptionFailed(_) => FailureKind::Internal,
            },
            Error::KeyExhausted(_) => FailureKind::KeyExhaustedFailure,
            Error::KeyNotFound(_) => FailureKind::KeyNotFoundFailure,
            Error::QkdUnavailable(_) | Error::Storage(_) => FailureKind::Unavailable,
            Error::MalformedEnvelope(_) => FailureKind::MalformedEnvelopeFailure,
            Error::StoreCorruption(_) => FailureKind::StoreCorruptionFailure,
            Error::Cancelled | Error::Timeout(_) => FailureKind::Cancelled,
            Error::MessageTooLarge { .. } | Error::InvalidRequest(_) => FailureKind::InvalidRequest,
            Error::Serialization(_) | Error::Internal(_) => FailureKind::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("blocking task failed: {}", err))
    }
}
