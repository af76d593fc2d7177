//! Error types for cryptographic operations

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key pair generation failed (randomness source unusable)
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Recipient public key is malformed
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Local secret key is malformed
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// KEM ciphertext is malformed
    #[error("Invalid KEM ciphertext: expected {expected} bytes, got {actual}")]
    InvalidCiphertext {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Authentication failed (AEAD tag verification)
    #[error("Message authentication failed")]
    AuthenticationFailed,

    /// One-time pad key does not match the data length
    #[error("One-time pad key length {key} does not match data length {data}")]
    OtpKeyLength {
        /// Pad length
        key: usize,
        /// Data length
        data: usize,
    },

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Invalid nonce length
    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Invalid tag length
    #[error("Invalid tag length: expected {expected}, got {actual}")]
    InvalidTagLength {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Key derivation failed
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Message too large
    #[error("Message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge {
        /// Message size in bytes
        size: usize,
        /// Largest accepted size
        max: usize,
    },

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Random number generation failed
    #[error("Random number generation failed")]
    RngFailed,
}

impl From<rand::Error> for CryptoError {
    fn from(_: rand::Error) -> Self {
        CryptoError::RngFailed
    }
}
