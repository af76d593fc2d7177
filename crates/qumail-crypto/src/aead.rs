//! Authenticated Encryption with Associated Data (AEAD)
//!
//! Provides AES-256-GCM (the default, matching deployed QuMail clients) and
//! ChaCha20-Poly1305. Both use a 96-bit nonce and a detached 128-bit tag so
//! the envelope can carry nonce, ciphertext and tag as separate fields.

use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::keys::SymmetricKey;
use crate::MAX_MESSAGE_SIZE;

/// Nonce size for both algorithms (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// Key size for both algorithms (256 bits)
pub const KEY_SIZE: usize = 32;

/// AEAD algorithm selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeadAlgorithm {
    /// AES-256-GCM (default)
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20-Poly1305 (faster without AES hardware support)
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    /// Wire name of the algorithm
    pub fn as_str(&self) -> &'static str {
        match self {
            AeadAlgorithm::Aes256Gcm => "aes-256-gcm",
            AeadAlgorithm::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl fmt::Display for AeadAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AeadAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "aes-256-gcm" => Ok(AeadAlgorithm::Aes256Gcm),
            "chacha20-poly1305" => Ok(AeadAlgorithm::ChaCha20Poly1305),
            other => Err(format!("unknown AEAD algorithm: {}", other)),
        }
    }
}

/// Output of one sealing operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPayload {
    /// Fresh random nonce
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// Detached authentication tag
    pub tag: [u8; TAG_SIZE],
}

/// AEAD cipher for message encryption
#[derive(Clone, Copy, Debug, Default)]
pub struct Aead {
    algorithm: AeadAlgorithm,
}

impl Aead {
    /// Create a new AEAD cipher with the default algorithm (AES-256-GCM)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a specific algorithm
    pub fn with_algorithm(algorithm: AeadAlgorithm) -> Self {
        Self { algorithm }
    }

    /// The configured algorithm
    pub fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    /// Encrypt plaintext with associated data
    ///
    /// A fresh nonce is drawn from the OS RNG on every call.
    pub fn encrypt(&self, key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> Result<SealedPayload> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(CryptoError::MessageTooLarge {
                size: plaintext.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.try_fill_bytes(&mut nonce)?;

        let mut buffer = plaintext.to_vec();
        let nonce_ga = GenericArray::from_slice(&nonce);
        let tag = match self.algorithm {
            AeadAlgorithm::Aes256Gcm => Aes256Gcm::new(key.as_bytes().into())
                .encrypt_in_place_detached(nonce_ga, aad, &mut buffer),
            AeadAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new(key.as_bytes().into())
                .encrypt_in_place_detached(nonce_ga, aad, &mut buffer),
        };

        let tag = match tag {
            Ok(tag) => tag,
            Err(_) => {
                buffer.zeroize();
                return Err(CryptoError::EncryptionFailed(format!("{} failed", self.algorithm)));
            }
        };

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(&tag);

        Ok(SealedPayload {
            nonce,
            ciphertext: buffer,
            tag: tag_bytes,
        })
    }

    /// Decrypt ciphertext with associated data
    ///
    /// The tag is verified before any plaintext is returned. On failure the
    /// working buffer is wiped and [`CryptoError::AuthenticationFailed`] is
    /// returned without detail.
    pub fn decrypt(
        &self,
        key: &SymmetricKey,
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: nonce.len(),
            });
        }
        if tag.len() != TAG_SIZE {
            return Err(CryptoError::InvalidTagLength {
                expected: TAG_SIZE,
                actual: tag.len(),
            });
        }

        let mut buffer = ciphertext.to_vec();
        let nonce_ga = GenericArray::from_slice(nonce);
        let tag_ga = GenericArray::from_slice(tag);
        let result = match self.algorithm {
            AeadAlgorithm::Aes256Gcm => Aes256Gcm::new(key.as_bytes().into())
                .decrypt_in_place_detached(nonce_ga, aad, &mut buffer, tag_ga),
            AeadAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new(key.as_bytes().into())
                .decrypt_in_place_detached(nonce_ga, aad, &mut buffer, tag_ga),
        };

        match result {
            Ok(()) => Ok(buffer),
            Err(_) => {
                buffer.zeroize();
                Err(CryptoError::AuthenticationFailed)
            }
        }
    }
}
