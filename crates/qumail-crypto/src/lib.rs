//! # QuMail Cryptographic Library
//!
//! This crate provides the cryptographic kernels behind the QuMail
//! multi-level message encryption engine.
//!
//! ## Security Properties
//!
//! - **Post-quantum key agreement**: Kyber-512 key encapsulation with
//!   Fujisaki-Okamoto re-encryption and implicit rejection
//! - **Authenticated encryption**: every symmetric ciphertext carries a
//!   128-bit tag that is verified before any plaintext is released
//! - **Single-use pads**: the one-time pad refuses key material that does not
//!   match the message length exactly
//! - **Key hygiene**: secret buffers are zeroized when dropped
//!
//! ## Core Components
//!
//! - [`kem`]: Kyber-512 key generation, encapsulation, decapsulation
//! - [`aead`]: Authenticated encryption (AES-256-GCM, ChaCha20-Poly1305)
//! - [`otp`]: One-time pad
//! - [`kdf`]: HKDF-based symmetric key derivation with domain separation
//! - [`keys`]: Zeroizing key containers

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod kem;
pub mod keys;
pub mod otp;

pub use error::{CryptoError, Result};

/// Maximum plaintext size accepted by the symmetric layers (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aead::{Aead, AeadAlgorithm, SealedPayload};
    pub use crate::error::{CryptoError, Result};
    pub use crate::kdf::{derive_symmetric_key, domain};
    pub use crate::kem::{Ciphertext, EncapsulatedKey, KemAlgorithm, KeyPair, PublicKey, SecretKey};
    pub use crate::keys::{OtpKey, SharedSecret, SymmetricKey};
}
