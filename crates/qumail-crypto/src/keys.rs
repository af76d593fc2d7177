//! Secret key containers
//!
//! Every type here zeroizes its contents when dropped and prints a redacted
//! `Debug` representation, so secrets cannot leak through logs or through
//! early returns.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

/// Size of a shared secret produced by the KEM
pub const SHARED_SECRET_SIZE: usize = 32;

/// Size of a symmetric key (256 bits)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// A 32-byte shared secret produced by KEM encapsulation/decapsulation
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl SharedSecret {
    /// Create a shared secret from raw bytes
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the secret bytes
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for SharedSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// A 256-bit symmetric key for one message
///
/// Not `Clone`; derived for one seal or open and then dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

impl SymmetricKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking its length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SYMMETRIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for SymmetricKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Single-use pad material, typically delivered by a QKD link
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct OtpKey(Vec<u8>);

impl OtpKey {
    /// Take ownership of pad bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Pad length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the pad is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get pad bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for OtpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OtpKey([REDACTED; {}])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SharedSecret::from_bytes([0x42; SHARED_SECRET_SIZE]);
        let key = SymmetricKey::from_bytes([0x42; SYMMETRIC_KEY_SIZE]);
        let pad = OtpKey::new(vec![0x42; 5]);

        assert!(!format!("{:?}", secret).contains("42"));
        assert!(!format!("{:?}", key).contains("42"));
        assert_eq!(format!("{:?}", pad), "OtpKey([REDACTED; 5])");
    }

    #[test]
    fn test_symmetric_key_from_slice() {
        assert!(SymmetricKey::from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            SymmetricKey::from_slice(&[0u8; 31]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 31 })
        ));
    }
}
