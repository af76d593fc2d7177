//! Key Derivation Functions (KDF) for QuMail
//!
//! HKDF-SHA-512 with domain separation: the same raw secret fed through two
//! different contexts yields unrelated keys.

use hkdf::Hkdf;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::keys::{SymmetricKey, SYMMETRIC_KEY_SIZE};

/// HKDF using SHA-512 for key derivation
pub type HkdfSha512 = Hkdf<Sha512>;

/// Fixed HKDF salt for all QuMail derivations
pub const PROTOCOL_SALT: &[u8] = b"QuMail_v1_KDF_Salt";

/// Domain separation strings for different key derivation contexts
pub mod domain {
    /// Level 2: AES keyed from QKD material
    pub const LEVEL2: &[u8] = b"QuMail_v1_level2";
    /// Level 3: AES keyed from a Kyber shared secret
    pub const LEVEL3: &[u8] = b"QuMail_v1_level3";
    /// Wrapping key for secret keys at rest
    pub const KEYSTORE: &[u8] = b"QuMail_v1_keystore";
}

/// Key derivation context for HKDF operations
pub struct KeyDerivationContext {
    hkdf: HkdfSha512,
}

impl KeyDerivationContext {
    /// Run HKDF-Extract over the input key material
    ///
    /// # Arguments
    /// * `salt` - Optional salt (if None, uses [`PROTOCOL_SALT`])
    /// * `ikm` - Input Key Material (shared secret or QKD bytes)
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        let hkdf = HkdfSha512::new(Some(salt.unwrap_or(PROTOCOL_SALT)), ikm);
        Self { hkdf }
    }

    /// Expand a symmetric key for the given domain and binding values
    ///
    /// Binding values are length-prefixed so that `("ab", "c")` and
    /// `("a", "bc")` produce different info strings.
    pub fn derive(&self, domain: &[u8], binding: &[&[u8]]) -> Result<SymmetricKey> {
        let info = build_info(domain, binding);
        let mut okm = Zeroizing::new([0u8; SYMMETRIC_KEY_SIZE]);
        self.hkdf
            .expand(&info, &mut okm[..])
            .map_err(|_| CryptoError::KeyDerivation("HKDF expansion failed".to_string()))?;
        Ok(SymmetricKey::from_bytes(*okm))
    }
}

/// Derive a one-message symmetric key from a shared secret or QKD material
pub fn derive_symmetric_key(
    secret: &[u8],
    domain: &[u8],
    binding: &[&[u8]],
) -> Result<SymmetricKey> {
    if secret.is_empty() {
        return Err(CryptoError::KeyDerivation("empty input key material".to_string()));
    }
    KeyDerivationContext::new(None, secret).derive(domain, binding)
}

fn build_info(domain: &[u8], binding: &[&[u8]]) -> Vec<u8> {
    let capacity = domain.len() + binding.iter().map(|b| b.len() + 4).sum::<usize>();
    let mut info = Vec::with_capacity(capacity);
    info.extend_from_slice(domain);
    for value in binding {
        info.extend_from_slice(&(value.len() as u32).to_be_bytes());
        info.extend_from_slice(value);
    }
    info
}
