//! Kyber-512 key encapsulation
//!
//! Round-3 Kyber with the Fujisaki-Okamoto transform and implicit rejection:
//! decapsulating a ciphertext that does not re-encrypt to itself yields a
//! pseudorandom secret derived from `z` instead of an error, so a tampered
//! ciphertext surfaces later as an AEAD authentication failure.
//!
//! ## Example
//!
//! ```
//! use qumail_crypto::kem;
//!
//! let bob = kem::keypair().unwrap();
//! let sent = kem::encapsulate(&bob.public_key).unwrap();
//! let received = kem::decapsulate(&bob.secret_key, &sent.kem_ciphertext).unwrap();
//! assert_eq!(sent.shared_secret.as_bytes(), received.as_bytes());
//! ```

mod indcpa;
mod ntt;
mod params;
mod poly;
mod reduce;
mod symmetric;
mod verify;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, Result};
use crate::keys::SharedSecret;

use params::{
    CIPHERTEXTBYTES, INDCPA_PUBLICKEYBYTES, INDCPA_SECRETKEYBYTES, POLYVECBYTES, PUBLICKEYBYTES,
    Q, SECRETKEYBYTES, SYMBYTES,
};
use symmetric::{hash_g, hash_h, kdf};

/// Public key size in bytes
pub const PUBLIC_KEY_SIZE: usize = PUBLICKEYBYTES;

/// Secret key size in bytes
pub const SECRET_KEY_SIZE: usize = SECRETKEYBYTES;

/// Ciphertext size in bytes
pub const CIPHERTEXT_SIZE: usize = CIPHERTEXTBYTES;

/// Seed size for the deterministic variants
pub const SEED_SIZE: usize = SYMBYTES;

/// Supported KEM algorithms
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KemAlgorithm {
    /// Kyber-512, round 3
    #[default]
    #[serde(rename = "kyber512")]
    Kyber512,
}

impl KemAlgorithm {
    /// Stable identifier, also bound into key store records
    pub fn as_str(&self) -> &'static str {
        match self {
            KemAlgorithm::Kyber512 => "kyber512",
        }
    }
}

impl fmt::Display for KemAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KemAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "kyber512" => Ok(KemAlgorithm::Kyber512),
            other => Err(format!("unknown KEM algorithm: {}", other)),
        }
    }
}

/// Kyber-512 public key (800 bytes)
///
/// Construction validates the length and that every packed coefficient is
/// canonical, so any `PublicKey` value is safe to encapsulate against.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Parse and validate public key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }

        // 12-bit coefficients must be reduced mod q
        for chunk in bytes[..POLYVECBYTES].chunks_exact(3) {
            let c0 = chunk[0] as u16 | ((chunk[1] as u16 & 0x0F) << 8);
            let c1 = (chunk[1] as u16 >> 4) | ((chunk[2] as u16) << 4);
            if c0 >= Q as u16 || c1 >= Q as u16 {
                return Err(CryptoError::InvalidPublicKey(
                    "coefficient out of range".to_string(),
                ));
            }
        }

        Ok(Self(bytes.to_vec()))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex encoding of the key
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Short fingerprint: first 8 bytes of SHA3-256 over the key, hex encoded
    pub fn fingerprint(&self) -> String {
        hex::encode(&hash_h(&self.0)[..8])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Kyber-512 secret key (1632 bytes): `s ‖ pk ‖ H(pk) ‖ z`
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Parse secret key bytes, checking the length and the embedded
    /// public key hash
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidSecretKey(format!(
                "expected {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }

        let key = Self(bytes.to_vec());
        if hash_h(key.embedded_public_key()).as_slice() != key.public_key_hash() {
            return Err(CryptoError::InvalidSecretKey(
                "public key hash mismatch".to_string(),
            ));
        }
        Ok(key)
    }

    /// Raw key bytes, for sealing at rest
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The public key embedded in this secret key
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_bytes(self.embedded_public_key())
    }

    fn indcpa_secret(&self) -> &[u8] {
        &self.0[..INDCPA_SECRETKEYBYTES]
    }

    fn embedded_public_key(&self) -> &[u8] {
        &self.0[INDCPA_SECRETKEYBYTES..INDCPA_SECRETKEYBYTES + INDCPA_PUBLICKEYBYTES]
    }

    fn public_key_hash(&self) -> &[u8] {
        let start = SECRET_KEY_SIZE - 2 * SYMBYTES;
        &self.0[start..start + SYMBYTES]
    }

    fn rejection_value(&self) -> &[u8] {
        &self.0[SECRET_KEY_SIZE - SYMBYTES..]
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Kyber-512 ciphertext (768 bytes)
#[derive(Clone, PartialEq, Eq)]
pub struct Ciphertext(Vec<u8>);

impl Ciphertext {
    /// Parse ciphertext bytes, checking only the length
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CIPHERTEXT_SIZE {
            return Err(CryptoError::InvalidCiphertext {
                expected: CIPHERTEXT_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Raw ciphertext bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext({} bytes)", self.0.len())
    }
}

/// Result of encapsulation
#[derive(Debug)]
pub struct EncapsulatedKey {
    /// Ciphertext to send to the key holder
    pub kem_ciphertext: Ciphertext,
    /// Shared secret, zeroized on drop
    pub shared_secret: SharedSecret,
}

/// A KEM key pair with its metadata
#[derive(Debug)]
pub struct KeyPair {
    /// Public key, safe to publish
    pub public_key: PublicKey,
    /// Secret key
    pub secret_key: SecretKey,
    /// Algorithm
    pub algorithm: KemAlgorithm,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG
    pub fn generate() -> Result<Self> {
        keypair()
    }

    /// Rebuild a key pair from a stored secret key
    pub fn from_secret_key(secret_key: SecretKey, created_at: DateTime<Utc>) -> Result<Self> {
        let public_key = secret_key.public_key()?;
        Ok(Self {
            public_key,
            secret_key,
            algorithm: KemAlgorithm::Kyber512,
            created_at,
        })
    }
}

/// Generate a key pair
pub fn keypair() -> Result<KeyPair> {
    let mut seeds = Zeroizing::new([0u8; 2 * SYMBYTES]);
    OsRng
        .try_fill_bytes(&mut seeds[..])
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

    let mut d = Zeroizing::new([0u8; SYMBYTES]);
    let mut z = Zeroizing::new([0u8; SYMBYTES]);
    d.copy_from_slice(&seeds[..SYMBYTES]);
    z.copy_from_slice(&seeds[SYMBYTES..]);

    Ok(keypair_derand(&d, &z))
}

/// Deterministic key generation from the key seed `d` and the implicit
/// rejection value `z`
pub fn keypair_derand(d: &[u8; SEED_SIZE], z: &[u8; SEED_SIZE]) -> KeyPair {
    let (pk, indcpa_sk) = indcpa::keypair(d);

    let mut sk = Vec::with_capacity(SECRET_KEY_SIZE);
    sk.extend_from_slice(&indcpa_sk[..]);
    sk.extend_from_slice(&pk);
    sk.extend_from_slice(&hash_h(&pk));
    sk.extend_from_slice(z);

    KeyPair {
        public_key: PublicKey(pk.to_vec()),
        secret_key: SecretKey(sk),
        algorithm: KemAlgorithm::Kyber512,
        created_at: Utc::now(),
    }
}

/// Encapsulate a fresh shared secret to `public_key`
pub fn encapsulate(public_key: &PublicKey) -> Result<EncapsulatedKey> {
    let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
    OsRng.try_fill_bytes(&mut seed[..])?;
    Ok(encapsulate_derand(public_key, &seed))
}

/// Deterministic encapsulation from a 32-byte seed
pub fn encapsulate_derand(public_key: &PublicKey, seed: &[u8; SEED_SIZE]) -> EncapsulatedKey {
    let pk = public_key.as_bytes();

    // The raw seed never reaches the ciphertext
    let m = Zeroizing::new(hash_h(seed));
    let mut kr = Zeroizing::new(hash_g(&[m.as_slice(), hash_h(pk).as_slice()]));

    let mut coins = Zeroizing::new([0u8; SYMBYTES]);
    coins.copy_from_slice(&kr[SYMBYTES..]);
    let ct = indcpa::encrypt(&m, pk, &coins);

    kr[SYMBYTES..].copy_from_slice(&hash_h(&ct));
    let ss = kdf(&[&kr[..]]);

    EncapsulatedKey {
        kem_ciphertext: Ciphertext(ct.to_vec()),
        shared_secret: SharedSecret::from_bytes(ss),
    }
}

/// Recover the shared secret from a ciphertext
///
/// Never reports a ciphertext mismatch: an invalid ciphertext produces a
/// secret derived from the rejection value `z`, selected without branching.
pub fn decapsulate(secret_key: &SecretKey, ciphertext: &Ciphertext) -> Result<SharedSecret> {
    let ct = ciphertext.as_bytes();
    if ct.len() != CIPHERTEXT_SIZE {
        return Err(CryptoError::InvalidCiphertext {
            expected: CIPHERTEXT_SIZE,
            actual: ct.len(),
        });
    }

    let m = indcpa::decrypt(ct, secret_key.indcpa_secret());
    let mut kr = Zeroizing::new(hash_g(&[m.as_slice(), secret_key.public_key_hash()]));

    let mut coins = Zeroizing::new([0u8; SYMBYTES]);
    coins.copy_from_slice(&kr[SYMBYTES..]);
    let cmp = indcpa::encrypt(&m, secret_key.embedded_public_key(), &coins);

    let fail = verify::verify(ct, &cmp);

    kr[SYMBYTES..].copy_from_slice(&hash_h(ct));
    verify::cmov(&mut kr[..SYMBYTES], secret_key.rejection_value(), fail);

    Ok(SharedSecret::from_bytes(kdf(&[&kr[..]])))
}
