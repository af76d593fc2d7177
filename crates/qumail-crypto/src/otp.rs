//! One-time pad
//!
//! XOR with pad material of exactly the message length. There is no
//! wraparound: a short pad is an error, because reusing pad bytes destroys
//! perfect secrecy. The pad is consumed by the call and wiped on return.

use crate::error::{CryptoError, Result};
use crate::keys::OtpKey;

/// XOR `data` with `key`
///
/// Encryption and decryption are the same operation.
pub fn apply(key: OtpKey, data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != data.len() {
        return Err(CryptoError::OtpKeyLength {
            key: key.len(),
            data: data.len(),
        });
    }

    let output = data
        .iter()
        .zip(key.as_bytes())
        .map(|(d, k)| d ^ k)
        .collect();

    Ok(output)
}
