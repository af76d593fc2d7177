//! Symmetric primitives instantiated with SHA-3
//!
//! H = SHA3-256, G = SHA3-512, XOF = SHAKE128, PRF and KDF = SHAKE256.

use sha3::digest::{Digest, ExtendableOutput, Update, XofReader};
use sha3::{Sha3_256, Sha3_512, Shake128, Shake128Reader, Shake256};

use super::params::SYMBYTES;

/// SHAKE128 rate in bytes
pub(crate) const XOF_BLOCKBYTES: usize = 168;

pub(crate) fn hash_h(input: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha3_256::digest(input));
    out
}

/// SHA3-512 over the concatenation of `parts`
pub(crate) fn hash_g(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha3_512::new();
    for part in parts {
        Digest::update(&mut hasher, part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// SHAKE256(key ‖ nonce) squeezed into `out`
pub(crate) fn prf(key: &[u8; SYMBYTES], nonce: u8, out: &mut [u8]) {
    let mut xof = Shake256::default();
    Update::update(&mut xof, key);
    Update::update(&mut xof, &[nonce]);
    xof.finalize_xof().read(out);
}

/// SHAKE256 over the concatenation of `parts`, 32 bytes of output
pub(crate) fn kdf(parts: &[&[u8]]) -> [u8; 32] {
    let mut xof = Shake256::default();
    for part in parts {
        Update::update(&mut xof, part);
    }
    let mut out = [0u8; 32];
    xof.finalize_xof().read(&mut out);
    out
}

/// SHAKE128(seed ‖ x ‖ y) stream for matrix expansion
pub(crate) fn xof_absorb(seed: &[u8; SYMBYTES], x: u8, y: u8) -> Shake128Reader {
    let mut xof = Shake128::default();
    Update::update(&mut xof, seed);
    Update::update(&mut xof, &[x, y]);
    xof.finalize_xof()
}
