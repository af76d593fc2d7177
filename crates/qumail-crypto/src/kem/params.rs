//! Kyber-512 parameter set

/// Polynomial ring dimension
pub const N: usize = 256;

/// Module rank
pub const K: usize = 2;

/// Modulus
pub const Q: i16 = 3329;

/// Noise parameter for secret and key-generation error vectors
pub const ETA1: usize = 3;

/// Noise parameter for encryption error vectors
pub const ETA2: usize = 2;

/// Compression width of the ciphertext vector `u`
pub const DU: usize = 10;

/// Compression width of the ciphertext polynomial `v`
pub const DV: usize = 4;

/// Size of seeds, hashes and shared secrets
pub const SYMBYTES: usize = 32;

/// Size of a shared secret
pub const SSBYTES: usize = 32;

/// Serialized polynomial (12 bits per coefficient)
pub const POLYBYTES: usize = 384;

/// Serialized polynomial vector
pub const POLYVECBYTES: usize = K * POLYBYTES;

/// Compressed ciphertext vector `u`
pub const POLYVECCOMPRESSEDBYTES: usize = K * N * DU / 8;

/// Compressed ciphertext polynomial `v`
pub const POLYCOMPRESSEDBYTES: usize = N * DV / 8;

/// IND-CPA public key: `t` followed by the matrix seed
pub const INDCPA_PUBLICKEYBYTES: usize = POLYVECBYTES + SYMBYTES;

/// IND-CPA secret key: `s` in NTT domain
pub const INDCPA_SECRETKEYBYTES: usize = POLYVECBYTES;

/// IND-CPA ciphertext
pub const INDCPA_BYTES: usize = POLYVECCOMPRESSEDBYTES + POLYCOMPRESSEDBYTES;

/// KEM public key (800 bytes)
pub const PUBLICKEYBYTES: usize = INDCPA_PUBLICKEYBYTES;

/// KEM secret key: `s ‖ pk ‖ H(pk) ‖ z` (1632 bytes)
pub const SECRETKEYBYTES: usize = INDCPA_SECRETKEYBYTES + INDCPA_PUBLICKEYBYTES + 2 * SYMBYTES;

/// KEM ciphertext (768 bytes)
pub const CIPHERTEXTBYTES: usize = INDCPA_BYTES;
