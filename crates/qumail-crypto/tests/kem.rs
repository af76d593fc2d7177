//! Kyber-512 KEM behaviour through the public API

use proptest::prelude::*;
use qumail_crypto::kem::{self, Ciphertext, PublicKey, SecretKey, CIPHERTEXT_SIZE};
use qumail_crypto::prelude::*;
use sha2::{Digest, Sha256};

#[test]
fn test_roundtrip_random_keypairs() {
    for _ in 0..16 {
        let kp = kem::keypair().unwrap();
        let encap = kem::encapsulate(&kp.public_key).unwrap();
        let ss = kem::decapsulate(&kp.secret_key, &encap.kem_ciphertext).unwrap();
        assert_eq!(ss.as_bytes(), encap.shared_secret.as_bytes());
    }
}

#[test]
fn test_encapsulation_is_randomized() {
    let kp = kem::keypair().unwrap();
    let a = kem::encapsulate(&kp.public_key).unwrap();
    let b = kem::encapsulate(&kp.public_key).unwrap();
    assert_ne!(a.kem_ciphertext, b.kem_ciphertext);
    assert_ne!(a.shared_secret.as_bytes(), b.shared_secret.as_bytes());
}

#[test]
fn test_deterministic_variants() {
    let d = [0x11u8; 32];
    let z = [0x22u8; 32];
    let kp1 = kem::keypair_derand(&d, &z);
    let kp2 = kem::keypair_derand(&d, &z);
    assert_eq!(kp1.public_key, kp2.public_key);
    assert_eq!(kp1.secret_key.as_bytes(), kp2.secret_key.as_bytes());

    let seed = [0x33u8; 32];
    let e1 = kem::encapsulate_derand(&kp1.public_key, &seed);
    let e2 = kem::encapsulate_derand(&kp1.public_key, &seed);
    assert_eq!(e1.kem_ciphertext, e2.kem_ciphertext);
    assert_eq!(e1.shared_secret.as_bytes(), e2.shared_secret.as_bytes());
}

#[test]
fn test_implicit_rejection_on_tampered_ciphertext() {
    let kp = kem::keypair_derand(&[1u8; 32], &[2u8; 32]);
    let encap = kem::encapsulate_derand(&kp.public_key, &[3u8; 32]);

    let mut bytes = encap.kem_ciphertext.as_bytes().to_vec();
    bytes[100] ^= 0x01;
    let tampered = Ciphertext::from_bytes(&bytes).unwrap();

    let rejected = kem::decapsulate(&kp.secret_key, &tampered).unwrap();
    assert_ne!(rejected.as_bytes(), encap.shared_secret.as_bytes());

    // the decoy secret is a deterministic function of z and the ciphertext
    let again = kem::decapsulate(&kp.secret_key, &tampered).unwrap();
    assert_eq!(rejected.as_bytes(), again.as_bytes());

    // a different z gives a different decoy
    let other = SecretKey::from_bytes(
        kem::keypair_derand(&[1u8; 32], &[9u8; 32]).secret_key.as_bytes(),
    )
    .unwrap();
    let other_decoy = kem::decapsulate(&other, &tampered).unwrap();
    assert_ne!(rejected.as_bytes(), other_decoy.as_bytes());
}

/// Kyber-512 round 3 known answers for fixed seeds
///
/// Keys and ciphertext are pinned by SHA-256, shared secrets in full.
struct KnownAnswer {
    d: [u8; 32],
    z: [u8; 32],
    seed: [u8; 32],
    pk_sha256: &'static str,
    sk_sha256: &'static str,
    ct_sha256: &'static str,
    shared_secret: &'static str,
    /// Ciphertext byte flipped to trigger implicit rejection
    flip: usize,
    rejected_secret: &'static str,
}

fn counting(start: u8) -> [u8; 32] {
    core::array::from_fn(|i| start + i as u8)
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[test]
fn test_known_answers() {
    let vectors = [
        KnownAnswer {
            d: counting(0x00),
            z: counting(0x20),
            seed: counting(0x40),
            pk_sha256: "5c280d767365c28e4cf8b4546c4d2de98b39a88f7a7db73768df86b04b2f7ade",
            sk_sha256: "65260c6192484930d28842240c2f0cae274ff90b9728e49ae485273748256d73",
            ct_sha256: "9412eb9bde4c49e5d0b5f56e107ae9b8978cda3db9460a964dcd6dfde7a70cd0",
            shared_secret: "484c65aa18a6955f7a9f70137c882fcdbf0bd732d15ccf204a250bd17bf3fc4f",
            flip: 0,
            rejected_secret: "dc88ce8c295322d9bd8bfe68236db10dff156e145d253ff945a0c88b97376218",
        },
        KnownAnswer {
            d: [0u8; 32],
            z: [0u8; 32],
            seed: [0u8; 32],
            pk_sha256: "6058dbe84f059702e4c82e844fcb943526a309727f35f34ab320424df68b5413",
            sk_sha256: "3e686719ca5eaab6579cd82cd4db161ab07fa7d37911c270127fe7994ab916d7",
            ct_sha256: "ba82059675b5ac0a2f04e4fedae4a3a48e46e77d2c25b0b26f5597928315f282",
            shared_secret: "fa719885de55735bf0325ecb15acec07351ed84884725e51344fcbca252f010d",
            flip: CIPHERTEXT_SIZE - 1,
            rejected_secret: "0bf3e85f4f48246c0d6f93bc99a3a5165e4f369331a83a4d14df021c2231884e",
        },
    ];

    for (i, v) in vectors.iter().enumerate() {
        let kp = kem::keypair_derand(&v.d, &v.z);
        assert_eq!(sha256_hex(kp.public_key.as_bytes()), v.pk_sha256, "pk #{}", i);
        assert_eq!(sha256_hex(kp.secret_key.as_bytes()), v.sk_sha256, "sk #{}", i);

        let encap = kem::encapsulate_derand(&kp.public_key, &v.seed);
        assert_eq!(sha256_hex(encap.kem_ciphertext.as_bytes()), v.ct_sha256, "ct #{}", i);
        assert_eq!(hex::encode(encap.shared_secret.as_bytes()), v.shared_secret, "ss #{}", i);

        let ss = kem::decapsulate(&kp.secret_key, &encap.kem_ciphertext).unwrap();
        assert_eq!(hex::encode(ss.as_bytes()), v.shared_secret, "decaps #{}", i);

        let mut bytes = encap.kem_ciphertext.as_bytes().to_vec();
        bytes[v.flip] ^= 0x01;
        let tampered = Ciphertext::from_bytes(&bytes).unwrap();
        let rejected = kem::decapsulate(&kp.secret_key, &tampered).unwrap();
        assert_eq!(hex::encode(rejected.as_bytes()), v.rejected_secret, "rejection #{}", i);
    }
}

#[test]
fn test_wrong_secret_key_gives_unrelated_secret() {
    let alice = kem::keypair().unwrap();
    let eve = kem::keypair().unwrap();
    let encap = kem::encapsulate(&alice.public_key).unwrap();
    let ss = kem::decapsulate(&eve.secret_key, &encap.kem_ciphertext).unwrap();
    assert_ne!(ss.as_bytes(), encap.shared_secret.as_bytes());
}

#[test]
fn test_invalid_public_keys_rejected() {
    assert!(matches!(
        PublicKey::from_bytes(&[0u8; 799]),
        Err(CryptoError::InvalidPublicKey(_))
    ));
    assert!(matches!(
        PublicKey::from_bytes(&[0xFFu8; 800]),
        Err(CryptoError::InvalidPublicKey(_))
    ));
    assert!(PublicKey::from_bytes(&[0u8; 800]).is_ok());
}

#[test]
fn test_ciphertext_length_checked() {
    assert!(matches!(
        Ciphertext::from_bytes(&[0u8; CIPHERTEXT_SIZE - 1]),
        Err(CryptoError::InvalidCiphertext { expected: 768, actual: 767 })
    ));
}

#[test]
fn test_secret_key_roundtrip_through_bytes() {
    let kp = kem::keypair().unwrap();
    let restored = SecretKey::from_bytes(kp.secret_key.as_bytes()).unwrap();
    let encap = kem::encapsulate(&kp.public_key).unwrap();
    let ss = kem::decapsulate(&restored, &encap.kem_ciphertext).unwrap();
    assert_eq!(ss.as_bytes(), encap.shared_secret.as_bytes());
}

#[test]
fn test_shared_secret_feeds_kdf() {
    let kp = kem::keypair().unwrap();
    let encap = kem::encapsulate(&kp.public_key).unwrap();
    let ct = encap.kem_ciphertext.as_bytes();

    let k1 = derive_symmetric_key(encap.shared_secret.as_bytes(), domain::LEVEL3, &[b"bob".as_slice(), ct]).unwrap();
    let k2 = derive_symmetric_key(encap.shared_secret.as_bytes(), domain::LEVEL2, &[b"bob".as_slice(), ct]).unwrap();
    assert_ne!(k1.as_bytes(), k2.as_bytes());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_roundtrip_for_any_seeds(
        d in any::<[u8; 32]>(),
        z in any::<[u8; 32]>(),
        seed in any::<[u8; 32]>(),
    ) {
        let kp = kem::keypair_derand(&d, &z);
        let encap = kem::encapsulate_derand(&kp.public_key, &seed);
        let ss = kem::decapsulate(&kp.secret_key, &encap.kem_ciphertext).unwrap();
        prop_assert_eq!(ss.as_bytes(), encap.shared_secret.as_bytes());
    }

    #[test]
    fn prop_single_bit_flip_changes_secret(
        d in any::<[u8; 32]>(),
        seed in any::<[u8; 32]>(),
        position in 0usize..CIPHERTEXT_SIZE,
        bit in 0u8..8,
    ) {
        let kp = kem::keypair_derand(&d, &[0x5Au8; 32]);
        let encap = kem::encapsulate_derand(&kp.public_key, &seed);

        let mut bytes = encap.kem_ciphertext.as_bytes().to_vec();
        bytes[position] ^= 1 << bit;
        let tampered = Ciphertext::from_bytes(&bytes).unwrap();

        let ss = kem::decapsulate(&kp.secret_key, &tampered).unwrap();
        prop_assert_ne!(ss.as_bytes(), encap.shared_secret.as_bytes());
    }
}
