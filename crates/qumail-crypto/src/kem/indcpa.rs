//! IND-CPA public-key encryption underlying the KEM

use sha3::digest::XofReader;
use zeroize::Zeroizing;

use super::params::{
    DU, DV, INDCPA_BYTES, INDCPA_PUBLICKEYBYTES, INDCPA_SECRETKEYBYTES, K, N, POLYVECBYTES,
    POLYVECCOMPRESSEDBYTES, Q, SYMBYTES,
};
use super::poly::{Poly, PolyVec};
use super::symmetric::{hash_g, xof_absorb, XOF_BLOCKBYTES};

/// Rejection sampling of uniform coefficients from 12-bit candidates
///
/// Returns the number of coefficients written into `r`.
fn rej_uniform(r: &mut [i16], buf: &[u8]) -> usize {
    let mut ctr = 0;
    for chunk in buf.chunks_exact(3) {
        if ctr >= r.len() {
            break;
        }
        let val0 = (chunk[0] as u16 | (chunk[1] as u16) << 8) & 0x0FFF;
        let val1 = ((chunk[1] >> 4) as u16 | (chunk[2] as u16) << 4) & 0x0FFF;

        if val0 < Q as u16 {
            r[ctr] = val0 as i16;
            ctr += 1;
        }
        if ctr < r.len() && val1 < Q as u16 {
            r[ctr] = val1 as i16;
            ctr += 1;
        }
    }
    ctr
}

/// Expand the public matrix `A` (or its transpose) from `seed`
///
/// Entry `(i, j)` is sampled from `SHAKE128(seed ‖ j ‖ i)`, or
/// `SHAKE128(seed ‖ i ‖ j)` when transposed.
pub(crate) fn gen_matrix(seed: &[u8; SYMBYTES], transposed: bool) -> [PolyVec; K] {
    let mut matrix: [PolyVec; K] = core::array::from_fn(|_| PolyVec::default());
    let mut buf = [0u8; XOF_BLOCKBYTES];

    for (i, row) in matrix.iter_mut().enumerate() {
        for (j, poly) in row.vec.iter_mut().enumerate() {
            let (x, y) = if transposed { (i as u8, j as u8) } else { (j as u8, i as u8) };
            let mut reader = xof_absorb(seed, x, y);

            let mut ctr = 0;
            while ctr < N {
                reader.read(&mut buf);
                ctr += rej_uniform(&mut poly.coeffs[ctr..], &buf);
            }
        }
    }
    matrix
}

/// Deterministic key generation from a 32-byte seed
pub(crate) fn keypair(
    d: &[u8; SYMBYTES],
) -> ([u8; INDCPA_PUBLICKEYBYTES], Zeroizing<[u8; INDCPA_SECRETKEYBYTES]>) {
    let seeds = Zeroizing::new(hash_g(&[d.as_slice()]));
    let mut public_seed = [0u8; SYMBYTES];
    public_seed.copy_from_slice(&seeds[..SYMBYTES]);
    let mut noise_seed = Zeroizing::new([0u8; SYMBYTES]);
    noise_seed.copy_from_slice(&seeds[SYMBYTES..]);

    let a = gen_matrix(&public_seed, false);

    let mut nonce = 0u8;
    let mut skpv = Zeroizing::new(PolyVec::default());
    for poly in skpv.vec.iter_mut() {
        *poly = Poly::getnoise_eta1(&noise_seed, nonce);
        nonce += 1;
    }
    let mut e = Zeroizing::new(PolyVec::default());
    for poly in e.vec.iter_mut() {
        *poly = Poly::getnoise_eta1(&noise_seed, nonce);
        nonce += 1;
    }

    skpv.ntt();
    e.ntt();

    let mut pkpv = PolyVec::default();
    for (row, t) in a.iter().zip(pkpv.vec.iter_mut()) {
        *t = PolyVec::basemul_acc_montgomery(row, &skpv);
        t.tomont();
    }
    pkpv.add_assign(&e);
    pkpv.reduce();

    let mut pk = [0u8; INDCPA_PUBLICKEYBYTES];
    pkpv.to_bytes(&mut pk[..POLYVECBYTES]);
    pk[POLYVECBYTES..].copy_from_slice(&public_seed);

    let mut sk = Zeroizing::new([0u8; INDCPA_SECRETKEYBYTES]);
    skpv.to_bytes(&mut sk[..]);

    (pk, sk)
}

/// Encrypt a 32-byte message under `pk` with explicit randomness `coins`
pub(crate) fn encrypt(
    msg: &[u8; SYMBYTES],
    pk: &[u8],
    coins: &[u8; SYMBYTES],
) -> [u8; INDCPA_BYTES] {
    debug_assert_eq!(pk.len(), INDCPA_PUBLICKEYBYTES);
    let pkpv = PolyVec::from_bytes(&pk[..POLYVECBYTES]);
    let mut seed = [0u8; SYMBYTES];
    seed.copy_from_slice(&pk[POLYVECBYTES..]);

    let k = Zeroizing::new(Poly::from_msg(msg));
    let at = gen_matrix(&seed, true);

    let mut nonce = 0u8;
    let mut sp = Zeroizing::new(PolyVec::default());
    for poly in sp.vec.iter_mut() {
        *poly = Poly::getnoise_eta1(coins, nonce);
        nonce += 1;
    }
    let mut ep = Zeroizing::new(PolyVec::default());
    for poly in ep.vec.iter_mut() {
        *poly = Poly::getnoise_eta2(coins, nonce);
        nonce += 1;
    }
    let epp = Zeroizing::new(Poly::getnoise_eta2(coins, nonce));

    sp.ntt();

    let mut bp = Zeroizing::new(PolyVec::default());
    for (row, b) in at.iter().zip(bp.vec.iter_mut()) {
        *b = PolyVec::basemul_acc_montgomery(row, &sp);
    }
    let mut v = Zeroizing::new(PolyVec::basemul_acc_montgomery(&pkpv, &sp));

    bp.invntt_tomont();
    v.invntt_tomont();

    bp.add_assign(&ep);
    v.add_assign(&epp);
    v.add_assign(&k);
    bp.reduce();
    v.reduce();

    let mut ct = [0u8; INDCPA_BYTES];
    bp.compress(DU, &mut ct[..POLYVECCOMPRESSEDBYTES]);
    v.compress(DV, &mut ct[POLYVECCOMPRESSEDBYTES..]);
    ct
}

/// Recover the message from a ciphertext with the IND-CPA secret key
pub(crate) fn decrypt(ct: &[u8], sk: &[u8]) -> Zeroizing<[u8; SYMBYTES]> {
    debug_assert_eq!(ct.len(), INDCPA_BYTES);
    debug_assert_eq!(sk.len(), INDCPA_SECRETKEYBYTES);

    let mut bp = PolyVec::decompress(&ct[..POLYVECCOMPRESSEDBYTES], DU);
    let v = Poly::decompress(&ct[POLYVECCOMPRESSEDBYTES..], DV);
    let skpv = Zeroizing::new(PolyVec::from_bytes(sk));

    bp.ntt();
    let mut mp = Zeroizing::new(PolyVec::basemul_acc_montgomery(&skpv, &bp));
    mp.invntt_tomont();
    mp.sub_from(&v);
    mp.reduce();

    Zeroizing::new(mp.to_msg())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rej_uniform_skips_out_of_range() {
        // candidates 0xFFF (rejected) and 0x001 (accepted)
        let buf = [0xFF, 0x1F, 0x00];
        let mut r = [0i16; 4];
        assert_eq!(rej_uniform(&mut r, &buf), 1);
        assert_eq!(r[0], 1);
    }

    #[test]
    fn test_gen_matrix_transpose() {
        let seed = [5u8; SYMBYTES];
        let a = gen_matrix(&seed, false);
        let at = gen_matrix(&seed, true);
        for i in 0..K {
            for j in 0..K {
                assert_eq!(a[i].vec[j].coeffs, at[j].vec[i].coeffs);
            }
        }
        assert!(a[0].vec[0].coeffs.iter().all(|&c| (0..Q).contains(&c)));
    }

    #[test]
    fn test_encrypt_decrypt() {
        let (pk, sk) = keypair(&[1u8; SYMBYTES]);
        let msg = [0x3Cu8; SYMBYTES];
        let ct = encrypt(&msg, &pk, &[2u8; SYMBYTES]);
        assert_eq!(*decrypt(&ct, &sk[..]), msg);
    }

    #[test]
    fn test_keypair_is_deterministic() {
        let (pk1, _) = keypair(&[9u8; SYMBYTES]);
        let (pk2, _) = keypair(&[9u8; SYMBYTES]);
        let (pk3, _) = keypair(&[10u8; SYMBYTES]);
        assert_eq!(pk1, pk2);
        assert_ne!(pk1, pk3);
    }
}
