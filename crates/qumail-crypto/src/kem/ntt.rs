//! Number-theoretic transform over Z_q[X]/(X^256 + 1)
//!
//! The transform is incomplete: it stops at 128 degree-one factors
//! `X^2 - ζ^(2·br(i)+1)`, so multiplication in the NTT domain is a pairwise
//! product of linear polynomials ([`basemul`]). Loop bounds and table indices
//! depend only on the position, never on coefficient values.

use super::params::{N, Q};
use super::reduce::{barrett_reduce, fqmul, MONT};

/// Primitive 256th root of unity mod q
const ROOT_OF_UNITY: u32 = 17;

/// mont^2 / 128: undoes the 2^7 scaling of the inverse transform and leaves
/// the result in Montgomery form
const INVNTT_FACTOR: i16 = 1441;

/// Powers of ζ in Montgomery form, bit-reversed order, centered
pub(crate) const ZETAS: [i16; 128] = generate_zetas();

const fn bit_reverse_7(mut x: usize) -> usize {
    let mut r = 0;
    let mut i = 0;
    while i < 7 {
        r = (r << 1) | (x & 1);
        x >>= 1;
        i += 1;
    }
    r
}

const fn generate_zetas() -> [i16; 128] {
    let q = Q as u32;
    let mont = (MONT as i32 + Q as i32) as u32;

    let mut powers = [0u32; 128];
    powers[0] = mont;
    let mut i = 1;
    while i < 128 {
        powers[i] = powers[i - 1] * ROOT_OF_UNITY % q;
        i += 1;
    }

    let mut zetas = [0i16; 128];
    let mut i = 0;
    while i < 128 {
        let v = powers[bit_reverse_7(i)] as i32;
        zetas[i] = if v > (Q as i32) / 2 { (v - Q as i32) as i16 } else { v as i16 };
        i += 1;
    }
    zetas
}

/// Forward NTT in place
///
/// Input in standard order, output in bit-reversed order. Coefficients grow
/// by up to q per layer, so inputs must be bounded by q in absolute value.
pub(crate) fn ntt(r: &mut [i16; N]) {
    let mut k = 1;
    let mut len = 128;
    while len >= 2 {
        let mut start = 0;
        while start < N {
            let zeta = ZETAS[k];
            k += 1;
            for j in start..start + len {
                let t = fqmul(zeta, r[j + len]);
                r[j + len] = r[j] - t;
                r[j] += t;
            }
            start += 2 * len;
        }
        len >>= 1;
    }
}

/// Inverse NTT in place, multiplying by the Montgomery factor
///
/// Input in bit-reversed order, output in standard order.
pub(crate) fn invntt_tomont(r: &mut [i16; N]) {
    let mut k = 127;
    let mut len = 2;
    while len <= 128 {
        let mut start = 0;
        while start < N {
            let zeta = ZETAS[k];
            k -= 1;
            for j in start..start + len {
                let t = r[j];
                r[j] = barrett_reduce(t + r[j + len]);
                r[j + len] -= t;
                r[j + len] = fqmul(zeta, r[j + len]);
            }
            start += 2 * len;
        }
        len <<= 1;
    }

    for coeff in r.iter_mut() {
        *coeff = fqmul(*coeff, INVNTT_FACTOR);
    }
}

/// Multiplication of `a0 + a1·X` and `b0 + b1·X` in `Z_q[X]/(X^2 - zeta)`
#[inline]
pub(crate) fn basemul(a: &[i16], b: &[i16], zeta: i16) -> [i16; 2] {
    let r0 = fqmul(fqmul(a[1], b[1]), zeta) + fqmul(a[0], b[0]);
    let r1 = fqmul(a[0], b[1]) + fqmul(a[1], b[0]);
    [r0, r1]
}
