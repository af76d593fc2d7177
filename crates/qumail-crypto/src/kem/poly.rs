//! Polynomials and polynomial vectors over Z_q
//!
//! Serialization is LSB-first bit packing (`ByteEncode_d`) for every width.
//! Compression and message decoding go through [`div_q`] so that no
//! secret-dependent division reaches the hardware divider.

use zeroize::Zeroize;

use super::ntt::{basemul, invntt_tomont, ntt, ZETAS};
use super::params::{ETA1, ETA2, K, N, POLYBYTES, Q, SYMBYTES};
use super::reduce::{barrett_reduce, div_q, montgomery_reduce, to_positive};
use super::symmetric::prf;

/// 2^32 mod q; multiplying by it through Montgomery reduction yields
/// Montgomery form
const MONT_SQUARED: i32 = 1353;

/// Rounded q/2, the image of a 1 bit in a message polynomial
const HALF_Q: u16 = ((Q as u16) + 1) / 2;

/// Element of Z_q[X]/(X^256 + 1)
#[derive(Clone, Zeroize)]
pub(crate) struct Poly {
    pub(crate) coeffs: [i16; N],
}

/// Vector of `K` polynomials
#[derive(Clone, Zeroize)]
pub(crate) struct PolyVec {
    pub(crate) vec: [Poly; K],
}

impl Default for Poly {
    fn default() -> Self {
        Self { coeffs: [0; N] }
    }
}

impl Default for PolyVec {
    fn default() -> Self {
        Self {
            vec: core::array::from_fn(|_| Poly::default()),
        }
    }
}

impl Poly {
    pub(crate) fn add_assign(&mut self, other: &Poly) {
        for (a, b) in self.coeffs.iter_mut().zip(other.coeffs.iter()) {
            *a += *b;
        }
    }

    pub(crate) fn sub_from(&mut self, minuend: &Poly) {
        for (a, b) in self.coeffs.iter_mut().zip(minuend.coeffs.iter()) {
            *a = *b - *a;
        }
    }

    pub(crate) fn reduce(&mut self) {
        for c in self.coeffs.iter_mut() {
            *c = barrett_reduce(*c);
        }
    }

    pub(crate) fn tomont(&mut self) {
        for c in self.coeffs.iter_mut() {
            *c = montgomery_reduce(*c as i32 * MONT_SQUARED);
        }
    }

    /// Forward NTT followed by reduction
    pub(crate) fn ntt(&mut self) {
        ntt(&mut self.coeffs);
        self.reduce();
    }

    pub(crate) fn invntt_tomont(&mut self) {
        invntt_tomont(&mut self.coeffs);
    }

    /// Product of two polynomials in NTT domain, result divided by 2^16
    pub(crate) fn basemul_montgomery(a: &Poly, b: &Poly) -> Poly {
        let mut r = Poly::default();
        for i in 0..N / 4 {
            let zeta = ZETAS[64 + i];
            let base = 4 * i;

            let lo = basemul(&a.coeffs[base..base + 2], &b.coeffs[base..base + 2], zeta);
            let hi = basemul(&a.coeffs[base + 2..base + 4], &b.coeffs[base + 2..base + 4], -zeta);

            r.coeffs[base..base + 2].copy_from_slice(&lo);
            r.coeffs[base + 2..base + 4].copy_from_slice(&hi);
        }
        r
    }

    /// 12-bit serialization of the canonical representatives
    pub(crate) fn to_bytes(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), POLYBYTES);
        let values = self.coeffs.map(to_positive);
        pack_bits(&values, 12, out);
    }

    /// 12-bit deserialization; values are not reduced
    pub(crate) fn from_bytes(bytes: &[u8]) -> Poly {
        debug_assert_eq!(bytes.len(), POLYBYTES);
        let values = unpack_bits(bytes, 12);
        Poly {
            coeffs: values.map(|v| v as i16),
        }
    }

    /// Lossy compression to `d` bits per coefficient
    pub(crate) fn compress(&self, d: usize, out: &mut [u8]) {
        debug_assert_eq!(out.len(), N * d / 8);
        let mask = (1u32 << d) - 1;
        let values = self.coeffs.map(|c| {
            let x = to_positive(c) as u32;
            (div_q((x << d) + (Q as u32) / 2) & mask) as u16
        });
        pack_bits(&values, d, out);
    }

    pub(crate) fn decompress(bytes: &[u8], d: usize) -> Poly {
        debug_assert_eq!(bytes.len(), N * d / 8);
        let values = unpack_bits(bytes, d);
        Poly {
            coeffs: values.map(|y| ((y as u32 * Q as u32 + (1 << (d - 1))) >> d) as i16),
        }
    }

    /// Map a 32-byte message to a polynomial, bit `i` to `0` or `(q+1)/2`
    pub(crate) fn from_msg(msg: &[u8; SYMBYTES]) -> Poly {
        let bits = unpack_bits(msg, 1);
        Poly {
            coeffs: bits.map(|b| (0u16.wrapping_sub(b) & HALF_Q) as i16),
        }
    }

    /// Decode each coefficient to the nearer of `0` and `q/2`
    pub(crate) fn to_msg(&self) -> [u8; SYMBYTES] {
        let bits = self.coeffs.map(|c| {
            let x = to_positive(c) as u32;
            (div_q((x << 1) + (Q as u32) / 2) & 1) as u16
        });
        let mut msg = [0u8; SYMBYTES];
        pack_bits(&bits, 1, &mut msg);
        msg
    }

    /// Centered binomial sample with parameter `ETA1` from `PRF(seed, nonce)`
    pub(crate) fn getnoise_eta1(seed: &[u8; SYMBYTES], nonce: u8) -> Poly {
        let mut buf = [0u8; ETA1 * N / 4];
        prf(seed, nonce, &mut buf);
        let poly = cbd3(&buf);
        buf.zeroize();
        poly
    }

    /// Centered binomial sample with parameter `ETA2` from `PRF(seed, nonce)`
    pub(crate) fn getnoise_eta2(seed: &[u8; SYMBYTES], nonce: u8) -> Poly {
        let mut buf = [0u8; ETA2 * N / 4];
        prf(seed, nonce, &mut buf);
        let poly = cbd2(&buf);
        buf.zeroize();
        poly
    }
}

impl PolyVec {
    pub(crate) fn add_assign(&mut self, other: &PolyVec) {
        for (a, b) in self.vec.iter_mut().zip(other.vec.iter()) {
            a.add_assign(b);
        }
    }

    pub(crate) fn reduce(&mut self) {
        self.vec.iter_mut().for_each(Poly::reduce);
    }

    pub(crate) fn ntt(&mut self) {
        self.vec.iter_mut().for_each(Poly::ntt);
    }

    pub(crate) fn invntt_tomont(&mut self) {
        self.vec.iter_mut().for_each(Poly::invntt_tomont);
    }

    /// Inner product in NTT domain, reduced
    pub(crate) fn basemul_acc_montgomery(a: &PolyVec, b: &PolyVec) -> Poly {
        let mut r = Poly::basemul_montgomery(&a.vec[0], &b.vec[0]);
        for i in 1..K {
            let t = Poly::basemul_montgomery(&a.vec[i], &b.vec[i]);
            r.add_assign(&t);
        }
        r.reduce();
        r
    }

    pub(crate) fn to_bytes(&self, out: &mut [u8]) {
        for (poly, chunk) in self.vec.iter().zip(out.chunks_exact_mut(POLYBYTES)) {
            poly.to_bytes(chunk);
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> PolyVec {
        let mut chunks = bytes.chunks_exact(POLYBYTES);
        PolyVec {
            vec: core::array::from_fn(|_| chunks.next().map(Poly::from_bytes).unwrap_or_default()),
        }
    }

    pub(crate) fn compress(&self, d: usize, out: &mut [u8]) {
        let width = N * d / 8;
        for (poly, chunk) in self.vec.iter().zip(out.chunks_exact_mut(width)) {
            poly.compress(d, chunk);
        }
    }

    pub(crate) fn decompress(bytes: &[u8], d: usize) -> PolyVec {
        let width = N * d / 8;
        let mut chunks = bytes.chunks_exact(width);
        PolyVec {
            vec: core::array::from_fn(|_| {
                chunks
                    .next()
                    .map(|c| Poly::decompress(c, d))
                    .unwrap_or_default()
            }),
        }
    }
}

/// Pack `N` values of `d` bits each, least significant bit first
fn pack_bits(values: &[u16; N], d: usize, out: &mut [u8]) {
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut pos = 0;
    for &v in values.iter() {
        acc |= (v as u32) << bits;
        bits += d;
        while bits >= 8 {
            out[pos] = acc as u8;
            pos += 1;
            acc >>= 8;
            bits -= 8;
        }
    }
}

fn unpack_bits(bytes: &[u8], d: usize) -> [u16; N] {
    let mask = (1u32 << d) - 1;
    let mut values = [0u16; N];
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut idx = 0;
    for &b in bytes {
        acc |= (b as u32) << bits;
        bits += 8;
        while bits >= d && idx < N {
            values[idx] = (acc & mask) as u16;
            idx += 1;
            acc >>= d;
            bits -= d;
        }
    }
    values
}

fn load32_le(x: &[u8]) -> u32 {
    u32::from_le_bytes([x[0], x[1], x[2], x[3]])
}

fn load24_le(x: &[u8]) -> u32 {
    u32::from_le_bytes([x[0], x[1], x[2], 0])
}

/// Centered binomial distribution, eta = 2
fn cbd2(buf: &[u8]) -> Poly {
    let mut r = Poly::default();
    for i in 0..N / 8 {
        let t = load32_le(&buf[4 * i..]);
        let d = (t & 0x5555_5555) + ((t >> 1) & 0x5555_5555);
        for j in 0..8 {
            let a = ((d >> (4 * j)) & 0x3) as i16;
            let b = ((d >> (4 * j + 2)) & 0x3) as i16;
            r.coeffs[8 * i + j] = a - b;
        }
    }
    r
}

/// Centered binomial distribution, eta = 3
fn cbd3(buf: &[u8]) -> Poly {
    let mut r = Poly::default();
    for i in 0..N / 4 {
        let t = load24_le(&buf[3 * i..]);
        let d = (t & 0x0024_9249) + ((t >> 1) & 0x0024_9249) + ((t >> 2) & 0x0024_9249);
        for j in 0..4 {
            let a = ((d >> (6 * j)) & 0x7) as i16;
            let b = ((d >> (6 * j + 3)) & 0x7) as i16;
            r.coeffs[4 * i + j] = a - b;
        }
    }
    r
}
