//! Modular reduction mod q without data-dependent branches

use super::params::Q;

/// q^-1 mod 2^16
const QINV: i16 = -3327;

/// 2^16 mod q, the Montgomery factor
pub(crate) const MONT: i16 = -1044;

/// Barrett constant: round(2^26 / q)
const BARRETT_V: i32 = ((1 << 26) + (Q as i32) / 2) / (Q as i32);

/// ceil(2^35 / q); exact floor division by q for inputs below 2^23
const DIV_Q_MULTIPLIER: u64 = 10_321_340;
const DIV_Q_SHIFT: u32 = 35;

/// Montgomery reduction: for `a` in `(-q·2^15, q·2^15)` returns
/// `a · 2^-16 mod q` in `(-q, q)`.
#[inline]
pub(crate) fn montgomery_reduce(a: i32) -> i16 {
    let t = (a as i16).wrapping_mul(QINV);
    ((a - (t as i32) * (Q as i32)) >> 16) as i16
}

/// Barrett reduction: returns the centered representative of `a mod q` in
/// `[-(q-1)/2, (q-1)/2]`.
#[inline]
pub(crate) fn barrett_reduce(a: i16) -> i16 {
    let t = ((BARRETT_V * a as i32 + (1 << 25)) >> 26) as i16;
    a.wrapping_sub(t.wrapping_mul(Q))
}

/// Multiplication followed by Montgomery reduction
#[inline]
pub(crate) fn fqmul(a: i16, b: i16) -> i16 {
    montgomery_reduce(a as i32 * b as i32)
}

/// Map a coefficient in `(-q, q)` to `[0, q)` using the sign bit as a mask
#[inline]
pub(crate) fn to_positive(a: i16) -> u16 {
    (a + ((a >> 15) & Q)) as u16
}

/// Floor division by q through multiply-and-shift, avoiding a hardware
/// divide whose latency may depend on its operand
#[inline]
pub(crate) fn div_q(x: u32) -> u32 {
    debug_assert!(x < (1 << 23));
    ((x as u64 * DIV_Q_MULTIPLIER) >> DIV_Q_SHIFT) as u32
}
