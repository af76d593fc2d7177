//! Constant-time comparison and conditional move

use std::hint::black_box;

/// Returns 0 if `a == b` and 1 otherwise, without early exit
pub(crate) fn verify(a: &[u8], b: &[u8]) -> u8 {
    debug_assert_eq!(a.len(), b.len());
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    // 0 -> 0, anything else -> 1
    let diff = black_box(diff) as u16;
    (0u16.wrapping_sub(diff) >> 15) as u8
}

/// Overwrite `dst` with `src` if `flag` is 1, leave it if `flag` is 0
pub(crate) fn cmov(dst: &mut [u8], src: &[u8], flag: u8) {
    debug_assert_eq!(dst.len(), src.len());
    let mask = black_box(0u8.wrapping_sub(flag));
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= mask & (*d ^ *s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        assert_eq!(verify(b"abcd", b"abcd"), 0);
        assert_eq!(verify(b"abcd", b"abce"), 1);
        assert_eq!(verify(&[0x80], &[0x00]), 1);
        assert_eq!(verify(b"", b""), 0);
    }

    #[test]
    fn test_cmov() {
        let mut dst = [1u8, 2, 3];
        cmov(&mut dst, &[9, 9, 9], 0);
        assert_eq!(dst, [1, 2, 3]);
        cmov(&mut dst, &[9, 8, 7], 1);
        assert_eq!(dst, [9, 8, 7]);
    }
}
