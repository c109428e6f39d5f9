// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Inner loops for the hot matrix-algebra patterns.

Each operation has a plain reference loop and a chunked variant written so
the compiler can keep four samples' worth of arithmetic in flight. Both run
in production depending on operand shape class, so they must stay
bit-identical; the tests below enforce that.
 */

use crate::{c64, jones::Jones};

const CHUNK: usize = 4;

/// out\[k\] = a\[k\] . b\[k\]; reference loop.
pub(crate) fn jones_mul_ref(a: &[Jones], b: &[Jones], out: &mut [Jones]) {
    debug_assert!(a.len() == b.len() && a.len() == out.len());
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = *x * *y;
    }
}

/// out\[k\] = a\[k\] . b\[k\]; chunked.
pub(crate) fn jones_mul(a: &[Jones], b: &[Jones], out: &mut [Jones]) {
    debug_assert!(a.len() == b.len() && a.len() == out.len());
    let mut o_it = out.chunks_exact_mut(CHUNK);
    let mut a_it = a.chunks_exact(CHUNK);
    let mut b_it = b.chunks_exact(CHUNK);
    for ((o, x), y) in (&mut o_it).zip(&mut a_it).zip(&mut b_it) {
        o[0] = x[0] * y[0];
        o[1] = x[1] * y[1];
        o[2] = x[2] * y[2];
        o[3] = x[3] * y[3];
    }
    jones_mul_ref(a_it.remainder(), b_it.remainder(), o_it.into_remainder());
}

/// out\[k\] = a\[k\] . b\[k\] . c\[k\]^H, conjugation folded into the dot
/// products; reference loop.
pub(crate) fn jones_corrupt_ref(a: &[Jones], b: &[Jones], c: &[Jones], out: &mut [Jones]) {
    debug_assert!(a.len() == b.len() && a.len() == c.len() && a.len() == out.len());
    for (((o, x), y), z) in out.iter_mut().zip(a).zip(b).zip(c) {
        *o = (*x * *y).mul_hermitian(z);
    }
}

/// out\[k\] = a\[k\] . b\[k\] . c\[k\]^H; chunked.
pub(crate) fn jones_corrupt(a: &[Jones], b: &[Jones], c: &[Jones], out: &mut [Jones]) {
    debug_assert!(a.len() == b.len() && a.len() == c.len() && a.len() == out.len());
    let mut o_it = out.chunks_exact_mut(CHUNK);
    let mut a_it = a.chunks_exact(CHUNK);
    let mut b_it = b.chunks_exact(CHUNK);
    let mut c_it = c.chunks_exact(CHUNK);
    for (((o, x), y), z) in (&mut o_it).zip(&mut a_it).zip(&mut b_it).zip(&mut c_it) {
        o[0] = (x[0] * y[0]).mul_hermitian(&z[0]);
        o[1] = (x[1] * y[1]).mul_hermitian(&z[1]);
        o[2] = (x[2] * y[2]).mul_hermitian(&z[2]);
        o[3] = (x[3] * y[3]).mul_hermitian(&z[3]);
    }
    jones_corrupt_ref(
        a_it.remainder(),
        b_it.remainder(),
        c_it.remainder(),
        o_it.into_remainder(),
    );
}

/// out\[k\] = s\[k\] * j\[k\] (a scalar grid broadcast over a Jones grid,
/// e.g. a phase factor times a coherence); reference loop.
pub(crate) fn scale_jones_ref(s: &[c64], j: &[Jones], out: &mut [Jones]) {
    debug_assert!(s.len() == j.len() && s.len() == out.len());
    for ((o, &x), y) in out.iter_mut().zip(s).zip(j) {
        *o = *y * x;
    }
}

/// out\[k\] = s\[k\] * j\[k\]; chunked.
pub(crate) fn scale_jones(s: &[c64], j: &[Jones], out: &mut [Jones]) {
    debug_assert!(s.len() == j.len() && s.len() == out.len());
    let mut o_it = out.chunks_exact_mut(CHUNK);
    let mut s_it = s.chunks_exact(CHUNK);
    let mut j_it = j.chunks_exact(CHUNK);
    for ((o, x), y) in (&mut o_it).zip(&mut s_it).zip(&mut j_it) {
        o[0] = y[0] * x[0];
        o[1] = y[1] * x[1];
        o[2] = y[2] * x[2];
        o[3] = y[3] * x[3];
    }
    scale_jones_ref(s_it.remainder(), j_it.remainder(), o_it.into_remainder());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_jones(seed: usize) -> Jones {
        // Deterministic, awkward values; no randomness needed.
        let f = seed as f64;
        Jones::from([
            c64::new(f * 0.37 + 0.1, -f * 0.11),
            c64::new(-f * 0.23, f * 0.54 + 0.7),
            c64::new(f * 0.81 - 0.3, f * 0.05),
            c64::new(f * 0.64, -f * 0.92 + 0.2),
        ])
    }

    // Exact bit equality: both paths run in production depending on operand
    // shape class, so they may never diverge.
    fn assert_bits_eq(a: &[Jones], b: &[Jones]) {
        for (x, y) in a.iter().zip(b) {
            for (cx, cy) in x.iter().zip(y.iter()) {
                assert_eq!(cx.re.to_bits(), cy.re.to_bits());
                assert_eq!(cx.im.to_bits(), cy.im.to_bits());
            }
        }
    }

    #[test]
    fn mul_chunked_matches_reference() {
        // 11 forces a non-empty remainder.
        let a: Vec<Jones> = (0..11).map(test_jones).collect();
        let b: Vec<Jones> = (11..22).map(test_jones).collect();
        let mut out1 = vec![Jones::zero(); 11];
        let mut out2 = vec![Jones::zero(); 11];
        jones_mul_ref(&a, &b, &mut out1);
        jones_mul(&a, &b, &mut out2);
        assert_bits_eq(&out1, &out2);
    }

    #[test]
    fn corrupt_chunked_matches_reference() {
        let a: Vec<Jones> = (0..13).map(test_jones).collect();
        let b: Vec<Jones> = (5..18).map(test_jones).collect();
        let c: Vec<Jones> = (9..22).map(test_jones).collect();
        let mut out1 = vec![Jones::zero(); 13];
        let mut out2 = vec![Jones::zero(); 13];
        jones_corrupt_ref(&a, &b, &c, &mut out1);
        jones_corrupt(&a, &b, &c, &mut out2);
        assert_bits_eq(&out1, &out2);
    }

    #[test]
    fn scale_chunked_matches_reference() {
        let s: Vec<c64> = (0..10).map(|i| c64::new(i as f64 * 0.3, -(i as f64))).collect();
        let j: Vec<Jones> = (3..13).map(test_jones).collect();
        let mut out1 = vec![Jones::zero(); 10];
        let mut out2 = vec![Jones::zero(); 10];
        scale_jones_ref(&s, &j, &mut out1);
        scale_jones(&s, &j, &mut out2);
        assert_bits_eq(&out1, &out2);
    }
}
