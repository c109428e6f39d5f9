// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;

fn one_through_eight() -> Jones {
    Jones::from([
        c64::new(1.0, 2.0),
        c64::new(3.0, 4.0),
        c64::new(5.0, 6.0),
        c64::new(7.0, 8.0),
    ])
}

#[test]
fn test_add() {
    let a = one_through_eight();
    let b = one_through_eight();
    let c = a + b;
    let expected = Jones::from([
        c64::new(2.0, 4.0),
        c64::new(6.0, 8.0),
        c64::new(10.0, 12.0),
        c64::new(14.0, 16.0),
    ]);
    assert_abs_diff_eq!(c, expected, epsilon = 1e-10);
}

#[test]
fn test_mul() {
    let i = c64::new(1.0, 2.0);
    let a = Jones::from([i, i + 1.0, i + 2.0, i + 3.0]);
    let b = Jones::from([i * 2.0, i * 3.0, i * 4.0, i * 5.0]);
    let c = a * b;
    let expected = Jones::from([
        c64::new(-14.0, 32.0),
        c64::new(-19.0, 42.0),
        c64::new(-2.0, 56.0),
        c64::new(-3.0, 74.0),
    ]);
    assert_abs_diff_eq!(c, expected, epsilon = 1e-10);
}

#[test]
fn test_identity_compose() {
    let a = one_through_eight();
    assert_abs_diff_eq!(Jones::identity() * a, a, epsilon = 0.0);
    assert_abs_diff_eq!(a * Jones::identity(), a, epsilon = 0.0);
}

#[test]
fn test_mul_hermitian() {
    let a = one_through_eight();
    // A^H is the conjugate transpose.
    let result = Jones::identity().mul_hermitian(&a);
    let expected = Jones::from([
        c64::new(1.0, -2.0),
        c64::new(5.0, -6.0),
        c64::new(3.0, -4.0),
        c64::new(7.0, -8.0),
    ]);
    assert_abs_diff_eq!(result, expected, epsilon = 1e-10);

    // Against explicitly materialising the conjugate transpose.
    let b = Jones::from([
        c64::new(0.5, -1.5),
        c64::new(2.0, 0.25),
        c64::new(-1.0, 3.0),
        c64::new(4.0, -0.5),
    ]);
    assert_abs_diff_eq!(a.mul_hermitian(&b), a * b.h(), epsilon = 1e-12);
}

#[test]
fn test_inv() {
    let a = one_through_eight();
    assert_abs_diff_eq!(a.inv() * a, Jones::identity(), epsilon = 1e-10);
    // Round trip.
    assert_abs_diff_eq!(a.inv().inv(), a, epsilon = 1e-9);
}

#[test]
fn test_inv_singular() {
    let a = Jones::from([
        c64::new(1.0, 0.0),
        c64::new(2.0, 0.0),
        c64::new(2.0, 0.0),
        c64::new(4.0, 0.0),
    ]);
    assert_abs_diff_eq!(a.det().norm(), 0.0, epsilon = 0.0);
    for j in a.inv().iter() {
        assert!(j.re.is_nan());
        assert!(j.im.is_nan());
    }
}

#[test]
fn test_mmse_inv_is_finite_for_singular_input() {
    let a = Jones::from([
        c64::new(1.0, 0.0),
        c64::new(2.0, 0.0),
        c64::new(2.0, 0.0),
        c64::new(4.0, 0.0),
    ]);
    let inv = a.mmse_inv(0.1);
    assert!(inv.is_finite());
}

#[test]
fn test_mmse_inv_approaches_direct_inv() {
    let a = one_through_eight();
    // For a well-conditioned matrix and a tiny sigma, the regularised
    // inverse is indistinguishable from the direct one.
    assert_abs_diff_eq!(a.mmse_inv(1e-9), a.inv(), epsilon = 1e-8);
}

#[test]
fn test_cond() {
    assert_abs_diff_eq!(Jones::identity().cond(), 1.0, epsilon = 1e-12);
    let singular = Jones::from([
        c64::new(1.0, 0.0),
        c64::new(2.0, 0.0),
        c64::new(2.0, 0.0),
        c64::new(4.0, 0.0),
    ]);
    assert!(singular.cond().is_infinite());
    // A diagonal matrix's condition number is the gain ratio.
    let d = Jones::diag(c64::new(10.0, 0.0), c64::new(2.0, 0.0));
    assert_abs_diff_eq!(d.cond(), 5.0, epsilon = 1e-10);
}
