// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! 2-D polynomial evaluation over normalised (time, frequency) coordinates.

use ndarray::prelude::*;

/// Evaluate a polynomial with coefficient matrix `coeffs` (time power along
/// axis 0, frequency power along axis 1) at normalised coordinates `(t, f)`,
/// Horner's scheme in both directions.
pub(crate) fn eval(coeffs: &Array2<f64>, t: f64, f: f64) -> f64 {
    let mut v = 0.0;
    for row in coeffs.outer_iter().rev() {
        let mut r = 0.0;
        for &c in row.iter().rev() {
            r = r * f + c;
        }
        v = v * t + r;
    }
    v
}

/// The basis function t^i * f^j for the flattened (row-major) coefficient
/// index `k`. The polynomial is linear in its coefficients, so a coefficient
/// perturbed by `step` shifts the value by `step * basis(k, t, f)`.
pub(crate) fn basis(coeffs: &Array2<f64>, k: usize, t: f64, f: f64) -> f64 {
    let ncols = coeffs.ncols();
    let i = k / ncols;
    let j = k % ncols;
    t.powi(i as i32) * f.powi(j as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn constant() {
        let coeffs = arr2(&[[3.5]]);
        assert_abs_diff_eq!(eval(&coeffs, 0.3, 0.8), 3.5);
    }

    #[test]
    fn linear_in_both_axes() {
        // 1 + 2f + 3t + 4tf
        let coeffs = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let t = 0.5;
        let f = 0.25;
        let expected = 1.0 + 2.0 * f + 3.0 * t + 4.0 * t * f;
        assert_abs_diff_eq!(eval(&coeffs, t, f), expected, epsilon = 1e-12);
    }

    #[test]
    fn perturbation_is_linear_in_coefficients() {
        let coeffs = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let (t, f) = (0.7, 0.2);
        for k in 0..4 {
            let mut stepped = coeffs.clone();
            stepped[[k / 2, k % 2]] += 1e-3;
            assert_abs_diff_eq!(
                eval(&stepped, t, f),
                eval(&coeffs, t, f) + 1e-3 * basis(&coeffs, k, t, f),
                epsilon = 1e-12
            );
        }
    }
}
