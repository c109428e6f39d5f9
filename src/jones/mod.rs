// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
General 2x2 complex (Jones) matrix math.

It's not ideal to use LAPACK for matrix multiplies or inverses, because it is
not possible to optimise only for 2x2 matrices. Here, we supply the math for
these special cases.
 */

#[cfg(test)]
mod tests;

use crate::c64;

/// A 2x2 complex matrix, stored row major as \[XX, XY, YX, YY\].
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Jones([c64; 4]);

const JONES_ZERO: Jones = Jones([c64::new(0.0, 0.0); 4]);

const JONES_IDENTITY: Jones = Jones([
    c64::new(1.0, 0.0),
    c64::new(0.0, 0.0),
    c64::new(0.0, 0.0),
    c64::new(1.0, 0.0),
]);

impl Jones {
    pub const fn identity() -> Self {
        JONES_IDENTITY
    }

    pub const fn zero() -> Self {
        JONES_ZERO
    }

    /// A diagonal matrix from two complex gains.
    #[inline(always)]
    pub fn diag(xx: c64, yy: c64) -> Self {
        Self([xx, c64::new(0.0, 0.0), c64::new(0.0, 0.0), yy])
    }

    /// From an input Jones matrix, get a copy that has been Hermitian
    /// conjugated (J^H).
    #[inline(always)]
    pub fn h(&self) -> Self {
        Self([
            self[0].conj(),
            self[2].conj(),
            self[1].conj(),
            self[3].conj(),
        ])
    }

    /// The determinant.
    #[inline(always)]
    pub fn det(&self) -> c64 {
        self[0] * self[3] - self[1] * self[2]
    }

    /// Multiply by a Jones matrix which gets Hermitian conjugated (A . B^H),
    /// without materialising B^H.
    #[inline(always)]
    pub fn mul_hermitian(&self, b: &Self) -> Self {
        let a = self;
        Self([
            a[0] * b[0].conj() + a[1] * b[1].conj(),
            a[0] * b[2].conj() + a[1] * b[3].conj(),
            a[2] * b[0].conj() + a[3] * b[1].conj(),
            a[2] * b[2].conj() + a[3] * b[3].conj(),
        ])
    }

    /// Get the direct analytic inverse of the Jones matrix (J^-1).
    ///
    /// Ideally, J^-1 . J = I. However it's possible that J is singular, in
    /// which case the contents of J^-1 are all NaN; callers that must stay
    /// finite check [`Jones::det`] first.
    #[inline(always)]
    pub fn inv(&self) -> Self {
        let a = self;
        let inv_det = c64::new(1.0, 0.0) / self.det();
        Self([
            inv_det * a[3],
            -inv_det * a[1],
            -inv_det * a[2],
            inv_det * a[0],
        ])
    }

    /// Get the regularised ("MMSE") inverse (A^H A + sigma^2 I)^-1 A^H.
    ///
    /// For sigma > 0 the regularised matrix is Hermitian positive definite,
    /// so this is finite even when the matrix itself is singular.
    #[inline(always)]
    pub fn mmse_inv(&self, sigma: f64) -> Self {
        let aha = self.h() * self;
        let reg = Jones([
            aha[0] + sigma * sigma,
            aha[1],
            aha[2],
            aha[3] + sigma * sigma,
        ]);
        reg.inv().mul_hermitian_of(self)
    }

    /// A . B^H where A is self; helper spelling of [`Jones::mul_hermitian`]
    /// that reads better in the MMSE inverse.
    #[inline(always)]
    fn mul_hermitian_of(&self, b: &Self) -> Self {
        self.mul_hermitian(b)
    }

    /// The squared Frobenius norm.
    #[inline(always)]
    pub fn norm_sqr(&self) -> f64 {
        self[0].norm_sqr() + self[1].norm_sqr() + self[2].norm_sqr() + self[3].norm_sqr()
    }

    /// An SVD-free condition-number proxy: the ratio of the larger to the
    /// smaller singular value, recovered from the Frobenius norm and the
    /// determinant. Singular matrices give infinity.
    pub fn cond(&self) -> f64 {
        let s = self.norm_sqr();
        let d = self.det().norm();
        if d == 0.0 {
            return f64::INFINITY;
        }
        // s = smax^2 + smin^2, d = smax * smin.
        let disc = (s * s - 4.0 * d * d).max(0.0).sqrt();
        let smax_sqr = 0.5 * (s + disc);
        let smin_sqr = 0.5 * (s - disc);
        if smin_sqr <= 0.0 {
            f64::INFINITY
        } else {
            (smax_sqr / smin_sqr).sqrt()
        }
    }

    /// Are all four elements finite?
    #[inline(always)]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.re.is_finite() && c.im.is_finite())
    }
}

impl std::ops::Deref for Jones {
    type Target = [c64; 4];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for Jones {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<[c64; 4]> for Jones {
    fn from(arr: [c64; 4]) -> Self {
        Self(arr)
    }
}

impl std::ops::Add<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Jones) -> Self {
        Jones([
            self[0] + rhs[0],
            self[1] + rhs[1],
            self[2] + rhs[2],
            self[3] + rhs[3],
        ])
    }
}

impl std::ops::AddAssign<Jones> for Jones {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Jones) {
        self[0] += rhs[0];
        self[1] += rhs[1];
        self[2] += rhs[2];
        self[3] += rhs[3];
    }
}

impl std::ops::Sub<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Jones) -> Self {
        Jones([
            self[0] - rhs[0],
            self[1] - rhs[1],
            self[2] - rhs[2],
            self[3] - rhs[3],
        ])
    }
}

impl std::ops::Mul<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Jones) -> Self {
        let a = self;
        let b = rhs;
        Jones([
            a[0] * b[0] + a[1] * b[2],
            a[0] * b[1] + a[1] * b[3],
            a[2] * b[0] + a[3] * b[2],
            a[2] * b[1] + a[3] * b[3],
        ])
    }
}

impl std::ops::Mul<&Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: &Jones) -> Self {
        self * *rhs
    }
}

impl std::ops::MulAssign<Jones> for Jones {
    #[inline(always)]
    fn mul_assign(&mut self, rhs: Jones) {
        *self = *self * rhs;
    }
}

impl std::ops::Mul<f64> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: f64) -> Self {
        Jones([self[0] * rhs, self[1] * rhs, self[2] * rhs, self[3] * rhs])
    }
}

impl std::ops::Mul<c64> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: c64) -> Self {
        Jones([self[0] * rhs, self[1] * rhs, self[2] * rhs, self[3] * rhs])
    }
}

impl std::ops::Div<c64> for Jones {
    type Output = Self;

    #[inline(always)]
    fn div(self, rhs: c64) -> Self {
        Jones([self[0] / rhs, self[1] / rhs, self[2] / rhs, self[3] / rhs])
    }
}

impl num_traits::Zero for Jones {
    #[inline]
    fn zero() -> Self {
        Jones::zero()
    }

    #[inline]
    fn is_zero(&self) -> bool {
        *self == Jones::zero()
    }
}

impl approx::AbsDiffEq for Jones {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    #[inline]
    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self[0] - other[0]).norm() <= epsilon
            && (self[1] - other[1]).norm() <= epsilon
            && (self[2] - other[2]).norm() <= epsilon
            && (self[3] - other[3]).norm() <= epsilon
    }
}
