// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Handle (right ascension, declination) coordinates.
 */

use serde::{Deserialize, Serialize};

use super::hadec::HADec;
use super::lmn::LMN;

/// A struct containing a Right Ascension and Declination. All units are in
/// radians.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RADec {
    /// Right ascension \[radians\]
    pub ra: f64,
    /// Declination \[radians\]
    pub dec: f64,
}

impl RADec {
    /// Make a new `RADec` struct from values in radians.
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Make a new `RADec` struct from values in degrees.
    pub fn new_degrees(ra: f64, dec: f64) -> Self {
        Self::new(ra.to_radians(), dec.to_radians())
    }

    /// Given a local sidereal time, make a new [`HADec`] struct from a
    /// `RADec`.
    pub fn to_hadec(self, lst_rad: f64) -> HADec {
        HADec {
            ha: lst_rad - self.ra,
            dec: self.dec,
        }
    }

    /// Get the (l,m,n) direction cosines from these coordinates with respect
    /// to a phase centre. All arguments are in radians.
    ///
    /// Derived using "Coordinate transformations" on page 388 of Synthesis
    /// Imaging in Radio Astronomy II.
    pub fn to_lmn(self, phase_centre: RADec) -> LMN {
        let d_ra = self.ra - phase_centre.ra;
        let (s_d_ra, c_d_ra) = d_ra.sin_cos();
        let (s_dec, c_dec) = self.dec.sin_cos();
        let (pc_s_dec, pc_c_dec) = phase_centre.dec.sin_cos();
        LMN {
            l: c_dec * s_d_ra,
            m: s_dec * pc_c_dec - c_dec * pc_s_dec * c_d_ra,
            n: s_dec * pc_s_dec + c_dec * pc_c_dec * c_d_ra,
        }
    }

    /// Calculate the angular distance between two sets of coordinates
    /// \[radians\].
    pub fn separation(self, b: Self) -> f64 {
        let d_ra = b.ra - self.ra;
        let (s_d_ra, c_d_ra) = d_ra.sin_cos();
        let (s_dec1, c_dec1) = self.dec.sin_cos();
        let (s_dec2, c_dec2) = b.dec.sin_cos();
        let num = ((c_dec2 * s_d_ra).powi(2)
            + (c_dec1 * s_dec2 - s_dec1 * c_dec2 * c_d_ra).powi(2))
        .sqrt();
        let den = s_dec1 * s_dec2 + c_dec1 * c_dec2 * c_d_ra;
        num.atan2(den)
    }

    /// The weighted average of a set of positions, for e.g. a patch centroid.
    /// Fine for small offsets, which is the case for calibration patches.
    pub fn weighted_average(radecs: &[RADec], weights: &[f64]) -> Option<RADec> {
        if radecs.is_empty() || radecs.len() != weights.len() {
            return None;
        }
        let weight_sum: f64 = weights.iter().sum();
        if weight_sum <= 0.0 {
            return None;
        }
        let mut ra = 0.0;
        let mut dec = 0.0;
        for (pos, w) in radecs.iter().zip(weights) {
            ra += pos.ra * w;
            dec += pos.dec * w;
        }
        Some(RADec::new(ra / weight_sum, dec / weight_sum))
    }
}

impl std::fmt::Display for RADec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({}°, {}°)", self.ra.to_degrees(), self.dec.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn test_to_lmn() {
        let radec = RADec::new_degrees(62.0, -27.5);
        let phase_centre = RADec::new_degrees(60.0, -27.0);
        let lmn = radec.to_lmn(phase_centre);
        assert_abs_diff_eq!(lmn.l, 0.03095623164758603, epsilon = 1e-10);
        assert_abs_diff_eq!(lmn.m, -0.008971846102111436, epsilon = 1e-10);
        assert_abs_diff_eq!(lmn.n, 0.9994804738961642, epsilon = 1e-10);
    }

    #[test]
    fn test_phase_centre_lmn_is_origin() {
        let pc = RADec::new_degrees(120.0, 30.0);
        let lmn = pc.to_lmn(pc);
        assert_abs_diff_eq!(lmn.l, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(lmn.m, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(lmn.n, 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_separation() {
        let a = RADec::new_degrees(1.0, -35.0);
        let b = RADec::new_degrees(1.0, -36.0);
        assert_abs_diff_eq!(a.separation(b), 1.0_f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(a.separation(a), 0.0, epsilon = 1e-12);
    }
}
