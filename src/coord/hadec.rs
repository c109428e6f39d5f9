// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Handle (hour angle, declination) coordinates.
 */

use super::azel::AzEl;
use crate::constants::TAU;

/// A struct containing an Hour Angle and Declination. All units are in
/// radians.
#[derive(Clone, Copy, Debug)]
pub struct HADec {
    /// Hour angle \[radians\]
    pub ha: f64,
    /// Declination \[radians\]
    pub dec: f64,
}

impl HADec {
    /// Make a new `HADec` struct from values in radians.
    pub fn new(ha: f64, dec: f64) -> Self {
        Self { ha, dec }
    }

    /// Convert the equatorial coordinates to horizon coordinates (azimuth and
    /// elevation), given the local latitude on Earth.
    pub fn to_azel(self, latitude: f64) -> AzEl {
        let (s_ha, c_ha) = self.ha.sin_cos();
        let (s_dec, c_dec) = self.dec.sin_cos();
        let (s_lat, c_lat) = latitude.sin_cos();
        let el = (s_lat * s_dec + c_lat * c_dec * c_ha).asin();
        let az = (-c_dec * s_ha).atan2(c_lat * s_dec - s_lat * c_dec * c_ha);
        AzEl::new(az.rem_euclid(TAU), el)
    }
}

impl std::fmt::Display for HADec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({}°, {}°)", self.ha.to_degrees(), self.dec.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn to_azel_at_zenith() {
        // A direction at zero hour angle with dec == latitude is at zenith.
        let hd = HADec::new(0.0, -0.5);
        let ae = hd.to_azel(-0.5);
        assert_abs_diff_eq!(ae.el, crate::constants::FRAC_PI_2, epsilon = 1e-10);
    }

    #[test]
    fn to_azel_on_horizon() {
        // From the pole, any direction on the celestial equator sits on the
        // horizon.
        let hd = HADec::new(1.234, 0.0);
        let ae = hd.to_azel(crate::constants::FRAC_PI_2);
        assert_abs_diff_eq!(ae.el, 0.0, epsilon = 1e-10);
    }
}
