// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
An analytic Gaussian station beam.

The response is a real voltage gain applied identically to both feeds. The
beam FWHM is [`crate::constants::BEAM_REF_FWHM`] radians at
[`crate::constants::BEAM_REF_FREQ`] and scales inversely with frequency and
with station diameter, which is how a diffraction-limited aperture behaves
to first order.
 */

use crate::{
    constants::{BEAM_REF_FREQ, BEAM_REF_FWHM, FWHM_FACTOR},
    coord::RADec,
    instrument::REF_STATION_DIAMETER,
};

/// The beam of one station, pointed at a fixed sky position.
#[derive(Clone, Copy, Debug)]
pub struct StationBeam {
    pub pointing: RADec,
    /// Station diameter \[metres\].
    pub diameter: f64,
}

impl StationBeam {
    /// Beam standard deviation \[radians\] at `freq_hz`.
    pub fn sigma(&self, freq_hz: f64) -> f64 {
        BEAM_REF_FWHM / FWHM_FACTOR * (BEAM_REF_FREQ / freq_hz)
            * (REF_STATION_DIAMETER / self.diameter)
    }

    /// Voltage gain towards `direction` at `freq_hz`.
    pub fn response(&self, direction: RADec, freq_hz: f64) -> f64 {
        let theta = self.pointing.separation(direction);
        let sigma = self.sigma(freq_hz);
        (-theta * theta / (2.0 * sigma * sigma)).exp()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::constants::FRAC_PI_2;

    fn beam() -> StationBeam {
        StationBeam {
            pointing: RADec::new_degrees(60.0, -27.0),
            diameter: REF_STATION_DIAMETER,
        }
    }

    #[test]
    fn boresight_gain_is_unity() {
        let b = beam();
        assert_abs_diff_eq!(b.response(b.pointing, BEAM_REF_FREQ), 1.0);
    }

    #[test]
    fn gain_at_the_half_maximum_point() {
        let b = beam();
        // The FWHM describes the voltage gain, so half of it off boresight
        // gives a gain of one half.
        let theta = BEAM_REF_FWHM / 2.0;
        let dir = RADec::new(b.pointing.ra, b.pointing.dec + theta);
        let g = b.response(dir, BEAM_REF_FREQ);
        assert_abs_diff_eq!(g, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn beam_narrows_with_frequency() {
        let b = beam();
        let dir = RADec::new(b.pointing.ra, b.pointing.dec + 0.02);
        assert!(b.response(dir, 2.0 * BEAM_REF_FREQ) < b.response(dir, BEAM_REF_FREQ));
    }

    #[test]
    fn bigger_station_means_narrower_beam() {
        let small = beam();
        let big = StationBeam {
            diameter: 2.0 * REF_STATION_DIAMETER,
            ..small
        };
        let dir = RADec::new(small.pointing.ra, small.pointing.dec + 0.02);
        assert!(big.response(dir, BEAM_REF_FREQ) < small.response(dir, BEAM_REF_FREQ));
    }

    #[test]
    fn far_sidelobe_is_tiny() {
        let b = beam();
        let dir = RADec::new(b.pointing.ra, b.pointing.dec + FRAC_PI_2);
        assert!(b.response(dir, BEAM_REF_FREQ) < 1e-10);
    }
}
