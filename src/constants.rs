// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All calculations in this crate are done in double precision; these constants
*must* be double precision too.
 */

pub use std::f64::consts::{FRAC_PI_2, LN_2, PI, TAU};

/// Speed of light \[metres/second\].
pub const VEL_C: f64 = 299_792_458.0;

/// The constant in front of a Gaussian source's envelope exponent, when the
/// major and minor axes are FWHM values \[dimensionless\].
pub const GAUSSIAN_EXP_CONST: f64 = -(FRAC_PI_2 * FRAC_PI_2) / LN_2;

/// The ionospheric phase constant: phase = -K_TEC * TEC / freq, with TEC in
/// TEC units (1e16 electrons / m^2) \[rad Hz / TECU\].
pub const K_TEC: f64 = 8.447_972_45e9;

/// The default reference frequency for power-law flux densities \[Hz\].
pub const DEFAULT_REF_FREQ: f64 = 150e6;

/// The default spectral index to use for power-law flux densities.
pub const DEFAULT_SPEC_INDEX: f64 = -0.7;

/// The default forward-difference perturbation applied to a solvable
/// parameter's coefficients.
pub const DEFAULT_PERTURBATION: f64 = 1e-6;

/// The frequency at which the analytic station beam has its reference width
/// \[Hz\].
pub const BEAM_REF_FREQ: f64 = 150e6;

/// The full width at half maximum of the analytic station beam at
/// [`BEAM_REF_FREQ`] \[radians\].
pub const BEAM_REF_FWHM: f64 = 0.075;

/// FWHM = FWHM_FACTOR * sigma for a Gaussian.
pub const FWHM_FACTOR: f64 = 2.354_820_045_03;

/// The assumed height of the thin-screen ionosphere \[metres\], used to
/// project lines of sight to piercepoint coordinates.
pub const IONO_HEIGHT: f64 = 300e3;
