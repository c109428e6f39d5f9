// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Coordinate systems used when modelling visibilities.
 */

mod azel;
mod hadec;
mod lmn;
mod radec;
mod uvw;
mod xyz;

pub use azel::AzEl;
pub use hadec::HADec;
pub use lmn::LMN;
pub use radec::RADec;
pub use uvw::UVW;
pub use xyz::Xyz;

use hifitime::Epoch;

use crate::constants::TAU;

/// Get the local mean sidereal time from the Earth rotation angle, given an
/// east longitude \[radians\].
///
/// This deliberately ignores precession, nutation and UT1-UTC; the model
/// only needs a consistent time-to-hour-angle mapping, not absolute
/// astrometric accuracy.
pub fn lmst(time: Epoch, longitude_rad: f64) -> f64 {
    let jd_ut = time.to_jde_utc_days();
    let t = jd_ut - 2451545.0;
    let era = TAU * (0.779_057_273_264 + 1.002_737_811_911_354_48 * t);
    (era + longitude_rad).rem_euclid(TAU)
}
