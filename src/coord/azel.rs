// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Handle (azimuth, elevation) coordinates.
 */

/// A struct containing an Azimuth and Elevation. All units are in radians.
#[derive(Clone, Copy, Debug)]
pub struct AzEl {
    /// Azimuth \[radians\]
    pub az: f64,
    /// Elevation \[radians\]
    pub el: f64,
}

impl AzEl {
    /// Make a new `AzEl` struct from values in radians.
    pub fn new(az: f64, el: f64) -> Self {
        Self { az, el }
    }

    /// The zenith angle \[radians\].
    pub fn za(self) -> f64 {
        crate::constants::FRAC_PI_2 - self.el
    }

    /// Is this direction above the horizon?
    pub fn is_above_horizon(self) -> bool {
        self.el > 0.0
    }
}
