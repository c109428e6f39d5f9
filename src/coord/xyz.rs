// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Handle station positions.
 */

use serde::{Deserialize, Serialize};

use super::hadec::HADec;
use super::uvw::UVW;

/// The local-equatorial (X,Y,Z) position of a station relative to the array
/// reference position. All units are in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Xyz {
    /// x-coordinate \[metres\]
    pub x: f64,
    /// y-coordinate \[metres\]
    pub y: f64,
    /// z-coordinate \[metres\]
    pub z: f64,
}

impl Xyz {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Rotate this position towards a phase centre, yielding a per-station
    /// (u,v,w).
    ///
    /// This is Equation 4.1 of: Interferometry and Synthesis in Radio
    /// Astronomy, Third Edition, Section 4: Geometrical Relationships,
    /// Polarimetry, and the Measurement Equation. The same rotation applies
    /// to single-station positions and baseline differences alike.
    pub fn to_uvw(self, phase_centre: HADec) -> UVW {
        let (s_ha, c_ha) = phase_centre.ha.sin_cos();
        let (s_dec, c_dec) = phase_centre.dec.sin_cos();
        UVW {
            u: s_ha * self.x + c_ha * self.y,
            v: s_dec * s_ha * self.y + c_dec * self.z - s_dec * c_ha * self.x,
            w: c_dec * c_ha * self.x - c_dec * s_ha * self.y + s_dec * self.z,
        }
    }
}

impl std::ops::Sub<Xyz> for Xyz {
    type Output = Self;

    fn sub(self, rhs: Xyz) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}
