// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The instrument being modelled: stations and array geometry.

use hifitime::Epoch;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use vec1::Vec1;

use crate::coord::{lmst, Xyz};

/// Nominal station diameter \[metres\] assumed when a station does not
/// specify one; beam widths are scaled relative to this.
pub const REF_STATION_DIAMETER: f64 = 35.0;

fn default_diameter() -> f64 {
    REF_STATION_DIAMETER
}

/// One station of the array.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    /// Position relative to the array reference \[metres\].
    pub position: Xyz,
    /// Effective dish/station diameter \[metres\].
    #[serde(default = "default_diameter")]
    pub diameter: f64,
}

/// An ordered station pair. `a < b` by construction in the model builder;
/// autocorrelations are not modelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Baseline {
    pub a: usize,
    pub b: usize,
}

/// Array-level description of the instrument.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    /// Array reference longitude \[radians\].
    pub longitude_rad: f64,
    /// Array reference latitude \[radians\].
    pub latitude_rad: f64,
    pub stations: Vec1<Station>,
}

impl Instrument {
    pub fn num_stations(&self) -> usize {
        self.stations.len()
    }

    pub fn station(&self, i: usize) -> &Station {
        &self.stations[i]
    }

    /// Local mean sidereal time at the array reference \[radians\].
    pub fn lst(&self, time: Epoch) -> f64 {
        lmst(time, self.longitude_rad)
    }

    /// All `a < b` station pairs.
    pub fn baselines(&self) -> Vec<Baseline> {
        (0..self.num_stations())
            .tuple_combinations()
            .map(|(a, b)| Baseline { a, b })
            .collect()
    }
}
