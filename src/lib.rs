// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
A measurement-equation evaluator for radio interferometry.

The measurement equation of an aperture-synthesis array is expressed as a
directed acyclic graph of 2x2 complex (Jones) matrix operations, built per
baseline from a sky model and a set of instrumental effects. Evaluating a
baseline over a time-frequency grid yields model visibilities, per-sample
flags, and forward-difference partial derivatives against whatever
parameters an external solver has marked solvable. Sub-chains shared
between baselines are precalculated once, in parallel, level by level.
 */

pub mod beam;
pub mod constants;
pub mod coord;
pub mod domain;
pub mod expr;
pub mod instrument;
pub mod jones;
pub mod model;
pub mod params;
pub mod srclist;
pub mod value;
pub mod visbuf;

/// A shorthand for a complex number with double-precision components.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex<f64>;

pub use domain::{Domain, EvalGrid};
pub use instrument::{Baseline, Instrument, Station};
pub use jones::Jones;
pub use model::{build, Effect, GainParam, Model, ModelConfig, ModelMode, ModelResult};
pub use params::{MemParmDb, ParmDb, ParmDef, PertKey, SolvableSet};
pub use srclist::{read_source_list_file, SourceList};
