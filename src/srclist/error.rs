// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors when reading or selecting from sky-model source lists.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceListError {
    #[error("Source list patch '{0}' has no components")]
    EmptyPatch(String),

    #[error("Source list contains no patches")]
    NoPatches,

    #[error(
        "Component '{comp}' has a Stokes I flux of {i}; fluxes must be finite and non-negative"
    )]
    InvalidFlux { comp: String, i: f64 },

    #[error("Component '{comp}' has a non-positive reference frequency")]
    InvalidRefFreq { comp: String },

    #[error("Bad patch pattern '{pattern}': {err}")]
    BadPattern {
        pattern: String,
        err: glob::PatternError,
    },

    #[error("Patch pattern '{0}' matches nothing in the source list")]
    NoMatch(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
