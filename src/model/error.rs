// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors when constructing or evaluating a model.

use thiserror::Error;

use crate::{params::ParameterError, srclist::SourceListError};

/// Problems turning a configuration into an expression graph.
#[derive(Error, Debug)]
pub enum ConstructionError {
    #[error("The instrument needs at least two stations to form a baseline, got {0}")]
    TooFewStations(usize),

    #[error("The patch selection matches nothing; nothing to model")]
    NoMatchingPatches,

    #[error(
        "Inverse correction is per direction; {0} patches are selected, pick exactly one"
    )]
    AmbiguousDirection(usize),

    #[error("Inverse mode needs a visibility buffer to read observed data from")]
    MissingVisBuffer,

    #[error("The ionospheric screen needs at least one polynomial term")]
    EmptyIonoScreen,

    #[error(transparent)]
    SourceList(#[from] SourceListError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Problems during an evaluation pass.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No evaluation grid has been set; call set_eval_grid first")]
    NoEvalGrid,

    #[error("Baseline {a} x {b} is not part of the model")]
    UnknownBaseline { a: usize, b: usize },

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}
