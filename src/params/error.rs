// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for parameter-registry operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("Parameter id {0} is not registered")]
    UnknownParameter(u32),

    #[error("No parameter is registered under the name '{0}'")]
    UnknownParameterName(String),

    #[error("The value carries no perturbation for parameter id {parm}, coefficient {coeff}")]
    UnknownPerturbation { parm: u32, coeff: u16 },

    #[error("A parameter named '{0}' is already registered")]
    Duplicate(String),

    #[error("Parameter '{name}' has {n} coefficients; perturbation keys hold at most 65536")]
    TooManyCoeffs { name: String, n: usize },
}
