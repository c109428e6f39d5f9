// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sky-model source lists.

A source list maps patch names to patches; a patch is a group of components
that share one set of direction-dependent effects, evaluated towards the
patch's flux-weighted centre. Components are points or elliptical
Gaussians with power-law spectra.
 */

mod error;
pub(crate) mod read;

pub use error::SourceListError;
pub use read::{read_source_list_file, source_list_from_yaml};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use vec1::Vec1;

use crate::{
    constants::{DEFAULT_REF_FREQ, DEFAULT_SPEC_INDEX},
    coord::RADec,
};

/// A power-law flux density. Stokes parameters are in janskys at
/// `ref_freq`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FluxDensity {
    pub i: f64,
    #[serde(default)]
    pub q: f64,
    #[serde(default)]
    pub u: f64,
    #[serde(default)]
    pub v: f64,
    /// \[Hz\]
    #[serde(default = "default_ref_freq")]
    pub ref_freq: f64,
    #[serde(default = "default_spec_index")]
    pub spectral_index: f64,
}

fn default_ref_freq() -> f64 {
    DEFAULT_REF_FREQ
}

fn default_spec_index() -> f64 {
    DEFAULT_SPEC_INDEX
}

/// The morphology of a component. Gaussian axes are FWHM \[radians\],
/// position angle east from north \[radians\].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ComponentType {
    Point,
    Gaussian { maj: f64, min: f64, pa: f64 },
}

/// One component of a patch.
#[derive(Clone, Debug)]
pub struct SourceComponent {
    pub name: String,
    pub radec: RADec,
    pub comp_type: ComponentType,
    pub flux: FluxDensity,
}

/// One patch: components sharing direction-dependent effects.
#[derive(Clone, Debug)]
pub struct Patch {
    pub components: Vec1<SourceComponent>,
}

impl Patch {
    /// The flux-weighted centre of the patch, towards which its
    /// direction-dependent effects are evaluated.
    pub fn centre(&self) -> RADec {
        let radecs: Vec<RADec> = self.components.iter().map(|c| c.radec).collect();
        let weights: Vec<f64> = self.components.iter().map(|c| c.flux.i).collect();
        RADec::weighted_average(&radecs, &weights)
            // Vec1 guarantees at least one component.
            .unwrap_or(self.components.first().radec)
    }
}

/// All of the patches to model, keyed by name. Iteration order follows the
/// source list file.
#[derive(Clone, Debug, Default)]
pub struct SourceList(IndexMap<String, Patch>);

impl SourceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve patch patterns against the list. A pattern starting with
    /// `@` names one patch literally; anything else is a glob (`3C*`,
    /// `CenterPatches.*`). Matches keep source-list order and are
    /// deduplicated; a pattern that matches nothing is an error.
    pub fn select(&self, patterns: &[String]) -> Result<Vec<String>, SourceListError> {
        let mut selected: Vec<String> = vec![];
        let push = |name: &str, selected: &mut Vec<String>| {
            if !selected.iter().any(|s| s == name) {
                selected.push(name.to_string());
            }
        };
        for pattern in patterns {
            if let Some(literal) = pattern.strip_prefix('@') {
                if !self.0.contains_key(literal) {
                    return Err(SourceListError::NoMatch(pattern.clone()));
                }
                push(literal, &mut selected);
                continue;
            }
            let glob =
                glob::Pattern::new(pattern).map_err(|err| SourceListError::BadPattern {
                    pattern: pattern.clone(),
                    err,
                })?;
            let mut any = false;
            for name in self.0.keys() {
                if glob.matches(name) {
                    any = true;
                    push(name, &mut selected);
                }
            }
            if !any {
                return Err(SourceListError::NoMatch(pattern.clone()));
            }
        }
        Ok(selected)
    }
}

impl From<IndexMap<String, Patch>> for SourceList {
    fn from(map: IndexMap<String, Patch>) -> Self {
        Self(map)
    }
}

impl std::ops::Deref for SourceList {
    type Target = IndexMap<String, Patch>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for SourceList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
