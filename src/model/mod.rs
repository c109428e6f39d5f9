// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The top-level model: an expression graph per baseline, a parameter
registry, and an epoch-tagged result cache.

A solver drives this in a loop: set an evaluation grid, mark parameters
solvable, `precompute`, `evaluate` each baseline, post updated
coefficients, repeat. Changing the grid, the solvable set, or a parameter
invalidates the cache by bumping the epoch.
 */

mod builder;
mod error;

pub use builder::{build, Effect, GainParam, ModelConfig, ModelMode};
pub use error::{ConstructionError, ModelError};

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use ndarray::Array2;

use crate::{
    coord::RADec,
    domain::{Domain, EvalGrid},
    expr::{eval::EvalShared, levels, CachePolicy, ExprGraph, ExprId},
    instrument::{Baseline, Instrument},
    jones::Jones,
    params::{ParmRegistry, PertKey, SolvableSet},
    value::{at, Value},
    visbuf::VisBuffer,
};

/// The evaluated visibilities of one baseline, on the full grid, with one
/// partial-derivative array per solvable coefficient.
#[derive(Clone, Debug)]
pub struct ModelResult {
    pub data: Array2<Jones>,
    pub flags: Array2<bool>,
    /// Forward-difference partials, keyed by parameter coefficient and
    /// ordered by introduction.
    pub partials: IndexMap<PertKey, Array2<Jones>>,
}

impl ModelResult {
    pub fn partial(&self, key: PertKey) -> Option<&Array2<Jones>> {
        self.partials.get(&key)
    }
}

pub struct Model {
    graph: ExprGraph,
    registry: ParmRegistry,
    solvables: SolvableSet,
    instrument: Instrument,
    phase_centre: RADec,
    roots: HashMap<(usize, usize), ExprId>,
    policy: CachePolicy,
    vis: Option<Box<dyn VisBuffer>>,
    grid: Option<EvalGrid>,
    cache: HashMap<ExprId, Arc<Value>>,
    epoch: u64,
}

impl Model {
    pub(crate) fn from_parts(
        graph: ExprGraph,
        registry: ParmRegistry,
        instrument: Instrument,
        phase_centre: RADec,
        roots: HashMap<(usize, usize), ExprId>,
        policy: CachePolicy,
        vis: Option<Box<dyn VisBuffer>>,
    ) -> Self {
        Self {
            graph,
            registry,
            solvables: SolvableSet::default(),
            instrument,
            phase_centre,
            roots,
            policy,
            vis,
            grid: None,
            cache: HashMap::new(),
            epoch: 0,
        }
    }

    /// The grid every following evaluation runs on. Replaces any previous
    /// grid and invalidates cached results.
    pub fn set_eval_grid(&mut self, grid: EvalGrid) {
        self.grid = Some(grid);
        self.invalidate("grid replaced");
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn phase_centre(&self) -> RADec {
        self.phase_centre
    }

    pub fn registry(&self) -> &ParmRegistry {
        &self.registry
    }

    /// The union box over every finite parameter domain.
    pub fn domain(&self) -> Domain {
        self.registry.domain()
    }

    pub fn baselines(&self) -> Vec<Baseline> {
        self.instrument.baselines()
    }

    pub fn solvables(&self) -> &SolvableSet {
        &self.solvables
    }

    /// Replace the solvable set; results evaluated afterwards carry one
    /// perturbed value per coefficient of each named parameter.
    pub fn set_solvables(&mut self, solvables: SolvableSet) {
        self.solvables = solvables;
        self.invalidate("solvable set replaced");
    }

    pub fn clear_solvables(&mut self) {
        if !self.solvables.is_empty() {
            self.solvables = SolvableSet::default();
            self.invalidate("solvable set cleared");
        }
    }

    /// Post updated coefficients for one polynomial piece of a parameter.
    pub fn update_parm(
        &mut self,
        name: &str,
        cell: usize,
        coeffs: Array2<f64>,
    ) -> Result<(), ModelError> {
        self.registry.update_coeffs(name, cell, coeffs)?;
        self.invalidate("parameter updated");
        Ok(())
    }

    /// Monotonic cache-invalidation counter, mostly for diagnostics.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn invalidate(&mut self, why: &str) {
        self.epoch += 1;
        self.cache.clear();
        log::trace!("cache invalidated ({why}); epoch now {}", self.epoch);
    }

    fn shared(&self) -> Result<EvalShared<'_>, ModelError> {
        Ok(EvalShared {
            graph: &self.graph,
            registry: &self.registry,
            solvables: &self.solvables,
            instrument: &self.instrument,
            phase_centre: self.phase_centre,
            grid: self.grid.as_ref().ok_or(ModelError::NoEvalGrid)?,
            vis: self.vis.as_deref(),
        })
    }

    /// Evaluate every multiply-used interior node once, in parallel, and
    /// keep the results for following `evaluate` calls. Optional: `evaluate`
    /// is correct without it, just slower across baselines.
    pub fn precompute(&mut self) -> Result<(), ModelError> {
        let cache = {
            let shared = self.shared()?;
            levels::precompute(&shared, self.policy)
        };
        self.cache = cache;
        Ok(())
    }

    /// Evaluate one baseline over the current grid.
    pub fn evaluate(&self, baseline: Baseline) -> Result<ModelResult, ModelError> {
        let root = *self
            .roots
            .get(&(baseline.a, baseline.b))
            .ok_or(ModelError::UnknownBaseline {
                a: baseline.a,
                b: baseline.b,
            })?;
        let shared = self.shared()?;
        let shape = shared.grid.shape();

        let mut memo = HashMap::new();
        let value = shared.eval(root, &self.cache, &mut memo);
        let value = value.as_jones();

        // Results are handed out on the full grid even if the graph
        // collapsed to a broadcast value.
        let data = Array2::from_shape_fn(shape, |(i, j)| at(value.data(), i, j));
        let flags = Array2::from_shape_fn(shape, |(i, j)| at(value.flags(), i, j));
        let mut partials = IndexMap::with_capacity(value.num_perturbed());
        for (key, parr) in value.iter_perturbed() {
            let step = self.registry.pert_step(key)?;
            partials.insert(
                key,
                Array2::from_shape_fn(shape, |(i, j)| {
                    (at(parr, i, j) - at(value.data(), i, j)) * (1.0 / step)
                }),
            );
        }
        Ok(ModelResult {
            data,
            flags,
            partials,
        })
    }
}
