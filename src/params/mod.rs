// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The parameter registry.

Every quantity the external solver can fit (complex gains, clock delays,
source fluxes, ionospheric screen coefficients, ...) is a named, piecewise
2-D polynomial parameter. The registry is the one and only place where
perturbations are *introduced* into the expression graph: a solvable
parameter's evaluation attaches one perturbed value per polynomial
coefficient, and every combinator downstream only *propagates* them.
 */

mod error;
pub(crate) mod poly;
#[cfg(test)]
mod tests;

pub use error::ParameterError;

use indexmap::{IndexMap, IndexSet};
use ndarray::prelude::*;
use vec1::Vec1;

use crate::{
    c64,
    constants::DEFAULT_PERTURBATION,
    domain::{Domain, EvalGrid},
    value::ScalarValue,
};

/// The stable identity of a registered parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParmId(pub(crate) u32);

impl std::fmt::Display for ParmId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The key of one perturbed value: which parameter, and which of its
/// polynomial coefficients (flattened across pieces).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PertKey {
    pub parm: ParmId,
    pub coeff: u16,
}

/// One piece of a piecewise polynomial: a coefficient matrix valid over a
/// time/frequency box. Coefficients are indexed \[time power\]\[freq power\]
/// and evaluated at domain-normalised coordinates.
#[derive(Clone, Debug)]
pub struct PolyCell {
    pub domain: Domain,
    pub coeffs: Array2<f64>,
}

/// A parameter definition, before it gets a name and an id.
#[derive(Clone, Debug)]
pub struct ParmDef {
    /// Forward-difference perturbation applied to each coefficient when the
    /// parameter is solvable.
    pub pert: f64,
    /// If set, the perturbation is `pert * coefficient` for non-zero
    /// coefficients.
    pub pert_rel: bool,
    pub cells: Vec1<PolyCell>,
}

impl ParmDef {
    /// A constant parameter valid everywhere.
    pub fn constant(value: f64) -> Self {
        Self {
            pert: DEFAULT_PERTURBATION,
            pert_rel: false,
            cells: Vec1::new(PolyCell {
                domain: Domain::all(),
                coeffs: arr2(&[[value]]),
            }),
        }
    }

    pub fn with_pert(mut self, pert: f64, pert_rel: bool) -> Self {
        self.pert = pert;
        self.pert_rel = pert_rel;
        self
    }
}

/// A registered parameter.
#[derive(Clone, Debug)]
pub struct Parm {
    pub name: String,
    pub pert: f64,
    pub pert_rel: bool,
    pub cells: Vec1<PolyCell>,
}

impl Parm {
    /// The perturbation step used for one coefficient's forward difference.
    pub(crate) fn step(&self, coeff: f64) -> f64 {
        if self.pert_rel && coeff != 0.0 {
            self.pert * coeff
        } else {
            self.pert
        }
    }

    /// The flattened-coefficient offset of cell `ci`.
    fn coeff_offset(&self, ci: usize) -> usize {
        self.cells.iter().take(ci).map(|c| c.coeffs.len()).sum()
    }

    fn num_coeffs(&self) -> usize {
        self.cells.iter().map(|c| c.coeffs.len()).sum()
    }
}

/// The set of parameters currently being fit, passed explicitly into every
/// evaluation pass. Replacing it on the model bumps the cache epoch.
#[derive(Clone, Debug, Default)]
pub struct SolvableSet {
    ids: IndexSet<ParmId>,
}

impl SolvableSet {
    pub fn new(ids: impl IntoIterator<Item = ParmId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: ParmId) -> bool {
        self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ParmId> + '_ {
        self.ids.iter().copied()
    }

    pub fn ids(&self) -> &IndexSet<ParmId> {
        &self.ids
    }
}

/// Read-only lookup against an external parameter database. The model
/// builder consults it for initial parameter definitions and falls back to
/// per-effect defaults when a name is absent.
pub trait ParmDb {
    fn lookup(&self, name: &str) -> Option<ParmDef>;
}

/// An in-memory [`ParmDb`], mostly for tests and for solvers that hold their
/// working set in memory.
#[derive(Clone, Debug, Default)]
pub struct MemParmDb {
    defs: IndexMap<String, ParmDef>,
}

impl MemParmDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, def: ParmDef) {
        self.defs.insert(name.into(), def);
    }
}

impl ParmDb for MemParmDb {
    fn lookup(&self, name: &str) -> Option<ParmDef> {
        self.defs.get(name).cloned()
    }
}

/// The process-wide table of parameters referenced by a model. Populated
/// during model construction; coefficient values are updated in place by the
/// solver between iterations; ids are stable for the registry's lifetime.
#[derive(Clone, Debug, Default)]
pub struct ParmRegistry {
    parms: Vec<Parm>,
    names: IndexMap<String, ParmId>,
}

impl ParmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parms.is_empty()
    }

    pub fn get(&self, id: ParmId) -> Result<&Parm, ParameterError> {
        self.parms
            .get(id.0 as usize)
            .ok_or(ParameterError::UnknownParameter(id.0))
    }

    pub fn parm_id(&self, name: &str) -> Result<ParmId, ParameterError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ParameterError::UnknownParameterName(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParmId, &Parm)> {
        self.parms
            .iter()
            .enumerate()
            .map(|(i, p)| (ParmId(i as u32), p))
    }

    /// Register a new parameter. Two parameters never share a name or an id.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        def: ParmDef,
    ) -> Result<ParmId, ParameterError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(ParameterError::Duplicate(name));
        }
        let id = ParmId(self.parms.len() as u32);
        self.names.insert(name.clone(), id);
        self.parms.push(Parm {
            name,
            pert: def.pert,
            pert_rel: def.pert_rel,
            cells: def.cells,
        });
        Ok(id)
    }

    /// Get the id of `name`, registering `def()` if it is new.
    pub fn get_or_register(&mut self, name: &str, def: impl FnOnce() -> ParmDef) -> ParmId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        // Just checked the name is absent.
        self.register(name.to_string(), def()).expect("name is new")
    }

    /// Replace the coefficients of one polynomial piece. This is how the
    /// solver posts updated values between iterations; the caller must bump
    /// the evaluation epoch afterwards.
    pub fn update_coeffs(
        &mut self,
        name: &str,
        cell: usize,
        coeffs: Array2<f64>,
    ) -> Result<(), ParameterError> {
        let id = self.parm_id(name)?;
        let parm = &mut self.parms[id.0 as usize];
        let old = &mut parm.cells[cell].coeffs;
        assert_eq!(
            old.dim(),
            coeffs.dim(),
            "coefficient shape changed for parameter '{name}'"
        );
        *old = coeffs;
        Ok(())
    }

    /// The union box over every finite parameter domain, or
    /// [`Domain::all`] when only constant (everywhere-valid) parameters are
    /// registered.
    pub fn domain(&self) -> Domain {
        let mut finite: Option<Domain> = None;
        for parm in &self.parms {
            for cell in &parm.cells {
                if !cell.domain.is_all() {
                    finite = Some(match finite {
                        Some(d) => d.union(&cell.domain),
                        None => cell.domain,
                    });
                }
            }
        }
        finite.unwrap_or_else(Domain::all)
    }

    /// The forward-difference step for one perturbation key, used by the
    /// top-level evaluator to turn perturbed values into partial
    /// derivatives.
    pub fn pert_step(&self, key: PertKey) -> Result<f64, ParameterError> {
        let parm = self.get(key.parm)?;
        let mut k = key.coeff as usize;
        for cell in &parm.cells {
            if k < cell.coeffs.len() {
                let coeff = cell.coeffs.as_slice().expect("row major")[k];
                return Ok(parm.step(coeff));
            }
            k -= cell.coeffs.len();
        }
        Err(ParameterError::UnknownPerturbation {
            parm: key.parm.0,
            coeff: key.coeff,
        })
    }

    /// Evaluate a parameter over the grid. Samples outside every polynomial
    /// piece are flagged (and zero). If the parameter is in `solvables`, one
    /// perturbed value is attached per coefficient of every piece that
    /// covers at least one sample.
    pub fn evaluate(
        &self,
        id: ParmId,
        grid: &EvalGrid,
        solvables: &SolvableSet,
    ) -> Result<ScalarValue, ParameterError> {
        let parm = self.get(id)?;
        let (n_time, n_freq) = grid.shape();
        let mut data = Array2::<c64>::zeros((n_time, n_freq));
        let mut flags = Array2::from_elem((n_time, n_freq), true);
        // Which piece covers which sample; first piece wins.
        let mut cell_of = Array2::<usize>::from_elem((n_time, n_freq), usize::MAX);

        for (ci, cell) in parm.cells.iter().enumerate() {
            for (it, &t) in grid.time_secs().iter().enumerate() {
                for (jf, &f) in grid.freqs().iter().enumerate() {
                    if flags[[it, jf]] && cell.domain.contains(t, f) {
                        let tn = cell.domain.norm_time(t);
                        let fn_ = cell.domain.norm_freq(f);
                        data[[it, jf]] = c64::new(poly::eval(&cell.coeffs, tn, fn_), 0.0);
                        flags[[it, jf]] = false;
                        cell_of[[it, jf]] = ci;
                    }
                }
            }
        }

        let mut value = ScalarValue::new(data, flags);

        if solvables.contains(id) {
            for (ci, cell) in parm.cells.iter().enumerate() {
                let offset = parm.coeff_offset(ci);
                let coeffs_flat = cell.coeffs.as_slice().expect("row major");
                for (k, &coeff) in coeffs_flat.iter().enumerate() {
                    let step = parm.step(coeff);
                    let mut pdata = value.data().clone();
                    let mut touched = false;
                    for (it, &t) in grid.time_secs().iter().enumerate() {
                        for (jf, &f) in grid.freqs().iter().enumerate() {
                            if cell_of[[it, jf]] == ci {
                                let tn = cell.domain.norm_time(t);
                                let fn_ = cell.domain.norm_freq(f);
                                // The polynomial is linear in its
                                // coefficients, so stepping one of them
                                // shifts the value by step * basis.
                                pdata[[it, jf]] += step * poly::basis(&cell.coeffs, k, tn, fn_);
                                touched = true;
                            }
                        }
                    }
                    if touched {
                        let coeff = u16::try_from(offset + k).map_err(|_| {
                            ParameterError::TooManyCoeffs {
                                name: parm.name.clone(),
                                n: parm.num_coeffs(),
                            }
                        })?;
                        value.insert_perturbed(PertKey { parm: id, coeff }, pdata);
                    }
                }
            }
        }

        Ok(value)
    }
}
