// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Evaluation of expression nodes over a time-frequency grid.

There is one evaluation function for the whole node set. Perturbations are
introduced only by [`ExprKind::Parm`]; every combinator propagates them the
same way: recompute the operation with each operand's perturbed array when
it has one for the key, and its main array otherwise. The top-level model
turns perturbed results into forward-difference partials.

Flag propagation is uniform too: a sample is flagged when any operand
flags it, and flagged samples hold exact zero in the main and every
perturbed array so they cannot poison downstream arithmetic.
 */

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexSet;
use ndarray::Array2;
use num_traits::Zero;

use super::{ExprGraph, ExprId, ExprKind, RelOp};
use crate::{
    c64,
    constants::{GAUSSIAN_EXP_CONST, K_TEC, TAU, VEL_C},
    coord::{RADec, LMN},
    domain::EvalGrid,
    instrument::{Baseline, Instrument},
    jones::Jones,
    params::{ParmRegistry, PertKey, SolvableSet},
    value::{at, kernels, unify_shape, JonesValue, ScalarValue, Value},
    visbuf::VisBuffer,
};

/// Everything an evaluation pass needs besides the per-call memo table.
/// Shared by reference across the precalculation worker threads.
pub(crate) struct EvalShared<'a> {
    pub graph: &'a ExprGraph,
    pub registry: &'a ParmRegistry,
    pub solvables: &'a SolvableSet,
    pub instrument: &'a Instrument,
    pub phase_centre: RADec,
    pub grid: &'a EvalGrid,
    pub vis: Option<&'a dyn VisBuffer>,
}

impl EvalShared<'_> {
    /// Evaluate one node. `cache` holds epoch-stable precalculated results;
    /// `memo` deduplicates shared nodes within this call.
    pub(crate) fn eval(
        &self,
        id: ExprId,
        cache: &HashMap<ExprId, Arc<Value>>,
        memo: &mut HashMap<ExprId, Arc<Value>>,
    ) -> Arc<Value> {
        if let Some(v) = cache.get(&id) {
            return Arc::clone(v);
        }
        if let Some(v) = memo.get(&id) {
            return Arc::clone(v);
        }
        let v = Arc::new(self.compute(id, cache, memo));
        memo.insert(id, Arc::clone(&v));
        v
    }

    fn compute(
        &self,
        id: ExprId,
        cache: &HashMap<ExprId, Arc<Value>>,
        memo: &mut HashMap<ExprId, Arc<Value>>,
    ) -> Value {
        // Convenience: evaluate a child.
        macro_rules! ev {
            ($c:expr) => {
                self.eval(*$c, cache, memo)
            };
        }

        match self.graph.kind(id) {
            ExprKind::Parm(pid) => self
                .registry
                .evaluate(*pid, self.grid, self.solvables)
                .expect("parameter registered during model construction")
                .into(),
            ExprKind::Constant(c) => ScalarValue::broadcast(*c).into(),
            ExprKind::ConstantJones(j) => JonesValue::broadcast(*j).into(),
            ExprKind::StationShift { station, lmn } => {
                self.station_shift(*station, *lmn).into()
            }
            ExprKind::GaussianEnvelope {
                station_a,
                station_b,
                major,
                minor,
                pa,
            } => self
                .gaussian_envelope(*station_a, *station_b, *major, *minor, *pa)
                .into(),
            ExprKind::BeamResponse { station, direction } => {
                self.beam_response(*station, *direction).into()
            }
            ExprKind::ElevationMask {
                direction,
                min_elevation,
            } => self.elevation_mask(*direction, *min_elevation).into(),
            ExprKind::Observed { baseline } => self.observed(*baseline).into(),

            ExprKind::Add(a, b) => {
                scalar_zip2(None, ev!(a).as_scalar(), ev!(b).as_scalar(), |_, _, x, y| x + y)
                    .into()
            }
            ExprKind::Mul(a, b) => {
                scalar_zip2(None, ev!(a).as_scalar(), ev!(b).as_scalar(), |_, _, x, y| x * y)
                    .into()
            }
            ExprKind::ConjMul(a, b) => {
                scalar_zip2(None, ev!(a).as_scalar(), ev!(b).as_scalar(), |_, _, x, y| {
                    x * y.conj()
                })
                .into()
            }
            ExprKind::ToComplex { re, im } => {
                scalar_zip2(None, ev!(re).as_scalar(), ev!(im).as_scalar(), |_, _, x, y| {
                    x + c64::i() * y
                })
                .into()
            }
            ExprKind::ToPolar { ampl, phase } => {
                scalar_zip2(None, ev!(ampl).as_scalar(), ev!(phase).as_scalar(), |_, _, a, p| {
                    a * (c64::i() * p).exp()
                })
                .into()
            }
            ExprKind::PowerLaw {
                flux,
                index,
                ref_freq,
            } => {
                let ref_freq = *ref_freq;
                let freqs = self.grid.freqs();
                // The result varies with frequency even when both operands
                // are broadcast, so force the full grid shape.
                scalar_zip2(
                    Some(self.grid.shape()),
                    ev!(flux).as_scalar(),
                    ev!(index).as_scalar(),
                    |_, jf, s, a| s * c64::new(freqs[jf] / ref_freq, 0.0).powc(a),
                )
                .into()
            }

            ExprKind::MakeJones { cells } => {
                let vs: Vec<Arc<Value>> = cells.iter().map(|c| ev!(c)).collect();
                JonesValue::from_cells([
                    vs[0].as_scalar(),
                    vs[1].as_scalar(),
                    vs[2].as_scalar(),
                    vs[3].as_scalar(),
                ])
                .into()
            }
            ExprKind::MakeDiagJones { xx, yy } => {
                let (xx, yy) = (ev!(xx), ev!(yy));
                JonesValue::from_diag(xx.as_scalar(), yy.as_scalar()).into()
            }
            ExprKind::MatrixMul(a, b) => matrix_mul(&ev!(a), &ev!(b)).into(),
            ExprKind::Corrupt { left, mid, right } => {
                corrupt(&ev!(left), &ev!(mid), &ev!(right)).into()
            }
            ExprKind::MatrixSum(terms) => {
                let vs: Vec<Arc<Value>> = terms.iter().map(|t| ev!(t)).collect();
                matrix_sum(&vs).into()
            }
            ExprKind::MatrixInverse { arg, sigma } => {
                let sigma = *sigma;
                let v = ev!(arg);
                match sigma {
                    None => matrix_inverse(v.as_jones()).into(),
                    Some(s) => matrix_inverse_mmse(v.as_jones(), s).into(),
                }
            }
            ExprKind::ScaleJones { scalar, jones } => {
                scale_jones(&ev!(scalar), &ev!(jones)).into()
            }
            ExprKind::FlagIf {
                arg,
                op,
                threshold,
            } => flag_if(ev!(arg).as_jones(), *op, *threshold).into(),
            ExprKind::MergeFlags { arg, mask } => {
                merge_flags(ev!(arg).as_jones(), ev!(mask).as_scalar()).into()
            }
            ExprKind::Brightness { i, q, u, v } => {
                let (i, q, u, v) = (ev!(i), ev!(q), ev!(u), ev!(v));
                brightness(i.as_scalar(), q.as_scalar(), u.as_scalar(), v.as_scalar()).into()
            }
            ExprKind::ClockDelay { delay } => {
                let freqs = self.grid.freqs();
                scalar_to_jones(self.grid.shape(), ev!(delay).as_scalar(), |_, jf, tau| {
                    let e = (c64::i() * (TAU * freqs[jf]) * tau).exp();
                    Jones::diag(e, e)
                })
                .into()
            }
            ExprKind::TecPhase { tec } => {
                let freqs = self.grid.freqs();
                scalar_to_jones(self.grid.shape(), ev!(tec).as_scalar(), |_, jf, tec| {
                    let e = (-c64::i() * (K_TEC / freqs[jf]) * tec).exp();
                    Jones::diag(e, e)
                })
                .into()
            }
            ExprKind::FaradayRotation { rm } => {
                let freqs = self.grid.freqs();
                scalar_to_jones(self.grid.shape(), ev!(rm).as_scalar(), |_, jf, rm| {
                    let lambda = VEL_C / freqs[jf];
                    // Rotation measures are real-valued parameters.
                    let chi = rm.re * (lambda * lambda);
                    let (s, c) = chi.sin_cos();
                    let (s, c) = (c64::new(s, 0.0), c64::new(c, 0.0));
                    Jones::from([c, -s, s, c])
                })
                .into()
            }
            ExprKind::IonoPhase {
                station,
                direction,
                coeffs,
            } => {
                let vs: Vec<Arc<Value>> = coeffs.iter().map(|c| ev!(c)).collect();
                let cs: Vec<&ScalarValue> = vs.iter().map(|v| v.as_scalar()).collect();
                self.iono_phase(*station, *direction, &cs).into()
            }
        }
    }

    fn station_shift(&self, station: usize, lmn: LMN) -> ScalarValue {
        let (n_time, n_freq) = self.grid.shape();
        let pos = self.instrument.station(station).position;
        let mut data = Array2::zeros((n_time, n_freq));
        for (it, &t) in self.grid.times().iter().enumerate() {
            let hadec = self.phase_centre.to_hadec(self.instrument.lst(t));
            let uvw = pos.to_uvw(hadec);
            // Geometric delay phase per Hz.
            let rate = TAU * (uvw.u * lmn.l + uvw.v * lmn.m + uvw.w * (lmn.n - 1.0)) / VEL_C;
            for (jf, &f) in self.grid.freqs().iter().enumerate() {
                data[[it, jf]] = c64::cis(rate * f);
            }
        }
        ScalarValue::unflagged(data)
    }

    fn gaussian_envelope(
        &self,
        station_a: usize,
        station_b: usize,
        major: f64,
        minor: f64,
        pa: f64,
    ) -> ScalarValue {
        let (n_time, n_freq) = self.grid.shape();
        let pos_a = self.instrument.station(station_a).position;
        let pos_b = self.instrument.station(station_b).position;
        let (s_pa, c_pa) = pa.sin_cos();
        let mut data = Array2::zeros((n_time, n_freq));
        for (it, &t) in self.grid.times().iter().enumerate() {
            let hadec = self.phase_centre.to_hadec(self.instrument.lst(t));
            let uvw = pos_a.to_uvw(hadec) - pos_b.to_uvw(hadec);
            for (jf, &f) in self.grid.freqs().iter().enumerate() {
                // Baseline in wavelengths.
                let u = uvw.u * f / VEL_C;
                let v = uvw.v * f / VEL_C;
                let k_x = u * s_pa + v * c_pa;
                let k_y = u * c_pa - v * s_pa;
                let env =
                    (GAUSSIAN_EXP_CONST * ((major * k_x).powi(2) + (minor * k_y).powi(2))).exp();
                data[[it, jf]] = c64::new(env, 0.0);
            }
        }
        ScalarValue::unflagged(data)
    }

    fn beam_response(&self, station: usize, direction: RADec) -> JonesValue {
        let (n_time, n_freq) = self.grid.shape();
        let st = self.instrument.station(station);
        let beam = crate::beam::StationBeam {
            pointing: self.phase_centre,
            diameter: st.diameter,
        };
        let mut data = Array2::from_elem((n_time, n_freq), Jones::zero());
        let mut flags = Array2::from_elem((n_time, n_freq), false);
        for (it, &t) in self.grid.times().iter().enumerate() {
            let azel = direction
                .to_hadec(self.instrument.lst(t))
                .to_azel(self.instrument.latitude_rad);
            if !azel.is_above_horizon() {
                for jf in 0..n_freq {
                    flags[[it, jf]] = true;
                }
                continue;
            }
            for (jf, &f) in self.grid.freqs().iter().enumerate() {
                let g = c64::new(beam.response(direction, f), 0.0);
                data[[it, jf]] = Jones::diag(g, g);
            }
        }
        JonesValue::new(data, flags)
    }

    fn elevation_mask(&self, direction: RADec, min_elevation: f64) -> ScalarValue {
        let (n_time, n_freq) = self.grid.shape();
        let mut flags = Array2::from_elem((n_time, n_freq), false);
        for (it, &t) in self.grid.times().iter().enumerate() {
            let azel = direction
                .to_hadec(self.instrument.lst(t))
                .to_azel(self.instrument.latitude_rad);
            if azel.el < min_elevation {
                for jf in 0..n_freq {
                    flags[[it, jf]] = true;
                }
            }
        }
        let ones = Array2::from_elem((n_time, n_freq), c64::new(1.0, 0.0));
        ScalarValue::new(ones, flags)
    }

    fn observed(&self, baseline: Baseline) -> JonesValue {
        match self.vis.and_then(|v| v.read(baseline, self.grid)) {
            Some(row) => JonesValue::new(row.data, row.flags),
            // No data: a fully-flagged zero result, not an error.
            None => {
                let shape = self.grid.shape();
                JonesValue::new(
                    Array2::from_elem(shape, Jones::zero()),
                    Array2::from_elem(shape, true),
                )
            }
        }
    }

    fn iono_phase(&self, station: usize, direction: RADec, coeffs: &[&ScalarValue]) -> JonesValue {
        let (n_time, n_freq) = self.grid.shape();
        let pos = self.instrument.station(station).position;
        let freqs = self.grid.freqs();

        // Piercepoint coordinates [km] per time sample; None below horizon.
        let pp: Vec<Option<(f64, f64)>> = self
            .grid
            .times()
            .iter()
            .map(|&t| {
                let azel = direction
                    .to_hadec(self.instrument.lst(t))
                    .to_azel(self.instrument.latitude_rad);
                if !azel.is_above_horizon() {
                    return None;
                }
                let (s_az, c_az) = azel.az.sin_cos();
                let run = crate::constants::IONO_HEIGHT / azel.el.tan();
                Some((
                    (pos.x + run * s_az) / 1e3,
                    (pos.y + run * c_az) / 1e3,
                ))
            })
            .collect();

        let mut shape = self.grid.shape();
        for c in coeffs {
            shape = unify_shape(shape, c.shape());
        }

        let mut flags = Array2::from_elem((n_time, n_freq), false);
        for (it, p) in pp.iter().enumerate() {
            if p.is_none() {
                for jf in 0..n_freq {
                    flags[[it, jf]] = true;
                }
            }
        }
        for c in coeffs {
            for ((it, jf), f) in flags.indexed_iter_mut() {
                *f |= at(c.flags(), it, jf);
            }
        }

        let go = |key: Option<PertKey>| -> Array2<Jones> {
            Array2::from_shape_fn((n_time, n_freq), |(it, jf)| {
                let (x, y) = match pp[it] {
                    Some(p) => p,
                    None => return Jones::zero(),
                };
                let mut tec = c64::zero();
                for (k, c) in coeffs.iter().enumerate() {
                    let arr = match key {
                        Some(key) => c.pert_or_value(key),
                        None => c.data(),
                    };
                    tec += at(arr, it, jf) * mim_basis(k, x, y);
                }
                let e = (-c64::i() * (K_TEC / freqs[jf]) * tec).exp();
                Jones::diag(e, e)
            })
        };

        let mut out = JonesValue::new(go(None), flags);
        let keys: IndexSet<PertKey> = coeffs.iter().flat_map(|c| c.pert_keys()).collect();
        for key in keys {
            out.insert_perturbed(key, go(Some(key)));
        }
        out
    }
}

/// The `k`-th term of the ionospheric screen polynomial, enumerated by
/// increasing total degree starting at degree 1 (an absolute phase offset
/// is unobservable): x, y, x², xy, y², x³, ...
pub(crate) fn mim_basis(k: usize, x: f64, y: f64) -> f64 {
    let mut idx = k;
    let mut d = 1;
    loop {
        let terms = d + 1;
        if idx < terms {
            let i = d - idx;
            let j = idx;
            return x.powi(i as i32) * y.powi(j as i32);
        }
        idx -= terms;
        d += 1;
    }
}

fn or_flags(shape: (usize, usize), flags: &[&Array2<bool>]) -> Array2<bool> {
    Array2::from_shape_fn(shape, |(i, j)| flags.iter().any(|fl| at(fl, i, j)))
}

/// Apply a per-sample binary scalar operation, unioning flags and
/// recomputing for each perturbation key either operand carries.
fn scalar_zip2(
    force_shape: Option<(usize, usize)>,
    a: &ScalarValue,
    b: &ScalarValue,
    f: impl Fn(usize, usize, c64, c64) -> c64,
) -> ScalarValue {
    let mut shape = unify_shape(a.shape(), b.shape());
    if let Some(s) = force_shape {
        shape = unify_shape(shape, s);
    }
    let go = |xa: &Array2<c64>, xb: &Array2<c64>| {
        Array2::from_shape_fn(shape, |(i, j)| f(i, j, at(xa, i, j), at(xb, i, j)))
    };
    let mut out = ScalarValue::new(go(a.data(), b.data()), or_flags(shape, &[a.flags(), b.flags()]));
    let keys: IndexSet<PertKey> = a.pert_keys().chain(b.pert_keys()).collect();
    for key in keys {
        out.insert_perturbed(key, go(a.pert_or_value(key), b.pert_or_value(key)));
    }
    out
}

/// Map a scalar value through a per-sample Jones-producing function. The
/// result always has the full grid shape (the function depends on the
/// sample's frequency or time).
fn scalar_to_jones(
    grid_shape: (usize, usize),
    v: &ScalarValue,
    f: impl Fn(usize, usize, c64) -> Jones,
) -> JonesValue {
    let shape = unify_shape(v.shape(), grid_shape);
    let go =
        |x: &Array2<c64>| Array2::from_shape_fn(shape, |(i, j)| f(i, j, at(x, i, j)));
    let mut out = JonesValue::new(go(v.data()), or_flags(shape, &[v.flags()]));
    for key in v.pert_keys().collect::<Vec<_>>() {
        out.insert_perturbed(key, go(v.pert_or_value(key)));
    }
    out
}

fn matrix_mul(av: &Value, bv: &Value) -> JonesValue {
    let (a, b) = (av.as_jones(), bv.as_jones());
    let shape = unify_shape(a.shape(), b.shape());
    let go = |xa: &Array2<Jones>, xb: &Array2<Jones>| -> Array2<Jones> {
        match (xa.as_slice(), xb.as_slice()) {
            // Both operands on the full output grid and contiguous: take
            // the vectorised kernel.
            (Some(sa), Some(sb)) if xa.dim() == shape && xb.dim() == shape => {
                let mut out = vec![Jones::zero(); sa.len()];
                kernels::jones_mul(sa, sb, &mut out);
                Array2::from_shape_vec(shape, out).expect("lengths match")
            }
            _ => Array2::from_shape_fn(shape, |(i, j)| at(xa, i, j) * at(xb, i, j)),
        }
    };
    let mut out = JonesValue::new(go(a.data(), b.data()), or_flags(shape, &[a.flags(), b.flags()]));
    let keys: IndexSet<PertKey> = a.pert_keys().chain(b.pert_keys()).collect();
    for key in keys {
        out.insert_perturbed(key, go(a.pert_or_value(key), b.pert_or_value(key)));
    }
    out
}

/// L . M . R^H without materialising the Hermitian transpose.
fn corrupt(lv: &Value, mv: &Value, rv: &Value) -> JonesValue {
    let (l, m, r) = (lv.as_jones(), mv.as_jones(), rv.as_jones());
    let shape = unify_shape(unify_shape(l.shape(), m.shape()), r.shape());
    let go = |xl: &Array2<Jones>, xm: &Array2<Jones>, xr: &Array2<Jones>| -> Array2<Jones> {
        match (xl.as_slice(), xm.as_slice(), xr.as_slice()) {
            (Some(sl), Some(sm), Some(sr))
                if xl.dim() == shape && xm.dim() == shape && xr.dim() == shape =>
            {
                let mut out = vec![Jones::zero(); sl.len()];
                kernels::jones_corrupt(sl, sm, sr, &mut out);
                Array2::from_shape_vec(shape, out).expect("lengths match")
            }
            _ => Array2::from_shape_fn(shape, |(i, j)| {
                (at(xl, i, j) * at(xm, i, j)).mul_hermitian(&at(xr, i, j))
            }),
        }
    };
    let mut out = JonesValue::new(
        go(l.data(), m.data(), r.data()),
        or_flags(shape, &[l.flags(), m.flags(), r.flags()]),
    );
    let keys: IndexSet<PertKey> = l
        .pert_keys()
        .chain(m.pert_keys())
        .chain(r.pert_keys())
        .collect();
    for key in keys {
        out.insert_perturbed(
            key,
            go(l.pert_or_value(key), m.pert_or_value(key), r.pert_or_value(key)),
        );
    }
    out
}

fn scale_jones(sv: &Value, jv: &Value) -> JonesValue {
    let (s, j) = (sv.as_scalar(), jv.as_jones());
    let shape = unify_shape(s.shape(), j.shape());
    let go = |xs: &Array2<c64>, xj: &Array2<Jones>| -> Array2<Jones> {
        match (xs.as_slice(), xj.as_slice()) {
            (Some(ss), Some(sj)) if xs.dim() == shape && xj.dim() == shape => {
                let mut out = vec![Jones::zero(); ss.len()];
                kernels::scale_jones(ss, sj, &mut out);
                Array2::from_shape_vec(shape, out).expect("lengths match")
            }
            _ => Array2::from_shape_fn(shape, |(i, jf)| at(xj, i, jf) * at(xs, i, jf)),
        }
    };
    let mut out = JonesValue::new(go(s.data(), j.data()), or_flags(shape, &[s.flags(), j.flags()]));
    let keys: IndexSet<PertKey> = s.pert_keys().chain(j.pert_keys()).collect();
    for key in keys {
        out.insert_perturbed(key, go(s.pert_or_value(key), j.pert_or_value(key)));
    }
    out
}

fn matrix_sum(terms: &[Arc<Value>]) -> JonesValue {
    if terms.is_empty() {
        return JonesValue::broadcast(Jones::zero());
    }
    let vs: Vec<&JonesValue> = terms.iter().map(|t| t.as_jones()).collect();
    let mut shape = (1, 1);
    for v in &vs {
        shape = unify_shape(shape, v.shape());
    }
    let flag_refs: Vec<&Array2<bool>> = vs.iter().map(|v| v.flags()).collect();
    let go = |key: Option<PertKey>| -> Array2<Jones> {
        Array2::from_shape_fn(shape, |(i, j)| {
            vs.iter().fold(Jones::zero(), |acc, v| {
                let arr = match key {
                    Some(key) => v.pert_or_value(key),
                    None => v.data(),
                };
                acc + at(arr, i, j)
            })
        })
    };
    let mut out = JonesValue::new(go(None), or_flags(shape, &flag_refs));
    let keys: IndexSet<PertKey> = vs.iter().flat_map(|v| v.pert_keys()).collect();
    for key in keys {
        out.insert_perturbed(key, go(Some(key)));
    }
    out
}

/// Direct analytic inverse. A sample is flagged when its main value or
/// any of its perturbed values is singular; a half-invertible sample
/// would otherwise leak a garbage partial.
fn matrix_inverse(v: &JonesValue) -> JonesValue {
    let shape = v.shape();
    let mut flags = v.flags().clone();
    let mut data = Array2::from_elem(shape, Jones::zero());
    for ((i, j), x) in v.data().indexed_iter() {
        let inv = x.inv();
        if inv.is_finite() {
            data[[i, j]] = inv;
        } else {
            flags[[i, j]] = true;
        }
    }
    let inverted: Vec<(PertKey, Array2<Jones>)> = v
        .iter_perturbed()
        .map(|(key, parr)| {
            let pinv = parr.mapv(|x| x.inv());
            for ((i, j), x) in pinv.indexed_iter() {
                if !x.is_finite() {
                    flags[[i, j]] = true;
                }
            }
            (key, pinv)
        })
        .collect();
    // Construction zeroes every flagged sample, main and perturbed.
    let mut out = JonesValue::new(data, flags);
    for (key, pinv) in inverted {
        out.insert_perturbed(key, pinv);
    }
    out
}

/// MMSE regularised inverse: finite for singular input when `sigma > 0`,
/// so only upstream flags survive.
fn matrix_inverse_mmse(v: &JonesValue, sigma: f64) -> JonesValue {
    let mut flags = v.flags().clone();
    let mut data = Array2::from_elem(v.shape(), Jones::zero());
    for ((i, j), x) in v.data().indexed_iter() {
        let inv = x.mmse_inv(sigma);
        if inv.is_finite() {
            data[[i, j]] = inv;
        } else {
            flags[[i, j]] = true;
        }
    }
    let inverted: Vec<(PertKey, Array2<Jones>)> = v
        .iter_perturbed()
        .map(|(key, parr)| {
            let pinv = parr.mapv(|x| x.mmse_inv(sigma));
            for ((i, j), x) in pinv.indexed_iter() {
                if !x.is_finite() {
                    flags[[i, j]] = true;
                }
            }
            (key, pinv)
        })
        .collect();
    let mut out = JonesValue::new(data, flags);
    for (key, pinv) in inverted {
        out.insert_perturbed(key, pinv);
    }
    out
}

fn flag_if(v: &JonesValue, op: RelOp, threshold: f64) -> JonesValue {
    let mut flags = v.flags().clone();
    for ((i, j), x) in v.data().indexed_iter() {
        if op.holds(x.cond(), threshold) {
            flags[[i, j]] = true;
        }
    }
    let mut out = JonesValue::new(v.data().clone(), flags);
    for (key, parr) in v.iter_perturbed() {
        out.insert_perturbed(key, parr.clone());
    }
    out
}

/// Value of `arg` with the flags of `mask` mixed in.
fn merge_flags(arg: &JonesValue, mask: &ScalarValue) -> JonesValue {
    let shape = unify_shape(arg.shape(), mask.shape());
    let go = |x: &Array2<Jones>| Array2::from_shape_fn(shape, |(i, j)| at(x, i, j));
    let mut out = JonesValue::new(go(arg.data()), or_flags(shape, &[arg.flags(), mask.flags()]));
    for key in arg.pert_keys().collect::<Vec<_>>() {
        out.insert_perturbed(key, go(arg.pert_or_value(key)));
    }
    out
}

/// Stokes parameters to a linear-feed coherence matrix.
fn brightness(i: &ScalarValue, q: &ScalarValue, u: &ScalarValue, v: &ScalarValue) -> JonesValue {
    let mut shape = (1, 1);
    for s in [i, q, u, v] {
        shape = unify_shape(shape, s.shape());
    }
    let go = |xi: &Array2<c64>, xq: &Array2<c64>, xu: &Array2<c64>, xv: &Array2<c64>| {
        Array2::from_shape_fn(shape, |(t, f)| {
            let (si, sq, su, sv) = (at(xi, t, f), at(xq, t, f), at(xu, t, f), at(xv, t, f));
            Jones::from([
                0.5 * (si + sq),
                0.5 * (su + c64::i() * sv),
                0.5 * (su - c64::i() * sv),
                0.5 * (si - sq),
            ])
        })
    };
    let mut out = JonesValue::new(
        go(i.data(), q.data(), u.data(), v.data()),
        or_flags(shape, &[i.flags(), q.flags(), u.flags(), v.flags()]),
    );
    let keys: IndexSet<PertKey> = [i, q, u, v]
        .iter()
        .flat_map(|s| s.pert_keys())
        .collect();
    for key in keys {
        out.insert_perturbed(
            key,
            go(
                i.pert_or_value(key),
                q.pert_or_value(key),
                u.pert_or_value(key),
                v.pert_or_value(key),
            ),
        );
    }
    out
}
