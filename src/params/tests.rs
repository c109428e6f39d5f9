// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use hifitime::Epoch;
use ndarray::{array, Array2};
use vec1::vec1;

use super::*;
use crate::domain::{Domain, EvalGrid};

fn epoch(gpst_s: f64) -> Epoch {
    Epoch::from_gpst_seconds(gpst_s)
}

fn grid() -> EvalGrid {
    EvalGrid::new(
        vec1![epoch(1_000_000_000.0), epoch(1_000_000_010.0)],
        vec1![140e6, 150e6, 160e6],
    )
}

#[test]
fn register_and_lookup() {
    let mut reg = ParmRegistry::new();
    let id = reg.register("Gain:0:0:Re:CS001", ParmDef::constant(1.0)).unwrap();
    assert_eq!(reg.parm_id("Gain:0:0:Re:CS001").unwrap(), id);
    assert_eq!(reg.get(id).unwrap().name, "Gain:0:0:Re:CS001");
    assert!(matches!(
        reg.parm_id("Gain:0:0:Im:CS001"),
        Err(ParameterError::UnknownParameterName(_))
    ));
}

#[test]
fn duplicate_name_is_an_error() {
    let mut reg = ParmRegistry::new();
    reg.register("Clock:CS001", ParmDef::constant(0.0)).unwrap();
    assert!(matches!(
        reg.register("Clock:CS001", ParmDef::constant(1.0)),
        Err(ParameterError::Duplicate(_))
    ));
}

#[test]
fn get_or_register_is_idempotent() {
    let mut reg = ParmRegistry::new();
    let a = reg.get_or_register("TEC:CS001", || ParmDef::constant(0.0));
    let b = reg.get_or_register("TEC:CS001", || ParmDef::constant(99.0));
    assert_eq!(a, b);
    assert_eq!(reg.len(), 1);
}

#[test]
fn constant_parm_covers_every_sample() {
    let mut reg = ParmRegistry::new();
    let id = reg.register("Gain:0:0:Re:CS001", ParmDef::constant(2.5)).unwrap();
    let v = reg.evaluate(id, &grid(), &SolvableSet::default()).unwrap();
    assert_eq!(v.shape(), (2, 3));
    for &x in v.data() {
        assert_abs_diff_eq!(x.re, 2.5);
        assert_abs_diff_eq!(x.im, 0.0);
    }
    assert!(v.flags().iter().all(|&f| !f));
    assert_eq!(v.num_perturbed(), 0);
}

#[test]
fn samples_outside_every_piece_are_flagged_zero() {
    // One piece covering only the first time sample.
    let dom = Domain::new(epoch(999_999_995.0), epoch(1_000_000_005.0), 0.0, 1e12);
    let def = ParmDef {
        pert: 1e-6,
        pert_rel: false,
        cells: vec1![PolyCell {
            domain: dom,
            coeffs: array![[3.0]],
        }],
    };
    let mut reg = ParmRegistry::new();
    let id = reg.register("Bandpass:0:0:CS001", def).unwrap();
    let v = reg.evaluate(id, &grid(), &SolvableSet::default()).unwrap();
    for jf in 0..3 {
        assert!(!v.flags()[[0, jf]]);
        assert_abs_diff_eq!(v.data()[[0, jf]].re, 3.0);
        assert!(v.flags()[[1, jf]]);
        assert_abs_diff_eq!(v.data()[[1, jf]].re, 0.0);
        assert_abs_diff_eq!(v.data()[[1, jf]].im, 0.0);
    }
}

#[test]
fn first_piece_wins_on_overlap() {
    let dom = Domain::new(epoch(999_999_990.0), epoch(1_000_000_020.0), 0.0, 1e12);
    let def = ParmDef {
        pert: 1e-6,
        pert_rel: false,
        cells: vec1![
            PolyCell {
                domain: dom,
                coeffs: array![[1.0]],
            },
            PolyCell {
                domain: dom,
                coeffs: array![[2.0]],
            },
        ],
    };
    let mut reg = ParmRegistry::new();
    let id = reg.register("Gain:1:1:Re:CS002", def).unwrap();
    let v = reg.evaluate(id, &grid(), &SolvableSet::default()).unwrap();
    for &x in v.data() {
        assert_abs_diff_eq!(x.re, 1.0);
    }
}

#[test]
fn solvable_parm_gets_one_perturbation_per_coefficient() {
    let dom = Domain::new(epoch(999_999_990.0), epoch(1_000_000_020.0), 100e6, 200e6);
    let def = ParmDef {
        pert: 1e-6,
        pert_rel: false,
        cells: vec1![PolyCell {
            domain: dom,
            // 2x2 coefficients: value = c00 + c01 f + c10 t + c11 t f.
            coeffs: array![[0.5, 0.1], [0.2, 0.0]],
        }],
    };
    let mut reg = ParmRegistry::new();
    let id = reg.register("DirectionalGain:0:0:Re:CS001:CasA", def).unwrap();
    let solvables = SolvableSet::new([id]);
    let v = reg.evaluate(id, &grid(), &solvables).unwrap();
    assert_eq!(v.num_perturbed(), 4);

    // Polynomials are linear in their coefficients, so each perturbed
    // array differs from the main one by exactly step * basis.
    for (k, (key, parr)) in v.iter_perturbed().enumerate() {
        assert_eq!(key.parm, id);
        assert_eq!(key.coeff as usize, k);
        let step = reg.pert_step(key).unwrap();
        assert_abs_diff_eq!(step, 1e-6);
        for (it, &t) in grid().time_secs().iter().enumerate() {
            for (jf, &f) in grid().freqs().iter().enumerate() {
                let tn = dom.norm_time(t);
                let fn_ = dom.norm_freq(f);
                let expected = step * poly::basis(&array![[0.5, 0.1], [0.2, 0.0]], k, tn, fn_);
                let diff = parr[[it, jf]] - v.data()[[it, jf]];
                assert_abs_diff_eq!(diff.re, expected, epsilon = 1e-15);
                assert_abs_diff_eq!(diff.im, 0.0);
            }
        }
    }
}

#[test]
fn relative_perturbation_scales_with_the_coefficient() {
    let def = ParmDef::constant(4.0).with_pert(1e-3, true);
    let mut reg = ParmRegistry::new();
    let id = reg.register("I:CasA", def).unwrap();
    let solvables = SolvableSet::new([id]);
    let v = reg.evaluate(id, &grid(), &solvables).unwrap();
    let (key, _) = v.iter_perturbed().next().unwrap();
    // Relative: step = pert * coeff.
    assert_abs_diff_eq!(reg.pert_step(key).unwrap(), 4e-3);

    // A zero coefficient falls back to the absolute step.
    let mut reg = ParmRegistry::new();
    let id = reg
        .register("I:CygA", ParmDef::constant(0.0).with_pert(1e-3, true))
        .unwrap();
    let v = reg.evaluate(id, &grid(), &SolvableSet::new([id])).unwrap();
    let (key, _) = v.iter_perturbed().next().unwrap();
    assert_abs_diff_eq!(reg.pert_step(key).unwrap(), 1e-3);
}

#[test]
fn non_solvable_parm_has_no_perturbations() {
    let mut reg = ParmRegistry::new();
    let a = reg.register("Clock:CS001", ParmDef::constant(1e-9)).unwrap();
    let b = reg.register("Clock:CS002", ParmDef::constant(2e-9)).unwrap();
    let solvables = SolvableSet::new([b]);
    let v = reg.evaluate(a, &grid(), &solvables).unwrap();
    assert_eq!(v.num_perturbed(), 0);
    let v = reg.evaluate(b, &grid(), &solvables).unwrap();
    assert_eq!(v.num_perturbed(), 1);
}

#[test]
fn coefficient_keys_do_not_wrap() {
    // One more coefficient than a u16 key can hold.
    let dom = Domain::new(epoch(999_999_990.0), epoch(1_000_000_020.0), 100e6, 200e6);
    let def = ParmDef {
        pert: 1e-6,
        pert_rel: false,
        cells: vec1![PolyCell {
            domain: dom,
            coeffs: Array2::zeros((1, usize::from(u16::MAX) + 2)),
        }],
    };
    let mut reg = ParmRegistry::new();
    let id = reg.register("MIM:0", def).unwrap();
    assert!(matches!(
        reg.evaluate(id, &grid(), &SolvableSet::new([id])),
        Err(ParameterError::TooManyCoeffs { .. })
    ));
}

#[test]
fn update_coeffs_changes_the_value() {
    let mut reg = ParmRegistry::new();
    let id = reg.register("TEC:RS106", ParmDef::constant(1.0)).unwrap();
    reg.update_coeffs("TEC:RS106", 0, Array2::from_elem((1, 1), 7.0))
        .unwrap();
    let v = reg.evaluate(id, &grid(), &SolvableSet::default()).unwrap();
    for &x in v.data() {
        assert_abs_diff_eq!(x.re, 7.0);
    }
}

#[test]
fn registry_domain_unions_finite_pieces() {
    let mut reg = ParmRegistry::new();
    reg.register("Gain:0:0:Re:CS001", ParmDef::constant(1.0)).unwrap();
    assert!(reg.domain().is_all());

    let d1 = Domain::new(epoch(100.0), epoch(200.0), 100e6, 150e6);
    let d2 = Domain::new(epoch(150.0), epoch(400.0), 120e6, 180e6);
    for (name, d) in [("A", d1), ("B", d2)] {
        reg.register(
            name,
            ParmDef {
                pert: 1e-6,
                pert_rel: false,
                cells: vec1![PolyCell {
                    domain: d,
                    coeffs: array![[1.0]],
                }],
            },
        )
        .unwrap();
    }
    let union = reg.domain();
    assert!(!union.is_all());
    assert_abs_diff_eq!(union.time_start, 100.0);
    assert_abs_diff_eq!(union.time_end, 400.0);
    assert_abs_diff_eq!(union.freq_start, 100e6);
    assert_abs_diff_eq!(union.freq_end, 180e6);
}
