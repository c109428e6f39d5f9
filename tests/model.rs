// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! End-to-end tests driving a model through the public API, from a YAML sky
//! model to visibilities and partial derivatives.

use approx::assert_abs_diff_eq;
use hifitime::Epoch;
use indoc::indoc;
use ndarray::Array2;
use vec1::vec1;

use memodel::{
    build,
    coord::Xyz,
    instrument::REF_STATION_DIAMETER,
    model::{ConstructionError, ModelConfig, ModelMode},
    srclist::source_list_from_yaml,
    visbuf::MemVisBuffer,
    Baseline, Effect, EvalGrid, Instrument, Jones, MemParmDb, ParmDef, PertKey, SolvableSet,
    SourceList,
};

const SKY_YAML: &str = indoc! {"
    Centre:
      - name: centre
        ra: 30.0
        dec: 52.0
        comp_type: point
        flux:
          i: 2.0
          ref_freq: 150000000.0
          spectral_index: 0.0
    OffAxis:
      - name: off1
        ra: 30.6
        dec: 52.3
        comp_type: point
        flux:
          i: 1.0
          ref_freq: 150000000.0
          spectral_index: -0.7
      - name: off2
        ra: 29.4
        dec: 51.7
        comp_type:
          gaussian:
            maj: 120.0
            min: 60.0
            pa: 45.0
        flux:
          i: 3.0
          ref_freq: 150000000.0
          spectral_index: -0.7
"};

fn sky() -> SourceList {
    // RUST_LOG=debug surfaces the builder's construction summaries.
    let _ = env_logger::builder().is_test(true).try_init();
    source_list_from_yaml(SKY_YAML.as_bytes()).unwrap()
}

fn instrument() -> Instrument {
    let station = |name: &str, x: f64, y: f64, z: f64| memodel::Station {
        name: name.to_string(),
        position: Xyz::new(x, y, z),
        diameter: REF_STATION_DIAMETER,
    };
    Instrument {
        name: "TEST".to_string(),
        longitude_rad: 0.12,
        latitude_rad: 0.92,
        stations: vec1![
            station("CS001", 0.0, 0.0, 0.0),
            station("CS002", 500.0, 100.0, 20.0),
            station("RS106", 2000.0, -300.0, 50.0),
            station("RS210", -1500.0, 800.0, -30.0),
        ],
    }
}

fn grid() -> EvalGrid {
    EvalGrid::new(
        vec1![
            Epoch::from_gpst_seconds(1_000_000_000.0),
            Epoch::from_gpst_seconds(1_000_000_010.0),
            Epoch::from_gpst_seconds(1_000_000_020.0),
        ],
        vec1![140e6, 150e6, 160e6, 170e6],
    )
}

fn phase_centre() -> memodel::coord::RADec {
    memodel::coord::RADec::new_degrees(30.0, 52.0)
}

#[test]
fn a_source_at_the_phase_centre_has_no_fringe() {
    // The phase centre has direction cosines (l, m, n) = (0, 0, 1), so the
    // geometric delay vanishes on every baseline and only the brightness
    // matrix remains: 0.5 * diag(I, I) with I = 2.
    let config = ModelConfig {
        patches: vec!["@Centre".to_string()],
        ..Default::default()
    };
    let mut model = build(
        config,
        instrument(),
        &sky(),
        phase_centre(),
        &MemParmDb::new(),
        None,
    )
    .unwrap();
    model.set_eval_grid(grid());

    for bl in model.baselines() {
        let result = model.evaluate(bl).unwrap();
        for j in &result.data {
            assert_abs_diff_eq!(*j, Jones::identity(), epsilon = 1e-9);
        }
        assert!(result.flags.iter().all(|&f| !f));
    }
}

#[test]
fn precalculation_is_bit_transparent() {
    let config = ModelConfig {
        effects: vec![Effect::Gain, Effect::Clock, Effect::Beam],
        ..Default::default()
    };
    let mut model = build(
        config,
        instrument(),
        &sky(),
        phase_centre(),
        &MemParmDb::new(),
        None,
    )
    .unwrap();
    model.set_eval_grid(grid());

    let cold: Vec<_> = model
        .baselines()
        .into_iter()
        .map(|bl| model.evaluate(bl).unwrap())
        .collect();
    model.precompute().unwrap();
    for (bl, before) in model.baselines().into_iter().zip(&cold) {
        let after = model.evaluate(bl).unwrap();
        // Cached and uncached evaluations share the arithmetic, so the
        // results must agree to the bit.
        assert_eq!(after.data, before.data);
        assert_eq!(after.flags, before.flags);
    }
}

#[test]
fn partials_follow_the_solved_station() {
    let mut model = build(
        ModelConfig {
            effects: vec![Effect::Gain],
            ..Default::default()
        },
        instrument(),
        &sky(),
        phase_centre(),
        &MemParmDb::new(),
        None,
    )
    .unwrap();
    model.set_eval_grid(grid());

    let id = model.registry().parm_id("Gain:0:0:Re:RS106").unwrap();
    model.set_solvables(SolvableSet::new([id]));

    for bl in model.baselines() {
        let result = model.evaluate(bl).unwrap();
        let touches_rs106 = bl.a == 2 || bl.b == 2;
        assert_eq!(result.partials.len(), usize::from(touches_rs106));
        if touches_rs106 {
            let key = PertKey { parm: id, coeff: 0 };
            assert!(result.partial(key).is_some());
        }
    }
}

#[test]
fn partial_agrees_with_a_finite_difference() {
    let build_model = || {
        let mut model = build(
            ModelConfig {
                effects: vec![Effect::Gain],
                ..Default::default()
            },
            instrument(),
            &sky(),
            phase_centre(),
            &MemParmDb::new(),
            None,
        )
        .unwrap();
        model.set_eval_grid(grid());
        model
    };

    let mut model = build_model();
    let name = "Gain:0:0:Re:CS001";
    let id = model.registry().parm_id(name).unwrap();
    model.set_solvables(SolvableSet::new([id]));
    let bl = Baseline { a: 0, b: 1 };
    let result = model.evaluate(bl).unwrap();
    let partial = result.partial(PertKey { parm: id, coeff: 0 }).unwrap();

    let delta = 1e-5;
    let mut shifted = build_model();
    shifted
        .update_parm(name, 0, Array2::from_elem((1, 1), 1.0 + delta))
        .unwrap();
    let plus = shifted.evaluate(bl).unwrap();

    for ((p, a), b) in partial.iter().zip(&plus.data).zip(&result.data) {
        for k in 0..4 {
            let fd = (a[k] - b[k]) / delta;
            assert_abs_diff_eq!(p[k].re, fd.re, epsilon = 1e-6);
            assert_abs_diff_eq!(p[k].im, fd.im, epsilon = 1e-6);
        }
    }
}

#[test]
fn inverse_mode_towards_one_patch() {
    let mut db = MemParmDb::new();
    for stn in ["CS001", "CS002", "RS106", "RS210"] {
        db.insert(format!("Gain:0:0:Re:{stn}"), ParmDef::constant(2.0));
        db.insert(format!("Gain:1:1:Re:{stn}"), ParmDef::constant(2.0));
    }

    let inst = instrument();
    let shape = grid().shape();
    let mut vis = MemVisBuffer::new();
    for bl in inst.baselines() {
        vis.insert(
            bl,
            Array2::from_elem(shape, Jones::identity()),
            Array2::from_elem(shape, false),
        );
    }

    let config = ModelConfig {
        patches: vec!["@Centre".to_string()],
        effects: vec![Effect::Gain, Effect::Beam],
        mode: ModelMode::Inverse {
            sigma: None,
            cond_threshold: None,
        },
        ..Default::default()
    };
    let mut model = build(
        config,
        inst,
        &sky(),
        phase_centre(),
        &db,
        Some(Box::new(vis)),
    )
    .unwrap();
    model.set_eval_grid(grid());

    let result = model.evaluate(Baseline { a: 0, b: 1 }).unwrap();
    assert!(result.flags.iter().all(|&f| !f));
    for j in &result.data {
        // The gains divide 2x2 = 4 out of the identity data; the beam
        // towards the patch centre only amplifies further.
        assert!(j[0].re >= 0.25);
        assert_abs_diff_eq!(j[1].norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(j[2].norm(), 0.0, epsilon = 1e-12);
    }
}

#[test]
fn inverse_mode_with_two_patches_is_ambiguous() {
    let config = ModelConfig {
        patches: vec!["*".to_string()],
        effects: vec![Effect::Gain, Effect::Beam],
        mode: ModelMode::Inverse {
            sigma: None,
            cond_threshold: None,
        },
        ..Default::default()
    };
    assert!(matches!(
        build(
            config,
            instrument(),
            &sky(),
            phase_centre(),
            &MemParmDb::new(),
            Some(Box::new(MemVisBuffer::new())),
        ),
        Err(ConstructionError::AmbiguousDirection(2))
    ));
}
