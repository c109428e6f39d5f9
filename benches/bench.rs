// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::{criterion_group, criterion_main, Criterion};
use hifitime::Epoch;
use indexmap::IndexMap;
use vec1::{vec1, Vec1};

use memodel::{
    build,
    coord::{RADec, Xyz},
    instrument::REF_STATION_DIAMETER,
    model::ModelConfig,
    srclist::{ComponentType, FluxDensity, Patch, SourceComponent, SourceList},
    Baseline, Effect, EvalGrid, Instrument, Jones, MemParmDb, Model, Station,
};

fn instrument(n_stations: usize) -> Instrument {
    let stations: Vec<Station> = (0..n_stations)
        .map(|i| Station {
            name: format!("CS{i:03}"),
            position: Xyz::new(150.0 * i as f64, 40.0 * i as f64, 5.0 * (i % 3) as f64),
            diameter: REF_STATION_DIAMETER,
        })
        .collect();
    Instrument {
        name: "BENCH".to_string(),
        longitude_rad: 0.12,
        latitude_rad: 0.92,
        stations: Vec1::try_from_vec(stations).unwrap(),
    }
}

fn source_list() -> SourceList {
    let comp = |name: &str, ra: f64, dec: f64, i: f64, gauss: bool| SourceComponent {
        name: name.to_string(),
        radec: RADec::new_degrees(ra, dec),
        comp_type: if gauss {
            ComponentType::Gaussian {
                maj: 0.05_f64.to_radians(),
                min: 0.02_f64.to_radians(),
                pa: 1.0,
            }
        } else {
            ComponentType::Point
        },
        flux: FluxDensity {
            i,
            q: 0.1,
            u: 0.0,
            v: 0.0,
            ref_freq: 150e6,
            spectral_index: -0.7,
        },
    };
    let mut map = IndexMap::new();
    map.insert(
        "A".to_string(),
        Patch {
            components: vec1![comp("A1", 30.2, 52.1, 10.0, false), comp("A2", 30.3, 52.0, 2.0, true)],
        },
    );
    map.insert(
        "B".to_string(),
        Patch {
            components: vec1![comp("B1", 29.5, 51.7, 5.0, false)],
        },
    );
    SourceList::from(map)
}

fn grid(n_time: usize, n_freq: usize) -> EvalGrid {
    let times: Vec<Epoch> = (0..n_time)
        .map(|i| Epoch::from_gpst_seconds(1_000_000_000.0 + 10.0 * i as f64))
        .collect();
    let freqs: Vec<f64> = (0..n_freq).map(|i| 120e6 + 200e3 * i as f64).collect();
    EvalGrid::new(
        Vec1::try_from_vec(times).unwrap(),
        Vec1::try_from_vec(freqs).unwrap(),
    )
}

fn model(n_stations: usize) -> Model {
    let config = ModelConfig {
        effects: vec![Effect::Gain, Effect::Clock, Effect::Beam],
        ..Default::default()
    };
    let mut model = build(
        config,
        instrument(n_stations),
        &source_list(),
        RADec::new_degrees(30.0, 52.0),
        &MemParmDb::new(),
        None,
    )
    .unwrap();
    model.set_eval_grid(grid(16, 32));
    model
}

fn jones(c: &mut Criterion) {
    let a: Vec<Jones> = (0..8192)
        .map(|i| {
            let x = i as f64 * 1e-3;
            Jones::from([
                memodel::c64::new(1.0 + x, x),
                memodel::c64::new(x, -x),
                memodel::c64::new(-x, x),
                memodel::c64::new(1.0 - x, x),
            ])
        })
        .collect();
    c.bench_function("multiply 8192 Jones matrix pairs", |b| {
        b.iter(|| {
            let sum: Jones = a
                .iter()
                .zip(a.iter().rev())
                .fold(Jones::zero(), |acc, (x, y)| acc + *x * y);
            criterion::black_box(sum)
        })
    });
}

fn evaluation(c: &mut Criterion) {
    let m = model(8);
    let bl = Baseline { a: 0, b: 1 };
    c.bench_function("evaluate one baseline, 8 stations, 16x32 grid", |b| {
        b.iter(|| criterion::black_box(m.evaluate(bl).unwrap()))
    });

    c.bench_function("precalculate shared chains, 8 stations", |b| {
        b.iter_batched(
            || model(8),
            |mut m| {
                m.precompute().unwrap();
                criterion::black_box(m)
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, jones, evaluation);
criterion_main!(benches);
