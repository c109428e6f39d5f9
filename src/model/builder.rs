// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Turning a model configuration into an expression graph.

For every baseline `a x b` the builder assembles

```text
V_ab = D_a . ( sum over patches p:  E_ap . C_abp . E_bp^H ) . D_b^H
```

where `D` is a station's direction-independent chain, `E` its
direction-dependent chain towards a patch centre, and `C_abp` the patch
coherence (a sum of per-component coherences). Sub-chains are created once
and shared: a station's `D` appears in every baseline touching the
station, which is what makes precalculation worthwhile.

Parameters follow the conventional colon-separated names
(`Gain:0:0:Re:CS001`, `DirectionalGain:1:1:Im:CS001:CasA`,
`Clock:CS002`, `TEC:RS106`, `RotationMeasure:CS001:CasA`, `MIM:3`,
`I:CasA_core`, `SpectralIndex:CasA_core`), so an external database can
seed initial values. Complex gains split into `:Re:`/`:Im:` pairs, or
`:Ampl:`/`:Phase:` under [`GainParam::Polar`].
 */

use std::collections::HashMap;

use crate::{
    c64,
    coord::RADec,
    expr::{CachePolicy, ExprGraph, ExprId, ExprKind, RelOp},
    instrument::Instrument,
    params::{ParmDb, ParmDef, ParmRegistry},
    srclist::{ComponentType, SourceList, SourceListError},
    visbuf::VisBuffer,
};

use super::{ConstructionError, Model};

/// One instrumental effect in a station's chain. The order in
/// [`ModelConfig::effects`] is the order of application, outermost first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Full 2x2 complex gain per station.
    Gain,
    /// Diagonal real bandpass per station.
    Bandpass,
    /// Clock delay per station.
    Clock,
    /// Ionospheric total electron content per station.
    Tec,
    /// Diagonal complex gain per station towards each patch.
    DirectionalGain,
    /// Analytic station beam towards each patch.
    Beam,
    /// Faraday rotation per station towards each patch.
    FaradayRotation,
    /// Polynomial ionospheric phase screen, shared coefficients.
    IonoScreen,
}

impl Effect {
    fn is_directional(self) -> bool {
        matches!(
            self,
            Effect::DirectionalGain | Effect::Beam | Effect::FaradayRotation | Effect::IonoScreen
        )
    }
}

/// How complex gains map onto parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GainParam {
    /// `{prefix}:Re:{suffix}` and `{prefix}:Im:{suffix}`.
    #[default]
    Cartesian,
    /// `{prefix}:Ampl:{suffix}` and `{prefix}:Phase:{suffix}`.
    Polar,
}

/// What the evaluated visibilities mean.
#[derive(Debug, Default)]
pub enum ModelMode {
    /// Predict model visibilities from the sky model.
    #[default]
    Forward,
    /// Correct observed data by the inverted station chains:
    /// `D_a^-1 . V_obs . D_b^-H`. Selecting exactly one patch also
    /// divides out the direction-dependent chain towards its centre;
    /// selecting more than one is a construction error.
    Inverse {
        /// `None` for the direct inverse (singular samples are flagged);
        /// `Some(sigma)` for the MMSE inverse.
        sigma: Option<f64>,
        /// Flag samples whose gain condition number reaches this value
        /// before inverting.
        cond_threshold: Option<f64>,
    },
}

/// Everything that shapes the expression graph.
#[derive(Debug)]
pub struct ModelConfig {
    /// Patch patterns to select from the source list (`@name` literal,
    /// glob otherwise). Empty selects every patch.
    pub patches: Vec<String>,
    pub effects: Vec<Effect>,
    pub gain_param: GainParam,
    pub mode: ModelMode,
    /// Flag samples where a patch centre sits below this elevation
    /// \[radians\].
    pub min_elevation: Option<f64>,
    /// Number of polynomial terms of the ionospheric screen.
    pub iono_rank: usize,
    pub cache_policy: CachePolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            patches: vec![],
            effects: vec![],
            gain_param: GainParam::default(),
            mode: ModelMode::Forward,
            min_elevation: None,
            iono_rank: 3,
            cache_policy: CachePolicy::Aggressive,
        }
    }
}

struct Builder<'a> {
    graph: ExprGraph,
    registry: ParmRegistry,
    db: &'a dyn ParmDb,
    instrument: &'a Instrument,
    gain_param: GainParam,
}

impl Builder<'_> {
    /// Look a parameter up in the external database, falling back to a
    /// constant default, and register it.
    fn parm(&mut self, name: String, default: f64) -> ExprId {
        let db = self.db;
        let id = self
            .registry
            .get_or_register(&name, || {
                db.lookup(&name).unwrap_or_else(|| ParmDef::constant(default))
            });
        self.graph.add(ExprKind::Parm(id))
    }

    /// `re + i im` from two registered parameters, named
    /// `{prefix}:Re:{suffix}` and `{prefix}:Im:{suffix}`.
    fn complex_parm(&mut self, prefix: &str, suffix: &str, default_re: f64) -> ExprId {
        let re = self.parm(format!("{prefix}:Re:{suffix}"), default_re);
        let im = self.parm(format!("{prefix}:Im:{suffix}"), 0.0);
        self.graph.add(ExprKind::ToComplex { re, im })
    }

    /// `ampl e^(i phase)` from two registered parameters, named
    /// `{prefix}:Ampl:{suffix}` and `{prefix}:Phase:{suffix}`.
    fn polar_parm(&mut self, prefix: &str, suffix: &str, default_ampl: f64) -> ExprId {
        let ampl = self.parm(format!("{prefix}:Ampl:{suffix}"), default_ampl);
        let phase = self.parm(format!("{prefix}:Phase:{suffix}"), 0.0);
        self.graph.add(ExprKind::ToPolar { ampl, phase })
    }

    /// One complex gain cell in the configured parameterisation. The
    /// default is purely real, so it doubles as the default amplitude.
    fn gain_parm(&mut self, prefix: &str, suffix: &str, default: f64) -> ExprId {
        match self.gain_param {
            GainParam::Cartesian => self.complex_parm(prefix, suffix, default),
            GainParam::Polar => self.polar_parm(prefix, suffix, default),
        }
    }

    /// A station's direction-independent chain, or `None` when the
    /// configuration has no direction-independent effects.
    fn die_chain(&mut self, effects: &[Effect], stn: usize) -> Option<ExprId> {
        let name = self.instrument.station(stn).name.clone();
        let mut chain: Option<ExprId> = None;
        for effect in effects {
            let node = match effect {
                Effect::Gain => {
                    let xx = self.gain_parm("Gain:0:0", &name, 1.0);
                    let xy = self.gain_parm("Gain:0:1", &name, 0.0);
                    let yx = self.gain_parm("Gain:1:0", &name, 0.0);
                    let yy = self.gain_parm("Gain:1:1", &name, 1.0);
                    self.graph.add(ExprKind::MakeJones {
                        cells: [xx, xy, yx, yy],
                    })
                }
                Effect::Bandpass => {
                    let xx = self.parm(format!("Bandpass:0:0:{name}"), 1.0);
                    let yy = self.parm(format!("Bandpass:1:1:{name}"), 1.0);
                    self.graph.add(ExprKind::MakeDiagJones { xx, yy })
                }
                Effect::Clock => {
                    let delay = self.parm(format!("Clock:{name}"), 0.0);
                    self.graph.add(ExprKind::ClockDelay { delay })
                }
                Effect::Tec => {
                    let tec = self.parm(format!("TEC:{name}"), 0.0);
                    self.graph.add(ExprKind::TecPhase { tec })
                }
                _ => continue,
            };
            chain = Some(match chain {
                Some(prev) => self.graph.add(ExprKind::MatrixMul(prev, node)),
                None => node,
            });
        }
        chain
    }

    /// A station's direction-dependent chain towards one patch centre.
    fn dde_chain(
        &mut self,
        effects: &[Effect],
        iono_rank: usize,
        stn: usize,
        patch: &str,
        centre: RADec,
    ) -> Option<ExprId> {
        let name = self.instrument.station(stn).name.clone();
        let mut chain: Option<ExprId> = None;
        for effect in effects {
            let node = match effect {
                Effect::DirectionalGain => {
                    let suffix = format!("{name}:{patch}");
                    let xx = self.gain_parm("DirectionalGain:0:0", &suffix, 1.0);
                    let yy = self.gain_parm("DirectionalGain:1:1", &suffix, 1.0);
                    self.graph.add(ExprKind::MakeDiagJones { xx, yy })
                }
                Effect::Beam => self.graph.add(ExprKind::BeamResponse {
                    station: stn,
                    direction: centre,
                }),
                Effect::FaradayRotation => {
                    let rm = self.parm(format!("RotationMeasure:{name}:{patch}"), 0.0);
                    self.graph.add(ExprKind::FaradayRotation { rm })
                }
                Effect::IonoScreen => {
                    let coeffs: Vec<ExprId> = (0..iono_rank)
                        .map(|k| self.parm(format!("MIM:{k}"), 0.0))
                        .collect();
                    self.graph.add(ExprKind::IonoPhase {
                        station: stn,
                        direction: centre,
                        coeffs,
                    })
                }
                _ => continue,
            };
            chain = Some(match chain {
                Some(prev) => self.graph.add(ExprKind::MatrixMul(prev, node)),
                None => node,
            });
        }
        chain
    }

    /// The frequency-independent brightness of one component, with the
    /// power-law spectrum applied to every Stokes parameter.
    fn brightness(&mut self, comp: &crate::srclist::SourceComponent) -> ExprId {
        let flux = comp.flux;
        let i_parm = self.parm(format!("I:{}", comp.name), flux.i);
        let si = self.parm(format!("SpectralIndex:{}", comp.name), flux.spectral_index);
        let i = self.graph.add(ExprKind::PowerLaw {
            flux: i_parm,
            index: si,
            ref_freq: flux.ref_freq,
        });
        let mut polarised = |x: f64| {
            if x == 0.0 {
                self.graph.add(ExprKind::Constant(c64::new(0.0, 0.0)))
            } else {
                let c = self.graph.add(ExprKind::Constant(c64::new(x, 0.0)));
                let one = self.graph.add(ExprKind::Constant(c64::new(1.0, 0.0)));
                let ratio = self.graph.add(ExprKind::PowerLaw {
                    flux: one,
                    index: si,
                    ref_freq: flux.ref_freq,
                });
                self.graph.add(ExprKind::Mul(c, ratio))
            }
        };
        let q = polarised(flux.q);
        let u = polarised(flux.u);
        let v = polarised(flux.v);
        self.graph.add(ExprKind::Brightness { i, q, u, v })
    }
}

/// Resolve the configured patch patterns. A pattern matching nothing and
/// an empty result are both construction errors in forward mode; inverse
/// mode tolerates an empty selection (direction-independent correction).
fn select_patches(
    patterns: &[String],
    source_list: &SourceList,
) -> Result<Vec<String>, ConstructionError> {
    if patterns.is_empty() {
        return Ok(source_list.keys().cloned().collect());
    }
    source_list.select(patterns).map_err(|e| match e {
        SourceListError::NoMatch(_) => ConstructionError::NoMatchingPatches,
        other => ConstructionError::SourceList(other),
    })
}

/// Build a [`Model`].
pub fn build(
    config: ModelConfig,
    instrument: Instrument,
    source_list: &SourceList,
    phase_centre: RADec,
    db: &dyn ParmDb,
    vis: Option<Box<dyn VisBuffer>>,
) -> Result<Model, ConstructionError> {
    let n_stations = instrument.num_stations();
    if n_stations < 2 {
        return Err(ConstructionError::TooFewStations(n_stations));
    }
    if config.effects.contains(&Effect::IonoScreen) && config.iono_rank == 0 {
        return Err(ConstructionError::EmptyIonoScreen);
    }

    let mut b = Builder {
        graph: ExprGraph::new(),
        registry: ParmRegistry::new(),
        db,
        instrument: &instrument,
        gain_param: config.gain_param,
    };
    let baselines = instrument.baselines();

    // The station chains are shared by every baseline.
    let die: Vec<Option<ExprId>> = (0..n_stations)
        .map(|s| b.die_chain(&config.effects, s))
        .collect();

    let mut roots: HashMap<(usize, usize), ExprId> = HashMap::with_capacity(baselines.len());

    match config.mode {
        ModelMode::Forward => {
            let patch_names = select_patches(&config.patches, source_list)?;
            if patch_names.is_empty() {
                return Err(ConstructionError::NoMatchingPatches);
            }
            log::info!(
                "building a forward model: {} patches, {} baselines, {} stations",
                patch_names.len(),
                baselines.len(),
                n_stations
            );

            let mut patches = vec![];
            for name in &patch_names {
                let patch = &source_list[name];
                let centre = patch.centre();

                // Per-station shifts and chains for this patch; brightness
                // and envelope parameters per component.
                let dde: Vec<Option<ExprId>> = (0..n_stations)
                    .map(|s| b.dde_chain(&config.effects, config.iono_rank, s, name, centre))
                    .collect();
                let mask = config.min_elevation.map(|min_elevation| {
                    b.graph.add(ExprKind::ElevationMask {
                        direction: centre,
                        min_elevation,
                    })
                });
                let comps: Vec<(ExprId, Vec<ExprId>, &ComponentType)> = patch
                    .components
                    .iter()
                    .map(|comp| {
                        let bright = b.brightness(comp);
                        let lmn = comp.radec.to_lmn(phase_centre);
                        let shifts = (0..n_stations)
                            .map(|s| b.graph.add(ExprKind::StationShift { station: s, lmn }))
                            .collect();
                        (bright, shifts, &comp.comp_type)
                    })
                    .collect();
                patches.push((dde, mask, comps));
            }

            for bl in &baselines {
                let sum = b.graph.add(ExprKind::MatrixSum(vec![]));
                for (dde, mask, comps) in &patches {
                    let mut comp_terms = Vec::with_capacity(comps.len());
                    for (bright, shifts, comp_type) in comps {
                        let mut factor = b
                            .graph
                            .add(ExprKind::ConjMul(shifts[bl.a], shifts[bl.b]));
                        if let ComponentType::Gaussian { maj, min, pa } = comp_type {
                            let env = b.graph.add(ExprKind::GaussianEnvelope {
                                station_a: bl.a,
                                station_b: bl.b,
                                major: *maj,
                                minor: *min,
                                pa: *pa,
                            });
                            factor = b.graph.add(ExprKind::Mul(factor, env));
                        }
                        comp_terms.push(b.graph.add(ExprKind::ScaleJones {
                            scalar: factor,
                            jones: *bright,
                        }));
                    }
                    // Patches hold at least one component.
                    let mut term = if comp_terms.len() == 1 {
                        comp_terms[0]
                    } else {
                        b.graph.add(ExprKind::MatrixSum(comp_terms))
                    };
                    term = match (dde[bl.a], dde[bl.b]) {
                        (Some(ea), Some(eb)) => b.graph.add(ExprKind::Corrupt {
                            left: ea,
                            mid: term,
                            right: eb,
                        }),
                        (None, None) => term,
                        _ => unreachable!("chains exist for every station or none"),
                    };
                    if let Some(mask) = mask {
                        term = b.graph.add(ExprKind::MergeFlags {
                            arg: term,
                            mask: *mask,
                        });
                    }
                    b.graph.connect(sum, term);
                }
                let root = match (die[bl.a], die[bl.b]) {
                    (Some(da), Some(db_)) => b.graph.add(ExprKind::Corrupt {
                        left: da,
                        mid: sum,
                        right: db_,
                    }),
                    (None, None) => sum,
                    _ => unreachable!("chains exist for every station or none"),
                };
                roots.insert((bl.a, bl.b), root);
            }
        }
        ModelMode::Inverse {
            sigma,
            cond_threshold,
        } => {
            if vis.is_none() {
                return Err(ConstructionError::MissingVisBuffer);
            }
            // A correction is per direction: at most one patch's
            // direction-dependent chain can be divided out. No
            // selection means a direction-independent correction.
            let patch_names = if config.patches.is_empty() {
                Vec::new()
            } else {
                select_patches(&config.patches, source_list)?
            };
            let towards = match patch_names.as_slice() {
                [] => None,
                [name] => Some(name.as_str()),
                more => return Err(ConstructionError::AmbiguousDirection(more.len())),
            };
            if towards.is_none() && config.effects.iter().any(|e| e.is_directional()) {
                log::warn!(
                    "directional effects are configured but no patch is selected; \
                     only direction-independent effects will be corrected"
                );
            }
            log::info!(
                "building an inverse model: {} baselines, {} stations, direction {:?}",
                baselines.len(),
                n_stations,
                towards
            );

            // Invert each station's full chain once, optionally flagging
            // ill-conditioned samples first.
            let inv: Vec<Option<ExprId>> = (0..n_stations)
                .map(|s| {
                    let dde = towards.and_then(|name| {
                        let centre = source_list[name].centre();
                        b.dde_chain(&config.effects, config.iono_rank, s, name, centre)
                    });
                    let chain = match (die[s], dde) {
                        (Some(d), Some(e)) => Some(b.graph.add(ExprKind::MatrixMul(d, e))),
                        (Some(d), None) => Some(d),
                        (None, Some(e)) => Some(e),
                        (None, None) => None,
                    };
                    chain.map(|mut d| {
                        if let Some(threshold) = cond_threshold {
                            d = b.graph.add(ExprKind::FlagIf {
                                arg: d,
                                op: RelOp::Ge,
                                threshold,
                            });
                        }
                        b.graph.add(ExprKind::MatrixInverse { arg: d, sigma })
                    })
                })
                .collect();

            for bl in &baselines {
                let obs = b.graph.add(ExprKind::Observed { baseline: *bl });
                let root = match (inv[bl.a], inv[bl.b]) {
                    (Some(ia), Some(ib)) => b.graph.add(ExprKind::Corrupt {
                        left: ia,
                        mid: obs,
                        right: ib,
                    }),
                    (None, None) => obs,
                    _ => unreachable!("chains exist for every station or none"),
                };
                roots.insert((bl.a, bl.b), root);
            }
        }
    }

    let root_ids: Vec<ExprId> = roots.values().copied().collect();
    b.graph.finalise(&root_ids);
    log::debug!(
        "expression graph: {} nodes, {} levels, {} parameters",
        b.graph.len(),
        b.graph.max_level() + 1,
        b.registry.len()
    );

    Ok(Model::from_parts(
        b.graph,
        b.registry,
        instrument,
        phase_centre,
        roots,
        config.cache_policy,
        vis,
    ))
}
