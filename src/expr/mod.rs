// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The measurement-equation expression graph.

Nodes live in an arena ([`ExprGraph`]) and reference their children by
integer handle, forming a DAG: per-station sub-chains are shared by every
baseline that touches the station. The node set is a closed tagged variant
([`ExprKind`]) with a single evaluation function in [`eval`], so adding an
operator keeps exhaustiveness checking and per-sample loops stay free of
virtual dispatch.

Graph structure is immutable once [`ExprGraph::finalise`] has run; after
that only parameter values and the solvable set change between evaluation
passes.
 */

pub(crate) mod eval;
pub(crate) mod levels;

use crate::{
    c64,
    coord::{RADec, LMN},
    instrument::Baseline,
    jones::Jones,
    params::ParmId,
};

/// Handle of a node in an [`ExprGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

/// The comparison applied by [`ExprKind::FlagIf`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelOp {
    Ge,
    Gt,
    Le,
    Lt,
}

impl RelOp {
    pub(crate) fn holds(self, x: f64, threshold: f64) -> bool {
        match self {
            RelOp::Ge => x >= threshold,
            RelOp::Gt => x > threshold,
            RelOp::Le => x <= threshold,
            RelOp::Lt => x < threshold,
        }
    }
}

/// Whether node results are memoised across `evaluate(baseline)` calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Nothing is kept across calls; shared nodes are still computed only
    /// once *within* one call. Slow but always correct; kept as a testing
    /// configuration.
    None,
    /// The precalculation pass caches every node whose result is reused by
    /// two or more parents.
    #[default]
    Aggressive,
}

/// Every operator of the measurement equation.
#[derive(Clone, Debug)]
pub enum ExprKind {
    // --- Leaves ---
    /// A registry parameter; the only node that introduces perturbations.
    Parm(ParmId),
    Constant(c64),
    ConstantJones(Jones),
    /// Per-station phase factor exp(2πi (u l + v m + w (n-1)) / λ) for one
    /// source direction. A baseline's phase shift is
    /// `ConjMul(shift_a, shift_b)`.
    StationShift { station: usize, lmn: LMN },
    /// The envelope of a Gaussian source on one baseline. Axes are FWHM
    /// \[radians\], position angle \[radians\].
    GaussianEnvelope {
        station_a: usize,
        station_b: usize,
        major: f64,
        minor: f64,
        pa: f64,
    },
    /// Analytic station-beam response towards a direction (diagonal Jones).
    BeamResponse { station: usize, direction: RADec },
    /// An all-ones scalar that is flagged whenever the direction is below
    /// the configured elevation at a time sample.
    ElevationMask {
        direction: RADec,
        min_elevation: f64,
    },
    /// Observed visibilities for one baseline (inverse mode only).
    Observed { baseline: Baseline },

    // --- Scalar combinators ---
    Add(ExprId, ExprId),
    Mul(ExprId, ExprId),
    /// a * conj(b).
    ConjMul(ExprId, ExprId),
    /// re + i im.
    ToComplex { re: ExprId, im: ExprId },
    /// ampl * exp(i phase).
    ToPolar { ampl: ExprId, phase: ExprId },
    /// flux * (freq / ref_freq)^index.
    PowerLaw {
        flux: ExprId,
        index: ExprId,
        ref_freq: f64,
    },

    // --- Jones combinators ---
    MakeJones { cells: [ExprId; 4] },
    MakeDiagJones { xx: ExprId, yy: ExprId },
    /// A . B.
    MatrixMul(ExprId, ExprId),
    /// A . B . C^H; the "corrupt" operator applying station chains to a
    /// baseline coherence. C^H is never materialised.
    Corrupt {
        left: ExprId,
        mid: ExprId,
        right: ExprId,
    },
    /// N-ary sum, accumulating patch contributions per baseline. Terms may
    /// be connected incrementally during construction.
    MatrixSum(Vec<ExprId>),
    /// Direct analytic 2x2 inverse when `sigma` is None; the regularised
    /// MMSE inverse (A^H A + sigma^2 I)^-1 A^H otherwise. A singular sample
    /// in the direct path is flagged, never NaN.
    MatrixInverse { arg: ExprId, sigma: Option<f64> },
    /// scalar * Jones with broadcast; the shape-class-sensitive kernel case.
    ScaleJones { scalar: ExprId, jones: ExprId },
    /// Flag samples whose condition-number proxy satisfies `op threshold`.
    FlagIf {
        arg: ExprId,
        op: RelOp,
        threshold: f64,
    },
    /// Value of `arg`, flags of `arg` OR `mask`.
    MergeFlags { arg: ExprId, mask: ExprId },
    /// Stokes scalars to a linear-feed coherence matrix:
    /// 0.5 * [[I+Q, U+iV], [U-iV, I-Q]].
    Brightness {
        i: ExprId,
        q: ExprId,
        u: ExprId,
        v: ExprId,
    },
    /// diag(exp(2πi ν τ)) for a per-station clock delay τ \[seconds\].
    ClockDelay { delay: ExprId },
    /// diag(exp(-i K_TEC TEC / ν)) for a per-station TEC value \[TECU\].
    TecPhase { tec: ExprId },
    /// Faraday rotation by RM λ² \[RM in rad/m²\].
    FaradayRotation { rm: ExprId },
    /// Ionospheric phase screen: a polynomial over piercepoint coordinates
    /// with solvable coefficients, scaled by 1/ν.
    IonoPhase {
        station: usize,
        direction: RADec,
        coeffs: Vec<ExprId>,
    },
}

impl ExprKind {
    /// Visit every child handle.
    pub(crate) fn for_each_child(&self, mut f: impl FnMut(ExprId)) {
        use ExprKind::*;
        match self {
            Parm(_) | Constant(_) | ConstantJones(_) | StationShift { .. }
            | GaussianEnvelope { .. } | BeamResponse { .. } | ElevationMask { .. }
            | Observed { .. } => {}
            Add(a, b) | Mul(a, b) | ConjMul(a, b) | MatrixMul(a, b) => {
                f(*a);
                f(*b);
            }
            ToComplex { re: a, im: b }
            | ToPolar { ampl: a, phase: b }
            | MakeDiagJones { xx: a, yy: b }
            | ScaleJones { scalar: a, jones: b }
            | MergeFlags { arg: a, mask: b } => {
                f(*a);
                f(*b);
            }
            PowerLaw { flux, index, .. } => {
                f(*flux);
                f(*index);
            }
            MakeJones { cells } => cells.iter().copied().for_each(f),
            Corrupt { left, mid, right } => {
                f(*left);
                f(*mid);
                f(*right);
            }
            MatrixSum(terms) => terms.iter().copied().for_each(f),
            MatrixInverse { arg, .. } | FlagIf { arg, .. } => f(*arg),
            Brightness { i, q, u, v } => {
                f(*i);
                f(*q);
                f(*u);
                f(*v);
            }
            ClockDelay { delay: a } | TecPhase { tec: a } | FaradayRotation { rm: a } => f(*a),
            IonoPhase { coeffs, .. } => coeffs.iter().copied().for_each(f),
        }
    }
}

/// The node arena. Structure is append-only during construction and frozen
/// by [`ExprGraph::finalise`], which computes per-node parent counts and
/// dependency levels for the precalculation scheduler.
#[derive(Clone, Debug, Default)]
pub struct ExprGraph {
    nodes: Vec<ExprKind>,
    parent_counts: Vec<u32>,
    /// Distance-from-roots level per node; `u32::MAX` for nodes
    /// unreachable from the root set.
    node_levels: Vec<u32>,
    /// Node handles grouped by level, index = level.
    by_level: Vec<Vec<ExprId>>,
}

impl ExprGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.0 as usize]
    }

    /// Append a node. Children must already be in the arena.
    pub fn add(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        kind.for_each_child(|c| {
            assert!(
                (c.0 as usize) < self.nodes.len(),
                "child {c:?} does not exist yet"
            );
        });
        self.nodes.push(kind);
        id
    }

    /// Connect one more term to a [`ExprKind::MatrixSum`] node during
    /// construction.
    pub fn connect(&mut self, sum: ExprId, term: ExprId) {
        assert_ne!(sum, term, "a sum cannot contain itself");
        assert!((term.0 as usize) < self.nodes.len());
        match &mut self.nodes[sum.0 as usize] {
            ExprKind::MatrixSum(terms) => terms.push(term),
            other => panic!("connect on a non-sum node: {other:?}"),
        }
    }

    /// Number of parents of `id`, counted over nodes reachable from the
    /// root set given to [`ExprGraph::finalise`].
    pub fn parent_count(&self, id: ExprId) -> u32 {
        self.parent_counts[id.0 as usize]
    }

    /// Level of `id`: 0 for roots, 1 + max parent level otherwise.
    pub fn level(&self, id: ExprId) -> u32 {
        self.node_levels[id.0 as usize]
    }

    pub fn max_level(&self) -> u32 {
        (self.by_level.len().saturating_sub(1)) as u32
    }

    pub fn nodes_at_level(&self, level: u32) -> &[ExprId] {
        self.by_level
            .get(level as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Freeze the graph: find nodes reachable from `roots`, count parents,
    /// and assign levels via a topological pass. Panics if a cycle has been
    /// constructed (which `add`/`connect` make hard, but `connect` cannot
    /// rule out entirely).
    pub fn finalise(&mut self, roots: &[ExprId]) {
        let n = self.nodes.len();
        let mut reachable = vec![false; n];
        let mut stack: Vec<ExprId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut reachable[id.0 as usize], true) {
                continue;
            }
            self.nodes[id.0 as usize].for_each_child(|c| stack.push(c));
        }

        let mut parent_counts = vec![0u32; n];
        for (i, node) in self.nodes.iter().enumerate() {
            if reachable[i] {
                node.for_each_child(|c| parent_counts[c.0 as usize] += 1);
            }
        }

        // Kahn's algorithm from the roots downward; a node's level is fixed
        // once all its parents have been processed.
        let mut levels = vec![u32::MAX; n];
        let mut remaining = parent_counts.clone();
        // A root with parents waits for them like any other node.
        let mut queue = std::collections::VecDeque::new();
        for &r in roots {
            if levels[r.0 as usize] == u32::MAX {
                levels[r.0 as usize] = 0;
                if remaining[r.0 as usize] == 0 {
                    queue.push_back(r);
                }
            }
        }
        let mut processed = 0usize;
        while let Some(id) = queue.pop_front() {
            processed += 1;
            let level = levels[id.0 as usize];
            self.nodes[id.0 as usize].for_each_child(|c| {
                let ci = c.0 as usize;
                let cl = &mut levels[ci];
                *cl = if *cl == u32::MAX {
                    level + 1
                } else {
                    (*cl).max(level + 1)
                };
                remaining[ci] -= 1;
                if remaining[ci] == 0 {
                    queue.push_back(c);
                }
            });
        }
        let num_reachable = reachable.iter().filter(|&&r| r).count();
        assert_eq!(processed, num_reachable, "expression graph has a cycle");

        let max_level = levels
            .iter()
            .filter(|&&l| l != u32::MAX)
            .copied()
            .max()
            .unwrap_or(0);
        let mut by_level: Vec<Vec<ExprId>> = vec![vec![]; max_level as usize + 1];
        for (i, &l) in levels.iter().enumerate() {
            if l != u32::MAX {
                by_level[l as usize].push(ExprId(i as u32));
            }
        }

        self.parent_counts = parent_counts;
        self.node_levels = levels;
        self.by_level = by_level;
    }
}
