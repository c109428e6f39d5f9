// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Access to observed visibilities, needed when a model divides data by
//! the predicted corruptions (inverse mode).

use std::collections::HashMap;

use ndarray::Array2;

use crate::{domain::EvalGrid, instrument::Baseline, jones::Jones};

/// Observed visibilities for one baseline on the evaluation grid.
#[derive(Clone, Debug)]
pub struct VisData {
    /// Shape `(n_time, n_freq)`.
    pub data: Array2<Jones>,
    pub flags: Array2<bool>,
}

/// Source of observed visibilities. Implementations must be shareable
/// across the precalculation worker threads.
pub trait VisBuffer: Send + Sync {
    /// Observed data for `baseline` on `grid`, or `None` when the buffer
    /// has nothing for that baseline. A `None` becomes a fully-flagged
    /// zero result; it is not an error.
    fn read(&self, baseline: Baseline, grid: &EvalGrid) -> Option<VisData>;
}

/// An in-memory buffer, filled up-front. Data must already be laid out on
/// the evaluation grid.
#[derive(Default)]
pub struct MemVisBuffer {
    rows: HashMap<(usize, usize), VisData>,
}

impl MemVisBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, baseline: Baseline, data: Array2<Jones>, flags: Array2<bool>) {
        assert_eq!(data.dim(), flags.dim());
        self.rows
            .insert((baseline.a, baseline.b), VisData { data, flags });
    }
}

impl VisBuffer for MemVisBuffer {
    fn read(&self, baseline: Baseline, grid: &EvalGrid) -> Option<VisData> {
        let row = self.rows.get(&(baseline.a, baseline.b))?;
        assert_eq!(
            row.data.dim(),
            grid.shape(),
            "buffered visibilities do not match the evaluation grid"
        );
        Some(row.clone())
    }
}
