// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Grid-shaped values produced by expression nodes.

A value is a dense array of samples over the evaluation grid (one array for a
scalar, one 2x2 Jones matrix per sample for a Jones value), a same-shaped
flag array marking invalid samples, and a sparse map of perturbed values
keyed by (parameter, coefficient). Values are immutable once returned by a
node; cached copies are shared read-only across threads.

Two shape classes exist: the full grid shape, and `[1][1]` which broadcasts
against any grid in every combinator. Any other shape disagreement is a
model-construction bug and panics.

Flagged samples always hold exact zero in the main value and in every
perturbed value, so flagged garbage can never contaminate downstream sums
with NaNs.
 */

pub(crate) mod kernels;

use indexmap::IndexMap;
use ndarray::prelude::*;
use num_traits::Zero;

use crate::{
    c64,
    jones::Jones,
    params::{ParameterError, PertKey},
};

/// Pick the common output shape of two operands, honouring `[1][1]`
/// broadcast.
pub(crate) fn unify_shape(a: (usize, usize), b: (usize, usize)) -> (usize, usize) {
    if a == (1, 1) {
        b
    } else if b == (1, 1) {
        a
    } else {
        assert_eq!(a, b, "operand grids have different shapes");
        a
    }
}

/// Read a sample, broadcasting `[1][1]` arrays over any index.
#[inline(always)]
pub(crate) fn at<T: Copy>(arr: &Array2<T>, i: usize, j: usize) -> T {
    if arr.dim() == (1, 1) {
        arr[[0, 0]]
    } else {
        arr[[i, j]]
    }
}

fn zero_flagged<T: Zero + Clone>(data: &mut Array2<T>, flags: &Array2<bool>) {
    azip!((d in data, &f in flags) if f { *d = T::zero() });
}

/// A grid of complex scalars with flags and perturbed values.
#[derive(Clone, Debug)]
pub struct ScalarValue {
    data: Array2<c64>,
    flags: Array2<bool>,
    perturbed: IndexMap<PertKey, Array2<c64>>,
}

/// A grid of Jones matrices with flags and perturbed values.
#[derive(Clone, Debug)]
pub struct JonesValue {
    data: Array2<Jones>,
    flags: Array2<bool>,
    perturbed: IndexMap<PertKey, Array2<Jones>>,
}

macro_rules! impl_value_common {
    ($ty:ty, $elem:ty) => {
        impl $ty {
            /// A new value; flagged samples are forced to zero.
            pub fn new(mut data: Array2<$elem>, flags: Array2<bool>) -> Self {
                assert_eq!(data.dim(), flags.dim(), "flag shape must match data");
                zero_flagged(&mut data, &flags);
                Self {
                    data,
                    flags,
                    perturbed: IndexMap::new(),
                }
            }

            /// An unflagged value with no perturbations.
            pub fn unflagged(data: Array2<$elem>) -> Self {
                let flags = Array2::from_elem(data.dim(), false);
                Self {
                    data,
                    flags,
                    perturbed: IndexMap::new(),
                }
            }

            /// A `[1][1]` value broadcasting a single sample over any grid.
            pub fn broadcast(elem: $elem) -> Self {
                Self::unflagged(Array2::from_elem((1, 1), elem))
            }

            /// The main value array.
            pub fn data(&self) -> &Array2<$elem> {
                &self.data
            }

            /// The per-sample invalidity flags.
            pub fn flags(&self) -> &Array2<bool> {
                &self.flags
            }

            pub fn shape(&self) -> (usize, usize) {
                self.data.dim()
            }

            pub fn is_broadcast(&self) -> bool {
                self.data.dim() == (1, 1)
            }

            pub fn has_perturbation(&self, key: PertKey) -> bool {
                self.perturbed.contains_key(&key)
            }

            /// The perturbed value for `key`, or an error if the value does
            /// not carry that perturbation.
            pub fn perturbed_value(&self, key: PertKey) -> Result<&Array2<$elem>, ParameterError> {
                self.perturbed
                    .get(&key)
                    .ok_or(ParameterError::UnknownPerturbation {
                        parm: key.parm.0,
                        coeff: key.coeff,
                    })
            }

            /// The perturbed value for `key` if present, otherwise the main
            /// value. This is the single-parameter forward-mode chain rule:
            /// operands lacking a key contribute their unperturbed value.
            pub fn pert_or_value(&self, key: PertKey) -> &Array2<$elem> {
                self.perturbed.get(&key).unwrap_or(&self.data)
            }

            /// Iterate over (key, perturbed value) pairs. Restartable; the
            /// map is immutable once the value is built.
            pub fn iter_perturbed(&self) -> impl Iterator<Item = (PertKey, &Array2<$elem>)> + '_ {
                self.perturbed.iter().map(|(&k, v)| (k, v))
            }

            pub fn pert_keys(&self) -> impl Iterator<Item = PertKey> + '_ {
                self.perturbed.keys().copied()
            }

            pub fn num_perturbed(&self) -> usize {
                self.perturbed.len()
            }

            /// Attach a perturbed value. Flagged samples are forced to zero,
            /// like the main value.
            pub fn insert_perturbed(&mut self, key: PertKey, mut data: Array2<$elem>) {
                assert_eq!(
                    data.dim(),
                    self.data.dim(),
                    "perturbed shape must match the main value"
                );
                zero_flagged(&mut data, &self.flags);
                self.perturbed.insert(key, data);
            }
        }
    };
}

impl_value_common!(ScalarValue, c64);
impl_value_common!(JonesValue, Jones);

impl JonesValue {
    /// Extract one of the four cells as an independent scalar value, so
    /// scalar combinators can be reused on Jones sub-results.
    pub fn cell(&self, row: usize, col: usize) -> ScalarValue {
        assert!(row < 2 && col < 2);
        let idx = row * 2 + col;
        let mut out = ScalarValue::new(self.data.mapv(|j| j[idx]), self.flags.clone());
        for (key, parr) in self.iter_perturbed() {
            out.insert_perturbed(key, parr.mapv(|j| j[idx]));
        }
        out
    }

    /// Assemble a Jones value from four independent scalar cells
    /// (row major). Flags OR across the cells; the perturbation key set is
    /// the union of the cells' key sets.
    pub fn from_cells(cells: [&ScalarValue; 4]) -> Self {
        let mut shape = (1, 1);
        for c in &cells {
            shape = unify_shape(shape, c.shape());
        }
        let (n_time, n_freq) = shape;

        let mut flags = Array2::from_elem(shape, false);
        for c in &cells {
            for i in 0..n_time {
                for j in 0..n_freq {
                    flags[[i, j]] |= at(c.flags(), i, j);
                }
            }
        }

        let assemble = |arrs: [&Array2<c64>; 4]| {
            Array2::from_shape_fn(shape, |(i, j)| {
                Jones::from([
                    at(arrs[0], i, j),
                    at(arrs[1], i, j),
                    at(arrs[2], i, j),
                    at(arrs[3], i, j),
                ])
            })
        };

        let mut out = JonesValue::new(
            assemble([cells[0].data(), cells[1].data(), cells[2].data(), cells[3].data()]),
            flags,
        );

        let keys: indexmap::IndexSet<PertKey> =
            cells.iter().flat_map(|c| c.pert_keys()).collect();
        for key in keys {
            out.insert_perturbed(
                key,
                assemble([
                    cells[0].pert_or_value(key),
                    cells[1].pert_or_value(key),
                    cells[2].pert_or_value(key),
                    cells[3].pert_or_value(key),
                ]),
            );
        }
        out
    }

    /// Assemble a diagonal Jones value from two scalar gains.
    pub fn from_diag(xx: &ScalarValue, yy: &ScalarValue) -> Self {
        let zero = ScalarValue::broadcast(c64::zero());
        Self::from_cells([xx, &zero, &zero, yy])
    }
}

/// A node result: either a scalar grid or a Jones grid.
#[derive(Clone, Debug)]
pub enum Value {
    Scalar(ScalarValue),
    Jones(JonesValue),
}

impl Value {
    pub fn as_scalar(&self) -> &ScalarValue {
        match self {
            Value::Scalar(v) => v,
            Value::Jones(_) => panic!("expected a scalar value, got a Jones value"),
        }
    }

    pub fn as_jones(&self) -> &JonesValue {
        match self {
            Value::Jones(v) => v,
            Value::Scalar(_) => panic!("expected a Jones value, got a scalar value"),
        }
    }
}

impl From<ScalarValue> for Value {
    fn from(v: ScalarValue) -> Self {
        Value::Scalar(v)
    }
}

impl From<JonesValue> for Value {
    fn from(v: JonesValue) -> Self {
        Value::Jones(v)
    }
}
