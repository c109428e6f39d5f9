// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Time/frequency domains and evaluation grids.

An [`EvalGrid`] is the "request" of an evaluation pass: the rectangle of
(time, frequency) sample points every expression must produce values for. It
is immutable; the model replaces it wholesale, which invalidates all cached
node results.
 */

use hifitime::Epoch;
use vec1::Vec1;

/// A rectangular time/frequency box. Times are compared as GPS seconds,
/// frequencies in Hz. Bounds are inclusive at the start, exclusive at the
/// end, except that the end itself is accepted (solvers like to put samples
/// on domain edges).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Domain {
    /// Start time \[GPS seconds\]
    pub time_start: f64,
    /// End time \[GPS seconds\]
    pub time_end: f64,
    /// Start frequency \[Hz\]
    pub freq_start: f64,
    /// End frequency \[Hz\]
    pub freq_end: f64,
}

impl Domain {
    pub fn new(time_start: Epoch, time_end: Epoch, freq_start: f64, freq_end: f64) -> Self {
        Self {
            time_start: time_start.to_gpst_seconds(),
            time_end: time_end.to_gpst_seconds(),
            freq_start,
            freq_end,
        }
    }

    /// A domain covering any time and frequency a sane observation can have.
    /// Used for parameters that are constants, like a source flux.
    pub const fn all() -> Self {
        Self {
            time_start: -1e12,
            time_end: 1e12,
            freq_start: 0.0,
            freq_end: 1e12,
        }
    }

    pub fn is_all(&self) -> bool {
        *self == Self::all()
    }

    pub fn contains(&self, time_gpst_s: f64, freq_hz: f64) -> bool {
        time_gpst_s >= self.time_start
            && time_gpst_s <= self.time_end
            && freq_hz >= self.freq_start
            && freq_hz <= self.freq_end
    }

    /// The smallest box containing both domains.
    pub fn union(&self, other: &Domain) -> Domain {
        Domain {
            time_start: self.time_start.min(other.time_start),
            time_end: self.time_end.max(other.time_end),
            freq_start: self.freq_start.min(other.freq_start),
            freq_end: self.freq_end.max(other.freq_end),
        }
    }

    /// Scale a time into [0, 1] within this domain's time extent.
    pub(crate) fn norm_time(&self, time_gpst_s: f64) -> f64 {
        let width = self.time_end - self.time_start;
        if width > 0.0 {
            (time_gpst_s - self.time_start) / width
        } else {
            0.0
        }
    }

    /// Scale a frequency into [0, 1] within this domain's frequency extent.
    pub(crate) fn norm_freq(&self, freq_hz: f64) -> f64 {
        let width = self.freq_end - self.freq_start;
        if width > 0.0 {
            (freq_hz - self.freq_start) / width
        } else {
            0.0
        }
    }
}

/// The immutable (time, frequency) sample grid of one evaluation pass.
/// Shape is `[n_time][n_freq]`, matching every value array produced against
/// it.
#[derive(Clone, Debug)]
pub struct EvalGrid {
    times: Vec1<Epoch>,
    /// The same instants as `times`, pre-converted \[GPS seconds\].
    time_secs: Vec<f64>,
    freqs: Vec1<f64>,
}

impl EvalGrid {
    pub fn new(times: Vec1<Epoch>, freqs: Vec1<f64>) -> Self {
        let time_secs = times.iter().map(|t| t.to_gpst_seconds()).collect();
        Self {
            times,
            time_secs,
            freqs,
        }
    }

    /// (number of times, number of frequencies).
    pub fn shape(&self) -> (usize, usize) {
        (self.times.len(), self.freqs.len())
    }

    pub fn times(&self) -> &[Epoch] {
        &self.times
    }

    pub fn time_secs(&self) -> &[f64] {
        &self.time_secs
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// The bounding box of the grid's samples.
    pub fn domain(&self) -> Domain {
        Domain {
            time_start: self.time_secs.iter().copied().fold(f64::INFINITY, f64::min),
            time_end: self
                .time_secs
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max),
            freq_start: self.freqs.iter().copied().fold(f64::INFINITY, f64::min),
            freq_end: self
                .freqs
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max),
        }
    }
}
