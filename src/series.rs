//! Core data types for the expression engine.
//!
//! This module defines the fundamental data structures of the public API:
//! fixed-step sampled series, the fetch-request key used to look series up,
//! and the map the host populates from its fetcher before evaluation.

use std::collections::HashMap;

/// Identity of one upstream fetch: a metric-name pattern together with the
/// absolute request window `[from, until)` in Unix seconds.
///
/// Patterns may contain globs (`foo.*.bar`, `foo.{a,b}`, `foo.b[0-9]`); they
/// are not interpreted here and are handed to the fetcher untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    /// The metric-name pattern, globs preserved.
    pub pattern: String,
    /// Window start, inclusive, Unix seconds.
    pub from: i32,
    /// Window end, exclusive, Unix seconds.
    pub until: i32,
}

impl FetchKey {
    /// Creates a fetch key for the given pattern and window.
    pub fn new(pattern: impl Into<String>, from: i32, until: i32) -> Self {
        Self {
            pattern: pattern.into(),
            from,
            until,
        }
    }
}

/// Resolved fetches, keyed by the planner-produced [`FetchKey`]. A single
/// pattern may resolve to many series.
pub type MetricMap = HashMap<FetchKey, Vec<Series>>;

/// A fixed-step sampled time series over `[start, stop)`.
///
/// # Invariants
///
/// - `start + values.len() * step == stop` and `step >= 1`
/// - `values.len() == absent.len()`
/// - `values[i]` is meaningful iff `absent[i]` is false; absent slots hold
///   `0.0`
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Display name. Functions rewrite this as they transform data.
    pub name: String,
    /// First sample timestamp, inclusive, Unix seconds.
    pub start: i32,
    /// End of the sampled window, exclusive, Unix seconds.
    pub stop: i32,
    /// Sampling period in seconds, `>= 1`.
    pub step: i32,
    /// Sample values; `0.0` where absent.
    pub values: Vec<f64>,
    /// Absence markers, parallel to `values`.
    pub absent: Vec<bool>,
}

impl Series {
    /// Creates a series from raw values, treating NaN entries as absent
    /// samples. NaN values are zeroed so the pairing invariant holds.
    ///
    /// `stop` is derived as `start + values.len() * step`.
    pub fn new(name: impl Into<String>, values: Vec<f64>, step: i32, start: i32) -> Self {
        let mut values = values;
        let mut absent = vec![false; values.len()];
        for (i, v) in values.iter_mut().enumerate() {
            if v.is_nan() {
                *v = 0.0;
                absent[i] = true;
            }
        }
        let stop = start + values.len() as i32 * step;
        Self {
            name: name.into(),
            start,
            stop,
            step,
            values,
            absent,
        }
    }

    /// Creates an all-absent series of `len` samples.
    pub fn blank(name: impl Into<String>, len: usize, step: i32, start: i32) -> Self {
        Self {
            name: name.into(),
            start,
            stop: start + len as i32 * step,
            step,
            values: vec![0.0; len],
            absent: vec![true; len],
        }
    }

    /// A fresh series with the same geometry (start/stop/step) and length as
    /// `self`, every slot absent, under a new name.
    pub(crate) fn shaped_like(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: self.start,
            stop: self.stop,
            step: self.step,
            values: vec![0.0; self.values.len()],
            absent: vec![true; self.values.len()],
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at `i`, or `None` when the sample is absent.
    pub(crate) fn at(&self, i: usize) -> Option<f64> {
        if self.absent[i] {
            None
        } else {
            Some(self.values[i])
        }
    }

    /// Sets slot `i` to a present value.
    pub(crate) fn set(&mut self, i: usize, v: f64) {
        self.values[i] = v;
        self.absent[i] = false;
    }

    /// Sets slot `i` from an optional value; NaN counts as absent.
    pub(crate) fn set_opt(&mut self, i: usize, v: Option<f64>) {
        match v {
            Some(v) if !v.is_nan() => self.set(i, v),
            _ => {
                self.values[i] = 0.0;
                self.absent[i] = true;
            }
        }
    }

    /// Iterator over present values.
    pub(crate) fn present(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .zip(self.absent.iter())
            .filter(|(_, &a)| !a)
            .map(|(&v, _)| v)
    }
}
