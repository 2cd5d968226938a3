//! Shared test constructors and assertions.
//!
//! `make_series` mirrors the fetcher's normalization: NaN input values
//! become absent samples with a zeroed value.

use crate::series::{FetchKey, MetricMap, Series};

pub(crate) fn make_series(name: &str, values: &[f64], step: i32, start: i32) -> Series {
    Series::new(name, values.to_vec(), step, start)
}

/// A map with one resolved pattern.
pub(crate) fn single_metric(
    pattern: &str,
    from: i32,
    until: i32,
    series: Vec<Series>,
) -> MetricMap {
    let mut m = MetricMap::new();
    m.insert(FetchKey::new(pattern, from, until), series);
    m
}

/// Plans `query` over `[from, until)` and seeds every planned key whose
/// pattern matches with `series`, so window-adjusting functions find their
/// data under the key they will actually look up.
pub(crate) fn planned_metric(
    query: &str,
    from: i32,
    until: i32,
    pattern: &str,
    series: Vec<Series>,
) -> MetricMap {
    let expr = crate::query::parser::parse(query).expect("test query parses");
    let mut m = MetricMap::new();
    for key in crate::query::planner::plan(&expr, from, until) {
        if key.pattern == pattern {
            m.insert(key, series.clone());
        }
    }
    m
}

/// Asserts name, geometry-consistent length, and values where NaN in `want`
/// means "absent".
pub(crate) fn assert_series(got: &Series, want_name: &str, want: &[f64]) {
    assert_eq!(got.name, want_name, "name mismatch");
    assert_eq!(got.len(), want.len(), "length mismatch for {}", got.name);
    assert_eq!(
        got.start + got.len() as i32 * got.step,
        got.stop,
        "geometry violated for {}",
        got.name
    );
    for i in 0..want.len() {
        if want[i].is_nan() {
            assert!(got.absent[i], "expected absent at index {} of {}", i, got.name);
        } else {
            assert!(
                !got.absent[i],
                "unexpected absent at index {} of {} (want {})",
                i, got.name, want[i]
            );
            assert!(
                (got.values[i] - want[i]).abs() < 1e-9,
                "value mismatch at index {} of {}: got {}, want {}",
                i,
                got.name,
                got.values[i],
                want[i]
            );
        }
    }
}
