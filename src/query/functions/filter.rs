//! Selection and ordering: functions that pick, drop, or reorder whole
//! series based on a per-series summary value or the series name.
//!
//! Every value-ranked selection breaks ties by name ascending, so results
//! are deterministic regardless of input order.

use std::cmp::Ordering;

use regex::Regex;

use crate::query::evaluator::{EvalError, EvalResult};
use crate::query::functions::{natural_cmp, pearson, percentile, variance};
use crate::query::parser::FuncExpr;
use crate::series::{MetricMap, Series};

/// The last present sample.
fn current_value(s: &Series) -> Option<f64> {
    (0..s.len()).rev().find_map(|i| s.at(i))
}

fn avg_value(s: &Series) -> Option<f64> {
    let vals: Vec<f64> = s.present().collect();
    if vals.is_empty() {
        None
    } else {
        Some(vals.iter().sum::<f64>() / vals.len() as f64)
    }
}

fn max_value(s: &Series) -> Option<f64> {
    s.present().reduce(f64::max)
}

fn min_value(s: &Series) -> Option<f64> {
    s.present().reduce(f64::min)
}

fn total_value(s: &Series) -> Option<f64> {
    let mut any = false;
    let mut total = 0.0;
    for v in s.present() {
        any = true;
        total += v;
    }
    any.then_some(total)
}

/// Orders by summary value; `None` summaries sink to the bottom and ties
/// fall back to name ascending.
fn rank(series: &mut [Series], summary: fn(&Series) -> Option<f64>, descending: bool) {
    series.sort_by(|a, b| {
        let ka = summary(a);
        let kb = summary(b);
        let ord = match (ka, kb) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        ord.then_with(|| a.name.cmp(&b.name))
    });
}

fn take_ranked(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
    summary: fn(&Series) -> Option<f64>,
    descending: bool,
) -> EvalResult<Vec<Series>> {
    let mut series = call.series_arg_or_empty(0, from, until, m)?;
    let n = call.int_arg(1)?.max(0) as usize;
    rank(&mut series, summary, descending);
    series.truncate(n);
    Ok(series)
}

pub(crate) fn highest_current(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    take_ranked(call, from, until, m, current_value, true)
}

pub(crate) fn highest_max(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    take_ranked(call, from, until, m, max_value, true)
}

pub(crate) fn highest_average(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    take_ranked(call, from, until, m, avg_value, true)
}

pub(crate) fn lowest_current(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    take_ranked(call, from, until, m, current_value, false)
}

pub(crate) fn lowest_average(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    take_ranked(call, from, until, m, avg_value, false)
}

/// Threshold filters. `average*` and `current*` compare inclusively on the
/// high side; `maximum*`/`minimum*` are strict above. Below is always
/// inclusive. Series with no present samples never pass.
fn threshold_filter(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
    summary: fn(&Series) -> Option<f64>,
    above: bool,
    inclusive: bool,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg_or_empty(0, from, until, m)?;
    let threshold = call.float_arg(1)?;
    Ok(series
        .into_iter()
        .filter(|s| match summary(s) {
            Some(v) if above && inclusive => v >= threshold,
            Some(v) if above => v > threshold,
            Some(v) => v <= threshold,
            None => false,
        })
        .collect())
}

pub(crate) fn average_above(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    threshold_filter(call, from, until, m, avg_value, true, true)
}

pub(crate) fn average_below(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    threshold_filter(call, from, until, m, avg_value, false, true)
}

pub(crate) fn current_above(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    threshold_filter(call, from, until, m, current_value, true, true)
}

pub(crate) fn current_below(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    threshold_filter(call, from, until, m, current_value, false, true)
}

pub(crate) fn maximum_above(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    threshold_filter(call, from, until, m, max_value, true, false)
}

pub(crate) fn maximum_below(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    threshold_filter(call, from, until, m, max_value, false, true)
}

pub(crate) fn minimum_above(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    threshold_filter(call, from, until, m, min_value, true, false)
}

pub(crate) fn minimum_below(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    threshold_filter(call, from, until, m, min_value, false, true)
}

/// Takes the `n` series with the largest population variance. The count is
/// accepted in either argument position.
pub(crate) fn most_deviant(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let (n, mut series) = match call.float_arg(0) {
        Ok(n) => (n as usize, call.series_arg_or_empty(1, from, until, m)?),
        Err(_) => (
            call.int_arg(1)?.max(0) as usize,
            call.series_arg_or_empty(0, from, until, m)?,
        ),
    };
    rank(
        &mut series,
        |s| {
            let vals: Vec<f64> = s.present().collect();
            let v = variance(&vals);
            (!v.is_nan()).then_some(v)
        },
        true,
    );
    series.truncate(n);
    Ok(series)
}

/// Ranks a pool by Pearson correlation against a reference series and
/// keeps the closest `n`. Pool members whose correlation is undefined
/// (no overlap, or zero variance) are dropped.
pub(crate) fn pearson_closest(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let reference = call.series_arg(0, from, until, m)?;
    let pool = call.series_arg_or_empty(1, from, until, m)?;
    let n = call.int_arg(2)?.max(0) as usize;
    let direction = call.string_named_or("direction", 3, "abs")?;
    if !matches!(direction, "abs" | "pos" | "neg") {
        return Err(EvalError::BadType);
    }

    let reference = &reference[0];
    let mut scored: Vec<(f64, Series)> = Vec::new();
    for s in pool {
        if s.step != reference.step {
            return Err(EvalError::SeriesMisaligned);
        }
        let len = s.len().min(reference.len());
        let mut xs = Vec::with_capacity(len);
        let mut ys = Vec::with_capacity(len);
        for i in 0..len {
            if let (Some(x), Some(y)) = (reference.at(i), s.at(i)) {
                xs.push(x);
                ys.push(y);
            }
        }
        let rho = pearson(&xs, &ys);
        if rho.is_nan() {
            continue;
        }
        scored.push((rho, s));
    }

    scored.sort_by(|(ra, a), (rb, b)| {
        let (ka, kb) = match direction {
            "abs" => (ra.abs(), rb.abs()),
            "pos" => (*ra, *rb),
            _ => (-ra, -rb),
        };
        kb.partial_cmp(&ka)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    scored.truncate(n);
    Ok(scored.into_iter().map(|(_, s)| s).collect())
}

pub(crate) fn tukey_above(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    tukey(call, from, until, m, true)
}

pub(crate) fn tukey_below(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    tukey(call, from, until, m, false)
}

/// Tukey outlier selection: pools the last `n` samples of every series,
/// derives the interquartile range, and keeps series with any point at or
/// beyond `q3 + basis*iqr` (above) or `q1 - basis*iqr` (below).
fn tukey(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
    above: bool,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg_or_empty(0, from, until, m)?;
    let basis = call.float_arg(1)?;
    let n = call.int_arg(2)?;
    if basis <= 0.0 || n < 1 {
        return Err(EvalError::BadType);
    }
    let n = n as usize;

    let window = |s: &Series| -> Vec<f64> {
        let lo = s.len().saturating_sub(n);
        (lo..s.len()).filter_map(|i| s.at(i)).collect()
    };

    let mut pool = Vec::new();
    for s in &series {
        pool.extend(window(s));
    }
    if pool.is_empty() {
        return Ok(Vec::new());
    }

    let q1 = percentile(&pool, 25.0, true);
    let q3 = percentile(&pool, 75.0, true);
    let iqr = q3 - q1;
    let cutoff = if above {
        q3 + basis * iqr
    } else {
        q1 - basis * iqr
    };

    Ok(series
        .into_iter()
        .filter(|s| {
            window(s)
                .iter()
                .any(|&v| if above { v >= cutoff } else { v <= cutoff })
        })
        .collect())
}

pub(crate) fn sort_by_name(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let mut series = call.series_arg_or_empty(0, from, until, m)?;
    let natural = call.bool_named_or("natural", 1, false)?;
    if natural {
        series.sort_by(|a, b| natural_cmp(&a.name, &b.name));
    } else {
        series.sort_by(|a, b| a.name.cmp(&b.name));
    }
    Ok(series)
}

pub(crate) fn sort_by_total(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let mut series = call.series_arg_or_empty(0, from, until, m)?;
    rank(&mut series, total_value, true);
    Ok(series)
}

pub(crate) fn sort_by_maxima(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let mut series = call.series_arg_or_empty(0, from, until, m)?;
    rank(&mut series, max_value, true);
    Ok(series)
}

pub(crate) fn sort_by_minima(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let mut series = call.series_arg_or_empty(0, from, until, m)?;
    rank(&mut series, min_value, false);
    Ok(series)
}

pub(crate) fn grep(call: &FuncExpr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    let series = call.series_arg_or_empty(0, from, until, m)?;
    let pattern = Regex::new(call.string_arg(1)?).map_err(|_| EvalError::BadType)?;
    Ok(series
        .into_iter()
        .filter(|s| pattern.is_match(&s.name))
        .collect())
}

pub(crate) fn exclude(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg_or_empty(0, from, until, m)?;
    let pattern = Regex::new(call.string_arg(1)?).map_err(|_| EvalError::BadType)?;
    Ok(series
        .into_iter()
        .filter(|s| !pattern.is_match(&s.name))
        .collect())
}

pub(crate) fn limit(call: &FuncExpr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    let mut series = call.series_arg_or_empty(0, from, until, m)?;
    let n = call.int_arg(1)?.max(0) as usize;
    series.truncate(n);
    Ok(series)
}

pub(crate) fn remove_empty_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg_or_empty(0, from, until, m)?;
    Ok(series
        .into_iter()
        .filter(|s| s.absent.iter().any(|&a| !a))
        .collect())
}

pub(crate) fn remove_zero_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg_or_empty(0, from, until, m)?;
    Ok(series
        .into_iter()
        .filter(|s| s.present().any(|v| v != 0.0))
        .collect())
}
