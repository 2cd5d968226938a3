//! Horizontal reducers: functions that collapse a set of aligned series
//! into one (or one per group) by combining samples index by index.
//!
//! All reducers require their inputs to share a step and skip absent
//! samples unless noted; a slot where every input is absent stays absent.

use std::collections::HashMap;

use crate::query::evaluator::{eval, EvalError, EvalResult};
use crate::query::functions::{common_step, percentile, variance};
use crate::query::parser::{parse, FuncExpr};
use crate::series::{FetchKey, MetricMap, Series};

/// Combines a series set into one output. `f` receives the per-series
/// sample state at each index (`None` for absent or out-of-range slots).
fn combine(
    series: &[Series],
    name: String,
    f: impl Fn(&[Option<f64>]) -> Option<f64>,
) -> EvalResult<Series> {
    common_step(series)?;
    let longest = series
        .iter()
        .max_by_key(|s| s.len())
        .expect("combine requires at least one series");
    let mut r = longest.shaped_like(name);
    let mut slots = Vec::with_capacity(series.len());
    for i in 0..r.len() {
        slots.clear();
        for s in series {
            slots.push(if i < s.len() { s.at(i) } else { None });
        }
        r.set_opt(i, f(&slots));
    }
    Ok(r)
}

fn present(slots: &[Option<f64>]) -> Vec<f64> {
    slots.iter().filter_map(|v| *v).collect()
}

fn reduce_sum(slots: &[Option<f64>]) -> Option<f64> {
    let vals = present(slots);
    if vals.is_empty() {
        None
    } else {
        Some(vals.iter().sum())
    }
}

fn reduce_avg(slots: &[Option<f64>]) -> Option<f64> {
    let vals = present(slots);
    if vals.is_empty() {
        None
    } else {
        Some(vals.iter().sum::<f64>() / vals.len() as f64)
    }
}

fn reduce_min(slots: &[Option<f64>]) -> Option<f64> {
    present(slots).into_iter().reduce(f64::min)
}

fn reduce_max(slots: &[Option<f64>]) -> Option<f64> {
    present(slots).into_iter().reduce(f64::max)
}

pub(crate) fn sum_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("sumSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, reduce_sum)?])
}

pub(crate) fn average_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("averageSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, reduce_avg)?])
}

pub(crate) fn min_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("minSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, reduce_min)?])
}

pub(crate) fn max_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("maxSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, reduce_max)?])
}

/// Product across the set; any absent input blanks the slot.
pub(crate) fn multiply_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("multiplySeries({})", call.arg_string);
    Ok(vec![combine(&series, name, |slots| {
        slots
            .iter()
            .copied()
            .try_fold(1.0, |acc, v| v.map(|v| acc * v))
    })?])
}

/// First series minus the rest. An absent minuend blanks the slot; absent
/// subtrahends are skipped.
pub(crate) fn diff_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("diffSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, |slots| {
        let head = slots.first().copied().flatten()?;
        Some(head - slots[1..].iter().filter_map(|v| *v).sum::<f64>())
    })?])
}

/// Spread between the largest and smallest present value; fewer than two
/// present values blanks the slot.
pub(crate) fn range_of_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("rangeOfSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, |slots| {
        let vals = present(slots);
        if vals.len() < 2 {
            return None;
        }
        let max = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = vals.iter().cloned().fold(f64::INFINITY, f64::min);
        Some(max - min)
    })?])
}

pub(crate) fn stddev_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("stddevSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, |slots| {
        let vals = present(slots);
        if vals.is_empty() {
            None
        } else {
            Some(variance(&vals).sqrt())
        }
    })?])
}

pub(crate) fn median_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("medianSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, |slots| {
        let vals = present(slots);
        let v = percentile(&vals, 50.0, true);
        (!v.is_nan()).then_some(v)
    })?])
}

/// A flat line carrying the number of input series.
pub(crate) fn count_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_args(0, from, until, m)?;
    let name = format!("countSeries({})", call.arg_string);
    let count = series.len() as f64;
    Ok(vec![combine(&series, name, |_| Some(count))?])
}

pub(crate) fn percentile_of_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let p = call.float_arg(1)?;
    let interpolate = call.bool_named_or("interpolate", 2, false)?;
    let name = format!("percentileOfSeries({})", call.arg_string);
    Ok(vec![combine(&series, name, |slots| {
        let vals = present(slots);
        let v = percentile(&vals, p, interpolate);
        (!v.is_nan()).then_some(v)
    })?])
}

/// `100 * a / b`; absent on either side, or a zero denominator, blanks the
/// slot.
pub(crate) fn as_percent(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let a = call.series_arg(0, from, until, m)?;
    let b = call.series_arg(1, from, until, m)?;
    let name = format!("asPercent({})", call.arg_string);
    let pair = [a[0].clone(), b[0].clone()];
    Ok(vec![combine(&pair, name, |slots| match (slots[0], slots[1]) {
        (Some(x), Some(y)) if y != 0.0 => Some(100.0 * x / y),
        _ => None,
    })?])
}

/// `a / b`. The single-argument form expects one pattern resolving to
/// exactly two series, numerator first.
pub(crate) fn divide_series(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let (numerator, denominator) = if call.args.len() == 1 {
        let mut pair = call.series_arg(0, from, until, m)?;
        if pair.len() != 2 {
            return Err(EvalError::BadType);
        }
        let d = pair.remove(1);
        (pair.remove(0), d)
    } else {
        let a = call.series_arg(0, from, until, m)?;
        let b = call.series_arg(1, from, until, m)?;
        (a[0].clone(), b[0].clone())
    };

    let name = format!("divideSeries({})", call.arg_string);
    let pair = [numerator, denominator];
    Ok(vec![combine(&pair, name, |slots| match (slots[0], slots[1]) {
        (Some(x), Some(y)) if y != 0.0 => Some(x / y),
        _ => None,
    })?])
}

/// The `idx`-th dot-separated node of a name; negative indices count from
/// the end.
fn name_node(name: &str, idx: i32) -> Option<String> {
    let parts: Vec<&str> = name.split('.').collect();
    let n = parts.len() as i32;
    let i = if idx < 0 { idx + n } else { idx };
    if i < 0 || i >= n {
        None
    } else {
        Some(parts[i as usize].to_string())
    }
}

/// Groups series by key in first-seen order.
fn group_by<K: Fn(&Series) -> Option<String>>(
    series: Vec<Series>,
    key: K,
) -> Vec<(String, Vec<Series>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Series>> = HashMap::new();
    for s in series {
        let Some(k) = key(&s) else { continue };
        if !groups.contains_key(&k) {
            order.push(k.clone());
        }
        groups.entry(k).or_default().push(s);
    }
    order
        .into_iter()
        .map(|k| {
            let v = groups.remove(&k).unwrap_or_default();
            (k, v)
        })
        .collect()
}

/// Evaluates `callback(key)` against a one-key map holding the group. This
/// routes group reduction through the ordinary dispatch table, so every
/// registered reducer (and alias) works as a callback.
fn eval_callback(
    callback: &str,
    key: &str,
    members: Vec<Series>,
    from: i32,
    until: i32,
) -> EvalResult<Vec<Series>> {
    let expr = parse(&format!("{}({})", callback, key)).map_err(|_| EvalError::BadType)?;
    let mut scoped = MetricMap::new();
    scoped.insert(FetchKey::new(key, from, until), members);
    eval(&expr, from, until, &scoped)
}

/// Groups by the `idx`-th name node and reduces each group with the named
/// callback; outputs are named by the grouping node alone.
pub(crate) fn group_by_node(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let idx = call.int_arg(1)?;
    let callback = call.string_arg(2)?.to_string();

    let mut out = Vec::new();
    for (key, members) in group_by(series, |s| name_node(&s.name, idx)) {
        for mut r in eval_callback(&callback, &key, members, from, until)? {
            r.name = key.clone();
            out.push(r);
        }
    }
    Ok(out)
}

pub(crate) fn sum_series_with_wildcards(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    series_with_wildcards(call, from, until, m, "sumSeriesWithWildcards", reduce_sum)
}

pub(crate) fn average_series_with_wildcards(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    series_with_wildcards(call, from, until, m, "averageSeriesWithWildcards", reduce_avg)
}

/// Groups by the series name with the given node positions elided, then
/// reduces each group.
fn series_with_wildcards(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
    fname: &str,
    reduce: fn(&[Option<f64>]) -> Option<f64>,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let mut positions = Vec::new();
    for i in 1..call.args.len() {
        positions.push(call.int_arg(i)?);
    }

    let groups = group_by(series, |s| {
        let parts: Vec<&str> = s.name.split('.').collect();
        let n = parts.len() as i32;
        let kept: Vec<&str> = parts
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let i = *i as i32;
                !positions.iter().any(|&p| p == i || p + n == i)
            })
            .map(|(_, p)| *p)
            .collect();
        Some(kept.join("."))
    });

    let mut out = Vec::new();
    for (key, members) in groups {
        out.push(combine(&members, format!("{}({})", fname, key), reduce)?);
    }
    Ok(out)
}

/// Substitutes each group's node prefix into the template, re-parses, and
/// evaluates against the same map. Results are renamed to the prefix.
/// Fetches for the substituted targets must already be resolved; missing
/// keys degrade to empty output.
pub(crate) fn apply_by_node(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let idx = call.int_arg(1)?;
    if idx < 0 {
        return Err(EvalError::BadType);
    }
    let template = call.string_arg(2)?.to_string();

    let mut prefixes: Vec<String> = Vec::new();
    for s in &series {
        let parts: Vec<&str> = s.name.split('.').collect();
        if parts.len() as i32 <= idx {
            continue;
        }
        let prefix = parts[..=(idx as usize)].join(".");
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }

    let mut out = Vec::new();
    for prefix in prefixes {
        let target = template.replace('%', &prefix);
        let expr = parse(&target).map_err(|_| EvalError::BadType)?;
        for mut r in eval(&expr, from, until, m)? {
            r.name = prefix.clone();
            out.push(r);
        }
    }
    Ok(out)
}
