//! Single-series transforms: pointwise arithmetic, derivatives, rolling
//! windows, and exponential smoothing.
//!
//! Every handler maps each input series to one output series of the same
//! geometry, allocating fresh buffers. Default output names follow the
//! Graphite convention with named arguments rendered positionally, e.g.
//! `transformNull(metric1,5)`.

use crate::query::evaluator::{EvalError, EvalResult};
use crate::query::functions::{pearson, percentile, sort_nan_first};
use crate::query::interval::parse_interval;
use crate::query::parser::{Expr, FuncExpr};
use crate::query::planner::child_window;
use crate::series::{MetricMap, Series};

/// Applies `op` to every sample of every input series. `op` sees `None`
/// for absent samples and returns `None` to blank the output slot.
fn map_series<N, F>(series: &[Series], name: N, op: F) -> Vec<Series>
where
    N: Fn(&Series) -> String,
    F: Fn(&Series, usize, Option<f64>) -> Option<f64>,
{
    series
        .iter()
        .map(|s| {
            let mut r = s.shaped_like(name(s));
            for i in 0..s.len() {
                r.set_opt(i, op(s, i, s.at(i)));
            }
            r
        })
        .collect()
}

pub(crate) fn scale(call: &FuncExpr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let factor = call.float_arg(1)?;
    Ok(map_series(
        &series,
        |s| format!("scale({},{})", s.name, factor),
        |_, _, v| v.map(|v| v * factor),
    ))
}

/// Rescales each sample so it represents a per-`seconds` rate, using the
/// series' own step as the source rate.
pub(crate) fn scale_to_seconds(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let seconds = call.float_arg(1)?;
    Ok(map_series(
        &series,
        |s| format!("scaleToSeconds({},{})", s.name, seconds),
        |s, _, v| v.map(|v| v * (seconds / s.step as f64)),
    ))
}

pub(crate) fn offset(call: &FuncExpr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let amount = call.float_arg(1)?;
    Ok(map_series(
        &series,
        |s| format!("offset({},{})", s.name, amount),
        |_, _, v| v.map(|v| v + amount),
    ))
}

/// Shifts each series down by its own minimum, so the smallest present
/// sample lands on zero.
pub(crate) fn offset_to_zero(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(series
        .iter()
        .map(|s| {
            let min = s.present().fold(f64::INFINITY, f64::min);
            let mut r = s.shaped_like(format!("offsetToZero({})", s.name));
            for i in 0..s.len() {
                r.set_opt(i, s.at(i).map(|v| v - min));
            }
            r
        })
        .collect())
}

pub(crate) fn absolute(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(map_series(
        &series,
        |s| format!("absolute({})", s.name),
        |_, _, v| v.map(f64::abs),
    ))
}

pub(crate) fn invert(call: &FuncExpr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(map_series(
        &series,
        |s| format!("invert({})", s.name),
        |_, _, v| match v {
            Some(v) if v != 0.0 => Some(1.0 / v),
            _ => None,
        },
    ))
}

pub(crate) fn logarithm(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let base = call.float_named_or("base", 1, 10.0)?;
    let explicit = call.has_arg("base", 1);
    let log_base = base.ln();
    Ok(map_series(
        &series,
        |s| {
            if explicit {
                format!("logarithm({},{})", s.name, base)
            } else {
                format!("logarithm({})", s.name)
            }
        },
        |_, _, v| v.map(|v| v.ln() / log_base),
    ))
}

pub(crate) fn square_root(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(map_series(
        &series,
        |s| format!("squareRoot({})", s.name),
        |_, _, v| v.map(f64::sqrt),
    ))
}

pub(crate) fn pow(call: &FuncExpr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let exponent = call.float_arg(1)?;
    Ok(map_series(
        &series,
        |s| format!("pow({},{})", s.name, exponent),
        |_, _, v| v.map(|v| v.powf(exponent)),
    ))
}

pub(crate) fn transform_null(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let default = call.float_named_or("default", 1, 0.0)?;
    let explicit = call.has_arg("default", 1);
    Ok(map_series(
        &series,
        |s| {
            if explicit {
                format!("transformNull({},{})", s.name, default)
            } else {
                format!("transformNull({})", s.name)
            }
        },
        |_, _, v| Some(v.unwrap_or(default)),
    ))
}

pub(crate) fn is_non_null(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(map_series(
        &series,
        |s| format!("isNonNull({})", s.name),
        |_, _, v| Some(if v.is_some() { 1.0 } else { 0.0 }),
    ))
}

/// Fills gaps with the last seen value, but only the first `limit` slots of
/// any run of absents; longer runs keep their tail absent.
pub(crate) fn keep_last_value(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let limit = call.float_named_or("limit", 1, f64::INFINITY)?;
    let explicit = call.has_arg("limit", 1);

    Ok(series
        .iter()
        .map(|s| {
            let name = if explicit {
                format!("keepLastValue({},{})", s.name, limit)
            } else {
                format!("keepLastValue({})", s.name)
            };
            let mut r = s.shaped_like(name);
            let mut prev = None;
            let mut gap = 0u32;
            for i in 0..s.len() {
                match s.at(i) {
                    Some(v) => {
                        gap = 0;
                        prev = Some(v);
                        r.set(i, v);
                    }
                    None => {
                        gap += 1;
                        if let Some(p) = prev {
                            if (gap as f64) <= limit {
                                r.set(i, p);
                            }
                        }
                    }
                }
            }
            r
        })
        .collect())
}

/// 1 where the value differs from the previous present value, else 0.
pub(crate) fn changed(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(series
        .iter()
        .map(|s| {
            let mut r = s.shaped_like(format!("changed({})", s.name));
            let mut prev = None;
            for i in 0..s.len() {
                match s.at(i) {
                    Some(v) => {
                        let flipped = prev.is_some_and(|p| p != v);
                        r.set(i, if flipped { 1.0 } else { 0.0 });
                        prev = Some(v);
                    }
                    None => r.set(i, 0.0),
                }
            }
            r
        })
        .collect())
}

/// Draws each series' interpolated p-th percentile as a flat line across
/// the whole window.
pub(crate) fn n_percentile(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let p = call.float_arg(1)?;
    Ok(series
        .iter()
        .map(|s| {
            let present: Vec<f64> = s.present().collect();
            let value = percentile(&present, p, true);
            let mut r = s.shaped_like(format!("nPercentile({},{})", s.name, p));
            for i in 0..s.len() {
                r.set_opt(i, Some(value));
            }
            r
        })
        .collect())
}

pub(crate) fn remove_below_value(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let threshold = call.float_arg(1)?;
    Ok(map_series(
        &series,
        |s| format!("removeBelowValue({}, {})", s.name, threshold),
        |_, _, v| v.filter(|&v| v >= threshold),
    ))
}

pub(crate) fn remove_above_value(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let threshold = call.float_arg(1)?;
    Ok(map_series(
        &series,
        |s| format!("removeAboveValue({}, {})", s.name, threshold),
        |_, _, v| v.filter(|&v| v <= threshold),
    ))
}

pub(crate) fn remove_below_percentile(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    remove_by_percentile(call, from, until, m, "removeBelowPercentile", false)
}

pub(crate) fn remove_above_percentile(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    remove_by_percentile(call, from, until, m, "removeAbovePercentile", true)
}

fn remove_by_percentile(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
    fname: &str,
    above: bool,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let p = call.float_arg(1)?;
    Ok(series
        .iter()
        .map(|s| {
            let present: Vec<f64> = s.present().collect();
            let cutoff = percentile(&present, p, false);
            let mut r = s.shaped_like(format!("{}({}, {})", fname, s.name, p));
            for i in 0..s.len() {
                let keep = s.at(i).filter(|&v| {
                    if above {
                        v <= cutoff
                    } else {
                        v >= cutoff
                    }
                });
                r.set_opt(i, keep);
            }
            r
        })
        .collect())
}

pub(crate) fn derivative(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(series
        .iter()
        .map(|s| {
            let mut r = s.shaped_like(format!("derivative({})", s.name));
            let mut prev = None;
            for i in 0..s.len() {
                if let Some(v) = s.at(i) {
                    r.set_opt(i, prev.map(|p| v - p));
                    prev = Some(v);
                }
            }
            r
        })
        .collect())
}

/// Counter-style derivative: negative deltas are counter resets. With
/// `maxValue` the wrapped delta `(maxValue - prev) + v + 1` is emitted when
/// plausible; otherwise the sample goes absent. An absent sample clears the
/// previous-value state.
pub(crate) fn non_negative_derivative(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    counter_delta(call, from, until, m, "nonNegativeDerivative", false)
}

/// Like `nonNegativeDerivative` but scaled by the series' step.
pub(crate) fn per_second(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    counter_delta(call, from, until, m, "perSecond", true)
}

fn counter_delta(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
    fname: &str,
    per_step: bool,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let max_value = match call.named_or_pos("maxValue", 1) {
        Some(Expr::Const(v)) => Some(*v),
        Some(_) => return Err(EvalError::BadType),
        None => None,
    };

    Ok(series
        .iter()
        .map(|s| {
            let name = match max_value {
                Some(mv) => format!("{}({},{})", fname, s.name, mv),
                None => format!("{}({})", fname, s.name),
            };
            let mut r = s.shaped_like(name);
            let mut prev = f64::NAN;
            for i in 0..s.len() {
                let v = match s.at(i) {
                    Some(v) => v,
                    None => {
                        prev = f64::NAN;
                        continue;
                    }
                };
                let mut delta = f64::NAN;
                if !prev.is_nan() && v >= prev {
                    delta = v - prev;
                } else if let Some(mv) = max_value {
                    if mv >= v {
                        delta = (mv - prev) + v + 1.0;
                    }
                }
                if per_step {
                    delta /= s.step as f64;
                }
                r.set_opt(i, (!delta.is_nan()).then_some(delta));
                prev = v;
            }
            r
        })
        .collect())
}

/// Cumulative sum; absent samples stay absent and leave the total alone.
pub(crate) fn integral(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(series
        .iter()
        .map(|s| {
            let mut r = s.shaped_like(format!("integral({})", s.name));
            let mut total = 0.0;
            for i in 0..s.len() {
                if let Some(v) = s.at(i) {
                    total += v;
                    r.set(i, total);
                }
            }
            r
        })
        .collect())
}

/// Resolves a rolling-window size argument. Integer arguments are sample
/// counts; interval strings convert via the series' step. The last return
/// is the number shown in output names: interval strings render as their
/// seconds value.
fn rolling_window(call: &FuncExpr, step: i32) -> EvalResult<(usize, bool, i64)> {
    match call.arg(1)? {
        Expr::Const(v) => {
            let w = *v as i64;
            if w < 1 {
                return Err(EvalError::BadType);
            }
            Ok((w as usize, false, w))
        }
        Expr::Str(s) => {
            let seconds = parse_interval(s, 1).ok_or(EvalError::BadType)?.abs();
            let w = (seconds / step.max(1)).max(1);
            Ok((w as usize, true, seconds as i64))
        }
        _ => Err(EvalError::BadType),
    }
}

/// Mean of the previous `w` samples, the current one excluded. For integer
/// windows the first `w` outputs are absent; interval strings rely on the
/// widened fetch for warm-up history instead.
pub(crate) fn moving_average(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let (from, until) = child_window(call, from, until);
    let series = call.series_arg(0, from, until, m)?;
    let mut out = Vec::with_capacity(series.len());
    for s in &series {
        let (w, from_interval, shown) = rolling_window(call, s.step)?;
        let offset = if from_interval { 0 } else { w };
        let mut r = s.shaped_like(format!("movingAverage({},{})", s.name, shown));
        for i in offset..s.len() {
            let lo = i.saturating_sub(w);
            let window: Vec<f64> = (lo..i).filter_map(|j| s.at(j)).collect();
            let value = if window.is_empty() {
                None
            } else {
                Some(window.iter().sum::<f64>() / window.len() as f64)
            };
            r.set_opt(i, value);
        }
        out.push(r);
    }
    Ok(out)
}

/// Median over the trailing `w` samples, the current one included. Absent
/// samples enter the window as NaN; NaN sorts before every number, so a
/// window dominated by gaps yields a NaN median and the output goes absent.
pub(crate) fn moving_median(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let (from, until) = child_window(call, from, until);
    let series = call.series_arg(0, from, until, m)?;
    let mut out = Vec::with_capacity(series.len());
    for s in &series {
        let (w, _, shown) = rolling_window(call, s.step)?;
        let mut r = s.shaped_like(format!("movingMedian({},{})", s.name, shown));
        for i in (w.saturating_sub(1))..s.len() {
            let lo = (i + 1).saturating_sub(w);
            let mut window: Vec<f64> = (lo..=i)
                .map(|j| s.at(j).unwrap_or(f64::NAN))
                .collect();
            sort_nan_first(&mut window);
            let n = window.len();
            let median = if n % 2 == 1 {
                window[n / 2]
            } else {
                (window[n / 2 - 1] + window[n / 2]) / 2.0
            };
            r.set_opt(i, (!median.is_nan()).then_some(median));
        }
        out.push(r);
    }
    Ok(out)
}

pub(crate) fn moving_min(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    moving_reduce(call, from, until, m, "movingMin", |w| {
        w.iter().cloned().reduce(f64::min)
    })
}

pub(crate) fn moving_max(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    moving_reduce(call, from, until, m, "movingMax", |w| {
        w.iter().cloned().reduce(f64::max)
    })
}

pub(crate) fn moving_sum(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    moving_reduce(call, from, until, m, "movingSum", |w| {
        if w.is_empty() {
            None
        } else {
            Some(w.iter().sum())
        }
    })
}

fn moving_reduce(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
    fname: &str,
    reduce: impl Fn(&[f64]) -> Option<f64>,
) -> EvalResult<Vec<Series>> {
    let (from, until) = child_window(call, from, until);
    let series = call.series_arg(0, from, until, m)?;
    let mut out = Vec::with_capacity(series.len());
    for s in &series {
        let (w, _, shown) = rolling_window(call, s.step)?;
        let mut r = s.shaped_like(format!("{}({},{})", fname, s.name, shown));
        for i in (w.saturating_sub(1))..s.len() {
            let lo = (i + 1).saturating_sub(w);
            let window: Vec<f64> = (lo..=i).filter_map(|j| s.at(j)).collect();
            r.set_opt(i, reduce(&window));
        }
        out.push(r);
    }
    Ok(out)
}

/// `y[0] = x[0]`, then `y[i] = α·y[i-1] + (1-α)·x[i]`. Absent inputs stay
/// absent and carry the state through unchanged.
pub(crate) fn ewma(call: &FuncExpr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let alpha = call.float_arg(1)?;
    Ok(series
        .iter()
        .map(|s| {
            let mut r = s.shaped_like(format!("ewma({},{})", s.name, alpha));
            let mut state: Option<f64> = None;
            for i in 0..s.len() {
                if let Some(v) = s.at(i) {
                    let y = match state {
                        Some(prev) => alpha * prev + (1.0 - alpha) * v,
                        None => v,
                    };
                    state = Some(y);
                    r.set(i, y);
                }
            }
            r
        })
        .collect())
}

/// Trailing-window Pearson correlation between two series. Outputs are
/// absent until a full window is available; pairs with an absent side are
/// skipped inside the window.
pub(crate) fn pearson_fn(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let a = call.series_arg(0, from, until, m)?;
    let b = call.series_arg(1, from, until, m)?;
    let window = call.int_arg(2)?;
    if window < 1 {
        return Err(EvalError::BadType);
    }
    let w = window as usize;

    let a = &a[0];
    let b = &b[0];
    if a.step != b.step {
        return Err(EvalError::SeriesMisaligned);
    }

    let mut r = a.shaped_like(format!("pearson({},{},{})", a.name, b.name, window));
    let len = a.len().min(b.len());
    for i in (w - 1)..len {
        let lo = i + 1 - w;
        let mut xs = Vec::with_capacity(w);
        let mut ys = Vec::with_capacity(w);
        for j in lo..=i {
            if let (Some(x), Some(y)) = (a.at(j), b.at(j)) {
                xs.push(x);
                ys.push(y);
            }
        }
        let rho = pearson(&xs, &ys);
        r.set_opt(i, (!rho.is_nan()).then_some(rho));
    }
    Ok(vec![r])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::evaluator::eval;
    use crate::query::parser::parse;
    use crate::testutil::{assert_series, make_series, planned_metric, single_metric};

    const NAN: f64 = f64::NAN;

    /// Parses and evaluates over `[0, 1)`, seeding the map under the keys
    /// the planner emits (widened for interval-string windows).
    fn run(query: &str, pattern: &str, series: Vec<crate::series::Series>) -> Vec<crate::series::Series> {
        let m = planned_metric(query, 0, 1, pattern, series);
        eval(&parse(query).unwrap(), 0, 1, &m).unwrap()
    }

    fn run_one(query: &str, pattern: &str, values: &[f64]) -> crate::series::Series {
        let mut out = run(query, pattern, vec![make_series(pattern, values, 1, 100)]);
        assert_eq!(out.len(), 1);
        out.remove(0)
    }

    #[test]
    fn should_scale_values() {
        let got = run_one("scale(metric1, 2.5)", "metric1", &[1.0, 2.0, NAN, 4.0, 5.0]);
        assert_series(&got, "scale(metric1,2.5)", &[2.5, 5.0, NAN, 10.0, 12.5]);
    }

    #[test]
    fn should_leave_input_untouched() {
        let input = vec![make_series("metric1", &[1.0, 2.0, NAN, 4.0], 1, 100)];
        let m = single_metric("metric1", 0, 1, input.clone());
        eval(&parse("scale(metric1, 2.5)").unwrap(), 0, 1, &m).unwrap();
        assert_eq!(m[&crate::series::FetchKey::new("metric1", 0, 1)], input);
    }

    #[test]
    fn should_scale_to_seconds() {
        let series = vec![make_series("metric1", &[60.0, 120.0, NAN, 120.0, 120.0], 60, 0)];
        let got = run("scaleToSeconds(metric1, 5)", "metric1", series);
        assert_series(&got[0], "scaleToSeconds(metric1,5)", &[5.0, 10.0, NAN, 10.0, 10.0]);
        assert_eq!(got[0].step, 60);
    }

    #[test]
    fn should_offset_values() {
        let got = run_one(
            "offset(metric1, 10)",
            "metric1",
            &[93.0, 94.0, 95.0, NAN, 97.0],
        );
        assert_series(&got, "offset(metric1,10)", &[103.0, 104.0, 105.0, NAN, 107.0]);
    }

    #[test]
    fn should_offset_to_zero() {
        let got = run_one(
            "offsetToZero(metric1)",
            "metric1",
            &[93.0, 94.0, 95.0, NAN, 97.0, 98.0, 99.0, 100.0, 101.0],
        );
        assert_series(
            &got,
            "offsetToZero(metric1)",
            &[0.0, 1.0, 2.0, NAN, 4.0, 5.0, 6.0, 7.0, 8.0],
        );
    }

    #[test]
    fn should_take_absolute_values() {
        let got = run_one("absolute(metric1)", "metric1", &[0.0, -1.0, 2.0, -3.0, 4.0, 5.0]);
        assert_series(&got, "absolute(metric1)", &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn should_invert_and_blank_zero() {
        let got = run_one(
            "invert(metric1)",
            "metric1",
            &[-4.0, -2.0, -1.0, 0.0, 1.0, 2.0, 4.0],
        );
        assert_series(
            &got,
            "invert(metric1)",
            &[-0.25, -0.5, -1.0, NAN, 1.0, 0.5, 0.25],
        );
    }

    #[test]
    fn should_take_logarithms() {
        let got = run_one(
            "logarithm(metric1)",
            "metric1",
            &[1.0, 10.0, 100.0, 1000.0, 10000.0],
        );
        assert_series(&got, "logarithm(metric1)", &[0.0, 1.0, 2.0, 3.0, 4.0]);

        let got = run_one(
            "logarithm(metric1, base=2)",
            "metric1",
            &[1.0, 2.0, 4.0, 8.0, 16.0, 32.0],
        );
        assert_series(&got, "logarithm(metric1,2)", &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn should_take_square_roots() {
        let got = run_one(
            "squareRoot(metric1)",
            "metric1",
            &[1.0, 2.0, 0.0, 7.0, 8.0, 20.0, 30.0, NAN],
        );
        assert_series(
            &got,
            "squareRoot(metric1)",
            &[
                1.0,
                1.4142135623730951,
                0.0,
                2.6457513110645907,
                2.8284271247461903,
                4.47213595499958,
                5.477225575051661,
                NAN,
            ],
        );
    }

    #[test]
    fn should_raise_to_powers() {
        let got = run_one(
            "pow(metric1, 3)",
            "metric1",
            &[5.0, 1.0, NAN, 0.0, 12.0, 125.0, 10.4, 1.1],
        );
        assert_series(
            &got,
            "pow(metric1,3)",
            &[125.0, 1.0, NAN, 0.0, 1728.0, 1953125.0, 1124.864, 1.331],
        );
    }

    #[test]
    fn should_transform_null_with_default_and_explicit_value() {
        let got = run_one("transformNull(metric1)", "metric1", &[1.0, NAN, NAN, 3.0, 4.0, 12.0]);
        assert_series(&got, "transformNull(metric1)", &[1.0, 0.0, 0.0, 3.0, 4.0, 12.0]);

        let got = run_one(
            "transformNull(metric1, default=5)",
            "metric1",
            &[1.0, NAN, NAN, 3.0, 4.0, 12.0],
        );
        assert_series(&got, "transformNull(metric1,5)", &[1.0, 5.0, 5.0, 3.0, 4.0, 12.0]);
    }

    #[test]
    fn should_flag_non_null_samples() {
        let got = run_one("isNonNull(metric1)", "metric1", &[NAN, -1.0, NAN, -3.0, 4.0, 5.0]);
        assert_series(&got, "isNonNull(metric1)", &[0.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn should_keep_last_value_without_limit() {
        let got = run_one(
            "keepLastValue(metric1)",
            "metric1",
            &[NAN, 2.0, NAN, NAN, NAN, NAN, 4.0, 5.0],
        );
        assert_series(
            &got,
            "keepLastValue(metric1)",
            &[NAN, 2.0, 2.0, 2.0, 2.0, 2.0, 4.0, 5.0],
        );
    }

    #[test]
    fn should_keep_last_value_up_to_limit() {
        let got = run_one(
            "keepLastValue(metric1, limit=3)",
            "metric1",
            &[NAN, 2.0, NAN, NAN, NAN, NAN, 4.0, 5.0],
        );
        assert_series(
            &got,
            "keepLastValue(metric1,3)",
            &[NAN, 2.0, 2.0, 2.0, 2.0, NAN, 4.0, 5.0],
        );
    }

    #[test]
    fn should_flag_changed_values() {
        let got = run_one(
            "changed(metric1)",
            "metric1",
            &[
                NAN, NAN, NAN, NAN, 0.0, 0.0, 0.0, NAN, NAN, 1.0, 1.0, 2.0, 3.0, 4.0, 4.0,
                5.0, 5.0, 5.0, 6.0, 7.0,
            ],
        );
        assert_series(
            &got,
            "changed(metric1)",
            &[
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0,
                1.0, 0.0, 0.0, 1.0, 1.0,
            ],
        );
    }

    #[test]
    fn should_draw_percentile_line() {
        let got = run_one(
            "nPercentile(metric1, 50)",
            "metric1",
            &[2.0, 4.0, 6.0, 10.0, 14.0, 20.0, NAN],
        );
        assert_series(
            &got,
            "nPercentile(metric1,50)",
            &[8.0, 8.0, 8.0, 8.0, 8.0, 8.0, 8.0],
        );
    }

    #[test]
    fn should_remove_below_and_above_value() {
        let got = run_one(
            "removeBelowValue(metric1, 0)",
            "metric1",
            &[1.0, 2.0, -1.0, 7.0, 8.0, 20.0, 30.0, NAN],
        );
        assert_series(
            &got,
            "removeBelowValue(metric1, 0)",
            &[1.0, 2.0, NAN, 7.0, 8.0, 20.0, 30.0, NAN],
        );

        let got = run_one(
            "removeAboveValue(metric1, 10)",
            "metric1",
            &[1.0, 2.0, -1.0, 7.0, 8.0, 20.0, 30.0, NAN],
        );
        assert_series(
            &got,
            "removeAboveValue(metric1, 10)",
            &[1.0, 2.0, -1.0, 7.0, 8.0, NAN, NAN, NAN],
        );
    }

    #[test]
    fn should_remove_by_percentile() {
        let got = run_one(
            "removeBelowPercentile(metric1, 50)",
            "metric1",
            &[1.0, 2.0, -1.0, 7.0, 8.0, 20.0, 30.0, NAN],
        );
        assert_series(
            &got,
            "removeBelowPercentile(metric1, 50)",
            &[NAN, NAN, NAN, 7.0, 8.0, 20.0, 30.0, NAN],
        );

        let got = run_one(
            "removeAbovePercentile(metric1, 50)",
            "metric1",
            &[1.0, 2.0, -1.0, 7.0, 8.0, 20.0, 30.0, NAN],
        );
        assert_series(
            &got,
            "removeAbovePercentile(metric1, 50)",
            &[1.0, 2.0, -1.0, 7.0, NAN, NAN, NAN, NAN],
        );
    }

    #[test]
    fn should_compute_derivative() {
        let got = run_one(
            "derivative(metric1)",
            "metric1",
            &[2.0, 4.0, 6.0, 1.0, 4.0, NAN, 8.0],
        );
        assert_series(
            &got,
            "derivative(metric1)",
            &[NAN, 2.0, 2.0, -5.0, 3.0, NAN, 4.0],
        );
    }

    #[test]
    fn should_compute_non_negative_derivative() {
        let got = run_one(
            "nonNegativeDerivative(metric1)",
            "metric1",
            &[2.0, 4.0, 6.0, 10.0, 14.0, 20.0],
        );
        assert_series(
            &got,
            "nonNegativeDerivative(metric1)",
            &[NAN, 2.0, 2.0, 4.0, 4.0, 6.0],
        );

        let got = run_one(
            "nonNegativeDerivative(metric1)",
            "metric1",
            &[2.0, 4.0, 6.0, 1.0, 4.0, NAN, 8.0],
        );
        assert_series(
            &got,
            "nonNegativeDerivative(metric1)",
            &[NAN, 2.0, 2.0, NAN, 3.0, NAN, NAN],
        );
    }

    #[test]
    fn should_wrap_counter_resets_at_max_value() {
        let got = run_one(
            "nonNegativeDerivative(metric1, maxValue=32)",
            "metric1",
            &[2.0, 4.0, 0.0, 10.0, 1.0, NAN, 8.0, 40.0, 37.0],
        );
        assert_series(
            &got,
            "nonNegativeDerivative(metric1,32)",
            &[NAN, 2.0, 29.0, 10.0, 24.0, NAN, NAN, 32.0, NAN],
        );
    }

    #[test]
    fn should_compute_per_second_rates() {
        let got = run_one(
            "perSecond(metric1)",
            "metric1",
            &[27.0, 19.0, NAN, 10.0, 1.0, 100.0, 1.5, 10.2],
        );
        assert_series(
            &got,
            "perSecond(metric1)",
            &[NAN, NAN, NAN, NAN, NAN, 99.0, NAN, 8.7],
        );

        let got = run_one(
            "perSecond(metric1, 32)",
            "metric1",
            &[NAN, 1.0, 2.0, 3.0, 4.0, 30.0, 0.0, 32.0, NAN],
        );
        assert_series(
            &got,
            "perSecond(metric1,32)",
            &[NAN, NAN, 1.0, 1.0, 1.0, 26.0, 3.0, 32.0, NAN],
        );
    }

    #[test]
    fn should_integrate() {
        let got = run_one(
            "integral(metric1)",
            "metric1",
            &[1.0, 0.0, 2.0, 3.0, 4.0, 5.0, NAN, 7.0, 8.0],
        );
        assert_series(
            &got,
            "integral(metric1)",
            &[1.0, 1.0, 3.0, 6.0, 10.0, 15.0, NAN, 22.0, 30.0],
        );
    }

    #[test]
    fn should_average_over_trailing_window() {
        let got = run_one(
            "movingAverage(metric1, 4)",
            "metric1",
            &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 4.0, 6.0, 4.0, 6.0, 8.0],
        );
        assert_series(
            &got,
            "movingAverage(metric1,4)",
            &[NAN, NAN, NAN, NAN, 1.0, 1.25, 1.5, 1.75, 2.5, 3.5, 4.0, 5.0],
        );
    }

    #[test]
    fn should_take_moving_median_including_current() {
        let got = run_one(
            "movingMedian(metric1, 4)",
            "metric1",
            &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 4.0, 6.0, 4.0, 6.0, 8.0],
        );
        assert_series(
            &got,
            "movingMedian(metric1,4)",
            &[NAN, NAN, NAN, 1.0, 1.0, 1.5, 2.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        );

        let got = run_one(
            "movingMedian(metric1, 5)",
            "metric1",
            &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 4.0, 6.0, 4.0, 6.0, 8.0, 1.0, 2.0, NAN],
        );
        assert_series(
            &got,
            "movingMedian(metric1,5)",
            &[NAN, NAN, NAN, NAN, 1.0, 1.0, 2.0, 2.0, 2.0, 4.0, 4.0, 6.0, 6.0, 4.0, 2.0],
        );
    }

    #[test]
    fn should_convert_interval_windows_by_step() {
        let values = [1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 4.0, 6.0, 4.0, 6.0, 8.0, 1.0, 2.0, NAN];
        let got = run_one("movingMedian(metric1, '1s')", "metric1", &values);
        assert_series(&got, "movingMedian(metric1,1)", &values);

        let got = run_one("movingMedian(metric1, '1min')", "metric1", &values);
        assert_series(&got, "movingMedian(metric1,60)", &[NAN; 15]);
    }

    #[test]
    fn should_reduce_moving_min_max_sum() {
        let values = [3.0, 1.0, 2.0, NAN, 5.0, 4.0];
        let got = run_one("movingMin(metric1, 3)", "metric1", &values);
        assert_series(&got, "movingMin(metric1,3)", &[NAN, NAN, 1.0, 1.0, 2.0, 4.0]);

        let got = run_one("movingMax(metric1, 3)", "metric1", &values);
        assert_series(&got, "movingMax(metric1,3)", &[NAN, NAN, 3.0, 2.0, 5.0, 5.0]);

        let got = run_one("movingSum(metric1, 3)", "metric1", &values);
        assert_series(&got, "movingSum(metric1,3)", &[NAN, NAN, 6.0, 3.0, 7.0, 9.0]);
    }

    #[test]
    fn should_smooth_exponentially() {
        let want = [0.0, 0.9, 0.99, 0.999, NAN, 0.9999, 0.99999];
        let input = [0.0, 1.0, 1.0, 1.0, NAN, 1.0, 1.0];
        let got = run_one("ewma(metric1, 0.1)", "metric1", &input);
        assert_series(&got, "ewma(metric1,0.1)", &want);

        // The long form canonicalizes to the same output name.
        let got = run_one("exponentialWeightedMovingAverage(metric1, 0.1)", "metric1", &input);
        assert_series(&got, "ewma(metric1,0.1)", &want);
    }

    #[test]
    fn should_correlate_over_trailing_window() {
        let mut m = single_metric(
            "metric1",
            0,
            1,
            vec![make_series("metric1", &[43.0, 21.0, 25.0, 42.0, 57.0, 59.0], 1, 100)],
        );
        m.insert(
            crate::series::FetchKey::new("metric2", 0, 1),
            vec![make_series("metric2", &[99.0, 65.0, 79.0, 75.0, 87.0, 81.0], 1, 100)],
        );
        let out = eval(&parse("pearson(metric1, metric2, 6)").unwrap(), 0, 1, &m).unwrap();
        assert_series(
            &out[0],
            "pearson(metric1,metric2,6)",
            &[NAN, NAN, NAN, NAN, NAN, 0.5298089018901744],
        );
    }
}
