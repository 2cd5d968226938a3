//! Time-aligned bucketing: `summarize` and `hitcount` downsample a series
//! onto a coarser fixed interval, plus the alignment helpers they and the
//! planner share.

use crate::query::evaluator::{EvalError, EvalResult};
use crate::query::functions::percentile;
use crate::query::parser::FuncExpr;
use crate::query::planner::child_window;
use crate::series::{MetricMap, Series};

/// Number of buckets of `size` needed to cover `[start, stop)`.
pub(crate) fn get_buckets(start: i32, stop: i32, size: i32) -> i32 {
    (stop - start + size - 1) / size
}

/// Rounds `start` down and `stop` up to multiples of `size`.
pub(crate) fn align_to_bucket_size(start: i32, stop: i32, size: i32) -> (i32, i32) {
    let start = start - start.rem_euclid(size);
    let stop = match stop.rem_euclid(size) {
        0 => stop,
        rem => stop + size - rem,
    };
    (start, stop)
}

/// Aligns `start` down to the calendar unit the bucket size spans: whole
/// days for sizes of a day or more, then hours, then minutes. Smaller
/// sizes leave `start` unchanged.
pub(crate) fn align_start_to_interval(start: i32, _stop: i32, size: i32) -> i32 {
    for unit in [86400, 3600, 60] {
        if size >= unit {
            return start - start.rem_euclid(unit);
        }
    }
    start
}

enum BucketFunc {
    Sum,
    Avg,
    Min,
    Max,
    Last,
    Percentile(f64),
}

impl BucketFunc {
    fn parse(name: &str) -> EvalResult<Self> {
        match name {
            "sum" | "total" => Ok(BucketFunc::Sum),
            "avg" | "average" => Ok(BucketFunc::Avg),
            "min" => Ok(BucketFunc::Min),
            "max" => Ok(BucketFunc::Max),
            "last" => Ok(BucketFunc::Last),
            _ => match name.strip_prefix('p') {
                Some(rest) => rest
                    .parse::<f64>()
                    .map(BucketFunc::Percentile)
                    .map_err(|_| EvalError::BadType),
                None => Err(EvalError::BadType),
            },
        }
    }

    fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let v = match self {
            BucketFunc::Sum => values.iter().sum(),
            BucketFunc::Avg => values.iter().sum::<f64>() / values.len() as f64,
            BucketFunc::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            BucketFunc::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            BucketFunc::Last => *values.last().expect("non-empty"),
            BucketFunc::Percentile(p) => percentile(values, *p, true),
        };
        (!v.is_nan()).then_some(v)
    }
}

/// Re-buckets each series onto `interval`, reducing every bucket with
/// `func`. Buckets anchor at the series' start aligned down to the
/// interval, or at the start itself under `alignToFrom`.
pub(crate) fn summarize(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let (from, until) = child_window(call, from, until);
    let series = call.series_arg(0, from, until, m)?;
    let interval_str = call.string_arg(1)?.to_string();
    let interval = call.interval_arg(1, 1)?;
    if interval < 1 {
        return Err(EvalError::BadType);
    }
    let func = call.string_named_or("func", 2, "sum")?.to_string();
    let align_to_from = call.bool_named_or("alignToFrom", 3, false)?;
    let reducer = BucketFunc::parse(&func)?;

    let show_func = call.has_arg("func", 2) || call.has_arg("alignToFrom", 3);
    let show_align = call.has_arg("alignToFrom", 3);

    let mut out = Vec::with_capacity(series.len());
    for s in &series {
        let mut name = format!("summarize({},'{}'", s.name, interval_str);
        if show_func {
            name.push_str(&format!(",'{}'", func));
        }
        if show_align {
            name.push_str(&format!(",{}", align_to_from));
        }
        name.push(')');

        let anchor = if align_to_from {
            s.start
        } else {
            s.start - s.start.rem_euclid(interval)
        };
        let buckets = get_buckets(anchor, s.stop, interval).max(0);

        let mut r = Series::blank(name, buckets as usize, interval, anchor);
        let mut bucket_values: Vec<Vec<f64>> = vec![Vec::new(); buckets as usize];
        for i in 0..s.len() {
            if let Some(v) = s.at(i) {
                let t = s.start + i as i32 * s.step;
                let b = (t - anchor) / interval;
                if (0..buckets).contains(&b) {
                    bucket_values[b as usize].push(v);
                }
            }
        }
        for (b, vals) in bucket_values.iter().enumerate() {
            r.set_opt(b, reducer.reduce(vals));
        }
        out.push(r);
    }
    Ok(out)
}

/// Events per bucket, treating each sample as a rate: the bucket total is
/// the sum of `value * step` over its samples. Output `stop` is aligned up
/// to a whole number of buckets so the length invariant holds.
pub(crate) fn hitcount(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let (from, until) = child_window(call, from, until);
    let series = call.series_arg(0, from, until, m)?;
    let interval_str = call.string_arg(1)?.to_string();
    let interval = call.interval_arg(1, 1)?;
    if interval < 1 {
        return Err(EvalError::BadType);
    }
    let align = call.bool_named_or("alignToInterval", 2, false)?;
    let show_align = call.has_arg("alignToInterval", 2);

    let mut out = Vec::with_capacity(series.len());
    for s in &series {
        let mut name = format!("hitcount({},'{}'", s.name, interval_str);
        if show_align {
            name.push_str(&format!(",{}", align));
        }
        name.push(')');

        let start = if align {
            align_start_to_interval(s.start, s.stop, interval)
        } else {
            s.start
        };
        let buckets = get_buckets(start, s.stop, interval).max(0);

        let mut r = Series::blank(name, buckets as usize, interval, start);
        let mut totals: Vec<Option<f64>> = vec![None; buckets as usize];
        for i in 0..s.len() {
            if let Some(v) = s.at(i) {
                let t = s.start + i as i32 * s.step;
                let b = (t - start) / interval;
                if (0..buckets).contains(&b) {
                    let slot = totals[b as usize].get_or_insert(0.0);
                    *slot += v * s.step as f64;
                }
            }
        }
        for (b, total) in totals.iter().enumerate() {
            r.set_opt(b, *total);
        }
        out.push(r);
    }
    Ok(out)
}
