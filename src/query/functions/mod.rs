//! The series function library.
//!
//! Handlers are plain functions behind a name-keyed registry; aliases
//! collapse onto one handler (`sum` → `sumSeries`, `ewma` →
//! `exponentialWeightedMovingAverage`). The table is built once and shared
//! by every evaluation. Shared numeric reducers used across families live
//! at the bottom of this module.

pub(crate) mod aggregate;
pub(crate) mod alias;
pub(crate) mod buckets;
pub(crate) mod filter;
pub(crate) mod synthetic;
pub(crate) mod transform;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::OnceLock;

use crate::query::evaluator::{EvalError, EvalResult};
use crate::query::parser::FuncExpr;
use crate::series::{MetricMap, Series};

/// A registered series function.
pub(crate) type Handler = fn(&FuncExpr, i32, i32, &MetricMap) -> EvalResult<Vec<Series>>;

/// Maps function names (aliases included) to their handlers.
pub(crate) struct FunctionRegistry {
    functions: HashMap<&'static str, Handler>,
}

impl FunctionRegistry {
    fn new() -> Self {
        let mut f: HashMap<&'static str, Handler> = HashMap::new();

        // Pointwise transforms
        f.insert("scale", transform::scale);
        f.insert("scaleToSeconds", transform::scale_to_seconds);
        f.insert("offset", transform::offset);
        f.insert("offsetToZero", transform::offset_to_zero);
        f.insert("absolute", transform::absolute);
        f.insert("invert", transform::invert);
        f.insert("logarithm", transform::logarithm);
        f.insert("log", transform::logarithm);
        f.insert("squareRoot", transform::square_root);
        f.insert("pow", transform::pow);
        f.insert("transformNull", transform::transform_null);
        f.insert("isNonNull", transform::is_non_null);
        f.insert("isNotNull", transform::is_non_null);
        f.insert("keepLastValue", transform::keep_last_value);
        f.insert("changed", transform::changed);
        f.insert("nPercentile", transform::n_percentile);
        f.insert("removeBelowValue", transform::remove_below_value);
        f.insert("removeAboveValue", transform::remove_above_value);
        f.insert("removeBelowPercentile", transform::remove_below_percentile);
        f.insert("removeAbovePercentile", transform::remove_above_percentile);

        // Derivatives and accumulation
        f.insert("derivative", transform::derivative);
        f.insert("nonNegativeDerivative", transform::non_negative_derivative);
        f.insert("perSecond", transform::per_second);
        f.insert("integral", transform::integral);

        // Rolling windows and smoothing
        f.insert("movingAverage", transform::moving_average);
        f.insert("movingMedian", transform::moving_median);
        f.insert("movingMin", transform::moving_min);
        f.insert("movingMax", transform::moving_max);
        f.insert("movingSum", transform::moving_sum);
        f.insert("exponentialWeightedMovingAverage", transform::ewma);
        f.insert("ewma", transform::ewma);
        f.insert("pearson", transform::pearson_fn);

        // Horizontal reducers
        f.insert("sumSeries", aggregate::sum_series);
        f.insert("sum", aggregate::sum_series);
        f.insert("averageSeries", aggregate::average_series);
        f.insert("avg", aggregate::average_series);
        f.insert("minSeries", aggregate::min_series);
        f.insert("maxSeries", aggregate::max_series);
        f.insert("multiplySeries", aggregate::multiply_series);
        f.insert("diffSeries", aggregate::diff_series);
        f.insert("rangeOfSeries", aggregate::range_of_series);
        f.insert("stddevSeries", aggregate::stddev_series);
        f.insert("medianSeries", aggregate::median_series);
        f.insert("countSeries", aggregate::count_series);
        f.insert("percentileOfSeries", aggregate::percentile_of_series);
        f.insert("asPercent", aggregate::as_percent);
        f.insert("divideSeries", aggregate::divide_series);

        // Group-by-node family
        f.insert("groupByNode", aggregate::group_by_node);
        f.insert("sumSeriesWithWildcards", aggregate::sum_series_with_wildcards);
        f.insert(
            "averageSeriesWithWildcards",
            aggregate::average_series_with_wildcards,
        );
        f.insert("applyByNode", aggregate::apply_by_node);

        // Selection, sorting, pattern filters
        f.insert("highestCurrent", filter::highest_current);
        f.insert("highestMax", filter::highest_max);
        f.insert("highestAverage", filter::highest_average);
        f.insert("lowestCurrent", filter::lowest_current);
        f.insert("lowestAverage", filter::lowest_average);
        f.insert("averageAbove", filter::average_above);
        f.insert("averageBelow", filter::average_below);
        f.insert("currentAbove", filter::current_above);
        f.insert("currentBelow", filter::current_below);
        f.insert("maximumAbove", filter::maximum_above);
        f.insert("maximumBelow", filter::maximum_below);
        f.insert("minimumAbove", filter::minimum_above);
        f.insert("minimumBelow", filter::minimum_below);
        f.insert("mostDeviant", filter::most_deviant);
        f.insert("pearsonClosest", filter::pearson_closest);
        f.insert("tukeyAbove", filter::tukey_above);
        f.insert("tukeyBelow", filter::tukey_below);
        f.insert("sortByName", filter::sort_by_name);
        f.insert("sortByTotal", filter::sort_by_total);
        f.insert("sortByMaxima", filter::sort_by_maxima);
        f.insert("sortByMinima", filter::sort_by_minima);
        f.insert("grep", filter::grep);
        f.insert("exclude", filter::exclude);
        f.insert("limit", filter::limit);
        f.insert("removeEmptySeries", filter::remove_empty_series);
        f.insert("removeZeroSeries", filter::remove_zero_series);

        // Aliasing
        f.insert("alias", alias::alias);
        f.insert("aliasByMetric", alias::alias_by_metric);
        f.insert("aliasByNode", alias::alias_by_node);
        f.insert("aliasSub", alias::alias_sub);

        // Time-aligned bucketing
        f.insert("summarize", buckets::summarize);
        f.insert("hitcount", buckets::hitcount);

        // Synthetic series and window shifting
        f.insert("constantLine", synthetic::constant_line);
        f.insert("threshold", synthetic::threshold);
        f.insert("timeFunction", synthetic::time_function);
        f.insert("time", synthetic::time_function);
        f.insert("timeShift", synthetic::time_shift);

        Self { functions: f }
    }

    pub(crate) fn get(&self, name: &str) -> Option<Handler> {
        self.functions.get(name).copied()
    }
}

/// The process-wide dispatch table, built on first use.
pub(crate) fn registry() -> &'static FunctionRegistry {
    static REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Verifies every input series shares one step and returns it.
pub(crate) fn common_step(series: &[Series]) -> EvalResult<i32> {
    let step = series[0].step;
    if series.iter().any(|s| s.step != step) {
        return Err(EvalError::SeriesMisaligned);
    }
    Ok(step)
}

/// Rank percentile over unsorted values.
///
/// `k = (n-1) * p / 100`; without interpolation the value at `ceil(k)` is
/// returned, with it the two neighbours blend linearly. Out-of-range `p`
/// and empty input give NaN. Callers pass present values only.
pub(crate) fn percentile(values: &[f64], p: f64, interpolate: bool) -> f64 {
    if values.is_empty() || !(0.0..=100.0).contains(&p) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let k = (sorted.len() - 1) as f64 * p / 100.0;
    let low = k.floor() as usize;
    let high = k.ceil() as usize;
    let remainder = k - k.floor();
    if remainder == 0.0 || !interpolate {
        return sorted[high];
    }
    sorted[low] + (sorted[high] - sorted[low]) * remainder
}

/// Population variance. NaN for empty input.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}

/// Pearson correlation coefficient over paired values.
pub(crate) fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return f64::NAN;
    }
    let nf = n as f64;
    let mx = xs[..n].iter().sum::<f64>() / nf;
    let my = ys[..n].iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for i in 0..n {
        let dx = xs[i] - mx;
        let dy = ys[i] - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    cov / (vx.sqrt() * vy.sqrt())
}

/// Sorts in place with NaN ordered before every number. Rolling medians
/// rely on this placement to push gap markers off the middle.
pub(crate) fn sort_nan_first(values: &mut [f64]) {
    values.sort_by(|a, b| match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    });
}

/// Name ordering where digit runs compare numerically: `metric2` sorts
/// before `metric11`.
pub(crate) fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn take_number(it: &mut Peekable<Chars>) -> u64 {
        let mut n: u64 = 0;
        while let Some(c) = it.peek() {
            match c.to_digit(10) {
                Some(d) => {
                    n = n.saturating_mul(10).saturating_add(d as u64);
                    it.next();
                }
                None => break,
            }
        }
        n
    }

    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                match take_number(&mut ai).cmp(&take_number(&mut bi)) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Equal => {
                    ai.next();
                    bi.next();
                }
                other => return other,
            },
        }
    }
}

fn is_metric_char(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, b'.' | b'_' | b'-' | b'*' | b'?' | b':' | b'[' | b']')
}

/// Pulls the first metric-looking identifier out of a call string by
/// walking parens and commas and balancing braces.
pub(crate) fn extract_metric(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut start = 0;
    let mut end = 0;
    let mut braces = 0;
    while end < bytes.len() {
        match bytes[end] {
            b'{' => braces += 1,
            b'}' => braces -= 1,
            b')' => return &s[start..end],
            b',' if braces == 0 => return &s[start..end],
            b',' => {}
            c if !is_metric_char(c) => start = end + 1,
            _ => {}
        }
        end += 1;
    }
    &s[start..end]
}
