//! Fetch planning: which `(pattern, from, until)` triples an expression
//! needs before it can be evaluated.
//!
//! The window a child is fetched over is not always the request window:
//! rolling windows reach back, timeShift moves the whole window, and the
//! bucketing functions align their edges. [`child_window`] is the single
//! source of truth for those adjustments and is shared with the evaluator,
//! so every key produced here is exactly the key `eval` will look up.

use std::collections::HashSet;

use crate::query::functions::buckets::{align_start_to_interval, align_to_bucket_size};
use crate::query::interval::parse_interval;
use crate::query::parser::{Expr, FuncExpr};
use crate::series::FetchKey;

/// Walks the expression and returns the set of fetches required to evaluate
/// it, in first-use order, duplicates removed.
pub fn plan(e: &Expr, from: i32, until: i32) -> Vec<FetchKey> {
    let mut out = Vec::new();
    walk(e, from, until, &mut out);

    let mut seen = HashSet::new();
    out.retain(|k| seen.insert(k.clone()));
    tracing::debug!(fetches = out.len(), from, until, "planned expression");
    out
}

fn walk(e: &Expr, from: i32, until: i32, out: &mut Vec<FetchKey>) {
    match e {
        // Bare `true`/`false` are boolean literals, not patterns.
        Expr::Name(name) if name == "true" || name == "false" => {}
        Expr::Name(name) => out.push(FetchKey::new(name.clone(), from, until)),
        Expr::Const(_) | Expr::Str(_) => {}
        Expr::Func(call) => {
            let (from, until) = child_window(call, from, until);
            // Named arguments are scalars by construction; only positional
            // arguments can carry series.
            for arg in &call.args {
                walk(arg, from, until, out);
            }
        }
    }
}

/// The window `call`'s series arguments are fetched and evaluated over.
///
/// Policies:
/// - rolling windows with a string interval widen `from` by the interval;
///   integer sample counts pass the window through (the step that would
///   convert samples to seconds is unknown until data arrives)
/// - `timeShift` shifts both edges; a bare interval means "into the past"
/// - `summarize` without `alignToFrom` aligns `from` down and `until` up to
///   the bucket size
/// - `hitcount` with `alignToInterval` aligns `from` down to the interval
/// - everything else passes the window through unchanged
pub(crate) fn child_window(call: &FuncExpr, from: i32, until: i32) -> (i32, i32) {
    match call.name.as_str() {
        "movingAverage" | "movingMedian" | "movingMin" | "movingMax" | "movingSum" => {
            if let Some(Expr::Str(s)) = call.args.get(1) {
                if let Some(seconds) = parse_interval(s, 1) {
                    return (from - seconds.abs(), until);
                }
            }
            (from, until)
        }
        "timeShift" => {
            if let Some(Expr::Str(s)) = call.args.get(1) {
                if let Some(offset) = parse_interval(s, -1) {
                    return (from + offset, until + offset);
                }
            }
            (from, until)
        }
        "summarize" => {
            let align_to_from = matches!(
                call.named_or_pos("alignToFrom", 3),
                Some(Expr::Name(n)) if n == "true"
            );
            if align_to_from {
                return (from, until);
            }
            match call.args.get(1) {
                Some(Expr::Str(s)) => match parse_interval(s, 1) {
                    Some(bucket) if bucket >= 1 => align_to_bucket_size(from, until, bucket),
                    _ => (from, until),
                },
                _ => (from, until),
            }
        }
        "hitcount" => {
            let align = matches!(
                call.named_or_pos("alignToInterval", 2),
                Some(Expr::Name(n)) if n == "true"
            );
            if !align {
                return (from, until);
            }
            match call.args.get(1) {
                Some(Expr::Str(s)) => match parse_interval(s, 1) {
                    Some(bucket) if bucket >= 1 => {
                        (align_start_to_interval(from, until, bucket), until)
                    }
                    _ => (from, until),
                },
                _ => (from, until),
            }
        }
        _ => (from, until),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;

    fn keys(query: &str, from: i32, until: i32) -> Vec<FetchKey> {
        plan(&parse(query).unwrap(), from, until)
    }

    #[test]
    fn should_pass_window_through_plain_functions() {
        assert_eq!(
            keys(
                "scale(scaleToSeconds(nonNegativeDerivative(foo.bar.baz),60),60)",
                100,
                200
            ),
            vec![FetchKey::new("foo.bar.baz", 100, 200)]
        );
    }

    #[test]
    fn should_widen_string_moving_windows() {
        assert_eq!(
            keys("movingAverage(m, '5min')", 1000, 2000),
            vec![FetchKey::new("m", 700, 2000)]
        );
    }

    #[test]
    fn should_not_widen_integer_moving_windows() {
        assert_eq!(
            keys("movingAverage(m, 4)", 1000, 2000),
            vec![FetchKey::new("m", 1000, 2000)]
        );
    }

    #[test]
    fn should_shift_window_for_time_shift() {
        assert_eq!(
            keys("timeShift(m, '1d')", 100000, 101000),
            vec![FetchKey::new("m", 100000 - 86400, 101000 - 86400)]
        );
        assert_eq!(
            keys("timeShift(m, '+1h')", 100000, 101000),
            vec![FetchKey::new("m", 103600, 104600)]
        );
    }

    #[test]
    fn should_align_summarize_window() {
        assert_eq!(
            keys("summarize(m, '10min')", 613, 1787),
            vec![FetchKey::new("m", 600, 1800)]
        );
        // alignToFrom disables the alignment
        assert_eq!(
            keys("summarize(m, '10min', 'sum', alignToFrom=true)", 613, 1787),
            vec![FetchKey::new("m", 613, 1787)]
        );
    }

    #[test]
    fn should_align_hitcount_window_only_when_asked() {
        assert_eq!(
            keys("hitcount(m, '1h')", 91111, 92222),
            vec![FetchKey::new("m", 91111, 92222)]
        );
        assert_eq!(
            keys("hitcount(m, '1h', true)", 91111, 92222),
            vec![FetchKey::new("m", 90000, 92222)]
        );
    }

    #[test]
    fn should_collect_each_leaf_and_dedup() {
        assert_eq!(
            keys("sumSeries(a, b, a)", 0, 60),
            vec![FetchKey::new("a", 0, 60), FetchKey::new("b", 0, 60)]
        );
    }

    #[test]
    fn should_skip_scalar_arguments() {
        assert_eq!(keys("constantLine(42.42)", 0, 60), Vec::new());
        assert_eq!(
            keys("mostDeviant(2, metric*)", 0, 60),
            vec![FetchKey::new("metric*", 0, 60)]
        );
    }

    #[test]
    fn should_adjust_nested_windows_cumulatively() {
        // The shift applies first, then the widened moving window inside it.
        assert_eq!(
            keys("timeShift(movingAverage(m, '1min'), '1h')", 10000, 20000),
            vec![FetchKey::new("m", 10000 - 3600 - 60, 20000 - 3600)]
        );
    }
}
