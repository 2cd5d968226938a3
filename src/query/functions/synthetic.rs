//! Series made from thin air, and window shifting.
//!
//! `constantLine`/`threshold`/`timeFunction` synthesize data directly from
//! the request window. `timeShift` fetches its input over the shifted
//! window (the planner advertises the same shift) and re-times the result
//! onto the request window.

use crate::query::evaluator::{EvalError, EvalResult};
use crate::query::parser::{Expr, FuncExpr};
use crate::query::planner::child_window;
use crate::series::{MetricMap, Series};

fn flat_line(name: String, value: f64, from: i32, until: i32) -> Series {
    let step = (until - from).max(1);
    Series {
        name,
        start: from,
        stop: from + 2 * step,
        step,
        values: vec![value, value],
        absent: vec![false, false],
    }
}

/// A two-sample horizontal line spanning the request window, named after
/// its value.
pub(crate) fn constant_line(
    call: &FuncExpr,
    from: i32,
    until: i32,
    _m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let value = call.float_arg(0)?;
    Ok(vec![flat_line(format!("{}", value), value, from, until)])
}

/// `constantLine` with an optional label and color; the color is accepted
/// for Graphite compatibility and discarded, since series carry none.
pub(crate) fn threshold(
    call: &FuncExpr,
    from: i32,
    until: i32,
    _m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let value = call.float_arg(0)?;
    let label = call.string_named_or("label", 1, "")?.to_string();
    let _color = call.string_named_or("color", 2, "")?;

    let name = if label.is_empty() {
        format!("{}", value)
    } else {
        label
    };
    Ok(vec![flat_line(name, value, from, until)])
}

/// Each sample carries its own timestamp. The step defaults to 60 seconds.
pub(crate) fn time_function(
    call: &FuncExpr,
    from: i32,
    until: i32,
    _m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let label = call.string_arg(0)?.to_string();
    let step = match call.named_or_pos("step", 1) {
        Some(Expr::Const(v)) => *v as i32,
        Some(_) => return Err(EvalError::BadType),
        None => 60,
    };
    if step < 1 {
        return Err(EvalError::BadType);
    }

    let mut values = Vec::new();
    let mut t = from;
    while t < until {
        values.push(t as f64);
        t += step;
    }
    Ok(vec![Series::new(label, values, step, from)])
}

/// Evaluates the input over the offset window, then slides the data back
/// onto the request window. A bare interval shifts into the past.
pub(crate) fn time_shift(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let offset_str = call.string_arg(1)?.to_string();
    let offset = call.interval_arg(1, -1)?;
    let (shifted_from, shifted_until) = child_window(call, from, until);

    let series = call.series_arg(0, shifted_from, shifted_until, m)?;
    Ok(series
        .into_iter()
        .map(|s| {
            let mut r = s.shaped_like(format!("timeShift({},'{}')", s.name, offset_str));
            r.start = s.start - offset;
            r.stop = s.stop - offset;
            r.values = s.values.clone();
            r.absent = s.absent.clone();
            r
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::evaluator::eval;
    use crate::query::parser::parse;
    use crate::series::{FetchKey, MetricMap};
    use crate::testutil::{assert_series, make_series};

    fn run(query: &str, from: i32, until: i32, m: &MetricMap) -> Vec<Series> {
        eval(&parse(query).unwrap(), from, until, m).unwrap()
    }

    #[test]
    fn should_draw_constant_line() {
        let m = MetricMap::new();
        let got = run("constantLine(42.42)", 0, 1, &m);
        assert_series(&got[0], "42.42", &[42.42, 42.42]);
    }

    #[test]
    fn should_name_threshold_by_label() {
        let m = MetricMap::new();
        let got = run("threshold(42.42)", 0, 1, &m);
        assert_series(&got[0], "42.42", &[42.42, 42.42]);

        let got = run("threshold(42.42, 'fourty-two')", 0, 1, &m);
        assert_series(&got[0], "fourty-two", &[42.42, 42.42]);

        let got = run("threshold(42.42, 'fourty-two', 'blue')", 0, 1, &m);
        assert_series(&got[0], "fourty-two", &[42.42, 42.42]);

        let got = run("threshold(42.42, label='fourty-two')", 0, 1, &m);
        assert_series(&got[0], "fourty-two", &[42.42, 42.42]);

        let got = run("threshold(42.42, color='blue')", 0, 1, &m);
        assert_series(&got[0], "42.42", &[42.42, 42.42]);

        let got = run("threshold(42.42, label='fourty-two-blue', color='blue')", 0, 1, &m);
        assert_series(&got[0], "fourty-two-blue", &[42.42, 42.42]);
    }

    #[test]
    fn should_emit_timestamps() {
        let m = MetricMap::new();
        let got = run("timeFunction('footime')", 4200, 4350, &m);
        assert_series(&got[0], "footime", &[4200.0, 4260.0, 4320.0]);
        assert_eq!((got[0].start, got[0].step, got[0].stop), (4200, 60, 4380));
    }

    #[test]
    fn should_shift_fetch_window_and_retime() {
        let mut m = MetricMap::new();
        m.insert(
            FetchKey::new("metric1", 100000 - 86400, 100300 - 86400),
            vec![make_series("metric1", &[1.0, 2.0, 3.0], 60, 100020 - 86400)],
        );
        let got = run("timeShift(metric1, '1d')", 100000, 100300, &m);
        assert_series(&got[0], "timeShift(metric1,'1d')", &[1.0, 2.0, 3.0]);
        assert_eq!((got[0].start, got[0].stop), (100020, 100200));
    }

    #[test]
    fn should_reject_bad_shift_offset() {
        let m = MetricMap::new();
        let err = eval(&parse("timeShift(metric1, 'bogus')").unwrap(), 0, 300, &m).unwrap_err();
        assert_eq!(err, EvalError::BadType);
    }
}
