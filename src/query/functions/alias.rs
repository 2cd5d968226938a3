//! Renaming functions. Data passes through untouched; only the output
//! name changes.

use regex::Regex;

use crate::query::evaluator::{EvalError, EvalResult};
use crate::query::functions::extract_metric;
use crate::query::parser::FuncExpr;
use crate::series::{MetricMap, Series};

pub(crate) fn alias(call: &FuncExpr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let name = call.string_arg(1)?.to_string();
    Ok(series
        .into_iter()
        .map(|mut s| {
            s.name = name.clone();
            s
        })
        .collect())
}

/// Renames each series to the last node of its underlying metric.
pub(crate) fn alias_by_metric(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    Ok(series
        .into_iter()
        .map(|mut s| {
            let metric = extract_metric(&s.name);
            s.name = metric.rsplit('.').next().unwrap_or(metric).to_string();
            s
        })
        .collect())
}

/// Renames each series to the selected dot-separated nodes, joined back
/// with dots. Negative indices count from the end; out-of-range indices
/// are skipped.
pub(crate) fn alias_by_node(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let mut nodes = Vec::new();
    for i in 1..call.args.len() {
        nodes.push(call.int_arg(i)?);
    }
    if nodes.is_empty() {
        return Err(EvalError::MissingArgument);
    }

    Ok(series
        .into_iter()
        .map(|mut s| {
            let metric = extract_metric(&s.name).to_string();
            let parts: Vec<&str> = metric.split('.').collect();
            let n = parts.len() as i32;
            let picked: Vec<&str> = nodes
                .iter()
                .filter_map(|&idx| {
                    let i = if idx < 0 { idx + n } else { idx };
                    if i < 0 || i >= n {
                        None
                    } else {
                        Some(parts[i as usize])
                    }
                })
                .collect();
            s.name = picked.join(".");
            s
        })
        .collect())
}

/// Regex substitution over the name, with `$1`..`$9` backreferences.
pub(crate) fn alias_sub(
    call: &FuncExpr,
    from: i32,
    until: i32,
    m: &MetricMap,
) -> EvalResult<Vec<Series>> {
    let series = call.series_arg(0, from, until, m)?;
    let search = Regex::new(call.string_arg(1)?).map_err(|_| EvalError::BadType)?;
    let replace = call.string_arg(2)?.to_string();
    Ok(series
        .into_iter()
        .map(|mut s| {
            s.name = search.replace_all(&s.name, replace.as_str()).into_owned();
            s
        })
        .collect())
}
