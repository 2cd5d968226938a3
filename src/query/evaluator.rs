//! Expression evaluation: post-order traversal with registry dispatch.
//!
//! `eval` walks the tree depth-first, left-to-right. Leaves resolve against
//! the caller-provided [`MetricMap`]; function nodes dispatch by name into
//! the function registry. Handlers receive already-parsed arguments and
//! produce fresh series; inputs are never mutated, so one map can back
//! many concurrent evaluations.

use std::fmt::{Display, Formatter};

use crate::query::functions::registry;
use crate::query::interval::parse_interval;
use crate::query::parser::{Expr, FuncExpr};
use crate::series::{FetchKey, MetricMap, Series};

/// Evaluation failure. Empty series results are not errors; they surface as
/// empty output at the top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Dispatch failed: no handler registered under this name.
    UnknownFunction(String),
    /// A required positional or named argument was absent.
    MissingArgument,
    /// An argument was present but of the wrong kind.
    BadType,
    /// A required series argument resolved to no series.
    SeriesDoesNotExist,
    /// Inputs to a reducer carry inconsistent steps.
    SeriesMisaligned,
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::UnknownFunction(name) => write!(f, "unknown function: {}", name),
            EvalError::MissingArgument => write!(f, "missing argument"),
            EvalError::BadType => write!(f, "argument has wrong type"),
            EvalError::SeriesDoesNotExist => write!(f, "series does not exist"),
            EvalError::SeriesMisaligned => write!(f, "series have inconsistent steps"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Result type alias for evaluation.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Evaluates an expression over `[from, until)` against resolved fetches.
///
/// `Name` leaves look up `(name, from, until)` in the map; a missing key is
/// an empty result, not an error. `Const` and `Str` leaves produce no series
/// on their own; they only have meaning as arguments.
pub fn eval(e: &Expr, from: i32, until: i32, m: &MetricMap) -> EvalResult<Vec<Series>> {
    match e {
        Expr::Name(name) => Ok(m
            .get(&FetchKey::new(name.clone(), from, until))
            .cloned()
            .unwrap_or_default()),
        Expr::Const(_) | Expr::Str(_) => Ok(Vec::new()),
        Expr::Func(call) => match registry().get(&call.name) {
            Some(handler) => handler(call, from, until, m),
            None => {
                tracing::warn!(function = %call.name, "dispatch failed");
                Err(EvalError::UnknownFunction(call.name.clone()))
            }
        },
    }
}

/// Typed accessors over a call's arguments. Every handler goes through
/// these; they encode the coercion rules once.
impl FuncExpr {
    pub(crate) fn arg(&self, i: usize) -> EvalResult<&Expr> {
        self.args.get(i).ok_or(EvalError::MissingArgument)
    }

    /// Resolves positional argument `i` to series by recursing into `eval`.
    /// Fails with `SeriesDoesNotExist` when the argument yields nothing:
    /// callers that tolerate empty input use [`FuncExpr::series_arg_or_empty`].
    pub(crate) fn series_arg(
        &self,
        i: usize,
        from: i32,
        until: i32,
        m: &MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let arg = self.arg(i)?;
        if !matches!(arg, Expr::Name(_) | Expr::Func(_)) {
            return Err(EvalError::BadType);
        }
        let series = eval(arg, from, until, m)?;
        if series.is_empty() {
            return Err(EvalError::SeriesDoesNotExist);
        }
        Ok(series)
    }

    /// Like [`FuncExpr::series_arg`], but an empty resolution is an empty
    /// list rather than an error. Filters and sorts degrade gracefully.
    pub(crate) fn series_arg_or_empty(
        &self,
        i: usize,
        from: i32,
        until: i32,
        m: &MetricMap,
    ) -> EvalResult<Vec<Series>> {
        match self.series_arg(i, from, until, m) {
            Ok(series) => Ok(series),
            Err(EvalError::SeriesDoesNotExist) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Flattens every positional argument from `start` on into one series
    /// list. Each argument must resolve to at least one series.
    pub(crate) fn series_args(
        &self,
        start: usize,
        from: i32,
        until: i32,
        m: &MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let mut out = Vec::new();
        for i in start..self.args.len() {
            out.extend(self.series_arg(i, from, until, m)?);
        }
        if out.is_empty() {
            return Err(EvalError::SeriesDoesNotExist);
        }
        Ok(out)
    }

    pub(crate) fn float_arg(&self, i: usize) -> EvalResult<f64> {
        match self.arg(i)? {
            Expr::Const(v) => Ok(*v),
            _ => Err(EvalError::BadType),
        }
    }

    pub(crate) fn int_arg(&self, i: usize) -> EvalResult<i32> {
        Ok(self.float_arg(i)? as i32)
    }

    pub(crate) fn string_arg(&self, i: usize) -> EvalResult<&str> {
        match self.arg(i)? {
            Expr::Str(s) => Ok(s),
            _ => Err(EvalError::BadType),
        }
    }

    /// Booleans are the bare identifiers `true` / `false`.
    pub(crate) fn bool_arg(&self, i: usize) -> EvalResult<bool> {
        match self.arg(i)? {
            Expr::Name(n) if n == "true" => Ok(true),
            Expr::Name(n) if n == "false" => Ok(false),
            _ => Err(EvalError::BadType),
        }
    }

    /// A duration-string argument, converted to seconds.
    pub(crate) fn interval_arg(&self, i: usize, default_sign: i32) -> EvalResult<i32> {
        let s = self.string_arg(i)?;
        parse_interval(s, default_sign).ok_or(EvalError::BadType)
    }

    /// The value for `name`, preferring the named form, falling back to
    /// positional index `i`.
    pub(crate) fn named_or_pos(&self, name: &str, i: usize) -> Option<&Expr> {
        self.named_args.get(name).or_else(|| self.args.get(i))
    }

    pub(crate) fn float_named_or(&self, name: &str, i: usize, default: f64) -> EvalResult<f64> {
        match self.named_or_pos(name, i) {
            Some(Expr::Const(v)) => Ok(*v),
            Some(_) => Err(EvalError::BadType),
            None => Ok(default),
        }
    }

    pub(crate) fn string_named_or<'a>(
        &'a self,
        name: &str,
        i: usize,
        default: &'a str,
    ) -> EvalResult<&'a str> {
        match self.named_or_pos(name, i) {
            Some(Expr::Str(s)) => Ok(s),
            Some(_) => Err(EvalError::BadType),
            None => Ok(default),
        }
    }

    pub(crate) fn bool_named_or(&self, name: &str, i: usize, default: bool) -> EvalResult<bool> {
        match self.named_or_pos(name, i) {
            Some(Expr::Name(n)) if n == "true" => Ok(true),
            Some(Expr::Name(n)) if n == "false" => Ok(false),
            Some(_) => Err(EvalError::BadType),
            None => Ok(default),
        }
    }

    /// Whether `name` was supplied at all, in either form.
    pub(crate) fn has_arg(&self, name: &str, i: usize) -> bool {
        self.named_or_pos(name, i).is_some()
    }
}
