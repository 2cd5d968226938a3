//! Expression engine for the Graphite render-target function language.
//!
//! Given a query such as
//! `summarize(scale(nonNegativeDerivative(a.b.*),60),'5min','avg')` and an
//! absolute window `[from, until)`, the engine works in three stages:
//!
//! 1. [`parse`] turns the query into an [`Expr`] tree.
//! 2. [`plan`] walks the tree and reports the [`FetchKey`]s, the
//!    `(pattern, from, until)` triples an external fetcher must resolve,
//!    with window adjustments (rolling lookback, time shifts, bucket
//!    alignment) applied.
//! 3. [`eval`] evaluates the tree bottom-up against the resolved
//!    [`MetricMap`], producing named, equally-sampled [`Series`].
//!
//! The engine performs no I/O and keeps no state between evaluations; the
//! fetcher side stays entirely with the host.
//!
//! # Example
//!
//! ```
//! use seriesexpr::{eval, parse, plan, MetricMap, Series};
//!
//! let expr = parse("sumSeries(app.host1.requests,app.host2.requests)")?;
//!
//! // Resolve each planned fetch, then evaluate.
//! let mut metrics = MetricMap::new();
//! for key in plan(&expr, 1000, 1005) {
//!     let series = Series::new(key.pattern.clone(), vec![1.0; 5], 1, 1000);
//!     metrics.insert(key, vec![series]);
//! }
//!
//! let result = eval(&expr, 1000, 1005, &metrics)?;
//! assert_eq!(result[0].name, "sumSeries(app.host1.requests,app.host2.requests)");
//! assert_eq!(result[0].values, vec![2.0; 5]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Concurrency
//!
//! Evaluation is synchronous and strictly depth-first. Inputs are never
//! mutated (handlers allocate fresh buffers for everything they produce),
//! so one `MetricMap` may back any number of concurrent evaluations. The
//! only shared state is the function dispatch table, built once on first
//! use.

mod query;
mod series;
#[cfg(test)]
mod testutil;

pub use query::evaluator::{eval, EvalError, EvalResult};
pub use query::parser::{parse, Expr, FuncExpr, ParseError, ParseErrorKind};
pub use query::planner::plan;
pub use series::{FetchKey, MetricMap, Series};
