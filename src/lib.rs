//! Queryseries turns select texts into query specs for a tabular query engine, and
//! folds transactional records and pre-computed metric series into per-period
//! chart series.
//!
//! # Projection
//! A select text is a comma separated list of fields. Each field is an expression,
//! optionally followed by an output name, with or without an `as` keyword:
//!
//! ```text
//! id, name nm, sum(amount) as total, concat("a, b", id) label
//! ```
//!
//! Commas inside parentheses or double quotes do not split fields. A doubled quote
//! inside a quoted span stands for a literal quote. When any field calls an aggregate
//! function, every plain field becomes a grouping key. See [projection].
//!
//! The compiled projection is sent to a [projection::QueryExecutor] and the typed
//! cells of the answer are reshaped into records keyed by output name.
//!
//! # Series
//! [series::SeriesAggregator] buckets records by calendar period and by the values of
//! configured group fields, summing value, quantity and spend columns. Metric results
//! are merged into the same periods. From there the aggregator derives series
//! relative to a baseline period and series normalized into `[0, 1]`.
//!
//! Every derived view is memoized, and setting any input invalidates what depends on
//! it.
//!
//! # Plans
//! [plan::explain] asks the engine for the plan of a fetch without reading any rows
//! and annotates the database plan with the columns of the indexes it uses.
//!
//! # Configuration
//! Query and series settings can be read from YAML, see [config].

/// Spans of text inside a select, used for error reporting.
pub mod span;

/// Module to aid user in understanding errors by pointing into the source text.
pub mod error_expl;

/// Select text compilation and the query round trip.
pub mod projection;

/// Period series from records and metric results.
pub mod series;

/// Explanation of query plans.
pub mod plan;

/// Ordering of version strings.
pub mod semver;

/// YAML configuration of queries and series.
pub mod config;

/// Error of a collaborator the crate delegates to, such as a query engine.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    MalformedExpression(#[from] projection::MalformedExpression),

    #[error("Query needs {plans} execution plans, only single-plan queries are supported")]
    UnsupportedMultiPlanQuery { plans: usize },

    #[error("Query engine returned no execution plan")]
    MissingQueryPlan,

    #[error("Query backend failed: {0}")]
    Backend(#[source] BackendError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yml::Error),
}

#[cfg(test)]
pub fn init_log() {
    use log::*;

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        flexi_logger::Logger::with(LevelFilter::Trace)
            .format(format)
            .start()
            .map(std::mem::forget)
            .unwrap_or_else(|e| eprintln!("logger not started: {e}"));
    });

    fn format(
        write: &mut dyn std::io::Write,
        _: &mut flexi_logger::DeferredNow,
        record: &Record,
    ) -> std::io::Result<()> {
        write.write_all(
            format!(
                "[{} {}:{}] {} - {}",
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.module_path().unwrap_or_default(),
                record.args()
            )
            .as_bytes(),
        )
    }
}
