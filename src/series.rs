/// Dotted-path field access and value coercions over JSON records.
pub mod path;

/// Period buckets and date resolution.
mod period;

/// Input contract of pre-computed metric series.
mod timeseries;

/// The memoizing aggregator itself.
mod aggregator;

pub use aggregator::{
    Aggregation, Baseline, Normalized, PointKind, Range, Relative, SeriesAggregator,
    SeriesDescriptor, TransactionProps, ALL_SERIES,
};
pub use period::{parse_datetime, resolve_date, Granularity, PeriodBucket};
pub use timeseries::{EvalMetricsResult, MetricSeries, Sequence, TsDate};
