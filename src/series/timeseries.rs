use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use super::period::parse_datetime;

/// Lazily produced sequence. Both materialized vectors and producer functions are
/// accepted; vectors are wrapped with [From].
pub struct Sequence<T> {
    produce: Arc<dyn Fn() -> Vec<T> + Send + Sync>,
}

impl<T> Sequence<T> {
    pub fn from_fn<F>(produce: F) -> Self
    where
        F: Fn() -> Vec<T> + Send + Sync + 'static,
    {
        Self {
            produce: Arc::new(produce),
        }
    }

    /// Produce the elements.
    pub fn get(&self) -> Vec<T> {
        (self.produce)()
    }
}

impl<T> From<Vec<T>> for Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(items: Vec<T>) -> Self {
        Self::from_fn(move || items.clone())
    }
}

impl<T: 'static> Default for Sequence<T> {
    fn default() -> Self {
        Self::from_fn(Vec::new)
    }
}

impl<T> Clone for Sequence<T> {
    fn clone(&self) -> Self {
        Self {
            produce: Arc::clone(&self.produce),
        }
    }
}

impl<T> fmt::Debug for Sequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sequence(..)")
    }
}

impl<'de, T> Deserialize<'de> for Sequence<T>
where
    T: Deserialize<'de> + Clone + Send + Sync + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<T>::deserialize(deserializer).map(Into::into)
    }
}

/// Date of a metric sample: either already materialized, or as the API sends it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawDate")]
pub enum TsDate {
    At(DateTime<Utc>),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Text(String),
    Millis(i64),
}

impl From<RawDate> for TsDate {
    fn from(raw: RawDate) -> Self {
        match raw {
            RawDate::Text(text) => TsDate::Text(text),
            RawDate::Millis(ms) => match Utc.timestamp_millis_opt(ms).single() {
                Some(at) => TsDate::At(at),
                None => TsDate::Text(ms.to_string()),
            },
        }
    }
}

impl TsDate {
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            TsDate::At(at) => Some(*at),
            TsDate::Text(text) => parse_datetime(text),
        }
    }
}

impl From<DateTime<Utc>> for TsDate {
    fn from(at: DateTime<Utc>) -> Self {
        TsDate::At(at)
    }
}

impl From<String> for TsDate {
    fn from(text: String) -> Self {
        TsDate::Text(text)
    }
}

impl From<&str> for TsDate {
    fn from(text: &str) -> Self {
        TsDate::Text(text.to_owned())
    }
}

/// Samples of one metric for one result id. `dates`, `data` and `missing` are
/// parallel; a nonzero `missing` entry marks the sample as a gap.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricSeries {
    #[serde(default)]
    pub dates: Sequence<TsDate>,
    #[serde(default)]
    pub data: Sequence<f64>,
    #[serde(default)]
    pub missing: Sequence<f64>,
}

impl MetricSeries {
    pub fn new(
        dates: impl Into<Sequence<TsDate>>,
        data: impl Into<Sequence<f64>>,
        missing: impl Into<Sequence<f64>>,
    ) -> Self {
        Self {
            dates: dates.into(),
            data: data.into(),
            missing: missing.into(),
        }
    }
}

/// Pre-computed metric results, keyed by result id and then by metric name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalMetricsResult {
    #[serde(default)]
    pub result: BTreeMap<String, BTreeMap<String, MetricSeries>>,
}

impl EvalMetricsResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        id: impl Into<String>,
        metric: impl Into<String>,
        series: MetricSeries,
    ) -> &mut Self {
        self.result
            .entry(id.into())
            .or_default()
            .insert(metric.into(), series);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.result.values().all(BTreeMap::is_empty)
    }
}
