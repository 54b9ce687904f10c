use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

/// Width of a period bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// `YYYY-MM-DD`, used for metric series.
    Day,

    /// `YYYY-MM-01`, used for transactions.
    Month,
}

impl Granularity {
    /// First day of the period containing `at`.
    pub fn truncate(self, at: DateTime<Utc>) -> Option<NaiveDate> {
        let day = at.date_naive();
        match self {
            Granularity::Day => Some(day),
            Granularity::Month => NaiveDate::from_ymd_opt(day.year(), day.month(), 1),
        }
    }
}

/// Values of all series for one period. Points absent from the map were never
/// seen in this period; a `None` value is a known gap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBucket {
    key: String,
    ms: i64,
    #[serde(flatten)]
    points: BTreeMap<String, Option<f64>>,
}

impl PeriodBucket {
    /// Empty bucket starting at midnight UTC of `start`.
    pub fn new(start: NaiveDate) -> Self {
        let ms = start
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight).timestamp_millis())
            .unwrap_or_default();
        Self {
            key: Self::key_of(start),
            ms,
            points: BTreeMap::new(),
        }
    }

    /// Empty bucket for the same period as `other`.
    pub(super) fn like(other: &PeriodBucket) -> Self {
        Self {
            key: other.key.clone(),
            ms: other.ms,
            points: BTreeMap::new(),
        }
    }

    pub fn key_of(start: NaiveDate) -> String {
        start.format("%Y-%m-%d").to_string()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Epoch milliseconds of the period start.
    pub fn ms(&self) -> i64 {
        self.ms
    }

    pub fn points(&self) -> &BTreeMap<String, Option<f64>> {
        &self.points
    }

    /// `None` when the point is unknown to this period, `Some(None)` for a gap.
    pub fn get(&self, point: &str) -> Option<Option<f64>> {
        self.points.get(point).copied()
    }

    /// Numeric value of the point, if there is one.
    pub fn value(&self, point: &str) -> Option<f64> {
        self.get(point).flatten()
    }

    pub(super) fn set(&mut self, point: &str, value: Option<f64>) {
        self.points.insert(point.to_owned(), value);
    }

    pub(super) fn add(&mut self, point: &str, amount: f64) {
        let slot = self.points.entry(point.to_owned()).or_insert(Some(0.0));
        *slot = Some(slot.unwrap_or(0.0) + amount);
    }
}

/// Read an ISO-8601 date or date-time. Values without an offset are taken as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Date held by a record field: an ISO string or epoch milliseconds.
pub fn resolve_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_datetime(s),
        Value::Number(n) => {
            let ms = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(ms).single()
        }
        _ => None,
    }
}
