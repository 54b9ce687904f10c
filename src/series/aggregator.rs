use std::collections::{BTreeMap, HashMap};

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use super::{
    path::{key_fragment, lookup, numeric},
    period::{resolve_date, Granularity, PeriodBucket},
    timeseries::EvalMetricsResult,
};
use crate::config::SeriesConfig;

/// Series key used for transactions when no group fields are given.
pub const ALL_SERIES: &str = "ALL";

/// Column names that drive transaction aggregation.
///
/// Aggregation needs `date_field` and at least one of `value`, `qty`, `spend`.
/// Without them it simply produces nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionProps {
    pub date_field: Option<String>,
    pub value: Option<String>,
    pub qty: Option<String>,
    pub spend: Option<String>,
}

impl TransactionProps {
    pub fn new(date_field: impl Into<String>) -> Self {
        Self {
            date_field: Some(date_field.into()),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, field: impl Into<String>) -> Self {
        self.value = Some(field.into());
        self
    }

    pub fn with_qty(mut self, field: impl Into<String>) -> Self {
        self.qty = Some(field.into());
        self
    }

    pub fn with_spend(mut self, field: impl Into<String>) -> Self {
        self.spend = Some(field.into());
        self
    }

    /// Whether any measure column is configured.
    pub fn has_measure(&self) -> bool {
        self.value.is_some() || self.qty.is_some() || self.spend.is_some()
    }

    fn field(&self, kind: PointKind) -> Option<&str> {
        match kind {
            PointKind::Value => self.value.as_deref(),
            PointKind::Qty => self.qty.as_deref(),
            PointKind::Spend => self.spend.as_deref(),
            PointKind::Price => None,
        }
    }
}

/// Logical measure tracked by a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Value,
    Qty,
    Spend,
    /// Spend divided by quantity.
    Price,
}

impl PointKind {
    /// Point key of this measure for the series `series_key`.
    pub fn point_key(self, series_key: &str) -> String {
        let suffix = match self {
            PointKind::Value => "",
            PointKind::Qty => "Q",
            PointKind::Spend => "S",
            PointKind::Price => "P",
        };
        format!("{series_key}{suffix}")
    }
}

/// What a series stands for and which point keys hold its measures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesDescriptor {
    names: BTreeMap<String, String>,
    points: SmallVec<[(PointKind, String); 4]>,
}

impl SeriesDescriptor {
    fn for_transaction(
        key: &str,
        group: &[String],
        record: &Value,
        props: &TransactionProps,
    ) -> Self {
        let names = group
            .iter()
            .map(|g| (g.clone(), key_fragment(lookup(record, g))))
            .collect();

        let mut points = SmallVec::new();
        for kind in [PointKind::Value, PointKind::Qty, PointKind::Spend] {
            if props.field(kind).is_some() {
                points.push((kind, kind.point_key(key)));
            }
        }
        if props.qty.is_some() && props.spend.is_some() {
            points.push((PointKind::Price, PointKind::Price.point_key(key)));
        }
        Self { names, points }
    }

    fn for_metric(id: &str, metric: &str, key: &str) -> Self {
        let names = [("id", id), ("metric", metric)]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let mut points = SmallVec::new();
        points.push((PointKind::Value, key.to_owned()));
        Self { names, points }
    }

    /// Group field values, or `id` and `metric` for metric series.
    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.names
    }

    pub fn point(&self, kind: PointKind) -> Option<&str> {
        self.points
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, key)| key.as_str())
    }

    pub fn point_keys(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(|(_, key)| key.as_str())
    }
}

/// Baseline a relative view was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// Each point's first value, in period order.
    FirstSeen,

    /// Values of the period with this key.
    Period(String),
}

/// Observed bounds of one point across all periods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    fn at(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Position of `value` within the range, `None` when the range is degenerate
    /// or its maximum is zero.
    pub fn scale(&self, value: f64) -> Option<f64> {
        if self.max == 0.0 || self.max == self.min {
            None
        } else {
            Some((value - self.min) / (self.max - self.min))
        }
    }
}

/// Raw aggregated periods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggregation<'a> {
    pub values: &'a BTreeMap<String, PeriodBucket>,
    pub series: &'a BTreeMap<String, SeriesDescriptor>,
}

/// Periods expressed as change relative to a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Relative<'a> {
    pub buckets: &'a BTreeMap<String, PeriodBucket>,
    pub series: &'a BTreeMap<String, SeriesDescriptor>,
}

/// Periods scaled into `0..=1` per point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Normalized<'a> {
    pub buckets: &'a BTreeMap<String, PeriodBucket>,
    pub series: &'a BTreeMap<String, SeriesDescriptor>,
    pub ranges: &'a BTreeMap<String, Range>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Validity {
    objs: bool,
    ts: bool,
    rel: Option<Baseline>,
    norm: bool,
}

/// Buckets transactions and metric series by period, with memoized derived
/// views. Any input change invalidates what depends on it; views recompute on
/// the next call only.
#[derive(Debug, Clone, Default)]
pub struct SeriesAggregator {
    records: Vec<Value>,
    group: Vec<String>,
    props: TransactionProps,
    timeseries: EvalMetricsResult,

    values: BTreeMap<String, PeriodBucket>,
    series: BTreeMap<String, SeriesDescriptor>,
    rel: BTreeMap<String, PeriodBucket>,
    norm: BTreeMap<String, PeriodBucket>,
    ranges: BTreeMap<String, Range>,

    valid: Validity,
}

impl SeriesAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the transactional input.
    pub fn set_transactions(
        &mut self,
        records: Vec<Value>,
        group: Vec<String>,
        props: TransactionProps,
    ) -> &mut Self {
        self.records = records;
        self.group = group;
        self.props = props;
        self.invalidate_objs();
        self
    }

    pub fn set_records(&mut self, records: Vec<Value>) -> &mut Self {
        self.records = records;
        self.invalidate_objs();
        self
    }

    pub fn set_group(&mut self, group: Vec<String>) -> &mut Self {
        self.group = group;
        self.invalidate_objs();
        self
    }

    pub fn set_props(&mut self, props: TransactionProps) -> &mut Self {
        self.props = props;
        self.invalidate_objs();
        self
    }

    /// Apply group fields and props from a loaded config.
    pub fn configure(&mut self, config: &SeriesConfig) -> &mut Self {
        self.group = config.group.clone();
        self.props = config.props.clone();
        self.invalidate_objs();
        self
    }

    /// Replace the metric series input.
    pub fn set_timeseries(&mut self, timeseries: EvalMetricsResult) -> &mut Self {
        self.timeseries = timeseries;
        self.valid.ts = false;
        self.invalidate_derived();
        self
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn group(&self) -> &[String] {
        &self.group
    }

    pub fn props(&self) -> &TransactionProps {
        &self.props
    }

    pub fn timeseries(&self) -> &EvalMetricsResult {
        &self.timeseries
    }

    /// Aggregate both inputs, unless nothing changed since the last call.
    pub fn recompute(&mut self) -> Aggregation<'_> {
        self.clear();
        if !self.valid.objs {
            self.valid.objs = true;
            self.invalidate_derived();
            self.aggregate_transactions();
        }
        if !self.valid.ts {
            self.valid.ts = true;
            self.invalidate_derived();
            self.aggregate_timeseries();
        }
        Aggregation {
            values: &self.values,
            series: &self.series,
        }
    }

    /// Change of every point relative to a baseline: the period keyed `reference`
    /// when given, otherwise each point's first value.
    pub fn relative(&mut self, reference: Option<&str>) -> Relative<'_> {
        let baseline = reference.map_or(Baseline::FirstSeen, |r| Baseline::Period(r.to_owned()));
        if self.valid.rel.as_ref() != Some(&baseline) {
            self.recompute();
            self.compute_relative(&baseline);
            self.valid.rel = Some(baseline);
        }
        Relative {
            buckets: &self.rel,
            series: &self.series,
        }
    }

    /// Min-max normalization of every point across all periods.
    pub fn normalized(&mut self) -> Normalized<'_> {
        if !self.valid.norm {
            self.recompute();
            self.compute_normalized();
            self.valid.norm = true;
        }
        Normalized {
            buckets: &self.norm,
            series: &self.series,
            ranges: &self.ranges,
        }
    }

    fn invalidate_objs(&mut self) {
        self.valid.objs = false;
        self.invalidate_derived();
    }

    fn invalidate_derived(&mut self) {
        self.valid.rel = None;
        self.valid.norm = false;
        self.rel.clear();
        self.norm.clear();
        self.ranges.clear();
    }

    /// Both inputs share the period buckets, so a change to either rebuilds both.
    fn clear(&mut self) {
        if !self.valid.objs || !self.valid.ts {
            self.valid.objs = false;
            self.valid.ts = false;
            self.values.clear();
            self.series.clear();
        }
    }

    fn aggregate_transactions(&mut self) {
        let Self {
            records,
            group,
            props,
            values,
            series,
            ..
        } = self;

        if records.is_empty() {
            return;
        }
        let Some(date_field) = props.date_field.as_deref() else {
            debug!("No date field configured, skipping {} record(s)", records.len());
            return;
        };
        if !props.has_measure() {
            debug!("No measure configured, skipping {} record(s)", records.len());
            return;
        }

        for record in records.iter() {
            let Some(month) = lookup(record, date_field)
                .and_then(resolve_date)
                .and_then(|at| Granularity::Month.truncate(at))
            else {
                warn!("Skipping record without a readable `{date_field}`");
                continue;
            };
            let period = values
                .entry(PeriodBucket::key_of(month))
                .or_insert_with(|| PeriodBucket::new(month));

            let key = if group.is_empty() {
                ALL_SERIES.to_owned()
            } else {
                group
                    .iter()
                    .map(|g| key_fragment(lookup(record, g)))
                    .collect::<String>()
            };
            series
                .entry(key.clone())
                .or_insert_with(|| SeriesDescriptor::for_transaction(&key, group, record, props));

            for kind in [PointKind::Value, PointKind::Qty, PointKind::Spend] {
                if let Some(field) = props.field(kind) {
                    period.add(&kind.point_key(&key), numeric(lookup(record, field)));
                }
            }
            if props.qty.is_some() && props.spend.is_some() {
                let qty = period.value(&PointKind::Qty.point_key(&key));
                let spend = period.value(&PointKind::Spend.point_key(&key));
                let price = qty
                    .filter(|q| *q != 0.0)
                    .and_then(|q| spend.map(|s| s / q));
                period.set(&PointKind::Price.point_key(&key), price);
            }
        }

        debug!(
            "Aggregated {} record(s) into {} period(s)",
            records.len(),
            values.len()
        );
    }

    fn aggregate_timeseries(&mut self) {
        let Self {
            timeseries,
            values,
            series,
            ..
        } = self;

        for (id, metrics) in &timeseries.result {
            for (metric, samples) in metrics {
                let key = format!("{id}|{metric}");
                series
                    .entry(key.clone())
                    .or_insert_with(|| SeriesDescriptor::for_metric(id, metric, &key));

                let dates = samples.dates.get();
                let data = samples.data.get();
                let missing = samples.missing.get();
                trace!("Series `{key}` has {} sample(s)", dates.len());

                for (i, date) in dates.iter().enumerate() {
                    let Some(day) = date.resolve().and_then(|at| Granularity::Day.truncate(at))
                    else {
                        warn!("Skipping unreadable date {date:?} of `{key}`");
                        continue;
                    };
                    let value = match missing.get(i) {
                        Some(m) if *m == 0.0 => data.get(i).copied(),
                        _ => None,
                    };
                    values
                        .entry(PeriodBucket::key_of(day))
                        .or_insert_with(|| PeriodBucket::new(day))
                        .set(&key, value);
                }
            }
        }
    }

    fn compute_relative(&mut self, baseline: &Baseline) {
        let Self {
            values,
            series,
            rel,
            ..
        } = self;

        rel.clear();
        let mut base: HashMap<&str, Option<f64>> = match baseline {
            Baseline::Period(key) => values
                .get(key)
                .map(|bucket| {
                    bucket
                        .points()
                        .iter()
                        .map(|(point, value)| (point.as_str(), *value))
                        .collect()
                })
                .unwrap_or_default(),
            Baseline::FirstSeen => HashMap::new(),
        };

        for (key, period) in values.iter() {
            let mut out = PeriodBucket::like(period);
            for point in series.values().flat_map(SeriesDescriptor::point_keys) {
                let value = period.get(point).and_then(|current| {
                    let reference = *base.entry(point).or_insert(current);
                    relative_change(current, reference)
                });
                out.set(point, value);
            }
            rel.insert(key.clone(), out);
        }
    }

    fn compute_normalized(&mut self) {
        let Self {
            values,
            series,
            norm,
            ranges,
            ..
        } = self;

        norm.clear();
        ranges.clear();
        for period in values.values() {
            for point in series.values().flat_map(SeriesDescriptor::point_keys) {
                if let Some(value) = period.value(point) {
                    ranges
                        .entry(point.to_owned())
                        .and_modify(|range| range.include(value))
                        .or_insert_with(|| Range::at(value));
                }
            }
        }

        for (key, period) in values.iter() {
            let mut out = PeriodBucket::like(period);
            for point in series.values().flat_map(SeriesDescriptor::point_keys) {
                let value = ranges
                    .get(point)
                    .zip(period.value(point))
                    .and_then(|(range, value)| range.scale(value));
                out.set(point, value);
            }
            norm.insert(key.clone(), out);
        }
    }
}

/// `(current - base) / base`, or `None` when either side is missing or the base
/// is zero.
fn relative_change(current: Option<f64>, base: Option<f64>) -> Option<f64> {
    let base = base.filter(|b| *b != 0.0)?;
    current.map(|c| (c - base) / base)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::series::{MetricSeries, TsDate};

    fn regional() -> SeriesAggregator {
        let mut agg = SeriesAggregator::new();
        agg.set_transactions(
            vec![
                json!({"d": "2020-01-15", "region": "E", "value": 10}),
                json!({"d": "2020-01-20", "region": "E", "value": 5}),
                json!({"d": "2020-02-01", "region": "E", "value": 3}),
            ],
            vec!["region".into()],
            TransactionProps::new("d").with_value("value"),
        );
        agg
    }

    fn metric(dates: &[&str], data: &[f64], missing: &[f64]) -> EvalMetricsResult {
        let dates: Vec<TsDate> = dates.iter().map(|d| TsDate::from(*d)).collect();
        let mut ts = EvalMetricsResult::new();
        ts.insert("m1", "Usage", MetricSeries::new(dates, data.to_vec(), missing.to_vec()));
        ts
    }

    #[test]
    fn monthly_transaction_sums() {
        let mut agg = regional();
        let out = agg.recompute();
        assert_eq!(out.values.len(), 2);
        assert_eq!(out.values["2020-01-01"].value("E"), Some(15.0));
        assert_eq!(out.values["2020-02-01"].value("E"), Some(3.0));

        let series = &out.series["E"];
        assert_eq!(series.names()["region"], "E");
        assert_eq!(series.point(PointKind::Value), Some("E"));
        assert_eq!(series.point(PointKind::Price), None);
    }

    #[test]
    fn recompute_is_memoized() {
        let mut agg = regional();
        let first = agg.recompute().values.clone();
        let second = agg.recompute().values.clone();
        assert_eq!(first, second);
        assert!(agg.valid.objs && agg.valid.ts);
    }

    #[test]
    fn new_input_invalidates() {
        let mut agg = regional();
        agg.recompute();
        agg.relative(None);
        agg.normalized();

        agg.set_records(vec![json!({"d": "2021-03-03", "region": "W", "value": 1})]);
        assert!(!agg.valid.objs);
        assert_eq!(agg.valid.rel, None);
        assert!(!agg.valid.norm);

        let out = agg.recompute();
        assert_eq!(out.values.len(), 1);
        assert_eq!(out.values["2021-03-01"].value("W"), Some(1.0));
        assert!(!out.series.contains_key("E"));
    }

    #[test]
    fn ungrouped_uses_all_key() {
        let mut agg = SeriesAggregator::new();
        agg.set_transactions(
            vec![json!({"d": "2020-01-15", "value": 2}), json!({"d": "2020-01-02", "value": 4})],
            vec![],
            TransactionProps::new("d").with_value("value"),
        );
        let out = agg.recompute();
        assert_eq!(out.values["2020-01-01"].value(ALL_SERIES), Some(6.0));
        assert!(out.series[ALL_SERIES].names().is_empty());
    }

    #[test]
    fn composite_group_key_and_nested_fields() {
        let mut agg = SeriesAggregator::new();
        agg.set_transactions(
            vec![
                json!({"at": {"day": "2020-05-05"}, "site": {"region": "E", "code": 7}, "amount": 1}),
                json!({"at": {"day": "2020-05-06"}, "site": {"region": "E"}, "amount": 2}),
            ],
            vec!["site.region".into(), "site.code".into()],
            TransactionProps::new("at.day").with_value("amount"),
        );
        let out = agg.recompute();
        let may = &out.values["2020-05-01"];
        assert_eq!(may.value("E7"), Some(1.0));
        assert_eq!(may.value("E"), Some(2.0));
        assert_eq!(out.series["E"].names()["site.code"], "");
    }

    #[test]
    fn price_from_qty_and_spend() {
        let mut agg = SeriesAggregator::new();
        agg.set_transactions(
            vec![
                json!({"d": "2020-01-01", "q": 2, "s": 10}),
                json!({"d": "2020-01-09", "q": 3, "s": 5}),
                json!({"d": "2020-02-01", "q": 0, "s": 4}),
            ],
            vec![],
            TransactionProps::new("d").with_qty("q").with_spend("s"),
        );
        let out = agg.recompute();
        let jan = &out.values["2020-01-01"];
        assert_eq!(jan.value("ALLQ"), Some(5.0));
        assert_eq!(jan.value("ALLS"), Some(15.0));
        assert_eq!(jan.value("ALLP"), Some(3.0));
        assert_eq!(out.values["2020-02-01"].get("ALLP"), Some(None));
        assert_eq!(out.series[ALL_SERIES].point(PointKind::Price), Some("ALLP"));
        assert_eq!(out.series[ALL_SERIES].point(PointKind::Value), None);
    }

    #[test]
    fn incomplete_props_yield_nothing() {
        let mut agg = SeriesAggregator::new();
        agg.set_transactions(
            vec![json!({"d": "2020-01-01", "value": 1})],
            vec![],
            TransactionProps::new("d"),
        );
        assert!(agg.recompute().values.is_empty());

        agg.set_props(TransactionProps {
            value: Some("value".into()),
            ..Default::default()
        });
        assert!(agg.recompute().values.is_empty());
    }

    #[test]
    fn unreadable_dates_are_skipped() {
        let mut agg = SeriesAggregator::new();
        agg.set_transactions(
            vec![json!({"d": "not a date", "value": 1}), json!({"value": 1})],
            vec![],
            TransactionProps::new("d").with_value("value"),
        );
        assert!(agg.recompute().values.is_empty());
    }

    #[test]
    fn timeseries_missing_gives_null() {
        let mut agg = SeriesAggregator::new();
        agg.set_timeseries(metric(
            &["2020-01-01T00:00:00Z", "2020-01-02T06:00:00Z", "2020-01-03"],
            &[1.0, 2.0, 3.0],
            &[0.0, 50.0, 0.0],
        ));
        let out = agg.recompute();
        assert_eq!(out.values["2020-01-01"].get("m1|Usage"), Some(Some(1.0)));
        assert_eq!(out.values["2020-01-02"].get("m1|Usage"), Some(None));
        assert_eq!(out.values["2020-01-03"].get("m1|Usage"), Some(Some(3.0)));

        let series = &out.series["m1|Usage"];
        assert_eq!(series.names()["id"], "m1");
        assert_eq!(series.names()["metric"], "Usage");
    }

    #[test]
    fn timeseries_accepts_producers_and_materialized_dates() {
        let day = crate::series::parse_datetime("2020-03-04T10:00:00Z").unwrap();
        let mut ts = EvalMetricsResult::new();
        ts.insert(
            "m2",
            "Cost",
            MetricSeries {
                dates: crate::series::Sequence::from_fn(move || vec![TsDate::At(day)]),
                data: vec![9.0].into(),
                missing: crate::series::Sequence::from_fn(|| vec![0.0]),
            },
        );
        let mut agg = SeriesAggregator::new();
        agg.set_timeseries(ts);
        assert_eq!(agg.recompute().values["2020-03-04"].value("m2|Cost"), Some(9.0));
    }

    #[test]
    fn both_inputs_share_periods() {
        let mut agg = regional();
        agg.set_timeseries(metric(&["2020-01-01"], &[7.0], &[0.0]));
        let out = agg.recompute();
        let jan = &out.values["2020-01-01"];
        assert_eq!(jan.value("E"), Some(15.0));
        assert_eq!(jan.value("m1|Usage"), Some(7.0));
        assert_eq!(out.series.len(), 2);
    }

    #[test]
    fn relative_before_input_is_empty() {
        let mut agg = SeriesAggregator::new();
        let rel = agg.relative(None);
        assert!(rel.buckets.is_empty());
        assert!(rel.series.is_empty());
    }

    #[test]
    fn relative_to_first_seen() {
        let mut agg = regional();
        let rel = agg.relative(None);
        assert_eq!(rel.buckets["2020-01-01"].get("E"), Some(Some(0.0)));
        assert_eq!(rel.buckets["2020-02-01"].get("E"), Some(Some((3.0 - 15.0) / 15.0)));
    }

    #[test]
    fn relative_to_reference_period() {
        let mut agg = regional();
        let rel = agg.relative(Some("2020-02-01"));
        assert_eq!(rel.buckets["2020-01-01"].get("E"), Some(Some(4.0)));
        assert_eq!(rel.buckets["2020-02-01"].get("E"), Some(Some(0.0)));
        assert_eq!(agg.valid.rel, Some(Baseline::Period("2020-02-01".into())));

        let rel = agg.relative(Some("1999-01-01")).buckets.clone();
        assert_eq!(rel["2020-01-01"].get("E"), Some(Some(0.0)));
    }

    #[test]
    fn relative_writes_null_for_absent_points() {
        let mut agg = SeriesAggregator::new();
        agg.set_transactions(
            vec![
                json!({"d": "2020-01-01", "r": "A", "v": 1}),
                json!({"d": "2020-02-01", "r": "B", "v": 2}),
            ],
            vec!["r".into()],
            TransactionProps::new("d").with_value("v"),
        );
        let rel = agg.relative(None);
        assert_eq!(rel.buckets["2020-01-01"].get("B"), Some(None));
        assert_eq!(rel.buckets["2020-02-01"].get("A"), Some(None));
        assert_eq!(rel.buckets["2020-02-01"].get("B"), Some(Some(0.0)));
    }

    #[test]
    fn relative_zero_base_is_null() {
        let mut agg = SeriesAggregator::new();
        agg.set_timeseries(metric(&["2020-01-01", "2020-01-02"], &[0.0, 5.0], &[0.0, 0.0]));
        let rel = agg.relative(None);
        assert_eq!(rel.buckets["2020-01-01"].get("m1|Usage"), Some(None));
        assert_eq!(rel.buckets["2020-01-02"].get("m1|Usage"), Some(None));
    }

    #[test]
    fn normalized_scales_between_min_and_max() {
        let mut agg = SeriesAggregator::new();
        agg.set_timeseries(metric(
            &["2020-01-01", "2020-01-02", "2020-01-03", "2020-01-04"],
            &[2.0, 4.0, 6.0, 1.0],
            &[0.0, 0.0, 0.0, 1.0],
        ));
        let norm = agg.normalized();
        let point = "m1|Usage";
        assert_eq!(norm.ranges[point], Range { min: 2.0, max: 6.0 });
        assert_eq!(norm.buckets["2020-01-01"].get(point), Some(Some(0.0)));
        assert_eq!(norm.buckets["2020-01-02"].get(point), Some(Some(0.5)));
        assert_eq!(norm.buckets["2020-01-03"].get(point), Some(Some(1.0)));
        assert_eq!(norm.buckets["2020-01-04"].get(point), Some(None));
    }

    #[test]
    fn normalized_flat_series_is_null() {
        let mut agg = SeriesAggregator::new();
        agg.set_timeseries(metric(&["2020-01-01", "2020-01-02"], &[5.0, 5.0], &[0.0, 0.0]));
        let norm = agg.normalized();
        assert_eq!(norm.buckets["2020-01-01"].get("m1|Usage"), Some(None));
        assert_eq!(norm.buckets["2020-01-02"].get("m1|Usage"), Some(None));
    }

    #[test]
    fn derived_views_are_memoized() {
        let mut agg = regional();
        let first = agg.normalized().buckets.clone();
        assert!(agg.valid.norm);
        let second = agg.normalized().buckets.clone();
        assert_eq!(first, second);

        agg.set_timeseries(EvalMetricsResult::new());
        assert!(!agg.valid.norm);
        assert_eq!(agg.normalized().buckets.len(), 2);
    }
}
