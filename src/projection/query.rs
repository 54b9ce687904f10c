use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{compile_projection, ProjectionSpec};
use crate::{plan::QueryPlan, series::parse_datetime, BackendError, Error};

/// Row limit used when the caller gives none.
pub const DEFAULT_LIMIT: u32 = 2000;

/// Evaluate request handed to the query engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub projection: String,
    pub filter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub limit: u32,
    pub force_db_engine_eval: bool,
}

/// Assemble the evaluate request for a compiled projection. A missing or zero
/// limit falls back to [DEFAULT_LIMIT].
pub fn build_query_spec(
    projection: &ProjectionSpec,
    filter: Option<&str>,
    limit: Option<u32>,
) -> QuerySpec {
    QuerySpec {
        projection: projection.projection(),
        filter: filter.unwrap_or_default().to_owned(),
        group: projection.group(),
        limit: limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT),
        force_db_engine_eval: true,
    }
}

/// Tabular answer of the query engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TupleResult {
    #[serde(default)]
    pub tuples: Vec<Tuple>,

    /// Plans the engine used to answer. Only single-plan answers are accepted.
    #[serde(default)]
    pub query_plans: Vec<QueryPlan>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Tuple {
    #[serde(default)]
    pub cells: Vec<TaggedCell>,
}

/// A cell of the tabular answer. At most one variant is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaggedCell {
    pub str: Option<String>,
    pub number: Option<f64>,
    pub bool: Option<bool>,
    pub date: Option<String>,
    pub obj: Option<ObjRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ObjRef {
    pub id: Option<String>,
}

impl TaggedCell {
    /// Pick the populated variant, in order: string, number, boolean, date, object
    /// reference.
    pub fn scalar(&self) -> Scalar {
        if let Some(s) = &self.str {
            Scalar::Str(s.clone())
        } else if let Some(n) = self.number {
            Scalar::Number(n)
        } else if let Some(b) = self.bool {
            Scalar::Bool(b)
        } else if let Some(d) = &self.date {
            match parse_datetime(d) {
                Some(date) => Scalar::Date(date),
                None => {
                    warn!("Unreadable date cell `{d}`, using null");
                    Scalar::Null
                }
            }
        } else if let Some(obj) = &self.obj {
            Scalar::Ref(obj.id.clone().unwrap_or_default())
        } else {
            Scalar::Null
        }
    }
}

/// Typed value of one reshaped column.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Scalar {
    #[default]
    Null,
    Str(String),
    Number(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    /// Identifier of a referenced object.
    Ref(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Str(s) | Scalar::Ref(s) => serializer.serialize_str(s),
            Scalar::Number(n) => serializer.serialize_f64(*n),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Date(d) => {
                serializer.serialize_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl From<Scalar> for serde_json::Value {
    fn from(scalar: Scalar) -> Self {
        use serde_json::Value;

        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Str(s) | Scalar::Ref(s) => Value::String(s),
            Scalar::Number(n) => Value::from(n),
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// One reshaped row, keyed by output name.
pub type Record = BTreeMap<String, Scalar>;

/// Turn the engine's tuples into records. Cells are matched to names by position;
/// names without a cell map to [Scalar::Null].
pub fn reshape_result<S: AsRef<str>>(raw: &TupleResult, output_names: &[S]) -> Vec<Record> {
    raw.tuples
        .iter()
        .map(|tuple| {
            output_names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = tuple.cells.get(i).map(TaggedCell::scalar).unwrap_or_default();
                    (name.as_ref().to_owned(), value)
                })
                .collect()
        })
        .collect()
}

/// The external query engine.
pub trait QueryExecutor {
    fn evaluate(&self, spec: &QuerySpec) -> Result<TupleResult, BackendError>;
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for &T {
    fn evaluate(&self, spec: &QuerySpec) -> Result<TupleResult, BackendError> {
        (**self).evaluate(spec)
    }
}

/// Compile `select`, run it through `executor` and reshape the answer into records.
pub fn query_data<E: QueryExecutor>(
    executor: E,
    select: &str,
    filter: Option<&str>,
    limit: Option<u32>,
) -> Result<Vec<Record>, Error> {
    let projection = compile_projection(select)?;
    let spec = build_query_spec(&projection, filter, limit);
    debug!("Evaluating {spec:?}");

    let result = executor.evaluate(&spec).map_err(Error::Backend)?;
    if result.query_plans.len() > 1 {
        return Err(Error::UnsupportedMultiPlanQuery {
            plans: result.query_plans.len(),
        });
    }

    let records = reshape_result(&result, &projection.output_names());
    debug!("Reshaped {} row(s)", records.len());
    Ok(records)
}
