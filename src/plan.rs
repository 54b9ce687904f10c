//! Query plan inspection. A fetch or evaluate spec is prepared so the engine only
//! plans it without reading any rows, then the database plan is annotated with
//! the columns of every index it uses.

use std::collections::BTreeMap;

use lazy_regex::{
    regex,
    regex::{NoExpand, RegexBuilder},
};
use log::{debug, trace, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::{BackendError, Error};

/// Predicate that makes a statement return no rows.
const SHORT_CIRCUIT: &str = "1==0";

/// A statement the engine prepared for a fetch or evaluate.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub sql: String,
    #[serde(default)]
    pub bind_vars: Vec<BindVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BindVar {
    #[serde(default)]
    pub value: Value,
}

/// Index defined on the inspected type's table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableIndex {
    pub index_name: String,
    pub index_cols: String,
}

/// Fetch or evaluate spec to inspect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectSpec {
    pub projection: Option<String>,
    pub filter: Option<String>,
    pub include: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Fetch,
    Evaluate,
}

/// Spec ready to be planned, never executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedExplain {
    pub kind: StatementKind,
    pub spec: InspectSpec,
}

/// Collaborator that plans and explains statements for one persisted type.
pub trait PlanBackend {
    /// Plans the engine would use for `spec`.
    fn query_plans(
        &self,
        kind: StatementKind,
        spec: &InspectSpec,
    ) -> Result<Vec<QueryPlan>, BackendError>;

    /// Database execution plan of a SQL statement, as text.
    fn explain_statement(&self, sql: &str, binds: &[Value]) -> Result<String, BackendError>;

    /// Indexes of the type's root table.
    fn table_indexes(&self) -> Result<Vec<TableIndex>, BackendError>;
}

/// Result of [explain].
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub plan: String,
    pub sql: String,
    pub bind_vars: Vec<Value>,
}

/// Turn `spec` into a plan-only request. `None` when there is nothing to plan.
pub fn prepare_explain(spec: &InspectSpec) -> Option<PreparedExplain> {
    let set = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.is_empty());
    if !set(&spec.filter) && !set(&spec.include) && !set(&spec.projection) {
        return None;
    }

    let kind = match spec.projection.as_deref() {
        Some(p) if p.len() > 1 => StatementKind::Evaluate,
        _ => StatementKind::Fetch,
    };

    let filter = match spec.filter.as_deref() {
        Some(f) if f.len() > 1 => format!("{f}&&{SHORT_CIRCUIT}"),
        _ => SHORT_CIRCUIT.to_owned(),
    };

    Some(PreparedExplain {
        kind,
        spec: InspectSpec {
            filter: Some(filter),
            ..spec.clone()
        },
    })
}

/// Accept exactly one plan.
pub fn single_plan(plans: Vec<QueryPlan>) -> Result<QueryPlan, Error> {
    let count = plans.len();
    let mut plans = plans.into_iter();
    match (plans.next(), count) {
        (Some(plan), 1) => Ok(plan),
        (None, _) => Err(Error::MissingQueryPlan),
        _ => Err(Error::UnsupportedMultiPlanQuery { plans: count }),
    }
}

/// Remove the first short-circuit fragment the engine rendered into the SQL.
pub fn strip_short_circuit(sql: &str) -> String {
    regex!(r"1=0 AND | AND 1=0|\(1=0\) AND")
        .replace(sql, "")
        .into_owned()
}

/// Names of indexes the database plan reports using, upper-cased.
pub fn used_indexes(db_plan: &str) -> Vec<String> {
    let mut used: Vec<String> = regex!(r" using (\w+) on ")
        .captures_iter(db_plan)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
        .collect();
    used.sort();
    used.dedup();
    used
}

/// Follow every mention of a used index with its column list, `NAME <cols>`.
pub fn annotate_indexes(db_plan: &str, used: &[String], indexes: &[TableIndex]) -> String {
    let columns: BTreeMap<&str, &str> = indexes
        .iter()
        .filter(|index| used.contains(&index.index_name))
        .map(|index| (index.index_name.as_str(), index.index_cols.as_str()))
        .collect();

    columns
        .iter()
        .fold(db_plan.to_owned(), |plan, (name, cols)| {
            let pattern = RegexBuilder::new(&regex::escape(name))
                .case_insensitive(true)
                .build();
            match pattern {
                Ok(pattern) => {
                    trace!("Annotating index {name} with <{cols}>");
                    let annotated = format!("{name} <{cols}>");
                    pattern.replace_all(&plan, NoExpand(&annotated)).into_owned()
                }
                Err(e) => {
                    warn!("Cannot match index {name} in the plan: {e}");
                    plan
                }
            }
        })
}

/// Plan `spec` without running it and describe how the database would execute it.
///
/// Specs that need more than one statement are rejected with
/// [Error::UnsupportedMultiPlanQuery]. An empty spec yields `None`.
pub fn explain<B: PlanBackend>(
    backend: &B,
    spec: &InspectSpec,
) -> Result<Option<Explanation>, Error> {
    let Some(prepared) = prepare_explain(spec) else {
        return Ok(None);
    };
    debug!("Planning {:?} with filter {:?}", prepared.kind, prepared.spec.filter);

    let plans = backend
        .query_plans(prepared.kind, &prepared.spec)
        .map_err(Error::Backend)?;
    let plan = single_plan(plans)?;

    let bind_vars: Vec<Value> = plan.bind_vars.into_iter().map(|b| b.value).collect();
    let sql = strip_short_circuit(&plan.sql);
    let mut db_plan = backend
        .explain_statement(&sql, &bind_vars)
        .map_err(Error::Backend)?;

    let used = used_indexes(&db_plan);
    if !used.is_empty() {
        debug!("Plan uses index(es): {}", used.join(", "));
        let indexes = backend.table_indexes().map_err(Error::Backend)?;
        db_plan = annotate_indexes(&db_plan, &used, &indexes);
    }

    Ok(Some(Explanation {
        plan: db_plan,
        sql,
        bind_vars,
    }))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;

    struct MockBackend {
        plans: Vec<QueryPlan>,
        db_plan: String,
        asked: RefCell<Vec<(StatementKind, InspectSpec)>>,
        explained: RefCell<Vec<String>>,
    }

    impl MockBackend {
        fn new(plans: Vec<QueryPlan>, db_plan: &str) -> Self {
            Self {
                plans,
                db_plan: db_plan.to_owned(),
                asked: RefCell::default(),
                explained: RefCell::default(),
            }
        }
    }

    impl PlanBackend for MockBackend {
        fn query_plans(
            &self,
            kind: StatementKind,
            spec: &InspectSpec,
        ) -> Result<Vec<QueryPlan>, BackendError> {
            self.asked.borrow_mut().push((kind, spec.clone()));
            Ok(self.plans.clone())
        }

        fn explain_statement(&self, sql: &str, _: &[Value]) -> Result<String, BackendError> {
            self.explained.borrow_mut().push(sql.to_owned());
            Ok(self.db_plan.clone())
        }

        fn table_indexes(&self) -> Result<Vec<TableIndex>, BackendError> {
            Ok(vec![
                TableIndex {
                    index_name: "IDX_CURRENCY_ID".into(),
                    index_cols: "ID".into(),
                },
                TableIndex {
                    index_name: "IDX_UNUSED".into(),
                    index_cols: "X".into(),
                },
            ])
        }
    }

    fn spec(projection: Option<&str>, filter: Option<&str>) -> InspectSpec {
        InspectSpec {
            projection: projection.map(Into::into),
            filter: filter.map(Into::into),
            include: None,
        }
    }

    #[test]
    fn prepare_picks_kind_and_short_circuits() {
        assert_eq!(prepare_explain(&InspectSpec::default()), None);

        let prepared = prepare_explain(&spec(Some("name"), None)).unwrap();
        assert_eq!(prepared.kind, StatementKind::Evaluate);
        assert_eq!(prepared.spec.filter.as_deref(), Some("1==0"));

        let prepared = prepare_explain(&spec(None, Some(r#"startsWith(id,"A")"#))).unwrap();
        assert_eq!(prepared.kind, StatementKind::Fetch);
        assert_eq!(
            prepared.spec.filter.as_deref(),
            Some(r#"startsWith(id,"A")&&1==0"#)
        );
    }

    #[test]
    fn strips_first_short_circuit() {
        assert_eq!(
            strip_short_circuit("SELECT * FROM T WHERE 1=0 AND ID LIKE :1"),
            "SELECT * FROM T WHERE ID LIKE :1"
        );
        assert_eq!(
            strip_short_circuit("SELECT * FROM T WHERE X=1 AND 1=0"),
            "SELECT * FROM T WHERE X=1"
        );
        assert_eq!(strip_short_circuit("WHERE (1=0) AND X=1"), "WHERE  X=1");
    }

    #[test]
    fn finds_used_indexes() {
        let plan = "Index Scan using idx_currency_id on currency  (cost=0.1)\n \
                    -> Seq Scan using pk_t on t";
        assert_eq!(used_indexes(plan), ["IDX_CURRENCY_ID", "PK_T"]);
        assert!(used_indexes("Seq Scan on t").is_empty());
    }

    #[test]
    fn annotation_is_case_insensitive() {
        let indexes = [TableIndex {
            index_name: "IDX_A".into(),
            index_cols: "A, B".into(),
        }];
        let out = annotate_indexes(
            "Index Scan using idx_a on t; IDX_A again",
            &["IDX_A".to_owned()],
            &indexes,
        );
        assert_eq!(out, "Index Scan using IDX_A <A, B> on t; IDX_A <A, B> again");
    }

    #[test]
    fn annotation_matches_names_literally() {
        let indexes = [TableIndex {
            index_name: "IDX$1.X".into(),
            index_cols: "$1".into(),
        }];
        let out = annotate_indexes(
            "using idx$1.x on t; IDX$1-X",
            &["IDX$1.X".to_owned()],
            &indexes,
        );
        assert_eq!(out, "using IDX$1.X <$1> on t; IDX$1-X");
    }

    #[test]
    fn explain_annotates_plan() {
        let backend = MockBackend::new(
            vec![QueryPlan {
                sql: "SELECT ID FROM CURRENCY WHERE 1=0 AND ID LIKE :1".into(),
                bind_vars: vec![BindVar { value: json!("A%") }],
            }],
            "Index Scan using idx_currency_id on currency",
        );

        let out = explain(&backend, &spec(None, Some(r#"startsWith(id,"A")"#)))
            .unwrap()
            .unwrap();
        assert_eq!(out.sql, "SELECT ID FROM CURRENCY WHERE ID LIKE :1");
        assert_eq!(out.bind_vars, [json!("A%")]);
        assert_eq!(out.plan, "Index Scan using IDX_CURRENCY_ID <ID> on currency");
        assert_eq!(backend.explained.borrow()[0], out.sql);
        assert_eq!(backend.asked.borrow()[0].0, StatementKind::Fetch);
    }

    #[test]
    fn explain_rejects_multi_plan() {
        let plan = QueryPlan {
            sql: "SELECT 1".into(),
            bind_vars: vec![],
        };
        let backend = MockBackend::new(vec![plan.clone(), plan], "");
        let err = explain(&backend, &spec(Some("name"), None)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMultiPlanQuery { plans: 2 }));
        assert!(backend.explained.borrow().is_empty());
    }

    #[test]
    fn explain_without_plan() {
        let backend = MockBackend::new(vec![], "");
        let err = explain(&backend, &spec(Some("name"), None)).unwrap_err();
        assert!(matches!(err, Error::MissingQueryPlan));
    }

    #[test]
    fn explain_of_empty_spec() {
        let backend = MockBackend::new(vec![], "");
        assert_eq!(explain(&backend, &InspectSpec::default()).unwrap(), None);
    }

    #[test]
    fn plan_deserializes() {
        let plan: QueryPlan =
            serde_json::from_str(r#"{"sql": "SELECT 1", "bindVars": [{"value": 3}]}"#).unwrap();
        assert_eq!(plan.bind_vars[0].value, json!(3));
    }
}
