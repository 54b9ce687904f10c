use log::debug;
use serde::Deserialize;

use crate::{
    projection::{
        build_query_spec, compile_projection, query_data, ProjectionSpec, QueryExecutor,
        QuerySpec, Record,
    },
    series::TransactionProps,
    Error,
};

/// How records are bucketed into series.
///
/// ```yaml
/// dateField: createdAt
/// value: amount
/// group: [region, product.name]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SeriesConfig {
    #[serde(default)]
    pub group: Vec<String>,

    #[serde(flatten)]
    pub props: TransactionProps,
}

impl SeriesConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yml::from_str(yaml)?;
        debug!("Loaded series config grouped by {:?}", config.group);
        Ok(config)
    }
}

/// A stored query: select text, optional filter and row limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueryConfig {
    pub select: String,

    #[serde(default)]
    pub filter: Option<String>,

    #[serde(default)]
    pub limit: Option<u32>,
}

impl QueryConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yml::from_str(yaml)?)
    }

    pub fn compile(&self) -> Result<ProjectionSpec, Error> {
        Ok(compile_projection(&self.select)?)
    }

    pub fn query_spec(&self) -> Result<QuerySpec, Error> {
        let projection = self.compile()?;
        Ok(build_query_spec(&projection, self.filter.as_deref(), self.limit))
    }

    /// Run the query against `executor`.
    pub fn run<E: QueryExecutor>(&self, executor: E) -> Result<Vec<Record>, Error> {
        query_data(executor, &self.select, self.filter.as_deref(), self.limit)
    }
}
