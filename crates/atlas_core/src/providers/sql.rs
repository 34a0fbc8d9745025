//! `sql`: run a query and expose its single result column.
//!
//! ```toml
//! [data.sql.tenants]
//! url = "sqlite://app.db"
//! query = "SELECT name FROM tenants WHERE active = ?"
//! args = [true]
//! ```
//!
//! The block exposes `count`, `values` and, when at least one row came back,
//! `value`.

use async_trait::async_trait;
use atlas_db::driver;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::EvalContext;
use crate::error::ProviderError;
use crate::registry::DataSource;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryAttrs {
    pub url: String,
    pub query: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QueryData;

#[async_trait]
impl DataSource for QueryData {
    type Attrs = QueryAttrs;

    fn name(&self) -> &'static str {
        "sql"
    }

    async fn resolve(&self, attrs: QueryAttrs, _ctx: &mut EvalContext) -> Result<Value, ProviderError> {
        let mut db = driver::open(&attrs.url).await?;
        let queried = db.query(&attrs.query, &attrs.args).await;
        let closed = db.close().await;
        let rows = queried?;
        closed?;
        debug!(rows = rows.len(), "query data source fetched rows");

        if !rows.is_empty() && rows.columns.len() != 1 {
            return Err(ProviderError::ColumnCount(rows.columns.len()));
        }

        let values: Vec<Value> = rows
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect();
        let mut out = Map::new();
        out.insert("count".to_string(), Value::from(values.len()));
        if let Some(first) = values.first() {
            out.insert("value".to_string(), first.clone());
        }
        out.insert("values".to_string(), Value::Array(values));
        Ok(Value::Object(out))
    }
}
