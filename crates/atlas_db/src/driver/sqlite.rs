//! SQLite driver backed by sqlx.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column as _, Connection, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::{Driver, Rows};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::schema::{Column, Realm, Schema, Table};

/// Schema name SQLite reports for the primary database.
pub const MAIN_SCHEMA: &str = "main";

/// A single SQLite connection.
#[derive(Debug)]
pub struct SqliteDriver {
    conn: SqliteConnection,
}

impl SqliteDriver {
    /// Connect using a `sqlite://` or `sqlite3://` URL.
    ///
    /// The database file is created if missing, and foreign keys are enforced
    /// unless `_fk=0` is given.
    pub async fn connect(url: &str) -> DbResult<Self> {
        let options = connect_options(url)?;
        let conn = SqliteConnection::connect_with(&options).await?;
        Ok(Self { conn })
    }
}

fn connect_options(url: &str) -> DbResult<SqliteConnectOptions> {
    let rest = url
        .strip_prefix("sqlite3://")
        .or_else(|| url.strip_prefix("sqlite://"))
        .ok_or_else(|| DbError::invalid_url(url, "expected sqlite:// or sqlite3://"))?;
    let rest = rest.strip_prefix("file:").unwrap_or(rest);
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

    let mut foreign_keys = true;
    let mut params = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "mode" | "cache" | "immutable" | "vfs" => {
                params.append_pair(&key, &value);
            }
            "_fk" | "foreign_keys" => foreign_keys = !matches!(value.as_ref(), "0" | "false"),
            other => debug!(param = other, "ignoring sqlite connection parameter"),
        }
    }
    let params = params.finish();
    let normalized = if params.is_empty() {
        format!("sqlite://{path}")
    } else {
        format!("sqlite://{path}?{params}")
    };

    Ok(SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .foreign_keys(foreign_keys))
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn exec(&mut self, sql: &str) -> DbResult<u64> {
        let result = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => query.bind(i),
                    None => query.bind(n.as_f64()),
                },
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }
        let fetched = query.fetch_all(&mut self.conn).await?;

        let columns = fetched
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let mut rows = Vec::with_capacity(fetched.len());
        for row in &fetched {
            let values = (0..row.len())
                .map(|i| decode(row, i))
                .collect::<DbResult<Vec<_>>>()?;
            rows.push(values);
        }
        Ok(Rows { columns, rows })
    }

    async fn inspect_realm(&mut self) -> DbResult<Realm> {
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut self.conn)
        .await?;

        let mut schema = Schema::new(MAIN_SCHEMA);
        for (name,) in names {
            let columns: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
                r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
            )
            .bind(&name)
            .fetch_all(&mut self.conn)
            .await?;

            let mut table = Table::new(name);
            let mut key_parts = Vec::new();
            for (column, ty, not_null, default, pk) in columns {
                if pk > 0 {
                    key_parts.push((pk, column.clone()));
                }
                table.columns.push(Column {
                    name: column,
                    ty: ty.to_ascii_lowercase(),
                    nullable: not_null == 0,
                    default,
                });
            }
            key_parts.sort();
            table.primary_key = key_parts.into_iter().map(|(_, c)| c).collect();
            schema.tables.push(table);
        }
        Ok(Realm::single(schema))
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}

fn decode(row: &SqliteRow, index: usize) -> DbResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "INT8" => Value::from(row.try_get::<i64, _>(index)?),
        "BOOLEAN" => Value::from(row.try_get::<bool, _>(index)?),
        "REAL" | "FLOAT" | "DOUBLE" => Value::from(row.try_get::<f64, _>(index)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            Value::from(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::from(row.try_get::<String, _>(index)?),
    };
    Ok(value)
}
