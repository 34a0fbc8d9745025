//! Postgres driver backed by sqlx.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::types::Uuid;
use sqlx::{Column as _, Connection, Row, TypeInfo, ValueRef};

use super::{Driver, Rows};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::schema::{Column, Realm, Schema, Table};

/// A single Postgres connection.
#[derive(Debug)]
pub struct PostgresDriver {
    conn: PgConnection,
}

impl PostgresDriver {
    /// Connect using a `postgres://` or `postgresql://` URL.
    pub async fn connect(url: &str) -> DbResult<Self> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
                other => query.bind(other.clone()),
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
        let (schema_name,): (String,) = sqlx::query_as("SELECT current_schema()::text")
            .fetch_one(&mut self.conn)
            .await?;

        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
        )
        .bind(&schema_name)
        .fetch_all(&mut self.conn)
        .await?;

        let mut schema = Schema::new(schema_name.clone());
        for (name,) in names {
            let columns: Vec<(String, String, bool, Option<String>)> = sqlx::query_as(
                "SELECT column_name::text, data_type::text, is_nullable = 'YES', column_default::text \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            )
            .bind(&schema_name)
            .bind(&name)
            .fetch_all(&mut self.conn)
            .await?;

            let primary_key: Vec<(String,)> = sqlx::query_as(
                "SELECT kcu.column_name::text \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name \
                  AND tc.table_schema = kcu.table_schema \
                  AND tc.table_name = kcu.table_name \
                 WHERE tc.constraint_type = 'PRIMARY KEY' \
                   AND tc.table_schema = $1 AND tc.table_name = $2 \
                 ORDER BY kcu.ordinal_position",
            )
            .bind(&schema_name)
            .bind(&name)
            .fetch_all(&mut self.conn)
            .await?;

            let mut table = Table::new(name);
            table.columns = columns
                .into_iter()
                .map(|(name, ty, nullable, default)| Column {
                    name,
                    ty,
                    nullable,
                    default,
                })
                .collect();
            table.primary_key = primary_key.into_iter().map(|(c,)| c).collect();
            schema.tables.push(table);
        }
        Ok(Realm::single(schema))
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}

fn decode(row: &PgRow, index: usize) -> DbResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "BOOL" => Value::from(row.try_get::<bool, _>(index)?),
        "INT2" => Value::from(row.try_get::<i16, _>(index)?),
        "INT4" => Value::from(row.try_get::<i32, _>(index)?),
        "INT8" => Value::from(row.try_get::<i64, _>(index)?),
        "FLOAT4" => Value::from(f64::from(row.try_get::<f32, _>(index)?)),
        "FLOAT8" => Value::from(row.try_get::<f64, _>(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => {
            Value::from(row.try_get::<String, _>(index)?)
        }
        "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
        "UUID" => Value::from(row.try_get::<Uuid, _>(index)?.to_string()),
        "TIMESTAMPTZ" => Value::from(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339()),
        "TIMESTAMP" => Value::from(row.try_get::<NaiveDateTime, _>(index)?.to_string()),
        "DATE" => Value::from(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "BYTEA" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            Value::from(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => {
            return Err(DbError::UnsupportedType {
                column: row.column(index).name().to_string(),
                type_name,
            });
        }
    };
    Ok(value)
}
