//! Database drivers.
//!
//! A [`Driver`] owns exactly one connection. Everything that needs a scoped
//! database resource (a query block, a state load, a migration diff) opens a
//! driver with [`open`], uses it, and closes it again. Dropping a driver also
//! releases the connection, so error paths never leak one.

mod postgres;
mod sqlite;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::schema::Realm;

pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

/// Rows buffered from a query, with values converted to JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A single database connection.
#[async_trait]
pub trait Driver: Send + fmt::Debug {
    /// The SQL dialect this connection speaks.
    fn dialect(&self) -> Dialect;

    /// Execute one or more statements, returning the number of affected rows.
    async fn exec(&mut self, sql: &str) -> DbResult<u64>;

    /// Execute a query with positional arguments and buffer every row.
    async fn query(&mut self, sql: &str, args: &[serde_json::Value]) -> DbResult<Rows>;

    /// Introspect the connected database.
    async fn inspect_realm(&mut self) -> DbResult<Realm>;

    /// Close the connection gracefully.
    async fn close(self: Box<Self>) -> DbResult<()>;

    async fn begin(&mut self) -> DbResult<()> {
        self.exec("BEGIN").await.map(|_| ())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.exec("ROLLBACK").await.map(|_| ())
    }
}

/// Open a driver for a connection URL.
///
/// Supported schemes: `sqlite`, `sqlite3`, `postgres`, `postgresql`.
pub async fn open(url: &str) -> DbResult<Box<dyn Driver>> {
    let scheme = url_scheme(url).ok_or_else(|| DbError::invalid_url(url, "missing scheme"))?;
    // The URL itself may carry credentials; only the scheme is logged.
    debug!(scheme, "opening database connection");
    match scheme {
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteDriver::connect(url).await?)),
        "postgres" | "postgresql" => Ok(Box::new(PostgresDriver::connect(url).await?)),
        other => Err(DbError::UnknownDriver {
            scheme: other.to_string(),
        }),
    }
}

fn url_scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once(':')?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}
