//! SQL dialect differences: identifier quoting and literal rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The SQL dialect spoken by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    /// Quote an identifier.
    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::Sqlite => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Render a string literal.
    pub fn string_literal(self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Render a JSON scalar as a SQL literal for use in `DEFAULT` clauses.
    ///
    /// Returns `None` for arrays and objects.
    pub fn literal(self, value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::Null => Some("NULL".to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) => Some(self.string_literal(s)),
            _ => None,
        }
    }

    /// Whether `ALTER TABLE ... ALTER COLUMN` is available.
    pub fn can_alter_columns(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
