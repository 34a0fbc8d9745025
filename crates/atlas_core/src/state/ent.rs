//! `ent://` schema source: a directory of TOML entity definitions.
//!
//! ```toml
//! # schema/user.toml
//! name = "User"
//!
//! [[fields]]
//! name = "name"
//! type = "string"
//!
//! [[fields]]
//! name = "nickname"
//! type = "string"
//! optional = true
//! ```
//!
//! Entities without a primary field get an `id` primary key.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use atlas_db::migrate::write_plan;
use atlas_db::{
    Column, Dialect, Driver, File, Plan, Realm, Schema, Table, diff_realms, plan_changes,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{DiffOptions, Differ, LoadOptions, StateLoader};
use crate::error::{CoreError, Result};

pub(super) const SCHEME: &str = "ent";

/// Query parameter that enables diffing of ent schemas.
pub const GLOBAL_ID: &str = "globalid";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Entity {
    name: String,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Field {
    name: String,
    #[serde(rename = "type")]
    ty: FieldType,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FieldType {
    String,
    Text,
    Int,
    Int64,
    Bool,
    Float,
    Time,
    Bytes,
    Json,
}

impl FieldType {
    fn column_type(self, dialect: Dialect) -> &'static str {
        match (dialect, self) {
            (Dialect::Sqlite, FieldType::String | FieldType::Text) => "text",
            (Dialect::Sqlite, FieldType::Int | FieldType::Int64) => "integer",
            (Dialect::Sqlite, FieldType::Bool) => "bool",
            (Dialect::Sqlite, FieldType::Float) => "real",
            (Dialect::Sqlite, FieldType::Time) => "datetime",
            (Dialect::Sqlite, FieldType::Bytes) => "blob",
            (Dialect::Sqlite, FieldType::Json) => "json",
            (Dialect::Postgres, FieldType::String) => "character varying",
            (Dialect::Postgres, FieldType::Text) => "text",
            (Dialect::Postgres, FieldType::Int | FieldType::Int64) => "bigint",
            (Dialect::Postgres, FieldType::Bool) => "boolean",
            (Dialect::Postgres, FieldType::Float) => "double precision",
            (Dialect::Postgres, FieldType::Time) => "timestamp with time zone",
            (Dialect::Postgres, FieldType::Bytes) => "bytea",
            (Dialect::Postgres, FieldType::Json) => "jsonb",
        }
    }
}

impl Entity {
    fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| format!("{}s", snake_case(&self.name)))
    }

    fn table(&self, dialect: Dialect) -> Result<Table> {
        let mut table = Table::new(self.table_name());
        if !self.fields.iter().any(|f| f.primary) {
            table
                .columns
                .push(Column::new("id", FieldType::Int64.column_type(dialect)));
            table.primary_key.push("id".to_string());
        }
        for field in &self.fields {
            let mut column = Column::new(&field.name, field.ty.column_type(dialect))
                .nullable(field.optional && !field.primary);
            if let Some(default) = &field.default {
                let literal = dialect.literal(default).ok_or_else(|| CoreError::SchemaSource {
                    path: self.name.clone(),
                    message: format!("field {:?} has a non-scalar default", field.name),
                })?;
                column = column.default_expr(literal);
            }
            if field.primary {
                table.primary_key.push(field.name.clone());
            }
            table.columns.push(column);
        }
        Ok(table)
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Directory named by an `ent://` URL. Host and path are joined so both
/// `ent://schema` and `ent:///abs/schema` work.
fn schema_dir(url: &Url) -> PathBuf {
    let mut path = url.host_str().unwrap_or_default().to_string();
    path.push_str(url.path());
    PathBuf::from(path)
}

fn read_entities(dir: &Path) -> Result<Vec<Entity>> {
    let source_error = |message: String| CoreError::SchemaSource {
        path: dir.display().to_string(),
        message,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| source_error(e.to_string()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "toml") && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut entities = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let entity: Entity = toml::from_str(&text)
            .map_err(|e| source_error(format!("{}: {e}", path.display())))?;
        entities.push(entity);
    }
    Ok(entities)
}

/// Loader and differ for `ent://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntSource;

impl EntSource {
    /// The desired realm, before it is applied to a database.
    fn desired(&self, urls: &[Url], dialect: Dialect) -> Result<Realm> {
        let mut schema = Schema::new("main");
        for url in urls {
            for entity in read_entities(&schema_dir(url))? {
                schema.tables.push(entity.table(dialect)?);
            }
        }
        Ok(Realm::single(schema))
    }
}

async fn apply(dev: &mut dyn Driver, plan: &Plan) -> Result<Realm> {
    for change in &plan.changes {
        dev.exec(&change.cmd).await?;
    }
    Ok(dev.inspect_realm().await?)
}

async fn replay(dev: &mut dyn Driver, files: &[File]) -> Result<Realm> {
    for file in files {
        let sql = std::str::from_utf8(file.bytes()).map_err(|e| CoreError::SchemaSource {
            path: file.name().to_string(),
            message: e.to_string(),
        })?;
        dev.exec(sql).await?;
    }
    Ok(dev.inspect_realm().await?)
}

#[async_trait]
impl StateLoader for EntSource {
    async fn load_state(&self, opts: LoadOptions<'_>) -> Result<Realm> {
        let dialect = opts.dev.dialect();
        let desired = self.desired(opts.urls, dialect)?;
        let plan = plan_changes(dialect, "load", &diff_realms(&Realm::default(), &desired), "")?;
        debug!(statements = plan.changes.len(), "applying ent schema to dev database");

        opts.dev.begin().await?;
        let loaded = apply(&mut *opts.dev, &plan).await;
        opts.dev.rollback().await?;
        loaded
    }
}

#[async_trait]
impl Differ for EntSource {
    async fn migrate_diff(&self, opts: DiffOptions<'_>) -> Result<Vec<String>> {
        let DiffOptions {
            name,
            indent,
            dev,
            dir,
            to,
        } = opts;

        let files = dir.files()?;
        dev.begin().await?;
        let current = replay(&mut *dev, &files).await;
        dev.rollback().await?;
        let current = current?;

        let desired = self
            .load_state(LoadOptions {
                dev: &mut *dev,
                urls: to,
            })
            .await?;

        let diff = diff_realms(&current, &desired);
        if diff.is_empty() {
            info!("migration directory is in sync with the ent schema");
            return Ok(Vec::new());
        }
        let plan = plan_changes(dev.dialect(), name, &diff, indent)?;
        Ok(write_plan(dir, &plan)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_names_default_to_snake_plural() {
        assert_eq!(snake_case("GroupMember"), "group_member");
        let entity: Entity = toml::from_str("name = \"GroupMember\"").unwrap();
        assert_eq!(entity.table_name(), "group_members");
    }

    #[test]
    fn implicit_primary_key() {
        let entity: Entity = toml::from_str(
            r#"
name = "User"

[[fields]]
name = "nickname"
type = "string"
optional = true
default = "anon"
"#,
        )
        .unwrap();
        let table = entity.table(Dialect::Postgres).unwrap();
        assert_eq!(table.primary_key, vec!["id"]);
        assert_eq!(
            table.columns,
            vec![
                Column::new("id", "bigint"),
                Column::new("nickname", "character varying")
                    .nullable(true)
                    .default_expr("'anon'"),
            ]
        );
    }

    #[test]
    fn url_paths_join_host_and_path() {
        assert_eq!(
            schema_dir(&Url::parse("ent://schema?globalid=1").unwrap()),
            PathBuf::from("schema")
        );
        assert_eq!(
            schema_dir(&Url::parse("ent:///abs/schema").unwrap()),
            PathBuf::from("/abs/schema")
        );
    }
}
