//! Render a [`SchemaDiff`] into executable SQL.
//!
//! A [`Plan`] is an ordered list of statements, each paired with the
//! statement that undoes it. Directory formats decide how a plan becomes
//! files; see [`crate::migrate`].

use crate::dialect::Dialect;
use crate::diff::{Change, SchemaDiff};
use crate::error::{DbError, DbResult};
use crate::schema::{Column, Table};

/// A named, ordered set of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub name: String,
    pub changes: Vec<PlannedChange>,
}

/// One statement of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    /// Human readable description, written as a SQL comment.
    pub comment: String,
    /// The statement, without a trailing semicolon.
    pub cmd: String,
    /// The statement that undoes `cmd`.
    pub reverse: String,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Plan a diff for the given dialect.
///
/// `indent` is inserted before each column of a `CREATE TABLE` statement,
/// which is then spread over multiple lines. An empty indent keeps every
/// statement on one line.
pub fn plan_changes(dialect: Dialect, name: &str, diff: &SchemaDiff, indent: &str) -> DbResult<Plan> {
    let renderer = Renderer { dialect, indent };
    let mut changes = Vec::with_capacity(diff.change_count());
    for table_diff in &diff.table_diffs {
        for change in &table_diff.changes {
            changes.push(PlannedChange {
                comment: renderer.comment(&table_diff.table, change),
                cmd: renderer.render(&table_diff.table, change)?,
                reverse: renderer.render(&table_diff.table, &change.reverse())?,
            });
        }
    }
    Ok(Plan {
        name: name.to_string(),
        changes,
    })
}

struct Renderer<'a> {
    dialect: Dialect,
    indent: &'a str,
}

impl Renderer<'_> {
    fn comment(&self, table: &str, change: &Change) -> String {
        match change {
            Change::AddTable(_) => format!("create {table:?} table"),
            Change::DropTable(_) => format!("drop {table:?} table"),
            Change::AddColumn(c) => format!("add column {:?} to table: {table:?}", c.name),
            Change::DropColumn(c) => format!("drop column {:?} from table: {table:?}", c.name),
            Change::ModifyColumn { to, .. } => {
                format!("modify column {:?} of table: {table:?}", to.name)
            }
        }
    }

    fn render(&self, table: &str, change: &Change) -> DbResult<String> {
        let q = |ident: &str| self.dialect.quote(ident);
        let sql = match change {
            Change::AddTable(t) => self.create_table(t),
            Change::DropTable(t) => format!("DROP TABLE {}", q(&t.name)),
            Change::AddColumn(c) => {
                format!("ALTER TABLE {} ADD COLUMN {}", q(table), self.column(c))
            }
            Change::DropColumn(c) => {
                format!("ALTER TABLE {} DROP COLUMN {}", q(table), q(&c.name))
            }
            Change::ModifyColumn { from, to } => {
                if !self.dialect.can_alter_columns() {
                    return Err(DbError::UnsupportedChange {
                        dialect: self.dialect.name(),
                        change: format!("modifying column {:?} of table {table:?}", to.name),
                    });
                }
                let mut actions = Vec::new();
                if !from.same_type(to) {
                    actions.push(format!("ALTER COLUMN {} TYPE {}", q(&to.name), to.ty));
                }
                if from.nullable != to.nullable {
                    let action = if to.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
                    actions.push(format!("ALTER COLUMN {} {action}", q(&to.name)));
                }
                format!("ALTER TABLE {} {}", q(table), actions.join(", "))
            }
        };
        Ok(sql)
    }

    fn create_table(&self, table: &Table) -> String {
        let mut parts: Vec<String> = table.columns.iter().map(|c| self.column(c)).collect();
        if !table.primary_key.is_empty() {
            let key: Vec<String> = table
                .primary_key
                .iter()
                .map(|c| self.dialect.quote(c))
                .collect();
            parts.push(format!("PRIMARY KEY ({})", key.join(", ")));
        }
        let name = self.dialect.quote(&table.name);
        if self.indent.is_empty() {
            format!("CREATE TABLE {name} ({})", parts.join(", "))
        } else {
            let body: Vec<String> = parts
                .iter()
                .map(|p| format!("{}{p}", self.indent))
                .collect();
            format!("CREATE TABLE {name} (\n{}\n)", body.join(",\n"))
        }
    }

    fn column(&self, column: &Column) -> String {
        let mut def = format!("{} {}", self.dialect.quote(&column.name), column.ty);
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::TableDiff;
    use pretty_assertions::assert_eq;

    fn revisions() -> Table {
        Table {
            name: "atlas_schema_revisions".into(),
            columns: vec![
                Column::new("version", "text"),
                Column::new("applied", "integer").default_expr("0"),
                Column::new("description", "text").nullable(true),
            ],
            primary_key: vec!["version".into()],
        }
    }

    fn single(change: Change) -> SchemaDiff {
        SchemaDiff {
            table_diffs: vec![TableDiff {
                table: "atlas_schema_revisions".into(),
                changes: vec![change],
            }],
        }
    }

    #[test]
    fn create_table_single_line() {
        let plan = plan_changes(Dialect::Sqlite, "init", &single(Change::AddTable(revisions())), "")
            .unwrap();
        assert_eq!(
            plan.changes[0].cmd,
            "CREATE TABLE `atlas_schema_revisions` (`version` text NOT NULL, `applied` integer NOT NULL DEFAULT 0, `description` text, PRIMARY KEY (`version`))"
        );
        assert_eq!(plan.changes[0].reverse, "DROP TABLE `atlas_schema_revisions`");
        assert_eq!(plan.changes[0].comment, "create \"atlas_schema_revisions\" table");
    }

    #[test]
    fn create_table_indented() {
        let plan = plan_changes(
            Dialect::Postgres,
            "init",
            &single(Change::AddTable(revisions())),
            "  ",
        )
        .unwrap();
        assert_eq!(
            plan.changes[0].cmd,
            "CREATE TABLE \"atlas_schema_revisions\" (\n  \"version\" text NOT NULL,\n  \"applied\" integer NOT NULL DEFAULT 0,\n  \"description\" text,\n  PRIMARY KEY (\"version\")\n)"
        );
    }

    #[test]
    fn modify_column_needs_alter_support() {
        let change = Change::ModifyColumn {
            from: Column::new("applied", "integer"),
            to: Column::new("applied", "bigint").nullable(true),
        };
        let err = plan_changes(Dialect::Sqlite, "m", &single(change.clone()), "").unwrap_err();
        assert!(matches!(err, DbError::UnsupportedChange { dialect: "sqlite", .. }));

        let plan = plan_changes(Dialect::Postgres, "m", &single(change), "").unwrap();
        assert_eq!(
            plan.changes[0].cmd,
            "ALTER TABLE \"atlas_schema_revisions\" ALTER COLUMN \"applied\" TYPE bigint, ALTER COLUMN \"applied\" DROP NOT NULL"
        );
        assert_eq!(
            plan.changes[0].reverse,
            "ALTER TABLE \"atlas_schema_revisions\" ALTER COLUMN \"applied\" TYPE integer, ALTER COLUMN \"applied\" SET NOT NULL"
        );
    }
}
