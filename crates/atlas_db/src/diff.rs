//! Schema diffing - compare a desired realm against the current one.
//!
//! [`diff_realms`] produces the changes needed to turn `current` into
//! `desired`. Tables are matched by name, columns by name within a table.
//! Changes are emitted in the order of the desired realm, with drops of
//! tables that no longer exist last.
//!
//! Column defaults are not compared: dialects echo defaults back in their own
//! normalized spelling (`'x'::character varying`), so a textual comparison
//! would report changes that are not there.

use std::collections::HashSet;
use std::fmt;

use crate::schema::{Column, Realm, Table};

/// A diff between two realms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Changes organized by table.
    pub table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.table_diffs.is_empty()
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.table_diffs.iter().map(|t| t.changes.len()).sum()
    }
}

/// Changes for a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    /// Table name.
    pub table: String,
    /// List of changes.
    pub changes: Vec<Change>,
}

/// A single schema change.
///
/// Changes carry enough of the previous state to be reversed.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Add a new table.
    AddTable(Table),
    /// Drop an existing table.
    DropTable(Table),
    /// Add a new column.
    AddColumn(Column),
    /// Drop an existing column.
    DropColumn(Column),
    /// Change a column's type or nullability.
    ModifyColumn { from: Column, to: Column },
}

impl Change {
    /// The change that undoes this one.
    pub fn reverse(&self) -> Change {
        match self {
            Change::AddTable(t) => Change::DropTable(t.clone()),
            Change::DropTable(t) => Change::AddTable(t.clone()),
            Change::AddColumn(c) => Change::DropColumn(c.clone()),
            Change::DropColumn(c) => Change::AddColumn(c.clone()),
            Change::ModifyColumn { from, to } => Change::ModifyColumn {
                from: to.clone(),
                to: from.clone(),
            },
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddTable(t) => write!(f, "+ table {}", t.name),
            Change::DropTable(t) => write!(f, "- table {}", t.name),
            Change::AddColumn(c) => {
                let nullable = if c.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", c.name, c.ty, nullable)
            }
            Change::DropColumn(c) => write!(f, "- {}", c.name),
            Change::ModifyColumn { from, to } => {
                write!(f, "~ {}: {} -> {}", to.name, from.ty, to.ty)?;
                if from.nullable != to.nullable {
                    let state = if to.nullable { "nullable" } else { "not null" };
                    write!(f, " ({state})")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes.");
        }
        for table_diff in &self.table_diffs {
            writeln!(f, "{}:", table_diff.table)?;
            for change in &table_diff.changes {
                writeln!(f, "  {change}")?;
            }
        }
        Ok(())
    }
}

/// Compute the changes that turn `current` into `desired`.
///
/// Tables are compared across all schemas by name; schema qualification is
/// left to the connection's search path.
pub fn diff_realms(current: &Realm, desired: &Realm) -> SchemaDiff {
    let mut table_diffs = Vec::new();

    let desired_names: HashSet<&str> = desired.tables().map(|t| t.name.as_str()).collect();

    for table in desired.tables() {
        let changes = match current.tables().find(|t| t.name == table.name) {
            Some(existing) => diff_table(existing, table),
            None => vec![Change::AddTable(table.clone())],
        };
        if !changes.is_empty() {
            table_diffs.push(TableDiff {
                table: table.name.clone(),
                changes,
            });
        }
    }

    for table in current.tables() {
        if !desired_names.contains(table.name.as_str()) {
            table_diffs.push(TableDiff {
                table: table.name.clone(),
                changes: vec![Change::DropTable(table.clone())],
            });
        }
    }

    SchemaDiff { table_diffs }
}

fn diff_table(current: &Table, desired: &Table) -> Vec<Change> {
    let mut changes = Vec::new();

    for column in &desired.columns {
        match current.column(&column.name) {
            None => changes.push(Change::AddColumn(column.clone())),
            Some(existing) => {
                if !existing.same_type(column) || existing.nullable != column.nullable {
                    changes.push(Change::ModifyColumn {
                        from: existing.clone(),
                        to: column.clone(),
                    });
                }
            }
        }
    }

    for column in &current.columns {
        if desired.column(&column.name).is_none() {
            changes.push(Change::DropColumn(column.clone()));
        }
    }

    changes
}
