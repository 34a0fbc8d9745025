//! golang-migrate directory format.

use std::path::Path;

use super::{Dir, File, LocalDir};
use crate::error::DbResult;
use crate::plan::Plan;

const UP_EXT: &str = ".up.sql";
const DOWN_EXT: &str = ".down.sql";

/// A directory using the golang-migrate layout: every version is a pair of
/// `<version>_<name>.up.sql` and `<version>_<name>.down.sql` files.
#[derive(Debug, Clone)]
pub struct GolangMigrateDir {
    local: LocalDir,
}

impl GolangMigrateDir {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self {
            local: LocalDir::open(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.local.path()
    }
}

impl Dir for GolangMigrateDir {
    fn entries(&self) -> DbResult<Vec<File>> {
        self.local.entries()
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> DbResult<()> {
        self.local.write_file(name, bytes)
    }

    fn read_file(&self, name: &str) -> DbResult<Option<Vec<u8>>> {
        self.local.read_file(name)
    }

    /// Only the `up` half is applied.
    fn files(&self) -> DbResult<Vec<File>> {
        self.local.sql_files(|name| name.ends_with(UP_EXT))
    }

    fn format_plan(&self, version: &str, plan: &Plan) -> Vec<File> {
        let mut up = String::new();
        for change in &plan.changes {
            up.push_str(&format!("-- {}\n{};\n", change.comment, change.cmd));
        }
        let mut down = String::new();
        for change in plan.changes.iter().rev() {
            down.push_str(&format!("-- reverse: {}\n{};\n", change.comment, change.reverse));
        }
        vec![
            File::new(format!("{version}_{}{UP_EXT}", plan.name), up),
            File::new(format!("{version}_{}{DOWN_EXT}", plan.name), down),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{validate, write_plan};
    use crate::plan::PlannedChange;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn writes_up_and_down_pairs() {
        let temp = TempDir::new().unwrap();
        let mut dir = GolangMigrateDir::open(temp.path()).unwrap();
        let plan = Plan {
            name: "boring".into(),
            changes: vec![
                PlannedChange {
                    comment: "create \"a\" table".into(),
                    cmd: "CREATE TABLE a (c int)".into(),
                    reverse: "DROP TABLE a".into(),
                },
                PlannedChange {
                    comment: "create \"b\" table".into(),
                    cmd: "CREATE TABLE b (c int)".into(),
                    reverse: "DROP TABLE b".into(),
                },
            ],
        };

        let written = write_plan(&mut dir, &plan).unwrap();
        assert_eq!(written.len(), 2);
        validate(&dir).unwrap();

        let files = dir.files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].name().ends_with("_boring.up.sql"));

        let down = dir
            .read_file(&written[1])
            .unwrap()
            .map(String::from_utf8)
            .unwrap()
            .unwrap();
        assert_eq!(
            down,
            "-- reverse: create \"b\" table\nDROP TABLE b;\n-- reverse: create \"a\" table\nDROP TABLE a;\n"
        );
    }
}
