//! Migration directories.
//!
//! A [`Dir`] is a flat collection of migration files plus a checksum file
//! ([`HASH_FILE`]). Each directory implementation owns its naming
//! convention: [`Dir::format_plan`] turns a [`Plan`] into files, so the diff
//! engine never needs to know whether it is writing `1_init.sql` or
//! `1_init.up.sql` + `1_init.down.sql`.

mod archive;
mod golang;
mod local;
mod mem;
mod sum;

use std::fmt;

use chrono::Utc;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::plan::Plan;

pub use archive::{archive_dir, unarchive_dir};
pub use golang::GolangMigrateDir;
pub use local::LocalDir;
pub use mem::MemDir;
pub use sum::HashFile;

/// Name of the checksum file kept next to migration files.
pub const HASH_FILE: &str = "atlas.sum";

/// Extension of migration files.
pub const SQL_EXT: &str = ".sql";

/// A migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    bytes: Vec<u8>,
}

impl File {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The version prefix, e.g. `20240101120000` for `20240101120000_init.sql`.
    pub fn version(&self) -> &str {
        self.name
            .split_once('_')
            .map(|(v, _)| v)
            .unwrap_or_else(|| self.name.trim_end_matches(SQL_EXT))
    }

    /// The description part, e.g. `init` for `20240101120000_init.up.sql`.
    pub fn desc(&self) -> &str {
        let stem = self
            .name
            .strip_suffix(".up.sql")
            .or_else(|| self.name.strip_suffix(".down.sql"))
            .or_else(|| self.name.strip_suffix(SQL_EXT))
            .unwrap_or(&self.name);
        stem.split_once('_').map(|(_, d)| d).unwrap_or("")
    }
}

/// A directory of migration files.
pub trait Dir: Send + Sync + fmt::Debug {
    /// Every SQL file in the directory, sorted by name.
    fn entries(&self) -> DbResult<Vec<File>>;

    /// Write (or overwrite) a file.
    fn write_file(&mut self, name: &str, bytes: &[u8]) -> DbResult<()>;

    /// Read a file, `None` if it does not exist.
    fn read_file(&self, name: &str) -> DbResult<Option<Vec<u8>>>;

    /// Migration files to apply, in order.
    fn files(&self) -> DbResult<Vec<File>> {
        self.entries()
    }

    /// Turn a plan into files following this directory's naming convention.
    ///
    /// The default is one `<version>_<name>.sql` file holding every statement.
    fn format_plan(&self, version: &str, plan: &Plan) -> Vec<File> {
        let mut content = String::new();
        for change in &plan.changes {
            content.push_str(&format!("-- {}\n{};\n", capitalize(&change.comment), change.cmd));
        }
        vec![File::new(format!("{version}_{}{SQL_EXT}", plan.name), content)]
    }
}

/// Write a plan into a directory and refresh its checksum file.
///
/// Returns the names of the files written. An empty plan writes nothing.
pub fn write_plan(dir: &mut dyn Dir, plan: &Plan) -> DbResult<Vec<String>> {
    if plan.is_empty() {
        return Ok(Vec::new());
    }
    let version = next_version(dir)?;
    let files = dir.format_plan(&version, plan);
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        dir.write_file(file.name(), file.bytes())?;
        written.push(file.name);
    }
    write_sum_file(dir)?;
    info!(files = ?written, "wrote migration files");
    Ok(written)
}

/// The current timestamp, or one past the newest version in `dir` when that
/// is not older. A new migration never replaces an existing one.
fn next_version(dir: &dyn Dir) -> DbResult<String> {
    let now = Utc::now().format("%Y%m%d%H%M%S").to_string();
    let latest = dir
        .entries()?
        .iter()
        .filter_map(|f| f.version().parse::<u64>().ok())
        .max();
    Ok(match (latest, now.parse::<u64>()) {
        (Some(latest), Ok(current)) if latest >= current => (latest + 1).to_string(),
        _ => now,
    })
}

/// Recompute and write the checksum file.
pub fn write_sum_file(dir: &mut dyn Dir) -> DbResult<()> {
    let sum = HashFile::compute(&dir.entries()?);
    dir.write_file(HASH_FILE, &sum.to_bytes())
}

/// Check the directory contents against its checksum file.
pub fn validate(dir: &dyn Dir) -> DbResult<()> {
    let bytes = dir.read_file(HASH_FILE)?.ok_or(DbError::ChecksumNotFound)?;
    let expected = HashFile::parse(&bytes)?;
    if expected != HashFile::compute(&dir.entries()?) {
        return Err(DbError::ChecksumMismatch);
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlannedChange;
    use pretty_assertions::assert_eq;

    fn plan() -> Plan {
        Plan {
            name: "init".into(),
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
        }
    }

    #[test]
    fn file_name_parts() {
        let f = File::new("20240101120000_add_users.up.sql", "");
        assert_eq!(f.version(), "20240101120000");
        assert_eq!(f.desc(), "add_users");
        let f = File::new("1.sql", "");
        assert_eq!(f.version(), "1");
        assert_eq!(f.desc(), "");
    }

    #[test]
    fn default_format_is_a_single_file() {
        let dir = MemDir::new();
        let files = dir.format_plan("42", &plan());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "42_init.sql");
        assert_eq!(
            String::from_utf8_lossy(files[0].bytes()),
            "-- Create \"a\" table\nCREATE TABLE a (c int);\n-- Create \"b\" table\nCREATE TABLE b (c int);\n"
        );
    }

    #[test]
    fn write_plan_keeps_checksum_valid() {
        let mut dir = MemDir::new();
        let written = write_plan(&mut dir, &plan()).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("_init.sql"));
        validate(&dir).unwrap();

        dir.write_file("2_sneaky.sql", b"DROP TABLE a;").unwrap();
        assert!(matches!(validate(&dir), Err(DbError::ChecksumMismatch)));
    }

    #[test]
    fn back_to_back_plans_get_distinct_versions() {
        let mut dir = MemDir::new();
        let first = write_plan(&mut dir, &plan()).unwrap();
        let second = write_plan(&mut dir, &plan()).unwrap();
        assert_ne!(first, second);
        assert!(second[0] > first[0], "{second:?} should sort after {first:?}");

        let files = dir.files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].name(), second[0]);
        validate(&dir).unwrap();
    }

    #[test]
    fn versions_move_past_newer_files() {
        let mut dir = MemDir::new();
        dir.write_file("30000101000000_future.sql", b"SELECT 1;").unwrap();
        let written = write_plan(&mut dir, &plan()).unwrap();
        assert_eq!(written, vec!["30000101000001_init.sql"]);
    }

    #[test]
    fn empty_plan_writes_nothing() {
        let mut dir = MemDir::new();
        let empty = Plan {
            name: "noop".into(),
            changes: vec![],
        };
        assert!(write_plan(&mut dir, &empty).unwrap().is_empty());
        assert!(matches!(validate(&dir), Err(DbError::ChecksumNotFound)));
    }
}
