//! Filesystem migration directory in the default format.

use std::path::{Path, PathBuf};

use super::{Dir, File, SQL_EXT};
use crate::error::{DbError, DbResult};

/// A migration directory on disk. Files are named `<version>_<name>.sql`.
#[derive(Debug, Clone)]
pub struct LocalDir {
    path: PathBuf,
}

impl LocalDir {
    /// Open an existing directory.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(DbError::invalid_data(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SQL files whose names satisfy `keep`, sorted by name.
    pub(super) fn sql_files(&self, keep: impl Fn(&str) -> bool) -> DbResult<Vec<File>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.ends_with(SQL_EXT) && keep(&name) {
                let bytes = std::fs::read(entry.path())?;
                files.push(File::new(name, bytes));
            }
        }
        files.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(files)
    }
}

impl Dir for LocalDir {
    fn entries(&self) -> DbResult<Vec<File>> {
        self.sql_files(|_| true)
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> DbResult<()> {
        std::fs::write(self.path.join(name), bytes)?;
        Ok(())
    }

    fn read_file(&self, name: &str) -> DbResult<Option<Vec<u8>>> {
        match std::fs::read(self.path.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_requires_a_directory() {
        let temp = TempDir::new().unwrap();
        assert!(LocalDir::open(temp.path().join("missing")).is_err());
        assert!(LocalDir::open(temp.path()).is_ok());
    }

    #[test]
    fn entries_skip_non_sql_files() {
        let temp = TempDir::new().unwrap();
        let mut dir = LocalDir::open(temp.path()).unwrap();
        dir.write_file("2_b.sql", b"b").unwrap();
        dir.write_file("1_a.sql", b"a").unwrap();
        dir.write_file("README.md", b"hi").unwrap();
        std::fs::create_dir(temp.path().join("nested.sql")).unwrap();

        let names: Vec<String> = dir
            .entries()
            .unwrap()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["1_a.sql", "2_b.sql"]);
        assert_eq!(dir.read_file("README.md").unwrap().unwrap(), b"hi");
        assert!(dir.read_file("absent.sql").unwrap().is_none());
    }
}
