//! In-memory migration directory.

use std::collections::BTreeMap;

use super::{Dir, File, SQL_EXT};
use crate::error::DbResult;

/// A virtual directory: file names mapped to contents, kept in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemDir {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemDir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files, including the checksum file.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every file, including non-SQL ones, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl Dir for MemDir {
    fn entries(&self) -> DbResult<Vec<File>> {
        Ok(self
            .files
            .iter()
            .filter(|(name, _)| name.ends_with(SQL_EXT))
            .map(|(name, bytes)| File::new(name.clone(), bytes.clone()))
            .collect())
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> DbResult<()> {
        self.files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read_file(&self, name: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.files.get(name).cloned())
    }
}
