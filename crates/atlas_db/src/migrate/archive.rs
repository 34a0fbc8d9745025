//! Tar encoding of a migration directory, used to ship directories over the
//! network.

use std::io::Read;

use super::{Dir, File, HASH_FILE, MemDir};
use crate::error::{DbError, DbResult};

/// Archive the SQL files of a directory, and its checksum file if present.
pub fn archive_dir(dir: &dyn Dir) -> DbResult<Vec<u8>> {
    let mut files = dir.entries()?;
    if let Some(sum) = dir.read_file(HASH_FILE)? {
        files.insert(0, File::new(HASH_FILE, sum));
    }

    let mut builder = tar::Builder::new(Vec::new());
    for file in &files {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.bytes().len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, file.name(), file.bytes())
            .map_err(DbError::archive)?;
    }
    builder.into_inner().map_err(DbError::archive)
}

/// Extract an archive into a fresh in-memory directory.
///
/// Only regular files are kept, and only their base name: an archive cannot
/// place files outside the directory. Two entries with the same base name
/// are rejected.
pub fn unarchive_dir(bytes: &[u8]) -> DbResult<MemDir> {
    let mut archive = tar::Archive::new(bytes);
    let mut dir = MemDir::new();
    for entry in archive.entries().map_err(DbError::archive)? {
        let mut entry = entry.map_err(DbError::archive)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .map_err(DbError::archive)?
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| DbError::archive("archive entry without a file name"))?;
        if dir.read_file(&name)?.is_some() {
            return Err(DbError::archive(format!("duplicate archive entry {name:?}")));
        }
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(DbError::archive)?;
        dir.write_file(&name, &content)?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{validate, write_sum_file};

    #[test]
    fn archive_keeps_files_and_checksum() {
        let mut dir = MemDir::new();
        dir.write_file("1.sql", b"create table t(c int);").unwrap();
        write_sum_file(&mut dir).unwrap();

        let extracted = unarchive_dir(&archive_dir(&dir).unwrap()).unwrap();
        assert_eq!(extracted, dir);
        validate(&extracted).unwrap();
    }

    #[test]
    fn entries_sharing_a_base_name_are_rejected() {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, body) in [("a/1.sql", "create table a(c int);"), ("b/1.sql", "create table b(c int);")] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, body.as_bytes()).unwrap();
        }
        let bytes = builder.into_inner().unwrap();

        let err = unarchive_dir(&bytes).unwrap_err();
        assert!(matches!(err, DbError::Archive(_)));
        assert!(err.to_string().contains("\"1.sql\""), "{err}");
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let err = unarchive_dir(&[0xff; 1024]).unwrap_err();
        assert!(matches!(err, DbError::Archive(_)));
    }
}
