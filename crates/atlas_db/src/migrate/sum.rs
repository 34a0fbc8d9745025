//! The `atlas.sum` checksum file.
//!
//! Format:
//!
//! ```text
//! h1:<base64 sha256 over every file>
//! <file name> h1:<base64 running sha256 up to and including this file>
//! ```
//!
//! Hashes are cumulative, so editing, inserting or reordering any file
//! changes every line after it as well as the total.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use super::File;
use crate::error::{DbError, DbResult};

const PREFIX: &str = "h1:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashFile {
    pub total: String,
    pub files: Vec<(String, String)>,
}

impl HashFile {
    pub fn compute(files: &[File]) -> Self {
        let mut hasher = Sha256::new();
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            hasher.update(file.name().as_bytes());
            hasher.update(file.bytes());
            entries.push((file.name().to_string(), encode(hasher.clone().finalize().as_slice())));
        }
        Self {
            total: encode(hasher.finalize().as_slice()),
            files: entries,
        }
    }

    pub fn parse(bytes: &[u8]) -> DbResult<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| DbError::ChecksumFormat(e.to_string()))?;
        let mut lines = text.lines();
        let total = lines
            .next()
            .filter(|l| l.starts_with(PREFIX))
            .ok_or_else(|| DbError::ChecksumFormat("missing total hash".into()))?
            .to_string();
        let files = lines
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                line.rsplit_once(' ')
                    .filter(|(_, h)| h.starts_with(PREFIX))
                    .map(|(name, hash)| (name.to_string(), hash.to_string()))
                    .ok_or_else(|| DbError::ChecksumFormat(format!("invalid line {line:?}")))
            })
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self { total, files })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{}\n", self.total);
        for (name, hash) in &self.files {
            out.push_str(&format!("{name} {hash}\n"));
        }
        out.into_bytes()
    }
}

fn encode(digest: &[u8]) -> String {
    format!("{PREFIX}{}", STANDARD.encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_what_it_writes() {
        let files = vec![File::new("1_a.sql", "a"), File::new("2_b.sql", "b")];
        let sum = HashFile::compute(&files);
        assert_eq!(sum.files.len(), 2);
        assert_eq!(HashFile::parse(&sum.to_bytes()).unwrap(), sum);
    }

    #[test]
    fn hashes_are_cumulative() {
        let before = HashFile::compute(&[File::new("1_a.sql", "a"), File::new("2_b.sql", "b")]);
        let after = HashFile::compute(&[File::new("1_a.sql", "A"), File::new("2_b.sql", "b")]);
        assert_ne!(before.files[1].1, after.files[1].1);
        assert_ne!(before.total, after.total);
    }

    #[test]
    fn rejects_garbage() {
        assert!(HashFile::parse(b"nope").is_err());
        assert!(HashFile::parse(b"h1:abc\nno-hash-here\n").is_err());
    }
}
