//! Per-evaluation store of in-memory migration directories.
//!
//! Directories are published whole under a fresh `mem://<uuid>` URL; there is
//! no way to add files to a directory once it is visible, so a failed
//! producer can never leave a half-built directory behind.

use std::collections::HashMap;
use std::sync::Arc;

use atlas_db::MemDir;
use tracing::debug;
use uuid::Uuid;

/// URL scheme of published directories.
pub const MEM_SCHEME: &str = "mem";

#[derive(Debug, Default)]
pub struct VirtualDirs {
    dirs: HashMap<String, Arc<MemDir>>,
}

impl VirtualDirs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a complete directory and return the URL it is reachable at.
    pub fn publish(&mut self, dir: MemDir) -> String {
        let key = Uuid::new_v4().to_string();
        debug!(key = %key, files = dir.len(), "publishing virtual directory");
        self.dirs.insert(key.clone(), Arc::new(dir));
        format!("{MEM_SCHEME}://{key}")
    }

    /// Open a directory by its `mem://` URL.
    pub fn open(&self, url: &str) -> Option<Arc<MemDir>> {
        let key = url.strip_prefix(MEM_SCHEME)?.strip_prefix("://")?;
        self.dirs.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}
