use crate::cloud::CloudConfig;
use crate::vdir::VirtualDirs;

/// State owned by a single evaluation.
///
/// A fresh context is created for every document evaluation and handed to
/// each data source. Nothing published into it is visible to any other
/// evaluation.
#[derive(Debug, Default)]
pub struct EvalContext {
    cloud: Option<CloudConfig>,
    dirs: VirtualDirs,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cloud(cloud: CloudConfig) -> Self {
        Self {
            cloud: Some(cloud),
            dirs: VirtualDirs::new(),
        }
    }

    /// The cloud block, if the document declared one.
    pub fn cloud(&self) -> Option<&CloudConfig> {
        self.cloud.as_ref()
    }

    pub fn dirs(&self) -> &VirtualDirs {
        &self.dirs
    }

    pub fn dirs_mut(&mut self) -> &mut VirtualDirs {
        &mut self.dirs
    }
}
