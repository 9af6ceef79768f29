use super::SyncPath;
use std::path::{Path, PathBuf};

/// Local side of a sync: the target directory every remote path is mapped under.
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a remote-relative path to its local location. Depends on nothing but
    /// the root and `path`.
    pub fn resolve(&self, path: &SyncPath) -> PathBuf {
        let mut local = self.root.clone();
        for segment in path.segments() {
            local.push(segment);
        }
        local
    }
}
