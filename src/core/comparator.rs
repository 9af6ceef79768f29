use crate::storage::RemoteEntry;
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error};

/// State of the local copy of a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    /// Nothing at the local path.
    Missing,
    /// Sizes differ.
    SizeDiffers,
    /// Same size, modification times differ at the configured resolution.
    MtimeDiffers,
    /// Same size and modification time.
    Unchanged,
    /// A directory sits where the remote has a file.
    TypeMismatch,
    /// Local metadata could not be read for a reason other than absence.
    Unreadable,
}

impl LocalState {
    /// Whether the remote file has to be copied. Unreadable local state is never
    /// overwritten, and type mismatches are left to the caller.
    pub fn needs_copy(self) -> bool {
        matches!(
            self,
            LocalState::Missing | LocalState::SizeDiffers | LocalState::MtimeDiffers
        )
    }
}

/// Comparison settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareConfig {
    /// Modification times are compared after flooring to this many seconds
    /// (0 is treated as 1).
    pub mtime_resolution_secs: u64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            mtime_resolution_secs: 1,
        }
    }
}

/// Decides whether a local file is stale with respect to its remote counterpart.
#[derive(Debug, Clone, Default)]
pub struct FileComparator {
    config: CompareConfig,
}

impl FileComparator {
    pub fn new(config: CompareConfig) -> Self {
        Self { config }
    }

    pub async fn needs_copy(&self, local_path: &Path, remote: &RemoteEntry) -> bool {
        self.compare(local_path, remote).await.needs_copy()
    }

    /// Stats `local_path` and classifies it against `remote`.
    pub async fn compare(&self, local_path: &Path, remote: &RemoteEntry) -> LocalState {
        let meta = match fs::metadata(local_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return LocalState::Missing,
            Err(e) => {
                error!("check local file {} failed: {}", local_path.display(), e);
                return LocalState::Unreadable;
            }
        };

        if meta.is_dir() {
            return LocalState::TypeMismatch;
        }

        let modified = match meta.modified() {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(e) => {
                error!("read mtime of {} failed: {}", local_path.display(), e);
                return LocalState::Unreadable;
            }
        };

        let state = self.compare_metadata(meta.len(), modified, remote);
        if state != LocalState::Unchanged {
            debug!(
                "{}: {:?} (local size={} mtime={}, remote size={} mtime={})",
                local_path.display(),
                state,
                meta.len(),
                modified.timestamp(),
                remote.size,
                remote.modified.timestamp()
            );
        }
        state
    }

    /// Classifies an existing local file from its size and mtime.
    pub fn compare_metadata(
        &self,
        local_size: u64,
        local_modified: DateTime<Utc>,
        remote: &RemoteEntry,
    ) -> LocalState {
        if local_size != remote.size {
            return LocalState::SizeDiffers;
        }
        if !self.same_mtime(local_modified, remote.modified) {
            return LocalState::MtimeDiffers;
        }
        LocalState::Unchanged
    }

    /// Compares two timestamps floored to the configured resolution.
    pub fn same_mtime(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        let resolution = self.config.mtime_resolution_secs.max(1) as i64;
        a.timestamp().div_euclid(resolution) == b.timestamp().div_euclid(resolution)
    }
}
