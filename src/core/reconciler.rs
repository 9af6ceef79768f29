use crate::core::error::SyncError;
use crate::storage::RemoteEntry;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};

/// Result of reconciling one local directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub deleted: u64,
    pub failed: u64,
}

/// Mirror mode: removes every entry of `local_dir` (one level) whose name is not in
/// `remote_entries`. Local directories go with their whole content.
///
/// Names are compared without looking at entry types. The directory listing is
/// read completely before anything is removed; if it cannot be read, nothing is.
pub async fn reconcile(local_dir: &Path, remote_entries: &[RemoteEntry]) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    let local_entries = match read_local_dir(local_dir).await {
        Ok(entries) => entries,
        Err(SyncError::ReadDir { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            debug!("mirror: {} does not exist yet", local_dir.display());
            return outcome;
        }
        Err(e) => {
            error!("mirror: {}", e);
            return outcome;
        }
    };

    let remote_names: HashSet<&str> = remote_entries.iter().map(|e| e.name.as_str()).collect();

    for (name, path, is_dir) in local_entries {
        if remote_names.contains(name.as_str()) {
            continue;
        }

        let removed = if is_dir {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };

        match removed {
            Ok(()) => {
                info!("mirror: deleted local path {}", path.display());
                outcome.deleted += 1;
            }
            Err(source) => {
                error!("mirror: {}", SyncError::RemoveLocal { path, source });
                outcome.failed += 1;
            }
        }
    }

    outcome
}

async fn read_local_dir(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>, SyncError> {
    let read_err = |source: io::Error| SyncError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut read_dir = fs::read_dir(dir).await.map_err(read_err)?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(read_err)? {
        // Symlinks are removed as links, never followed.
        let is_dir = entry.file_type().await.map_err(read_err)?.is_dir();
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path(), is_dir));
    }
    Ok(entries)
}
