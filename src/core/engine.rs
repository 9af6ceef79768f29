use crate::core::comparator::{CompareConfig, FileComparator, LocalState};
use crate::core::error::SyncError;
use crate::core::reconciler::reconcile;
use crate::storage::{LocalTree, RemoteEntry, RemoteStorage, SyncPath};
use chrono::{DateTime, Utc};
use filetime::FileTime;
use futures::StreamExt;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SyncMode {
    /// Only add and update local files; files deleted or moved on the server stay.
    Backup,
    /// Also delete local entries that no longer exist on the server.
    Mirror,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Backup => write!(f, "backup"),
            SyncMode::Mirror => write!(f, "mirror"),
        }
    }
}

/// Options fixed for one run.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub mode: SyncMode,
    pub compare: CompareConfig,
}

impl SyncOptions {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            compare: CompareConfig::default(),
        }
    }
}

/// Counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub directories_scanned: u64,
    pub files_scanned: u64,
    /// Files found stale and scheduled for copy (including copies that then failed).
    pub files_backed_up: u64,
    pub files_failed: u64,
    /// Local entries removed because they are gone on the server (mirror mode).
    pub entries_deleted: u64,
    pub bytes_transferred: u64,
    pub duration: Duration,
}

/// Walks the remote tree and brings the local tree up to date.
pub struct SyncEngine {
    remote: Arc<dyn RemoteStorage>,
    local: LocalTree,
    options: SyncOptions,
    comparator: FileComparator,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteStorage>, local: LocalTree, options: SyncOptions) -> Self {
        Self {
            remote,
            local,
            comparator: FileComparator::new(options.compare),
            options,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.options.mode
    }

    /// Runs one full pass, starting at the remote root.
    ///
    /// Directories are visited depth first in listing order; the files of a
    /// directory are handled before any of its subdirectories. Per-entry failures
    /// are logged and counted, never propagated.
    pub async fn run_sync(&self) -> SyncReport {
        let started = Instant::now();
        let mut report = SyncReport::default();

        info!(
            "start {} from {} into {}",
            self.options.mode,
            self.remote.name(),
            self.local.root().display()
        );

        let mut pending = vec![SyncPath::root()];
        while let Some(dir) = pending.pop() {
            let subdirs = self.sync_directory(&dir, &mut report).await;
            // Reversed so the first subdirectory is popped next.
            pending.extend(subdirs.into_iter().rev());
        }

        report.duration = started.elapsed();
        report
    }

    /// Handles the files of one directory and returns its subdirectories.
    async fn sync_directory(&self, dir: &SyncPath, report: &mut SyncReport) -> Vec<SyncPath> {
        debug!("scan dir: {}", dir);
        report.directories_scanned += 1;

        let mirror = self.options.mode == SyncMode::Mirror;
        let entries = match self.remote.list_dir(dir).await {
            Ok(entries) => {
                if mirror {
                    let outcome = reconcile(&self.local.resolve(dir), &entries).await;
                    report.entries_deleted += outcome.deleted;
                }
                entries
            }
            Err(reason) => {
                // Treated as empty, but an unknown listing never drives deletions.
                let err = SyncError::List {
                    path: dir.to_string(),
                    reason,
                };
                error!("{}", err);
                Vec::new()
            }
        };

        let (dir_entries, file_entries): (Vec<RemoteEntry>, Vec<RemoteEntry>) =
            entries.into_iter().partition(|e| e.is_dir);

        // Decide for every file first, then copy.
        let mut to_copy = Vec::new();
        let mut skipped = 0usize;
        for entry in file_entries {
            report.files_scanned += 1;
            let Some(path) = child_path(dir, &entry.name) else {
                skipped += 1;
                continue;
            };
            let local_path = self.local.resolve(&path);

            match self.comparator.compare(&local_path, &entry).await {
                LocalState::TypeMismatch if mirror => {
                    if let Err(source) = fs::remove_dir_all(&local_path).await {
                        error!("{}", SyncError::RemoveLocal { path: local_path.clone(), source });
                        skipped += 1;
                        continue;
                    }
                    info!("mirror: replaced local dir {} by remote file", local_path.display());
                    report.entries_deleted += 1;
                }
                LocalState::TypeMismatch => {
                    error!(
                        "skip {}: local path {} is a directory",
                        path,
                        local_path.display()
                    );
                    skipped += 1;
                    continue;
                }
                state if state.needs_copy() => {
                    if state != LocalState::Missing {
                        remove_stale_file(&local_path).await;
                    }
                }
                _ => {
                    debug!("skip file: {}", path);
                    skipped += 1;
                    continue;
                }
            }

            report.files_backed_up += 1;
            to_copy.push((path, entry));
        }

        if skipped > 0 {
            if to_copy.is_empty() && dir_entries.is_empty() {
                info!("dir {}: nothing to copy, {} files skipped", dir, skipped);
            } else {
                info!(
                    "dir {}: {} files skipped, {} to copy, {} subdirs",
                    dir,
                    skipped,
                    to_copy.len(),
                    dir_entries.len()
                );
            }
        }

        for (path, entry) in &to_copy {
            match self.copy_file(path, entry).await {
                Ok(bytes) => report.bytes_transferred += bytes,
                Err(e) => {
                    error!("copy {} failed: {}", path, e);
                    report.files_failed += 1;
                }
            }
        }

        let mut subdirs = Vec::with_capacity(dir_entries.len());
        for entry in dir_entries {
            let Some(child) = child_path(dir, &entry.name) else {
                continue;
            };
            if mirror {
                self.clear_file_at_dir(&child, report).await;
            }
            subdirs.push(child);
        }
        subdirs
    }

    /// Mirror mode: a local non-directory where the remote has a directory is removed
    /// so the directory can be recreated on descent.
    async fn clear_file_at_dir(&self, dir: &SyncPath, report: &mut SyncReport) {
        let local_path = self.local.resolve(dir);
        match fs::symlink_metadata(&local_path).await {
            Ok(meta) if !meta.is_dir() => match fs::remove_file(&local_path).await {
                Ok(()) => {
                    info!("mirror: replaced local file {} by remote dir", local_path.display());
                    report.entries_deleted += 1;
                }
                Err(source) => error!("{}", SyncError::RemoveLocal { path: local_path.clone(), source }),
            },
            _ => {}
        }
    }

    /// Streams one remote file to its local path and stamps it with the remote
    /// modification time. Returns the number of bytes written.
    ///
    /// A failure leaves whatever was written in place; the next run sees the
    /// size/mtime mismatch and copies again.
    pub async fn copy_file(&self, path: &SyncPath, entry: &RemoteEntry) -> Result<u64, SyncError> {
        let local_path = self.local.resolve(path);
        debug!("copy file: {} => {}", path, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| SyncError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut stream = self
            .remote
            .open_read(path)
            .await
            .map_err(|reason| SyncError::OpenRemote {
                path: path.to_string(),
                reason,
            })?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(entry.mode);
        let mut file = options
            .open(&local_path)
            .await
            .map_err(|source| SyncError::OpenLocal {
                path: local_path.clone(),
                source,
            })?;

        let write_err = |source: io::Error| SyncError::Write {
            path: local_path.clone(),
            source,
        };

        let started = Instant::now();
        let mut copied = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(reason) => {
                    // Settle the partial file before reporting; the next run recopies it.
                    if let Err(e) = file.flush().await {
                        debug!("flush partial {}: {}", local_path.display(), e);
                    }
                    return Err(SyncError::Stream {
                        path: path.to_string(),
                        reason,
                    });
                }
            };
            file.write_all(&chunk).await.map_err(write_err)?;
            copied += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;
        drop(file);
        drop(stream);

        let elapsed = started.elapsed();
        info!(
            "copy file, speed: [{:.2} MB/s], [{}] => [{}]",
            copied as f64 / elapsed.as_secs_f64().max(1e-6) / 1e6,
            path,
            local_path.display()
        );
        if copied != entry.size {
            warn!(
                "{}: listed size {} but received {} bytes",
                path, entry.size, copied
            );
        }

        set_file_times(&local_path, entry.modified)
            .await
            .map_err(|source| SyncError::SetTimes {
                path: local_path.clone(),
                source,
            })?;

        Ok(copied)
    }
}

/// Path of a listed entry, or `None` (logged) when its name does not denote
/// exactly one level below `dir`, e.g. `.`, `..`, empty or `a/b`.
fn child_path(dir: &SyncPath, name: &str) -> Option<SyncPath> {
    let child = dir.join(name);
    if child.file_name() == Some(name) && child.segments().count() == dir.segments().count() + 1 {
        Some(child)
    } else {
        error!("skip entry {:?} listed in {}: not a plain name", name, dir);
        None
    }
}

/// Removes the local file that is about to be replaced. Failures are only logged:
/// the copy that follows truncates the file anyway.
async fn remove_stale_file(local_path: &Path) {
    match fs::remove_file(local_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => error!(
            "{}",
            SyncError::RemoveLocal {
                path: local_path.to_path_buf(),
                source
            }
        ),
    }
}

async fn set_file_times(path: &Path, modified: DateTime<Utc>) -> io::Result<()> {
    let time = FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || filetime::set_file_times(&path, time, time))
        .await
        .map_err(io::Error::other)?
}

/// Formats a run duration as `H hours M mins S secs`.
pub fn format_duration(duration: Duration) -> String {
    let secs = (duration.as_millis() + 500) / 1000;
    format!(
        "{} hours {} mins {} secs",
        secs / 3600,
        secs % 3600 / 60,
        secs % 60
    )
}
