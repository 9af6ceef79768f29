use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single step of the traversal. None of these abort a run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("list remote dir {path}: {reason:#}")]
    List { path: String, reason: anyhow::Error },

    #[error("open remote file {path}: {reason:#}")]
    OpenRemote { path: String, reason: anyhow::Error },

    #[error("read remote file {path}: {reason:#}")]
    Stream { path: String, reason: anyhow::Error },

    #[error("create local dir {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("open local file {}: {source}", path.display())]
    OpenLocal { path: PathBuf, source: io::Error },

    #[error("write local file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("set times on {}: {source}", path.display())]
    SetTimes { path: PathBuf, source: io::Error },

    #[error("remove local path {}: {source}", path.display())]
    RemoveLocal { path: PathBuf, source: io::Error },

    #[error("read local dir {}: {source}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },
}
