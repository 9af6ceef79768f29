pub mod local;
pub mod webdav;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::fmt;
use std::pin::Pin;

pub use local::LocalTree;
pub use webdav::WebDavStorage;

/// Permission bits reported for remote files when the protocol carries none.
pub const DEFAULT_FILE_MODE: u32 = 0o664;
/// Permission bits reported for remote directories when the protocol carries none.
pub const DEFAULT_DIR_MODE: u32 = 0o775;

/// Chunked byte stream of a remote file. Dropping it releases the remote handle.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub mode: u32,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size,
            modified,
            mode: DEFAULT_FILE_MODE,
        }
    }

    pub fn dir(name: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: 0,
            modified,
            mode: DEFAULT_DIR_MODE,
        }
    }
}

/// Remote-relative, slash separated path.
///
/// Empty, `.` and `..` components are dropped while parsing so that joining a
/// `SyncPath` under a local root can never leave that root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncPath {
    segments: Vec<String>,
}

impl SyncPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    /// Child path. `name` is sanitized the same way as in [`SyncPath::parse`].
    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(Self::parse(name).segments);
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Key used to address this path as a directory (`/` for the root, `a/b/` otherwise).
    pub fn dir_key(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("{}/", self.segments.join("/"))
        }
    }

    /// Key used to address this path as a file (`a/b.txt`).
    pub fn file_key(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// Read-only view of the remote hierarchy consumed by the sync engine.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Lists one directory level, in the order the server returned it.
    async fn list_dir(&self, path: &SyncPath) -> Result<Vec<RemoteEntry>>;

    /// Opens a byte stream for a remote file.
    async fn open_read(&self, path: &SyncPath) -> Result<ByteStream>;

    /// Connectivity probe run once before a sync.
    async fn check(&self) -> Result<()> {
        self.list_dir(&SyncPath::root()).await.map(|_| ())
    }

    /// Storage name (used in logs).
    fn name(&self) -> &str;
}
