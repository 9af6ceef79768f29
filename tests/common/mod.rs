//! In-memory remote tree shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use webdav_backup_lib::storage::{ByteStream, RemoteEntry, RemoteStorage, SyncPath};

/// Size of the chunks handed out by [`MemoryStorage::open_read`].
pub const CHUNK_SIZE: usize = 3;

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Bytes,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tree {
    dirs: BTreeMap<SyncPath, DateTime<Utc>>,
    files: BTreeMap<SyncPath, MemoryFile>,
    broken_dirs: BTreeSet<SyncPath>,
    broken_opens: BTreeSet<SyncPath>,
    broken_streams: BTreeSet<SyncPath>,
}

/// In-memory remote tree. Listings are returned in name order.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tree: RwLock<Tree>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file, creating missing parent directories.
    pub fn put_file(&self, path: &str, data: impl Into<Bytes>, modified: DateTime<Utc>) {
        let path = SyncPath::parse(path);
        let mut tree = self.write();
        ensure_parents(&mut tree, &path, modified);
        tree.files.insert(
            path,
            MemoryFile {
                data: data.into(),
                modified,
            },
        );
    }

    pub fn put_dir(&self, path: &str, modified: DateTime<Utc>) {
        let path = SyncPath::parse(path);
        let mut tree = self.write();
        ensure_parents(&mut tree, &path, modified);
        tree.dirs.insert(path, modified);
    }

    /// Removes a file or a directory with everything below it.
    pub fn remove(&self, path: &str) {
        let path = SyncPath::parse(path);
        let prefix: Vec<String> = path.segments().map(str::to_string).collect();
        let under = |p: &SyncPath| p.segments().take(prefix.len()).eq(prefix.iter().map(String::as_str));
        let mut tree = self.write();
        tree.files.retain(|p, _| !under(p));
        tree.dirs.retain(|p, _| !under(p));
    }

    /// Makes every listing of `path` fail.
    pub fn break_listing(&self, path: &str) {
        self.write().broken_dirs.insert(SyncPath::parse(path));
    }

    /// Makes every open of `path` fail.
    pub fn break_reads(&self, path: &str) {
        self.write().broken_opens.insert(SyncPath::parse(path));
    }

    /// Streams of `path` fail after the first chunk.
    pub fn break_stream(&self, path: &str) {
        self.write().broken_streams.insert(SyncPath::parse(path));
    }

    /// Clears every failure injected for `path`.
    pub fn repair(&self, path: &str) {
        let path = SyncPath::parse(path);
        let mut tree = self.write();
        tree.broken_dirs.remove(&path);
        tree.broken_opens.remove(&path);
        tree.broken_streams.remove(&path);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ensure_parents(tree: &mut Tree, path: &SyncPath, modified: DateTime<Utc>) {
    let segments: Vec<&str> = path.segments().collect();
    let mut parent = SyncPath::root();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        parent = parent.join(segment);
        tree.dirs.entry(parent.clone()).or_insert(modified);
    }
}

fn parent_of(path: &SyncPath) -> SyncPath {
    let segments: Vec<&str> = path.segments().collect();
    SyncPath::parse(&segments[..segments.len().saturating_sub(1)].join("/"))
}

#[async_trait]
impl RemoteStorage for MemoryStorage {
    async fn list_dir(&self, path: &SyncPath) -> Result<Vec<RemoteEntry>> {
        let tree = self.read();
        if tree.broken_dirs.contains(path) {
            return Err(anyhow!("listing of {path} refused"));
        }
        if !path.is_root() && !tree.dirs.contains_key(path) {
            return Err(anyhow!("{path} not found"));
        }

        let mut entries: Vec<RemoteEntry> = tree
            .dirs
            .iter()
            .filter(|(p, _)| !p.is_root() && parent_of(p) == *path)
            .filter_map(|(p, modified)| p.file_name().map(|name| RemoteEntry::dir(name, *modified)))
            .collect();
        entries.extend(
            tree.files
                .iter()
                .filter(|(p, _)| parent_of(p) == *path)
                .filter_map(|(p, file)| {
                    p.file_name()
                        .map(|name| RemoteEntry::file(name, file.data.len() as u64, file.modified))
                }),
        );
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_read(&self, path: &SyncPath) -> Result<ByteStream> {
        let tree = self.read();
        if tree.broken_opens.contains(path) {
            return Err(anyhow!("read of {path} refused"));
        }
        let file = tree
            .files
            .get(path)
            .ok_or_else(|| anyhow!("{path} not found"))?;

        let mut chunks: Vec<Result<Bytes>> = file
            .data
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if tree.broken_streams.contains(path) {
            chunks.truncate(1);
            chunks.push(Err(anyhow!("connection reset while reading {path}")));
        }
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
