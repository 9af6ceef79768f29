use super::{ByteStream, RemoteEntry, RemoteStorage, SyncPath, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use opendal::{Metadata, Metakey, Operator};
use tracing::warn;

/// Remote storage backed by an opendal operator, normally the WebDAV service.
pub struct WebDavStorage {
    operator: Operator,
    name: String,
}

impl WebDavStorage {
    pub fn new(endpoint: &str, username: &str, password: &str, root: Option<String>) -> Result<Self> {
        use opendal::services::Webdav;

        let mut builder = Webdav::default()
            .endpoint(endpoint)
            .username(username)
            .password(password);

        if let Some(ref r) = root {
            builder = builder.root(r);
        }

        let operator = Operator::new(builder)?.finish();

        let name = format!(
            "webdav://{}{}",
            endpoint.trim_start_matches("https://").trim_start_matches("http://").trim_end_matches('/'),
            root.as_deref()
                .map(|r| format!("/{}", r.trim_start_matches('/')))
                .unwrap_or_default()
        );

        Ok(Self { operator, name })
    }

    /// Wraps an already built operator (any opendal service).
    pub fn from_operator(operator: Operator, name: impl Into<String>) -> Self {
        Self {
            operator,
            name: name.into(),
        }
    }
}

#[async_trait]
impl RemoteStorage for WebDavStorage {
    async fn list_dir(&self, path: &SyncPath) -> Result<Vec<RemoteEntry>> {
        let dir_key = path.dir_key();
        let listed = dir_key.trim_matches('/');

        let mut lister = self
            .operator
            .lister_with(&dir_key)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await?;

        let mut entries = Vec::new();
        while let Some(entry) = lister.try_next().await? {
            // Some servers include the listed collection itself.
            if entry.path().trim_matches('/') == listed {
                continue;
            }

            let name = entry.name().trim_end_matches('/');
            if name.is_empty() || name == "." || name == ".." {
                continue;
            }

            let meta = entry.metadata();
            if meta.is_dir() {
                entries.push(RemoteEntry {
                    name: name.to_string(),
                    is_dir: true,
                    size: 0,
                    modified: meta.last_modified().unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    mode: DEFAULT_DIR_MODE,
                });
                continue;
            }

            let (size, modified) = match meta.last_modified() {
                Some(modified) => (meta.content_length(), modified),
                None => stat_fallback(entry.path(), meta, self.operator.stat(entry.path()).await),
            };

            entries.push(RemoteEntry {
                name: name.to_string(),
                is_dir: false,
                size,
                modified,
                mode: DEFAULT_FILE_MODE,
            });
        }

        Ok(entries)
    }

    async fn open_read(&self, path: &SyncPath) -> Result<ByteStream> {
        let stream = self
            .operator
            .reader(&path.file_key())
            .await?
            .into_bytes_stream(..)
            .await?;

        Ok(Box::pin(stream.map_err(anyhow::Error::from)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Size and mtime of a listed file whose listing carried no mtime. A failed stat
/// keeps the listed size and the epoch, so the file is recopied instead of its
/// whole directory being dropped.
fn stat_fallback(
    path: &str,
    listed: &Metadata,
    stat: opendal::Result<Metadata>,
) -> (u64, DateTime<Utc>) {
    match stat {
        Ok(stat) => (
            stat.content_length(),
            stat.last_modified().unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        ),
        Err(e) => {
            warn!("stat {} failed, mtime unknown: {}", path, e);
            (listed.content_length(), DateTime::<Utc>::UNIX_EPOCH)
        }
    }
}
