//! Run configuration, read from a JSON file.

use crate::core::CompareConfig;
use crate::logging::LogConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "./webdavBackup.json";

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupConfig {
    /// WebDAV endpoint, e.g. `https://dav.example.com/remote.php/dav/files/me`
    pub base_url: String,
    pub user: String,
    pub password: String,
    /// Local directory the remote tree is copied into (full path)
    pub target_dir: String,
    /// Optional root below the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default = "default_mtime_resolution_secs")]
    pub mtime_resolution_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_mtime_resolution_secs() -> u64 {
    1
}

impl BackupConfig {
    /// Loads the config file. When it does not exist a template is written at
    /// `path` and an error asks the user to fill it in.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Self::template()
                    .save(path)
                    .with_context(|| format!("can't write default config to {}", path.display()))?;
                bail!(
                    "config file {} not found, a default one was written; edit it and restart",
                    path.display()
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("can't read config file {}", path.display()))
            }
        };

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("can't parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Placeholder values written for first-time users.
    pub fn template() -> Self {
        Self {
            base_url: "https://test.dav".to_string(),
            user: "user-account".to_string(),
            password: "user-password".to_string(),
            target_dir: "target-local-backup-dir-full-path".to_string(),
            root: None,
            mtime_resolution_secs: default_mtime_resolution_secs(),
            log: LogConfig::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            bail!("BaseUrl must not be empty");
        }
        if self.target_dir.trim().is_empty() {
            bail!("TargetDir must not be empty");
        }
        Ok(())
    }

    pub fn target_dir(&self) -> PathBuf {
        PathBuf::from(&self.target_dir)
    }

    pub fn compare_config(&self) -> CompareConfig {
        CompareConfig {
            mtime_resolution_secs: self.mtime_resolution_secs,
        }
    }
}
