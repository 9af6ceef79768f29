pub mod config;
pub mod core;
pub mod logging;
pub mod storage;

pub use config::BackupConfig;
pub use crate::core::{SyncEngine, SyncMode, SyncOptions, SyncReport};
pub use storage::{LocalTree, RemoteStorage, SyncPath, WebDavStorage};

/// Version shown in the banner and by `--version`.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
