use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};
use webdav_backup_lib::config::{BackupConfig, DEFAULT_CONFIG_PATH};
use webdav_backup_lib::core::format_duration;
use webdav_backup_lib::logging::{init_logging, LogConfig};
use webdav_backup_lib::{LocalTree, RemoteStorage, SyncEngine, SyncMode, SyncOptions, WebDavStorage, APP_VERSION};

const BANNER: &str = "\
=====================================================================
                 W E B D A V   B A C K U P
=====================================================================";

#[derive(Parser, Debug)]
#[command(about, long_about = None, disable_version_flag = true)]
struct Args {
    /// Config file path
    #[arg(short = 'c', long = "conf", default_value = DEFAULT_CONFIG_PATH)]
    conf: PathBuf,

    /// backup: files deleted or moved on the server are kept locally.
    /// mirror: they are deleted locally too, mirroring the server.
    #[arg(short, long, value_enum, default_value_t = SyncMode::Backup)]
    mode: SyncMode,

    /// Show debug log
    #[arg(short, long)]
    debug: bool,

    /// Show version
    #[arg(short = 'v', long)]
    version: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("{BANNER}\n{:=^69}", format!(" V{APP_VERSION} "));
        return ExitCode::SUCCESS;
    }

    let loaded = BackupConfig::load(&args.conf);
    let log_config = loaded
        .as_ref()
        .map(|c| c.log.clone())
        .unwrap_or_else(|_| LogConfig::default());
    if let Err(e) = init_logging(&log_config, args.debug) {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("=================================================");
    info!("app version: {}", APP_VERSION);
    info!("run config path: {}", args.conf.display());
    info!("run config mode: {}", args.mode);
    info!("backup webdav: {}", config.base_url);
    info!("backup target dir: {}", config.target_dir);
    info!("log level: {}", if args.debug { "debug" } else { log_config.level.as_str() });
    info!("=================================================");

    let remote = match WebDavStorage::new(
        &config.base_url,
        &config.user,
        &config.password,
        config.root.clone(),
    ) {
        Ok(remote) => remote,
        Err(e) => {
            error!("webdav config error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    debug!("start connect webdav");
    if let Err(e) = remote.check().await {
        error!("webdav connect error: {:#}", e);
        return ExitCode::FAILURE;
    }
    debug!("webdav connect success");

    let options = SyncOptions {
        mode: args.mode,
        compare: config.compare_config(),
    };
    let engine = SyncEngine::new(Arc::new(remote), LocalTree::new(config.target_dir()), options);
    let report = engine.run_sync().await;

    info!("=================================================");
    info!("{} finish, use: {}", engine.mode(), format_duration(report.duration));
    info!("scan dir count: {}", report.directories_scanned);
    info!("scan file count: {}", report.files_scanned);
    info!("real backup count: {}", report.files_backed_up);
    if report.files_failed > 0 {
        info!("failed copy count: {}", report.files_failed);
    }
    if engine.mode() == SyncMode::Mirror {
        info!("deleted local entries: {}", report.entries_deleted);
    }
    info!("=================================================");

    ExitCode::SUCCESS
}
