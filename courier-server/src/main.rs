//! courier-server - Release registry daemon and build administration

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{error, info};

use courier_protocol::Version;
use courier_server::{
    builder::DEFAULT_EXCLUDES, register_commands, Builder, DirPackager, ReleaseStore, ServerConfig,
};
use courier_utils::{init_logging_with_config, paths, CourierError, LogConfig, Result};

use courier_net::{Dispatcher, Listener};

/// Release registry for closed-network agent fleets
#[derive(Parser, Debug)]
#[command(name = "courier-server")]
#[command(about = "Release registry daemon for courier")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "COURIER_SERVER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the registry daemon
    Run {
        /// Listen address, overrides the config file
        #[arg(long)]
        listen: Option<String>,
    },

    /// Package a version into the release store as a draft
    Build {
        /// Version to build (e.g. 1.2.0)
        version: String,

        /// Directory holding the staged artifact tree
        #[arg(short, long)]
        source: PathBuf,

        /// File-name patterns to exclude (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },

    /// Approve a draft version for distribution
    Release {
        /// Version to approve
        version: String,

        /// Release notes to attach
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show the stored record for a version
    Info {
        /// Version to inspect
        version: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(paths::config_file);
    let config = ServerConfig::load(&config_path)?;

    // The daemon logs to file; administration subcommands log to stderr.
    let log_config = match cli.command {
        Command::Run { .. } => LogConfig::server(),
        _ => LogConfig::client(),
    };
    init_logging_with_config(log_config)?;

    match cli.command {
        Command::Run { listen } => {
            let listen_addr = listen.unwrap_or(config.listen_addr.clone());
            run_daemon(&listen_addr, config).await
        }
        Command::Build {
            version,
            source,
            exclude,
        } => {
            let version: Version = version.parse()?;
            let excludes = if exclude.is_empty() {
                DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
            } else {
                exclude
            };
            let record = Builder::new(&config.release_root).build(
                &version,
                &DirPackager::new(source),
                &excludes,
            )?;
            println!(
                "built {} as draft: {} files, {} bytes",
                record.version,
                record.files.len(),
                record.total_size()
            );
            Ok(())
        }
        Command::Release { version, notes } => {
            let version: Version = version.parse()?;
            let store = ReleaseStore::open(&config.release_root)?;
            let (record, already_approved) = store.approve(&version, notes).await?;
            if already_approved {
                println!("{} was already approved", record.version);
            } else {
                println!("{} approved", record.version);
            }
            Ok(())
        }
        Command::Info { version } => {
            let version: Version = version.parse()?;
            let store = ReleaseStore::open(&config.release_root)?;
            let record = store
                .record(&version)
                .await
                .ok_or_else(|| CourierError::VersionNotFound(version.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    }
}

async fn run_daemon(listen_addr: &str, config: ServerConfig) -> Result<()> {
    info!(
        release_root = %config.release_root.display(),
        %listen_addr,
        "courier-server starting"
    );

    let store = Arc::new(ReleaseStore::open(&config.release_root)?);
    let dispatcher = Dispatcher::new();
    register_commands(&dispatcher, store, config.chunk_size)?;

    let listener = Listener::bind(listen_addr).await?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let accept = tokio::spawn(listener.run(dispatcher, shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(e) => error!("failed to listen for interrupt: {e}"),
    }
    let _ = shutdown_tx.send(());

    accept
        .await
        .map_err(|e| CourierError::internal(format!("accept loop panicked: {e}")))?;
    info!("courier-server stopped");
    Ok(())
}
