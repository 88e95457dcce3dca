//! courier - Update client CLI

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use courier_client::{ClientConfig, UpdateReport, Updater};
use courier_net::{Connection, Dispatcher};
use courier_protocol::Version;
use courier_utils::{init_logging_with_config, paths, CourierError, LogConfig, Result};

/// Update client for closed-network agents
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Update client for courier agents")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Registry address, overrides the config file
    #[arg(long, env = "COURIER_ADDR")]
    addr: Option<String>,

    /// Version the agent is currently running, overrides the config file
    #[arg(long)]
    local_version: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether a newer approved version exists
    Check,

    /// Download and verify the latest approved version
    Update,

    /// Poll for updates until one is staged
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 300)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging_with_config(LogConfig::client())?;

    let config_path = cli.config.unwrap_or_else(paths::config_file);
    let config = ClientConfig::load(&config_path)?;

    let addr = cli.addr.unwrap_or(config.server_addr.clone());
    let local_version: Version = cli
        .local_version
        .or(config.local_version.clone())
        .ok_or_else(|| {
            CourierError::config("local version not set (use --local-version or the config file)")
        })?
        .parse()?;
    let timeout = Duration::from_secs(config.invoke_timeout_secs);

    match cli.command {
        Command::Check => {
            let updater = connect(&addr, &local_version, &config, timeout).await?;
            match updater.check().await? {
                Some(version) => println!("update available: {version}"),
                None => println!("up to date ({})", updater.local_version()),
            }
        }
        Command::Update => {
            let updater = connect(&addr, &local_version, &config, timeout).await?;
            match updater.update().await? {
                UpdateReport::UpToDate => println!("up to date ({})", updater.local_version()),
                UpdateReport::Updated(outcome) => {
                    println!(
                        "staged {} at {}",
                        outcome.new_version,
                        outcome.staging_path.display()
                    );
                }
            }
        }
        Command::Watch { interval } => {
            let interval = Duration::from_secs(interval.max(1));
            // Fresh connection per attempt: agents on flaky closed
            // networks outlive any single socket.
            loop {
                let attempt = async {
                    let updater = connect(&addr, &local_version, &config, timeout).await?;
                    updater.update().await
                };
                match attempt.await {
                    Ok(UpdateReport::Updated(outcome)) => {
                        println!(
                            "staged {} at {}",
                            outcome.new_version,
                            outcome.staging_path.display()
                        );
                        break;
                    }
                    Ok(UpdateReport::UpToDate) => {}
                    Err(e) if e.is_retryable() => {
                        warn!("update attempt failed, will retry: {e}");
                    }
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(interval).await;
            }
        }
    }

    Ok(())
}

async fn connect(
    addr: &str,
    local_version: &Version,
    config: &ClientConfig,
    timeout: Duration,
) -> Result<Updater> {
    let conn = Connection::connect(addr, Dispatcher::new()).await?;
    info!(%addr, %local_version, "connected to registry");
    Ok(Updater::new(
        conn,
        local_version.clone(),
        &config.staging_root,
        timeout,
    ))
}
