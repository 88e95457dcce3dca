//! Path utilities for courier
//!
//! Handles XDG Base Directory specification compliance for config,
//! data, and log directories.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Application identifier for XDG directories
const APP_NAME: &str = "courier";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/courier` or `~/.config/courier`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(fallback_config_dir)
}

/// Get the main configuration file path
///
/// Location: `$XDG_CONFIG_HOME/courier/config.toml`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the data directory (release store, staged downloads)
///
/// Location: `$XDG_DATA_HOME/courier` or `~/.local/share/courier`
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(fallback_data_dir)
}

/// Default release store root for the registry daemon
///
/// Location: `$XDG_DATA_HOME/courier/releases`
pub fn release_dir() -> PathBuf {
    data_dir().join("releases")
}

/// Default staging root for in-progress downloads
///
/// Location: `$XDG_DATA_HOME/courier/updates`
pub fn staging_dir() -> PathBuf {
    data_dir().join("updates")
}

/// Get the state directory
///
/// Location: `$XDG_STATE_HOME/courier` or `~/.local/state/courier`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(fallback_state_dir)
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/courier/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

// Fallback implementations when ProjectDirs is unavailable

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn fallback_config_dir() -> PathBuf {
    home_dir().join(".config").join(APP_NAME)
}

fn fallback_state_dir() -> PathBuf {
    home_dir().join(".local").join("state").join(APP_NAME)
}

fn fallback_data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join(APP_NAME)
}
