//! Client configuration, loaded from TOML with per-field defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use courier_utils::{paths, CourierError, Result};

fn default_server_addr() -> String {
    "127.0.0.1:7400".to_string()
}

fn default_staging_root() -> PathBuf {
    paths::staging_dir()
}

fn default_invoke_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    /// Where verified downloads are staged, one directory per version.
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,

    /// Version the agent is currently running. The host process keeps
    /// this current; tooling may also pass it on the command line.
    #[serde(default)]
    pub local_version: Option<String>,

    #[serde(default = "default_invoke_timeout_secs")]
    pub invoke_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            staging_root: default_staging_root(),
            local_version: None,
            invoke_timeout_secs: default_invoke_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file, or defaults if the path does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| CourierError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text)
            .map_err(|e| CourierError::config(format!("{}: {e}", path.display())))
    }
}
