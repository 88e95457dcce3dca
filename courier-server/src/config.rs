//! Server configuration, loaded from TOML with per-field defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use courier_protocol::DEFAULT_CHUNK_SIZE;
use courier_utils::{paths, CourierError, Result};

fn default_listen_addr() -> String {
    "0.0.0.0:7400".to_string()
}

fn default_release_root() -> PathBuf {
    paths::release_dir()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_release_root")]
    pub release_root: PathBuf,

    /// Chunk size for outbound file streaming, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            release_root: default_release_root(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl ServerConfig {
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
