//! Update engine: version check, staged download, verification
//!
//! Downloads never touch the running installation. Each update lands in
//! a fresh staging directory named after the version; the host process
//! swaps it in and restarts on its own schedule. A failed download
//! removes the whole staging directory so a later attempt starts clean.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use courier_net::{resolve_within, Connection};
use courier_protocol::messages::{
    ident, FetchFileReply, FetchFileRequest, LatestVersionReply, ManifestReply, ManifestRequest,
    VersionListReply,
};
use courier_protocol::{ManifestEntry, Version};
use courier_utils::{checksum, CourierError, Result};

/// A completed update, ready for the host process to swap in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub old_version: Version,
    pub new_version: Version,
    /// Directory holding the verified artifact tree.
    pub staging_path: PathBuf,
}

/// Result of one update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReport {
    /// No approved version is newer than the local one.
    UpToDate,
    Updated(UpdateOutcome),
}

/// Update client bound to one registry connection.
pub struct Updater {
    conn: Connection,
    local_version: Version,
    staging_root: PathBuf,
    timeout: Duration,
}

impl Updater {
    pub fn new(
        conn: Connection,
        local_version: Version,
        staging_root: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            conn,
            local_version,
            staging_root: staging_root.into(),
            timeout,
        }
    }

    pub fn local_version(&self) -> &Version {
        &self.local_version
    }

    /// Ask the registry for its latest approved version. Returns it only
    /// if it is strictly newer than the local one; an equal or older
    /// registry is not an update.
    pub async fn check(&self) -> Result<Option<Version>> {
        let reply = self
            .conn
            .invoke(ident::LATEST_VERSION, Value::Null, self.timeout)
            .await?;
        let reply: LatestVersionReply = serde_json::from_value(reply)?;

        match reply.version {
            Some(latest) if latest.is_newer_than(&self.local_version) => {
                info!(local = %self.local_version, %latest, "update available");
                Ok(Some(latest))
            }
            Some(latest) => {
                debug!(local = %self.local_version, %latest, "up to date");
                Ok(None)
            }
            None => {
                debug!("registry has no approved versions");
                Ok(None)
            }
        }
    }

    /// All approved versions the registry offers, ascending.
    pub async fn available_versions(&self) -> Result<Vec<Version>> {
        let reply = self
            .conn
            .invoke(ident::LIST_VERSIONS, Value::Null, self.timeout)
            .await?;
        let reply: VersionListReply = serde_json::from_value(reply)?;
        Ok(reply.versions)
    }

    /// Check and, if a newer version exists, download and verify it into
    /// the staging area.
    pub async fn update(&self) -> Result<UpdateReport> {
        let Some(target) = self.check().await? else {
            return Ok(UpdateReport::UpToDate);
        };

        let staging_path = match self.download(&target).await {
            Ok(path) => path,
            Err(e) => {
                warn!(version = %target, "update failed: {e}");
                return Err(e);
            }
        };

        info!(
            from = %self.local_version,
            to = %target,
            staging = %staging_path.display(),
            "update staged"
        );
        Ok(UpdateReport::Updated(UpdateOutcome {
            old_version: self.local_version.clone(),
            new_version: target,
            staging_path,
        }))
    }

    /// Download one version into `staging_root/<version>`, verifying
    /// every file. Any failure removes the staging directory.
    pub async fn download(&self, version: &Version) -> Result<PathBuf> {
        let reply = self
            .conn
            .invoke(
                ident::FETCH_MANIFEST,
                serde_json::to_value(ManifestRequest {
                    version: version.clone(),
                })?,
                self.timeout,
            )
            .await?;
        let manifest: ManifestReply = serde_json::from_value(reply)?;

        let staging = self.staging_root.join(version.to_string());
        if staging.exists() {
            debug!(dir = %staging.display(), "clearing stale staging directory");
            fs::remove_dir_all(&staging).map_err(|source| CourierError::FileWrite {
                path: staging.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&staging).map_err(|source| CourierError::FileWrite {
            path: staging.clone(),
            source,
        })?;

        let total = manifest.files.len();
        for (index, entry) in manifest.files.iter().enumerate() {
            debug!(
                file = %entry.path,
                bytes = entry.size,
                progress = format!("{}/{total}", index + 1),
                "fetching"
            );
            if let Err(e) = self.fetch_one(version, entry, &staging).await {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!(
                        dir = %staging.display(),
                        "failed to remove staging directory: {cleanup}"
                    );
                }
                return Err(e);
            }
        }

        Ok(staging)
    }

    async fn fetch_one(
        &self,
        version: &Version,
        entry: &ManifestEntry,
        staging: &std::path::Path,
    ) -> Result<()> {
        let dest = resolve_within(staging, &entry.path)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| CourierError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Register the sink before asking the server to stream, so no
        // chunk can arrive unrouted.
        let transfer_id = self.conn.allocate_transfer_id();
        let done = self.conn.expect_file(transfer_id, &dest, entry.size)?;

        let reply = match self
            .conn
            .invoke(
                ident::FETCH_FILE,
                serde_json::to_value(FetchFileRequest {
                    version: version.clone(),
                    path: entry.path.clone(),
                    transfer_id,
                })?,
                self.timeout,
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.conn.abort_transfer(transfer_id);
                return Err(e);
            }
        };
        let reply: FetchFileReply = serde_json::from_value(reply)?;

        tokio::time::timeout(self.timeout, done)
            .await
            .map_err(|_| CourierError::InvokeTimeout {
                ident: ident::FETCH_FILE.to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|_| CourierError::ConnectionClosed)??;

        if reply.size != entry.size {
            return Err(CourierError::SizeMismatch {
                path: entry.path.clone(),
                expected: entry.size,
                actual: reply.size,
            });
        }
        checksum::verify_file(&dest, &entry.checksum)?;
        Ok(())
    }
}
