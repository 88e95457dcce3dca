//! Build Record and manifest types
//!
//! A Build Record is the immutable metadata for one versioned artifact
//! set, persisted as `status.json` inside its version directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Lifecycle state of a Build Record.
///
/// The only transition in this core is `Draft -> Approved`, one-way and
/// idempotent. Only approved records are visible to remote callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Draft,
    Approved,
}

/// One file in a version's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the version directory, `/`-separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// `"sha256:<hex>"` digest of the file contents.
    pub checksum: String,
}

/// Immutable metadata describing one versioned artifact set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub version: Version,
    pub status: BuildStatus,
    /// Platform the artifacts were built for (e.g. "linux").
    pub platform: String,
    pub built_at: DateTime<Utc>,
    /// Files in manifest order; order is preserved end to end.
    pub files: Vec<ManifestEntry>,
    #[serde(default)]
    pub release_notes: String,
}

impl BuildRecord {
    /// Create a fresh draft record for a completed build.
    pub fn draft(version: Version, platform: String, files: Vec<ManifestEntry>) -> Self {
        Self {
            version,
            status: BuildStatus::Draft,
            platform,
            built_at: Utc::now(),
            files,
            release_notes: String::new(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == BuildStatus::Approved
    }

    /// Total payload size across all manifest entries.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}
