//! Release store: the registry's single source of truth
//!
//! A `BTreeMap<Version, BuildRecord>` loaded from the release root at
//! startup and flushed back to `status.json` on every change. Each
//! version lives in its own directory:
//!
//! ```text
//! releases/
//!     0.9.0/
//!         status.json
//!         bin/agent
//!     1.0.0/
//!         status.json
//!         ...
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use courier_net::resolve_within;
use courier_protocol::{BuildRecord, BuildStatus, ManifestEntry, Version};
use courier_utils::{CourierError, Result};

/// Persisted record file name inside each version directory
pub const STATUS_FILE: &str = "status.json";

/// In-memory registry state backed by the release root on disk.
pub struct ReleaseStore {
    root: PathBuf,
    records: RwLock<BTreeMap<Version, BuildRecord>>,
}

impl ReleaseStore {
    /// Open (and create if missing) a release root and load every valid
    /// version directory. Directories without a readable `status.json`
    /// are skipped with a warning.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CourierError::FileWrite {
            path: root.clone(),
            source,
        })?;

        let records = Self::load(&root)?;
        info!(
            root = %root.display(),
            versions = records.len(),
            "release store opened"
        );
        Ok(Self {
            root,
            records: RwLock::new(records),
        })
    }

    fn load(root: &Path) -> Result<BTreeMap<Version, BuildRecord>> {
        let mut records = BTreeMap::new();

        for entry in fs::read_dir(root).map_err(|source| CourierError::FileRead {
            path: root.to_path_buf(),
            source,
        })? {
            let entry = entry.map_err(CourierError::Io)?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }

            let status_path = dir.join(STATUS_FILE);
            if !status_path.exists() {
                warn!(dir = %dir.display(), "no status.json, skipping");
                continue;
            }

            let record: BuildRecord = match fs::read_to_string(&status_path)
                .map_err(CourierError::Io)
                .and_then(|text| serde_json::from_str(&text).map_err(CourierError::Json))
            {
                Ok(record) => record,
                Err(e) => {
                    warn!(dir = %dir.display(), "unreadable status.json, skipping: {e}");
                    continue;
                }
            };

            if dir.file_name().map(|n| n.to_string_lossy().to_string())
                != Some(record.version.to_string())
            {
                warn!(
                    dir = %dir.display(),
                    version = %record.version,
                    "directory name does not match record version, skipping"
                );
                continue;
            }

            debug!(version = %record.version, status = ?record.status, "loaded build record");
            records.insert(record.version.clone(), record);
        }

        Ok(records)
    }

    /// Release root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one version's artifacts.
    pub fn version_dir(&self, version: &Version) -> PathBuf {
        self.root.join(version.to_string())
    }

    /// Approved versions in ascending order. Drafts are never listed.
    pub async fn approved_versions(&self) -> Vec<Version> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.is_approved())
            .map(|r| r.version.clone())
            .collect()
    }

    /// Highest approved version, if any.
    pub async fn latest_approved(&self) -> Option<Version> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.is_approved())
            .map(|r| r.version.clone())
            .max()
    }

    /// Look up a record regardless of status. Local administration only;
    /// never exposed over the wire.
    pub async fn record(&self, version: &Version) -> Option<BuildRecord> {
        self.records.read().await.get(version).cloned()
    }

    /// Transition a record from draft to approved and flush it to disk.
    ///
    /// Idempotent: approving an approved version succeeds (and may update
    /// the notes). Returns the record and whether it was already
    /// approved. Unknown versions fail with `VersionNotFound`.
    pub async fn approve(
        &self,
        version: &Version,
        notes: Option<String>,
    ) -> Result<(BuildRecord, bool)> {
        let mut records = self.records.write().await;
        let record = records
            .get(version)
            .ok_or_else(|| CourierError::VersionNotFound(version.to_string()))?;

        let already_approved = record.is_approved();
        let mut staged = record.clone();
        staged.status = BuildStatus::Approved;
        if let Some(notes) = notes {
            staged.release_notes = notes;
        }

        // Flush the staged copy before touching the map, while holding the
        // write lock. A failed flush leaves the in-memory record exactly
        // as it is on disk.
        self.persist(&staged)?;
        records.insert(version.clone(), staged.clone());

        info!(version = %version, already_approved, "version approved");
        Ok((staged, already_approved))
    }

    /// Manifest for an approved version. Draft and unknown versions both
    /// answer `NotApproved`: this is the authorization boundary, and it
    /// does not reveal whether a draft exists.
    pub async fn manifest(&self, version: &Version) -> Result<Vec<ManifestEntry>> {
        let records = self.records.read().await;
        match records.get(version) {
            Some(record) if record.is_approved() => Ok(record.files.clone()),
            _ => Err(CourierError::NotApproved(version.to_string())),
        }
    }

    /// Absolute path of one approved file, guarded against traversal and
    /// restricted to paths present in the manifest.
    pub async fn file_path(&self, version: &Version, relative: &str) -> Result<PathBuf> {
        let records = self.records.read().await;
        let record = match records.get(version) {
            Some(record) if record.is_approved() => record,
            _ => return Err(CourierError::NotApproved(version.to_string())),
        };

        if !record.files.iter().any(|f| f.path == relative) {
            return Err(CourierError::bad_request(format!(
                "'{relative}' is not in the manifest of {version}"
            )));
        }

        resolve_within(&self.version_dir(version), relative)
    }

    fn persist(&self, record: &BuildRecord) -> Result<()> {
        let path = self.version_dir(&record.version).join(STATUS_FILE);
        let text = serde_json::to_string_pretty(record)?;
        fs::write(&path, text).map_err(|source| CourierError::FileWrite { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_version(
        root: &Path,
        version: &str,
        status: BuildStatus,
        files: &[(&str, &[u8])],
    ) {
        let dir = root.join(version);
        let mut entries = Vec::new();
        for (rel, content) in files {
            let path = dir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, content).unwrap();
            entries.push(ManifestEntry {
                path: rel.to_string(),
                size: content.len() as u64,
                checksum: courier_utils::checksum::bytes_checksum(content),
            });
        }
        fs::create_dir_all(&dir).unwrap();
        let mut record =
            BuildRecord::draft(Version::parse(version).unwrap(), "linux".into(), entries);
        record.status = status;
        fs::write(
            dir.join(STATUS_FILE),
            serde_json::to_string_pretty(&record).unwrap(),
        )
        .unwrap();
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_drafts_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        seed_version(dir.path(), "0.9.0", BuildStatus::Draft, &[("a", b"1")]);
        seed_version(dir.path(), "1.0.0", BuildStatus::Approved, &[("a", b"2")]);

        let store = ReleaseStore::open(dir.path()).unwrap();
        assert_eq!(store.approved_versions().await, vec![v("1.0.0")]);
        assert_eq!(store.latest_approved().await, Some(v("1.0.0")));
    }

    #[tokio::test]
    async fn test_versions_sorted_ascending() {
        let dir = tempfile::tempdir().unwrap();
        for version in ["1.10.0", "1.2.0", "0.9.0"] {
            seed_version(dir.path(), version, BuildStatus::Approved, &[("a", b"x")]);
        }

        let store = ReleaseStore::open(dir.path()).unwrap();
        assert_eq!(
            store.approved_versions().await,
            vec![v("0.9.0"), v("1.2.0"), v("1.10.0")]
        );
        assert_eq!(store.latest_approved().await, Some(v("1.10.0")));
    }

    #[tokio::test]
    async fn test_empty_store_has_no_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReleaseStore::open(dir.path().join("releases")).unwrap();
        assert!(store.latest_approved().await.is_none());
        assert!(store.approved_versions().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_junk_directories() {
        let dir = tempfile::tempdir().unwrap();
        seed_version(dir.path(), "1.0.0", BuildStatus::Approved, &[("a", b"x")]);
        // Directory without status.json
        fs::create_dir_all(dir.path().join("2.0.0")).unwrap();
        // Malformed record
        fs::create_dir_all(dir.path().join("3.0.0")).unwrap();
        fs::write(dir.path().join("3.0.0").join(STATUS_FILE), "{oops").unwrap();
        // Loose file at the root
        fs::write(dir.path().join("README"), "hi").unwrap();

        let store = ReleaseStore::open(dir.path()).unwrap();
        assert_eq!(store.approved_versions().await, vec![v("1.0.0")]);
    }

    #[tokio::test]
    async fn test_approve_unknown_fails_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReleaseStore::open(dir.path()).unwrap();
        let err = store.approve(&v("1.0.0"), None).await.unwrap_err();
        assert!(matches!(err, CourierError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn test_approve_is_idempotent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        seed_version(dir.path(), "1.0.0", BuildStatus::Draft, &[("a", b"x")]);

        let store = ReleaseStore::open(dir.path()).unwrap();
        let (record, already) = store
            .approve(&v("1.0.0"), Some("first".into()))
            .await
            .unwrap();
        assert!(record.is_approved());
        assert!(!already);
        assert_eq!(record.release_notes, "first");

        let (record, already) = store.approve(&v("1.0.0"), None).await.unwrap();
        assert!(already);
        assert!(record.is_approved());
        assert_eq!(record.release_notes, "first");

        // Survives a reload
        let store = ReleaseStore::open(dir.path()).unwrap();
        assert_eq!(store.approved_versions().await, vec![v("1.0.0")]);
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_record_draft() {
        let dir = tempfile::tempdir().unwrap();
        seed_version(dir.path(), "1.0.0", BuildStatus::Draft, &[("a", b"x")]);

        let store = ReleaseStore::open(dir.path()).unwrap();
        // Make the status file unwritable by putting a directory in its place
        let status = dir.path().join("1.0.0").join(STATUS_FILE);
        fs::remove_file(&status).unwrap();
        fs::create_dir(&status).unwrap();

        let err = store.approve(&v("1.0.0"), None).await.unwrap_err();
        assert!(matches!(err, CourierError::FileWrite { .. }));

        // The in-memory record must not diverge from disk
        assert!(store.latest_approved().await.is_none());
        assert!(store.approved_versions().await.is_empty());
        assert!(!store.record(&v("1.0.0")).await.unwrap().is_approved());
    }

    #[tokio::test]
    async fn test_manifest_refuses_draft_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        seed_version(dir.path(), "0.9.0", BuildStatus::Draft, &[("a", b"x")]);

        let store = ReleaseStore::open(dir.path()).unwrap();
        for version in ["0.9.0", "5.0.0"] {
            let err = store.manifest(&v(version)).await.unwrap_err();
            assert!(matches!(err, CourierError::NotApproved(_)));
        }
    }

    #[tokio::test]
    async fn test_file_path_guards() {
        let dir = tempfile::tempdir().unwrap();
        seed_version(
            dir.path(),
            "1.0.0",
            BuildStatus::Approved,
            &[("lib/mod.bin", b"x")],
        );

        let store = ReleaseStore::open(dir.path()).unwrap();
        let path = store.file_path(&v("1.0.0"), "lib/mod.bin").await.unwrap();
        assert!(path.ends_with("1.0.0/lib/mod.bin"));

        // Not in the manifest
        let err = store
            .file_path(&v("1.0.0"), "status.json")
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::BadRequest(_)));

        // Draft version
        let err = store.file_path(&v("0.9.0"), "lib/mod.bin").await.unwrap_err();
        assert!(matches!(err, CourierError::NotApproved(_)));
    }
}
