//! Build pipeline: turn packaged artifacts into a draft Build Record
//!
//! The actual packaging step (the original system shells out to an
//! executable packager) is behind the [`Packager`] trait; the pipeline
//! owns version validation, the no-overwrite rule, manifest generation
//! with checksums, and writing the draft `status.json`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use courier_protocol::{BuildRecord, ManifestEntry, Version};
use courier_utils::checksum;
use courier_utils::{CourierError, Result};

use crate::store::STATUS_FILE;

/// File-name patterns excluded from every build unless overridden.
pub const DEFAULT_EXCLUDES: &[&str] = &["*.conf", "*.log"];

/// Packaging collaborator: materialize one version's artifacts under
/// `dest`. Implementations wrap whatever produces the deployable tree.
pub trait Packager {
    fn package(&self, version: &Version, dest: &Path) -> Result<()>;
}

/// Packager that copies a staged artifact tree verbatim.
pub struct DirPackager {
    source: PathBuf,
}

impl DirPackager {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl Packager for DirPackager {
    fn package(&self, _version: &Version, dest: &Path) -> Result<()> {
        if !self.source.is_dir() {
            return Err(CourierError::bad_request(format!(
                "source is not a directory: {}",
                self.source.display()
            )));
        }
        copy_tree(&self.source, dest)
    }
}

fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    for entry in fs::read_dir(source).map_err(|e| CourierError::FileRead {
        path: source.to_path_buf(),
        source: e,
    })? {
        let entry = entry.map_err(CourierError::Io)?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            fs::create_dir_all(&to).map_err(|e| CourierError::FileWrite {
                path: to.clone(),
                source: e,
            })?;
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| CourierError::FileWrite {
                path: to.clone(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Build pipeline for one release root.
pub struct Builder {
    release_root: PathBuf,
    platform: String,
}

impl Builder {
    pub fn new(release_root: impl Into<PathBuf>) -> Self {
        Self {
            release_root: release_root.into(),
            platform: std::env::consts::OS.to_string(),
        }
    }

    /// Produce a draft Build Record for `version`.
    ///
    /// Fails with `DuplicateBuild` if the version directory already
    /// exists. If the packaging step fails, the partially produced
    /// directory is left in place for inspection; callers clean up after
    /// confirming the failure.
    pub fn build(
        &self,
        version: &Version,
        packager: &dyn Packager,
        exclude_patterns: &[String],
    ) -> Result<BuildRecord> {
        let version_dir = self.release_root.join(version.to_string());
        if version_dir.exists() {
            return Err(CourierError::DuplicateBuild(version.to_string()));
        }
        fs::create_dir_all(&version_dir).map_err(|source| CourierError::FileWrite {
            path: version_dir.clone(),
            source,
        })?;

        packager.package(version, &version_dir)?;

        let mut files = Vec::new();
        collect_manifest(&version_dir, &version_dir, exclude_patterns, &mut files)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let record = BuildRecord::draft(version.clone(), self.platform.clone(), files);
        let status_path = version_dir.join(STATUS_FILE);
        fs::write(
            &status_path,
            serde_json::to_string_pretty(&record)?,
        )
        .map_err(|source| CourierError::FileWrite {
            path: status_path,
            source,
        })?;

        info!(
            version = %version,
            files = record.files.len(),
            bytes = record.total_size(),
            "build complete (draft)"
        );
        Ok(record)
    }
}

/// Minimal file-name pattern match: `*suffix`, `prefix*`, or exact.
fn matches_pattern(name: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else {
        name == pattern
    }
}

fn collect_manifest(
    root: &Path,
    dir: &Path,
    exclude_patterns: &[String],
    out: &mut Vec<ManifestEntry>,
) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| CourierError::FileRead {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let entry = entry.map_err(CourierError::Io)?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            collect_manifest(root, &path, exclude_patterns, out)?;
            continue;
        }

        if name == STATUS_FILE && dir == root {
            continue;
        }
        if exclude_patterns.iter().any(|p| matches_pattern(&name, p)) {
            debug!(file = %path.display(), "excluded from manifest");
            continue;
        }

        let size = fs::metadata(&path)
            .map_err(|e| CourierError::FileRead {
                path: path.clone(),
                source: e,
            })?
            .len();
        let relative = path
            .strip_prefix(root)
            .map_err(|_| CourierError::internal("walk escaped the version directory"))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        out.push(ManifestEntry {
            path: relative,
            size,
            checksum: checksum::file_checksum(&path)?,
        });
    }
    Ok(())
}
