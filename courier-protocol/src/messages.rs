//! Typed command bodies for the registry protocol
//!
//! Each registry command has a request/reply pair serialized as the JSON
//! body of a command envelope. Idents are plain strings looked up in the
//! dispatcher's handler registry.

use serde::{Deserialize, Serialize};

use crate::build::ManifestEntry;
use crate::version::Version;

/// Command identifiers exposed by the release registry.
pub mod ident {
    pub const LIST_VERSIONS: &str = "list_versions";
    pub const LATEST_VERSION: &str = "latest_version";
    pub const RELEASE_APPROVE: &str = "release_approve";
    pub const FETCH_MANIFEST: &str = "fetch_manifest";
    pub const FETCH_FILE: &str = "fetch_file";
    /// Liveness probe, answered by either role.
    pub const PING: &str = "ping";
}

/// `list_versions` reply: approved versions in ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionListReply {
    pub versions: Vec<Version>,
}

/// `latest_version` reply: highest approved version, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestVersionReply {
    pub version: Option<Version>,
}

/// `release_approve` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub version: Version,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `release_approve` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveReply {
    pub version: Version,
    /// True if the version was already approved (idempotent success).
    pub already_approved: bool,
}

/// `fetch_manifest` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRequest {
    pub version: Version,
}

/// `fetch_manifest` reply: manifest entries in transfer order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestReply {
    pub version: Version,
    pub files: Vec<ManifestEntry>,
}

/// `fetch_file` request. The caller allocates the transfer id and
/// registers a sink for it before sending the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFileRequest {
    pub version: Version,
    pub path: String,
    pub transfer_id: u64,
}

/// `fetch_file` reply, sent after the last chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFileReply {
    pub size: u64,
    pub chunks: u32,
}
