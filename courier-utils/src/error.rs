//! Error types for courier
//!
//! Provides a unified error type used across all courier crates. Every
//! failure carries a kind so callers can tell protocol violations
//! (connection-fatal) apart from application, integrity, and transport
//! failures without string matching.

use std::path::PathBuf;

/// Broad failure category, used to pick the recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed frames, traversal attempts, unknown commands. The
    /// offending connection is closed.
    Protocol,
    /// Typed command failures (not found, not approved, duplicate build).
    /// The connection stays open.
    Application,
    /// Checksum or size verification failure. Aborts the update, staging
    /// is discarded, the connection stays open.
    Integrity,
    /// Disconnects and timeouts. All pending calls on the connection fail.
    Transport,
    /// Everything else (IO, config, serialization, internal bugs).
    Other,
}

/// Main error type for courier operations
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Path escapes destination root: {path}")]
    PathEscapes { path: String },

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    // === Application Errors ===

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Version not approved: {0}")]
    NotApproved(String),

    #[error("Version already built: {0}")]
    DuplicateBuild(String),

    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    // === Integrity Errors ===

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    // === Transport Errors ===

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Command '{ident}' timed out after {seconds}s")]
    InvokeTimeout { ident: String, seconds: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Serialization Errors ===

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a bad-request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error into the four-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(_)
            | Self::FrameTooLarge { .. }
            | Self::PathEscapes { .. }
            | Self::UnsupportedCommand(_) => ErrorKind::Protocol,

            Self::VersionNotFound(_)
            | Self::NotApproved(_)
            | Self::DuplicateBuild(_)
            | Self::InvalidVersion { .. }
            | Self::BadRequest(_) => ErrorKind::Application,

            Self::ChecksumMismatch { .. } | Self::SizeMismatch { .. } => ErrorKind::Integrity,

            Self::ConnectionClosed | Self::InvokeTimeout { .. } | Self::Connection(_) => {
                ErrorKind::Transport
            }

            _ => ErrorKind::Other,
        }
    }

    /// Whether the connection that produced this error must be closed.
    pub fn is_connection_fatal(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    /// Check if a whole-operation retry might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvokeTimeout { .. } | Self::Connection(_) | Self::ConnectionClosed
        )
    }
}

/// Result type alias using CourierError
pub type Result<T> = std::result::Result<T, CourierError>;
