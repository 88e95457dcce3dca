//! Command envelope carried by text frames
//!
//! An envelope pairs a command identifier with a per-connection
//! correlation id (`cid`) and an opaque JSON body. A response or error
//! envelope echoes the cid of the request it answers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use courier_utils::{CourierError, Result};

/// Whether an envelope opens a call or answers one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Request,
    Response,
    Error,
}

/// Typed error code carried in error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnsupportedCommand,
    VersionNotFound,
    NotApproved,
    DuplicateBuild,
    BadRequest,
    TransferFailed,
    Internal,
}

impl ErrorCode {
    /// Pick the code for an error produced by a local handler.
    pub fn for_error(err: &CourierError) -> Self {
        match err {
            CourierError::UnsupportedCommand(_) => Self::UnsupportedCommand,
            CourierError::VersionNotFound(_) => Self::VersionNotFound,
            CourierError::NotApproved(_) => Self::NotApproved,
            CourierError::DuplicateBuild(_) => Self::DuplicateBuild,
            CourierError::BadRequest(_) | CourierError::InvalidVersion { .. } => Self::BadRequest,
            CourierError::ChecksumMismatch { .. }
            | CourierError::SizeMismatch { .. }
            | CourierError::ConnectionClosed => Self::TransferFailed,
            _ => Self::Internal,
        }
    }

    /// Reconstruct a local error from a remote error envelope.
    pub fn into_error(self, message: String) -> CourierError {
        match self {
            Self::UnsupportedCommand => CourierError::UnsupportedCommand(message),
            Self::VersionNotFound => CourierError::VersionNotFound(message),
            Self::NotApproved => CourierError::NotApproved(message),
            Self::DuplicateBuild => CourierError::DuplicateBuild(message),
            Self::BadRequest => CourierError::BadRequest(message),
            Self::TransferFailed => CourierError::Connection(message),
            Self::Internal => CourierError::Internal(message),
        }
    }
}

/// Body of an error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// One command message: request, response, or error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub ident: String,
    pub cid: u64,
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    pub fn request(ident: impl Into<String>, cid: u64, body: Value) -> Self {
        Self {
            ident: ident.into(),
            cid,
            kind: EnvelopeKind::Request,
            body,
        }
    }

    pub fn response(ident: impl Into<String>, cid: u64, body: Value) -> Self {
        Self {
            ident: ident.into(),
            cid,
            kind: EnvelopeKind::Response,
            body,
        }
    }

    pub fn error(ident: impl Into<String>, cid: u64, code: ErrorCode, message: String) -> Self {
        let body = serde_json::to_value(ErrorBody { code, message })
            .unwrap_or(Value::Null);
        Self {
            ident: ident.into(),
            cid,
            kind: EnvelopeKind::Error,
            body,
        }
    }

    /// Serialize to the UTF-8 JSON payload of a text frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a text-frame payload. A payload that is not a valid envelope
    /// is a protocol error, fatal to the connection.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| CourierError::protocol(format!("malformed envelope: {e}")))
    }

    /// Extract the typed error from an error envelope body.
    pub fn error_body(&self) -> CourierError {
        match serde_json::from_value::<ErrorBody>(self.body.clone()) {
            Ok(body) => body.code.into_error(body.message),
            Err(_) => CourierError::internal(format!(
                "remote error for '{}' with unreadable body",
                self.ident
            )),
        }
    }
}
