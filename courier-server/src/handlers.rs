//! Registry command handlers
//!
//! Wires the release store to the dispatcher. Handlers are thin: decode
//! the body, ask the store, encode the reply. Errors surface as typed
//! error envelopes on the peer's side.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use courier_net::{Connection, Dispatcher};
use courier_protocol::messages::{
    ident, ApproveReply, ApproveRequest, FetchFileReply, FetchFileRequest, LatestVersionReply,
    ManifestReply, ManifestRequest, VersionListReply,
};
use courier_utils::{CourierError, Result};

use crate::store::ReleaseStore;

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| CourierError::bad_request(e.to_string()))
}

/// Register every registry command on `dispatcher`.
pub fn register_commands(
    dispatcher: &Dispatcher,
    store: Arc<ReleaseStore>,
    chunk_size: usize,
) -> Result<()> {
    {
        let store = store.clone();
        dispatcher.register(ident::LIST_VERSIONS, move |_body, _conn: Connection| {
            let store = store.clone();
            async move {
                let versions = store.approved_versions().await;
                debug!(count = versions.len(), "list_versions");
                Ok(serde_json::to_value(VersionListReply { versions })?)
            }
        })?;
    }

    {
        let store = store.clone();
        dispatcher.register(ident::LATEST_VERSION, move |_body, _conn: Connection| {
            let store = store.clone();
            async move {
                let version = store.latest_approved().await;
                Ok(serde_json::to_value(LatestVersionReply { version })?)
            }
        })?;
    }

    {
        let store = store.clone();
        dispatcher.register(ident::RELEASE_APPROVE, move |body, _conn: Connection| {
            let store = store.clone();
            async move {
                let req: ApproveRequest = decode(body)?;
                let (record, already_approved) = store.approve(&req.version, req.notes).await?;
                info!(version = %record.version, already_approved, "approved over the wire");
                Ok(serde_json::to_value(ApproveReply {
                    version: record.version,
                    already_approved,
                })?)
            }
        })?;
    }

    {
        let store = store.clone();
        dispatcher.register(ident::FETCH_MANIFEST, move |body, _conn: Connection| {
            let store = store.clone();
            async move {
                let req: ManifestRequest = decode(body)?;
                let files = store.manifest(&req.version).await?;
                Ok(serde_json::to_value(ManifestReply {
                    version: req.version,
                    files,
                })?)
            }
        })?;
    }

    {
        let store = store.clone();
        dispatcher.register(ident::FETCH_FILE, move |body, conn: Connection| {
            let store = store.clone();
            async move {
                let req: FetchFileRequest = decode(body)?;
                let path = store.file_path(&req.version, &req.path).await?;
                debug!(
                    version = %req.version,
                    file = %req.path,
                    transfer_id = req.transfer_id,
                    "streaming file"
                );
                let (size, chunks) = conn.send_file(&path, req.transfer_id, chunk_size).await?;
                Ok(serde_json::to_value(FetchFileReply { size, chunks })?)
            }
        })?;
    }

    dispatcher.register(ident::PING, |_body, _conn: Connection| async move {
        Ok(json!("pong"))
    })?;

    Ok(())
}
