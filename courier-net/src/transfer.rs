//! Chunked file-transfer reassembly
//!
//! The receiving side of a transfer registers a sink keyed by transfer id
//! before requesting the stream. Chunks must land at the exact next
//! offset; anything else is a protocol violation and kills the
//! connection. Destination paths always pass through [`resolve_within`]
//! so a hostile manifest cannot write outside the destination root.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use courier_utils::{CourierError, Result};

/// Resolve a manifest-relative path strictly inside `root`.
///
/// Rejects absolute paths, parent-directory components, and path
/// prefixes. `.` components are ignored.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf> {
    let escape = || CourierError::PathEscapes {
        path: relative.to_string(),
    };

    if relative.is_empty() {
        return Err(escape());
    }

    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escape());
            }
        }
    }
    Ok(resolved)
}

/// One in-progress inbound file transfer.
struct TransferSink {
    file: File,
    path: PathBuf,
    expected: u64,
    received: u64,
    done: Option<oneshot::Sender<Result<()>>>,
}

impl TransferSink {
    fn finish(&mut self, result: Result<()>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(result);
        }
    }
}

/// Table of inbound transfers for one connection.
#[derive(Default)]
pub(crate) struct TransferTable {
    sinks: Mutex<HashMap<u64, TransferSink>>,
}

impl TransferTable {
    /// Register a sink for `transfer_id`, writing to `dest`. The returned
    /// receiver resolves once `expected` bytes have landed. Zero-byte
    /// files complete immediately with an empty file on disk.
    pub fn register(
        &self,
        transfer_id: u64,
        dest: &Path,
        expected: u64,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        let mut sinks = self.sinks.lock();
        // Reject before creating the file, or a duplicate id would
        // truncate the destination of the sink already in flight.
        if sinks.contains_key(&transfer_id) {
            return Err(CourierError::internal(format!(
                "transfer id {transfer_id} already registered"
            )));
        }

        let file = File::create(dest).map_err(|source| CourierError::FileWrite {
            path: dest.to_path_buf(),
            source,
        })?;

        let (done_tx, done_rx) = oneshot::channel();

        if expected == 0 {
            let _ = done_tx.send(Ok(()));
            return Ok(done_rx);
        }

        sinks.insert(
            transfer_id,
            TransferSink {
                file,
                path: dest.to_path_buf(),
                expected,
                received: 0,
                done: Some(done_tx),
            },
        );
        Ok(done_rx)
    }

    /// Append one chunk. Errors returned here are connection-fatal.
    pub fn write_chunk(&self, transfer_id: u64, offset: u64, data: &[u8]) -> Result<()> {
        let mut sinks = self.sinks.lock();
        let sink = sinks.get_mut(&transfer_id).ok_or_else(|| {
            CourierError::protocol(format!("chunk for unknown transfer {transfer_id}"))
        })?;

        if offset != sink.received {
            let err = CourierError::protocol(format!(
                "out-of-order chunk for transfer {transfer_id}: offset {offset}, expected {}",
                sink.received
            ));
            Self::discard(sinks.remove(&transfer_id), &err);
            return Err(err);
        }

        if sink.received + data.len() as u64 > sink.expected {
            let err = CourierError::protocol(format!(
                "transfer {transfer_id} overran its declared size {}",
                sink.expected
            ));
            Self::discard(sinks.remove(&transfer_id), &err);
            return Err(err);
        }

        if let Err(source) = sink.file.write_all(data) {
            let err = CourierError::FileWrite {
                path: sink.path.clone(),
                source,
            };
            Self::discard(sinks.remove(&transfer_id), &err);
            return Err(err);
        }

        sink.received += data.len() as u64;
        if sink.received == sink.expected {
            let result = sink
                .file
                .flush()
                .map_err(|source| CourierError::FileWrite {
                    path: sink.path.clone(),
                    source,
                });
            debug!(
                transfer_id,
                bytes = sink.expected,
                path = %sink.path.display(),
                "transfer complete"
            );
            sink.finish(result);
            sinks.remove(&transfer_id);
        }
        Ok(())
    }

    /// Drop a registered sink, e.g. when the request that would feed it
    /// failed. The partial file is removed.
    pub fn abort(&self, transfer_id: u64) {
        if let Some(mut sink) = self.sinks.lock().remove(&transfer_id) {
            sink.finish(Err(CourierError::ConnectionClosed));
            let _ = std::fs::remove_file(&sink.path);
        }
    }

    /// Fail every in-flight transfer with a connection-closed error.
    pub fn fail_all(&self) {
        let mut sinks = self.sinks.lock();
        for (transfer_id, mut sink) in sinks.drain() {
            warn!(transfer_id, "failing transfer: connection closed");
            sink.finish(Err(CourierError::ConnectionClosed));
            let _ = std::fs::remove_file(&sink.path);
        }
    }

    fn discard(sink: Option<TransferSink>, err: &CourierError) {
        if let Some(mut sink) = sink {
            sink.finish(Err(CourierError::protocol(err.to_string())));
            let _ = std::fs::remove_file(&sink.path);
        }
    }
}
