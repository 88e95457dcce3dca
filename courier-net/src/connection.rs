//! Connection: one duplex frame channel
//!
//! Each connection owns exactly one read loop and one writer task. All
//! outbound frames funnel through an mpsc queue into the writer, so two
//! concurrent senders can never interleave bytes. The read loop only
//! routes: requests are handed to the dispatcher (which spawns the
//! handler), responses complete the matching pending-correlation entry,
//! file chunks go to the transfer table. It never awaits application
//! logic, which is what makes nested `invoke` on the same connection
//! safe.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use courier_protocol::{Envelope, EnvelopeKind, Frame, FrameCodec};
use courier_utils::{CourierError, Result};

use crate::dispatcher::Dispatcher;
use crate::transfer::TransferTable;

/// Outbound queue depth; backpressures file streaming.
const WRITE_QUEUE: usize = 64;

/// Handle to an established duplex channel. Cheap to clone; the
/// underlying state is shared.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: Uuid,
    peer: String,
    outgoing: mpsc::Sender<Frame>,
    next_cid: AtomicU64,
    next_transfer_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
    transfers: TransferTable,
    shutdown_tx: broadcast::Sender<()>,
    closed: AtomicBool,
}

impl ConnectionInner {
    /// Deliver a response (or remote error) to whoever is waiting on the
    /// correlation id. Late responses after a timeout find no entry and
    /// are discarded.
    fn complete(&self, cid: u64, result: Result<Value>) {
        match self.pending.lock().remove(&cid) {
            Some(waiter) => {
                let _ = waiter.send(result);
            }
            None => debug!(cid, "discarding response with no pending call"),
        }
    }

    /// Fail everything outstanding and stop the writer. Idempotent.
    fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the senders resolves every waiter to ConnectionClosed
        self.pending.lock().clear();
        self.transfers.fail_all();
        let _ = self.shutdown_tx.send(());
    }
}

impl Connection {
    /// Connect to a remote peer and start the channel tasks.
    pub async fn connect(addr: &str, dispatcher: Dispatcher) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| CourierError::connection(format!("failed to connect to {addr}: {e}")))?;
        Self::from_stream(stream, dispatcher)
    }

    /// Wrap an accepted stream and start the channel tasks.
    pub fn from_stream(stream: TcpStream, dispatcher: Dispatcher) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());

        let (read_half, write_half) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(WRITE_QUEUE);
        let (shutdown_tx, _) = broadcast::channel(1);

        let inner = Arc::new(ConnectionInner {
            id: Uuid::new_v4(),
            peer,
            outgoing: outgoing_tx,
            next_cid: AtomicU64::new(1),
            next_transfer_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            transfers: TransferTable::default(),
            shutdown_tx: shutdown_tx.clone(),
            closed: AtomicBool::new(false),
        });

        let writer = FramedWrite::new(write_half, FrameCodec::new());
        tokio::spawn(write_loop(writer, outgoing_rx, shutdown_tx.subscribe()));

        let reader = FramedRead::new(read_half, FrameCodec::new());
        tokio::spawn(read_loop(
            Arc::clone(&inner),
            reader,
            dispatcher,
            shutdown_tx.subscribe(),
        ));

        debug!(id = %inner.id, peer = %inner.peer, "connection established");
        Ok(Self { inner })
    }

    /// Unique id of this connection.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Peer address, for logging.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// True once the channel has torn down.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the channel. Every pending call and in-flight transfer fails
    /// with a connection-closed error.
    pub fn close(&self) {
        self.inner.teardown();
    }

    /// Queue one frame for the writer task.
    async fn send_frame(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(CourierError::ConnectionClosed);
        }
        self.inner
            .outgoing
            .send(frame)
            .await
            .map_err(|_| CourierError::ConnectionClosed)
    }

    /// Send a command envelope as a text frame.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.send_frame(Frame::Text(envelope.encode()?)).await
    }

    /// Send an opaque binary blob.
    pub async fn send_binary(&self, data: Vec<u8>) -> Result<()> {
        self.send_frame(Frame::Binary(data)).await
    }

    /// Issue a request and await the correlated response.
    ///
    /// Allocates a fresh correlation id, suspends the calling task until
    /// the response arrives, the timeout elapses, or the connection
    /// closes. Safe to call from inside a command handler running on this
    /// same connection.
    pub async fn invoke(&self, ident: &str, body: Value, timeout: Duration) -> Result<Value> {
        let cid = self.inner.next_cid.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(cid, tx);

        let request = Envelope::request(ident, cid, body);
        if let Err(e) = self.send_envelope(&request).await {
            self.inner.pending.lock().remove(&cid);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped: the channel tore down while we waited
            Ok(Err(_)) => Err(CourierError::ConnectionClosed),
            Err(_) => {
                // Remove the entry so a late response is discarded
                self.inner.pending.lock().remove(&cid);
                Err(CourierError::InvokeTimeout {
                    ident: ident.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    /// Allocate a transfer id for a `fetch_file` call.
    pub fn allocate_transfer_id(&self) -> u64 {
        self.inner.next_transfer_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a sink for an expected inbound file of `size` bytes.
    /// Must be called before the request that triggers the stream.
    pub fn expect_file(
        &self,
        transfer_id: u64,
        dest: &Path,
        size: u64,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        self.inner.transfers.register(transfer_id, dest, size)
    }

    /// Drop a registered sink, e.g. after the triggering request failed.
    pub fn abort_transfer(&self, transfer_id: u64) {
        self.inner.transfers.abort(transfer_id);
    }

    /// Stream a file to the peer as in-order chunks. Returns the byte
    /// count and number of chunks sent.
    pub async fn send_file(
        &self,
        path: &Path,
        transfer_id: u64,
        chunk_size: usize,
    ) -> Result<(u64, u32)> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|source| CourierError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        let size = file
            .metadata()
            .await
            .map_err(|source| CourierError::FileRead {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut offset = 0u64;
        let mut chunks = 0u32;
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|source| CourierError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            self.send_frame(Frame::FileChunk {
                transfer_id,
                offset,
                data: buf[..n].to_vec(),
            })
            .await?;
            offset += n as u64;
            chunks += 1;
        }

        debug!(transfer_id, size, chunks, path = %path.display(), "file streamed");
        Ok((size, chunks))
    }
}

/// Writer task: the single place frames hit the socket.
async fn write_loop(
    mut writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut outgoing: mpsc::Receiver<Frame>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.send(frame).await {
                        debug!("write failed: {e}");
                        break;
                    }
                }
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Read loop: the only place frames are received for this connection.
async fn read_loop(
    inner: Arc<ConnectionInner>,
    mut reader: FramedRead<OwnedReadHalf, FrameCodec>,
    dispatcher: Dispatcher,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(frame)) => {
                    if let Err(e) = route_frame(&inner, &dispatcher, frame) {
                        error!(peer = %inner.peer, "protocol violation, closing connection: {e}");
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(peer = %inner.peer, "frame decode failed, closing connection: {e}");
                    break;
                }
                None => {
                    info!(peer = %inner.peer, "connection ended");
                    break;
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }
    inner.teardown();
}

/// Route one inbound frame. Returns an error only for connection-fatal
/// protocol violations.
fn route_frame(inner: &Arc<ConnectionInner>, dispatcher: &Dispatcher, frame: Frame) -> Result<()> {
    match frame {
        Frame::Text(payload) => {
            let envelope = Envelope::decode(&payload)?;
            match envelope.kind {
                EnvelopeKind::Request => {
                    dispatcher.dispatch(
                        envelope,
                        Connection {
                            inner: Arc::clone(inner),
                        },
                    );
                }
                EnvelopeKind::Response => inner.complete(envelope.cid, Ok(envelope.body)),
                EnvelopeKind::Error => {
                    let err = envelope.error_body();
                    inner.complete(envelope.cid, Err(err));
                }
            }
            Ok(())
        }
        Frame::Binary(data) => {
            // No consumer for raw blobs in this core
            debug!(peer = %inner.peer, len = data.len(), "discarding binary frame");
            Ok(())
        }
        Frame::FileChunk {
            transfer_id,
            offset,
            data,
        } => inner.transfers.write_chunk(transfer_id, offset, &data),
    }
}
