//! TCP accept loop for the server role

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use courier_utils::{CourierError, Result};

use crate::connection::Connection;
use crate::dispatcher::Dispatcher;

/// Bound listening socket; [`run`](Listener::run) turns it into an
/// accept loop that wires every peer to a shared dispatcher.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to an address such as `"0.0.0.0:7400"`. Use port 0 to let
    /// the OS pick one, then read it back with [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CourierError::connection(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| CourierError::connection(format!("no local addr: {e}")))?;
        info!(%local_addr, "listener bound");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop until the shutdown signal fires. Each accepted
    /// stream becomes a [`Connection`] running the shared dispatcher.
    pub async fn run(self, dispatcher: Dispatcher, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!(%peer_addr, "new connection");
                            if let Err(e) = Connection::from_stream(stream, dispatcher.clone()) {
                                error!(%peer_addr, "failed to start connection: {e}");
                            }
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }
    }
}
