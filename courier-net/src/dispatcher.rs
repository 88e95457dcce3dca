//! Command dispatcher
//!
//! Maps inbound request envelopes to registered handlers by command
//! identifier. Handlers run on their own spawned tasks, off the read
//! loop's critical path, so a handler is free to issue nested requests
//! on the connection that delivered it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use courier_protocol::{Envelope, ErrorCode};
use courier_utils::{CourierError, Result};

use crate::connection::Connection;

type BoxedHandler = Arc<dyn Fn(Value, Connection) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Registry of command handlers, shared by every connection of one role.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<String, BoxedHandler>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a command identifier. Handlers take the
    /// request body and the connection it arrived on; the value they
    /// return becomes the response body. Duplicate idents are rejected.
    pub fn register<F, Fut>(&self, ident: &str, handler: F) -> Result<()>
    where
        F: Fn(Value, Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(ident) {
            return Err(CourierError::internal(format!(
                "command ident collision: '{ident}'"
            )));
        }
        handlers.insert(
            ident.to_string(),
            Arc::new(move |body, conn| Box::pin(handler(body, conn))),
        );
        debug!(ident, "command handler registered");
        Ok(())
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Route one inbound request to its handler on a fresh task and send
    /// back the response or error envelope. Called by the read loop;
    /// returns immediately.
    pub(crate) fn dispatch(&self, request: Envelope, conn: Connection) {
        let handler = self.handlers.read().get(&request.ident).cloned();

        tokio::spawn(async move {
            let outcome = match handler {
                Some(handler) => handler(request.body, conn.clone()).await,
                None => Err(CourierError::UnsupportedCommand(request.ident.clone())),
            };

            let reply = match outcome {
                Ok(body) => Envelope::response(&request.ident, request.cid, body),
                Err(e) => {
                    warn!(ident = %request.ident, cid = request.cid, "handler failed: {e}");
                    Envelope::error(
                        &request.ident,
                        request.cid,
                        ErrorCode::for_error(&e),
                        e.to_string(),
                    )
                }
            };

            if let Err(e) = conn.send_envelope(&reply).await {
                debug!(ident = %request.ident, "could not send reply: {e}");
            }
        });
    }
}
