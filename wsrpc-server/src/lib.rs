//! JSON-RPC 2.0 style server over WebSocket
//!
//! This crate dispatches requests arriving on WebSocket connections to typed
//! handler functions, and pushes unsolicited events back to clients.
//!
//! # Core Features
//!
//! - **Typed Handlers**: Register `async fn(RequestContext, P) -> Result<R, E>`;
//!   params are decoded and results encoded for you
//! - **Error Mapping**: Handler errors carrying a JSON-RPC code reach the
//!   client verbatim, anything else becomes an internal error
//! - **Ordered Serving**: Each connection is served sequentially, so responses
//!   leave in request order
//! - **Events**: Send to one connection or broadcast to many concurrently
//! - **Cancellation**: Every connection and handler observes a
//!   `CancellationToken` derived from the server's
//! - **Observability**: OpenTelemetry metrics and tracing spans
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wsrpc_server::{RequestContext, WsRpcServer};
//! use wsrpc_core::RpcError;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AddParams { a: i32, b: i32 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = WsRpcServer::builder()
//!         .bind_str("127.0.0.1:8080")?
//!         .handler("add", |_ctx: RequestContext, p: AddParams| async move {
//!             Ok::<_, RpcError>(p.a + p.b)
//!         })
//!         .build()
//!         .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Accept loop** ([`WsRpcServer::run`]): accepts TCP connections until shutdown
//! - **Connection tasks**: perform the WebSocket handshake, then run [`serve`]
//! - **Dispatch** ([`dispatch`]): one frame in, one response out
//!
//! The building blocks are public on their own: [`serve`] works over any
//! [`Transport`], and [`broadcast_event`] over any slice of them.

mod builder;
mod connection;
mod dispatcher;
mod handler;
mod metrics;
mod notify;
mod registry;
mod transport;

pub use builder::ServerBuilder;
pub use connection::serve;
pub use dispatcher::dispatch;
pub use handler::{from_typed_fn, Handler, HandlerFuture, RequestContext, TypedHandler};
pub use metrics::ServerMetrics;
pub use notify::{broadcast_event, send_event, BroadcastResults, SendOutcome};
pub use registry::MethodRegistry;
pub use transport::{ConnectionId, Transport, WsConnection};

use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use wsrpc_core::{Error, Result};

/// Connection type accepted by [`WsRpcServer`]
pub type ServerConnection = WsConnection<TcpStream>;

/// Live connections by id
///
/// Shared between the accept loop, every connection task (which removes its
/// own entry on termination) and the event senders.
pub type ConnectionTable = Arc<Mutex<HashMap<ConnectionId, Arc<ServerConnection>>>>;

/// WebSocket RPC server
///
/// # Lifecycle
///
/// 1. **Build**: Create the server using `WsRpcServer::builder()`
/// 2. **Run**: `server.run().await` accepts connections until shutdown
/// 3. **Events**: `send_event` and `broadcast` push to live connections
/// 4. **Shutdown**: `shutdown()` (or dropping the server) cancels the accept
///    loop, every connection and every in-flight handler
pub struct WsRpcServer {
    listener: TcpListener,
    registry: MethodRegistry,
    connections: ConnectionTable,
    next_conn_id: AtomicU64,
    metrics: Option<Arc<ServerMetrics>>,
    shutdown: CancellationToken,
}

impl WsRpcServer {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Accept and serve connections until shutdown
    ///
    /// Each accepted connection is handled in its own task. Returns `Ok(())`
    /// on shutdown, or an error if the listener fails.
    #[tracing::instrument(skip(self), name = "server.run")]
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting WebSocket RPC server");

        loop {
            let (stream, addr) = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Server shut down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    accepted.map_err(|e| Error::Io(e.to_string()))?
                }
            };

            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
            tracing::info!(conn_id = conn_id, addr = %addr, "New connection accepted");

            tokio::spawn(handle_connection(
                stream,
                conn_id,
                self.registry.clone(),
                Arc::clone(&self.connections),
                self.metrics.clone(),
                self.shutdown.child_token(),
            ));
        }
    }

    /// Send an event to one live connection
    ///
    /// Fails with `Error::ConnectionClosed` if no live connection has that id.
    pub async fn send_event<T>(&self, conn_id: ConnectionId, name: &str, data: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let conn = self
            .connections
            .lock()
            .await
            .get(&conn_id)
            .cloned()
            .ok_or(Error::ConnectionClosed)?;

        let result = send_event(conn.as_ref(), name, data, &self.shutdown).await;
        if let Some(m) = &self.metrics {
            m.record_event(name, result.is_ok());
        }
        result
    }

    /// Broadcast an event to every live connection
    ///
    /// Targets are the connections live at the time of the call. The returned
    /// stream yields one outcome per target.
    #[tracing::instrument(skip(self, data))]
    pub async fn broadcast<T>(&self, name: &str, data: &T) -> Result<BroadcastResults<ServerConnection>>
    where
        T: Serialize + ?Sized,
    {
        let targets: Vec<Arc<ServerConnection>> =
            self.connections.lock().await.values().cloned().collect();

        tracing::debug!(targets = targets.len(), "Broadcasting event");
        notify::broadcast_instrumented(&targets, name, data, &self.shutdown, self.metrics.clone())
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Ids of live connections, sorted
    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Registered method names
    pub fn methods(&self) -> Vec<String> {
        self.registry.methods()
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Stop accepting, and cancel every connection and in-flight handler
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled on shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Drop for WsRpcServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Handshake, register, serve, unregister
async fn handle_connection(
    stream: TcpStream,
    conn_id: ConnectionId,
    registry: MethodRegistry,
    connections: ConnectionTable,
    metrics: Option<Arc<ServerMetrics>>,
    cancel: CancellationToken,
) {
    let accepted = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        accepted = WsConnection::accept(conn_id, stream) => accepted,
    };
    let conn = match accepted {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            tracing::warn!(conn_id = conn_id, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let active = {
        let mut table = connections.lock().await;
        table.insert(conn_id, Arc::clone(&conn));
        table.len()
    };
    if let Some(m) = &metrics {
        m.record_connection(active as i64);
    }

    let result = connection::serve_instrumented(&registry, conn.as_ref(), &cancel, metrics.as_deref()).await;

    let active = {
        let mut table = connections.lock().await;
        table.remove(&conn_id);
        table.len()
    };
    if let Some(m) = &metrics {
        m.record_disconnection(active as i64);
    }

    if !matches!(result, Err(Error::ConnectionClosed)) {
        if let Err(e) = conn.close().await {
            tracing::debug!(conn_id = conn_id, error = %e, "Close frame not sent");
        }
    }
}
