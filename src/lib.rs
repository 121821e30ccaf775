//! wsrpc - JSON-RPC 2.0 style request/response over WebSocket
//!
//! This is the convenience crate that re-exports the wsrpc sub-crates.
//!
//! # Architecture
//!
//! - **wsrpc-core**: Wire types, codec, error taxonomy, telemetry setup
//! - **wsrpc-server**: Method registry, dispatcher, serve loop, events, server
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wsrpc::WsRpcServer;
//! use wsrpc::core::RpcError;
//! use wsrpc::server::RequestContext;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize, Serialize)]
//! struct Echo { msg: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = WsRpcServer::builder()
//!         .bind_str("127.0.0.1:8080")?
//!         .handler("echo", |_ctx: RequestContext, p: Echo| async move {
//!             Ok::<_, RpcError>(p)
//!         })
//!         .build()
//!         .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub use wsrpc_core as core;
pub use wsrpc_server as server;

pub use wsrpc_core::{Error, IntoRpcError, Result, RpcError};
pub use wsrpc_server::WsRpcServer;
